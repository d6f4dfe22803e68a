use crate::{Result, StorageError};

/// Key encoder for storage keys
///
/// Layout:
/// - records: `record/{object_type}/{uuid}`
/// - attributes: `attribute/{object_type}/{uuid}/{name}`
/// - events: `event/{object_type}/{uuid}/{sequence}`
///
/// Segments may not be empty or contain `/`, otherwise one object's
/// prefix could cover another object's keys.
pub struct KeyEncoder;

impl KeyEncoder {
    /// Encode the key of an object's static record
    pub fn encode_record_key(object_type: &str, uuid: &str) -> Result<String> {
        Ok(format!(
            "record/{}/{}",
            segment("object_type", object_type)?,
            segment("uuid", uuid)?
        ))
    }

    /// Encode a prefix for scanning every record of a type
    pub fn encode_record_prefix(object_type: &str) -> Result<String> {
        Ok(format!("record/{}/", segment("object_type", object_type)?))
    }

    /// Encode the key of a named attribute
    pub fn encode_attribute_key(object_type: &str, uuid: &str, name: &str) -> Result<String> {
        Ok(format!(
            "attribute/{}/{}/{}",
            segment("object_type", object_type)?,
            segment("uuid", uuid)?,
            segment("attribute", name)?
        ))
    }

    /// Encode the key of one event; `sequence` must sort chronologically
    pub fn encode_event_key(object_type: &str, uuid: &str, sequence: &str) -> Result<String> {
        Ok(format!(
            "{}{}",
            Self::encode_event_prefix(object_type, uuid)?,
            segment("sequence", sequence)?
        ))
    }

    /// Encode a prefix for scanning an object's events
    pub fn encode_event_prefix(object_type: &str, uuid: &str) -> Result<String> {
        Ok(format!(
            "event/{}/{}/",
            segment("object_type", object_type)?,
            segment("uuid", uuid)?
        ))
    }

    /// Parse a record key back to (object_type, uuid)
    pub fn parse_record_key(key: &str) -> Option<(String, String)> {
        let rest = key.strip_prefix("record/")?;
        let (object_type, uuid) = rest.split_once('/')?;
        if object_type.is_empty() || uuid.is_empty() || uuid.contains('/') {
            return None;
        }
        Some((object_type.to_string(), uuid.to_string()))
    }
}

fn segment<'a>(kind: &'static str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() || value.contains('/') {
        return Err(StorageError::invalid_key(kind, value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_record_key() {
        assert_eq!(
            KeyEncoder::encode_record_key("node", "sf-1").unwrap(),
            "record/node/sf-1"
        );
        assert_eq!(KeyEncoder::encode_record_prefix("node").unwrap(), "record/node/");
    }

    #[test]
    fn test_encode_attribute_and_event_keys() {
        assert_eq!(
            KeyEncoder::encode_attribute_key("node", "sf-1", "state").unwrap(),
            "attribute/node/sf-1/state"
        );
        assert_eq!(
            KeyEncoder::encode_event_key("instance", "abc", "00000000000000000001-0000000000")
                .unwrap(),
            "event/instance/abc/00000000000000000001-0000000000"
        );
        assert!(KeyEncoder::encode_event_key("instance", "abc", "1")
            .unwrap()
            .starts_with(&KeyEncoder::encode_event_prefix("instance", "abc").unwrap()));
    }

    #[test]
    fn test_slash_in_segment_is_rejected() {
        // "a/b" would otherwise fall under the event prefix of "a"
        let err = KeyEncoder::encode_event_prefix("node", "a/b").unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { kind: "uuid", .. }));

        assert!(KeyEncoder::encode_record_key("node", "a/b").is_err());
        assert!(KeyEncoder::encode_attribute_key("node", "sf-1", "x/y").is_err());
        assert!(KeyEncoder::encode_record_prefix("no/de").is_err());
        assert!(KeyEncoder::encode_record_key("node", "").is_err());
    }

    #[test]
    fn test_parse_record_key() {
        let (object_type, uuid) = KeyEncoder::parse_record_key("record/node/sf-1").unwrap();
        assert_eq!(object_type, "node");
        assert_eq!(uuid, "sf-1");

        assert!(KeyEncoder::parse_record_key("attribute/node/sf-1/state").is_none());
        assert!(KeyEncoder::parse_record_key("record/node/").is_none());
        assert!(KeyEncoder::parse_record_key("record/node/a/b").is_none());
    }
}
