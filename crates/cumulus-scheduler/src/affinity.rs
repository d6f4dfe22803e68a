//! Locality preferences: networks already present, images already cached,
//! and keeping the network node lightly loaded.
//!
//! The narrowing functions are pure. The `collect_*` helpers gather the
//! counts they operate on from the catalogs.

use crate::catalog::{ImageCatalog, InstanceCatalog};
use crate::error::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Networks attached to instances on each node
pub type NetworksByNode = HashMap<String, HashSet<String>>;

/// Group candidates by score, preserving candidate order within a group
fn bucket_by<F>(candidates: &[String], score: F) -> BTreeMap<usize, Vec<String>>
where
    F: Fn(&str) -> usize,
{
    let mut buckets: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for node in candidates {
        buckets.entry(score(node)).or_default().push(node.clone());
    }
    buckets
}

/// Narrow to the candidates already attached to the most requested networks
///
/// When the best score is a single match held only by the network node, the
/// candidates are returned unchanged: that node carries every network.
pub fn most_matching_networks(
    requested: &[String],
    candidates: &[String],
    present: &NetworksByNode,
    network_node: Option<&str>,
) -> Vec<String> {
    let mut buckets = bucket_by(candidates, |node| {
        present
            .get(node)
            .map(|networks| requested.iter().filter(|n| networks.contains(*n)).count())
            .unwrap_or(0)
    });

    let Some((max, best)) = buckets.pop_last() else {
        return Vec::new();
    };

    if max == 1 && network_node.is_some_and(|nn| best.len() == 1 && best[0] == nn) {
        debug!("Only the network node matches; no network preference");
        return candidates.to_vec();
    }

    debug!("Best network match count is {}", max);
    best
}

/// Narrow to the candidates holding the most requested images
///
/// Candidates missing from `matches` hold none. If no candidate holds any,
/// every candidate ties at zero and the set is unchanged.
pub fn most_matching_images(candidates: &[String], matches: &HashMap<String, usize>) -> Vec<String> {
    let mut buckets = bucket_by(candidates, |node| matches.get(node).copied().unwrap_or(0));

    match buckets.pop_last() {
        Some((max, best)) => {
            debug!("Best image match count is {}", max);
            best
        }
        None => Vec::new(),
    }
}

/// Drop the network node when some other candidate remains
pub fn avoid_network_node(candidates: &[String], network_node: Option<&str>) -> Vec<String> {
    match network_node {
        Some(nn) if candidates.len() > 1 && candidates.iter().any(|c| c == nn) => {
            candidates.iter().filter(|c| *c != nn).cloned().collect()
        }
        _ => candidates.to_vec(),
    }
}

/// Names with repeats dropped, first occurrence wins
pub fn dedup_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|n| seen.insert(n.as_str()))
        .cloned()
        .collect()
}

/// Scan placed instances for the networks present on each node
pub async fn collect_networks_by_node(catalog: &dyn InstanceCatalog) -> Result<NetworksByNode> {
    let mut present = NetworksByNode::new();

    for instance in catalog.list_instances().await? {
        let Some(node) = instance.placed_on() else {
            continue;
        };
        let networks = present.entry(node.to_string()).or_default();
        for iface in catalog.interfaces(&instance.uuid).await? {
            networks.insert(iface.network_uuid);
        }
    }

    Ok(present)
}

/// Number of distinct requested images each candidate holds an active copy of
pub async fn collect_image_matches(
    catalog: &dyn ImageCatalog,
    urls: &[String],
    candidates: &[String],
) -> Result<HashMap<String, usize>> {
    let mut matches: HashMap<String, usize> = HashMap::new();

    for url in urls {
        let holders: HashSet<String> = catalog
            .active_images(url)
            .await?
            .into_iter()
            .map(|image| image.node)
            .filter(|node| candidates.contains(node))
            .collect();

        for node in holders {
            *matches.entry(node).or_default() += 1;
        }
    }

    Ok(matches)
}

/// Canonical URLs for every base image the instance uses, deduplicated
pub async fn resolve_images<'a, I>(catalog: &dyn ImageCatalog, bases: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut urls: Vec<String> = Vec::new();
    for base in bases {
        let url = catalog.resolve(base).await?;
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    Ok(urls)
}
