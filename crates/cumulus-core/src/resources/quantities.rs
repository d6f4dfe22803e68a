//! Unit conversions between the figures nodes report and the units requests use.
//!
//! Nodes report memory in MiB and free disk in bytes. Instances request
//! memory in MiB and disk in GiB. Reservations are configured in GiB.

pub const MIB_PER_GIB: f64 = 1024.0;
pub const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Convert a GiB figure to MiB
pub fn gib_to_mib(gib: f64) -> f64 {
    gib * MIB_PER_GIB
}

/// Convert a byte count to GiB
pub fn bytes_to_gib(bytes: f64) -> f64 {
    bytes / BYTES_PER_GIB
}
