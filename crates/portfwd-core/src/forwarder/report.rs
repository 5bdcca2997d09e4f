//! Operator status lines
//!
//! The exact wording is scraped by downstream log tooling, so it is kept
//! byte for byte, including the double space after "successful".

use crate::error::Error;
use crate::traits::MappingInfo;
use chrono::Local;

pub const INITIALIZED: &str = "Port forward => Initialized successfully";
pub const INITIALIZATION_FAILED: &str = "Port forward => Initialization failed!";
pub const MAPPING_INIT_FAILED: &str = "Port forward => Failed to init mapping!";
pub const MAPPING_FAILED: &str = "Port forward => Mapping failed!";
pub const MAPPING_REMOVED: &str = "Port forward => Mapping removed";
pub const SHUTDOWN: &str = "Port forward => Shutdown";

/// Format used for lease expiry, same as the host's log timestamps
const LEASE_END_FORMAT: &str = "%m/%d %H:%M:%S";

/// `[internal]:port <-> [external]:port` line for one granted mapping
///
/// IPv4-mapped IPv6 addresses are shown in dotted form.
pub fn mapping_successful(info: &MappingInfo) -> String {
    format!(
        "Port forward => Mapping successful  [{}]:{} <-> [{}]:{}",
        info.internal_ip.to_canonical(),
        info.internal_port,
        info.external_ip.to_canonical(),
        info.external_port
    )
}

/// Lease expiry line for one granted mapping, in local time
pub fn mapping_valid_until(info: &MappingInfo) -> String {
    format!(
        "Port forward => Mapping valid until {}",
        info.lease_end.with_timezone(&Local).format(LEASE_END_FORMAT)
    )
}

/// A diagnostic line forwarded from the engine
pub fn engine_message(message: &str) -> String {
    format!("Port forward => {}", message)
}

/// A collaborator failure
pub fn failure(err: &Error) -> String {
    format!("Port forward => {}", err)
}
