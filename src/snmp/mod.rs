//! SNMP telemetry
//!
//! Layers, bottom up:
//!
//! - [`codec`]: BER encoding of v1/v2c messages
//! - [`client`]: request/response over UDP behind the [`SnmpClient`] trait
//! - [`session`]: community/version negotiation for one target
//! - [`vendor`]: per-brand OID profiles and value normalization
//! - [`rates`] and [`discovery`]: counter math and traffic interface selection

pub mod client;
pub mod codec;
pub mod discovery;
pub mod rates;
pub mod session;
pub mod vendor;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::time::Duration;

pub use client::{Agent, SnmpClient, UdpSnmpClient};
pub use codec::{Oid, SnmpVersion, Value, VarBind};
pub use session::SnmpSession;
pub use vendor::{VendorProfile, identify_brand, profile_for};

pub type SnmpResult<T> = Result<T, SnmpError>;

#[derive(Debug)]
pub enum SnmpError {
    Timeout(Duration),
    Io(std::io::Error),
    Encode(String),
    Decode(String),
    /// The agent answered with a non-zero error-status
    ErrorStatus { status: i64, index: i64 },
}

impl SnmpError {
    /// Whether the agent answered at all, meaning the credentials were accepted
    pub fn is_agent_response(&self) -> bool {
        matches!(self, SnmpError::ErrorStatus { .. })
    }
}

impl fmt::Display for SnmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpError::Timeout(after) => write!(f, "no SNMP response within {after:?}"),
            SnmpError::Io(err) => write!(f, "SNMP transport error: {err}"),
            SnmpError::Encode(msg) => write!(f, "cannot encode SNMP request: {msg}"),
            SnmpError::Decode(msg) => write!(f, "malformed SNMP message: {msg}"),
            SnmpError::ErrorStatus { status, index } => {
                write!(f, "agent returned error-status {status} at index {index}")
            }
        }
    }
}

impl std::error::Error for SnmpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnmpError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SnmpError {
    fn from(err: std::io::Error) -> Self {
        SnmpError::Io(err)
    }
}

/// Standard MIB-II / IF-MIB objects
pub mod oids {
    pub const SYS_DESCR: &str = "1.3.6.1.2.1.1.1.0";
    pub const SYS_OBJECT_ID: &str = "1.3.6.1.2.1.1.2.0";

    pub const IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";
    pub const IF_IN_OCTETS: &str = "1.3.6.1.2.1.2.2.1.10";
    pub const IF_OUT_OCTETS: &str = "1.3.6.1.2.1.2.2.1.16";
    pub const IF_HC_IN_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.6";
    pub const IF_HC_OUT_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.10";

    pub const HR_PROCESSOR_LOAD: &str = "1.3.6.1.2.1.25.3.3.1.2";
    pub const HR_STORAGE_SIZE: &str = "1.3.6.1.2.1.25.2.3.1.5";
    pub const HR_STORAGE_USED: &str = "1.3.6.1.2.1.25.2.3.1.6";

    pub const UCD_CPU_IDLE: &str = "1.3.6.1.4.1.2021.11.11.0";
    pub const UCD_MEM_TOTAL: &str = "1.3.6.1.4.1.2021.4.5.0";
    pub const UCD_MEM_AVAIL: &str = "1.3.6.1.4.1.2021.4.6.0";
}

/// Parse a constant OID
pub(crate) fn oid(dotted: &str) -> Oid {
    dotted.parse().unwrap_or_default()
}
