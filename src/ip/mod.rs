// src/ip/mod.rs

//! Information packets: the unit of data flowing between processes.
//!
//! - [`packet`] holds [`FileIp`] and the temp-then-atomize output protocol.
//! - [`audit`] holds [`AuditInfo`], the provenance carried by every IP and
//!   persisted as a JSON sidecar next to the artifact.

pub mod audit;
pub mod packet;

pub use audit::AuditInfo;
pub use packet::{AUDIT_SUFFIX, FileIp, TEMP_SUFFIX};
