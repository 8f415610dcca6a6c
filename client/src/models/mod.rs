//! Data models for the Housemate client
//!
//! Records are built from server payloads, merged in place when updates
//! with the same primary key arrive, and dropped on logout.

pub mod de;
mod record;
mod types;

pub use record::{Record, RecordKey};
pub use types::*;
