//! Echocycle Core - Types, step addressing, event protocol, and error handling

pub mod address;
pub mod error;
pub mod protocol;
pub mod types;

pub use address::{cycle_addresses, primary_stream_for_step, to_step_address, CYCLE_LENGTH};
pub use error::{Error, Result};
pub use protocol::*;
pub use types::*;
