//! Shared plumbing for the laser level workspace: logging setup, the ready
//! gate used for drop-on-busy frame handoff, published snapshots and
//! serde file-format helpers.

pub mod file_format;
pub mod log_setup;
pub mod published;
pub mod ready_gate;
pub mod serde;

pub use file_format::{FileExtensionError, SerdeFormat};
pub use published::Published;
pub use ready_gate::{ReadyGate, ReadyPermit};
