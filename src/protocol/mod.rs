//! Chat wire protocol
//!
//! Message envelope and topic validation shared by publishers and subscribers.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
