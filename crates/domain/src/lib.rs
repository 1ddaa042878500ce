//! `ag-domain`: types shared by every agentgate crate.
//!
//! Configuration, the conversation model exchanged with the upstream
//! chat-completion API, the shared error type, and the deadline/cancellation
//! scope threaded through every downstream call.

pub mod config;
pub mod deadline;
pub mod error;
pub mod tool;

pub use deadline::{CallScope, Deadline, Interrupt};
pub use error::{Error, Result};
