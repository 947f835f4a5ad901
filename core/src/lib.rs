//! HexLogic execution controller
//!
//! Client-side control of an 8051 simulator service: assemble, step, run
//! with breakpoints and run-to-cursor, pause, stop, reset and memory edits,
//! driven through a session task that serializes every action.

pub mod application;
pub mod cli;
pub mod config;
pub mod error;
pub mod memory_edit;
pub mod registry;
pub mod report;
pub mod service;
pub mod session;
pub mod types;

pub use types::*;

// Re-export init API for convenience
pub use application::{initialize, Application, InitBuilder, InitOptions};
pub use error::{Fault, Line, SessionError};
pub use session::{Action, HaltReason, Outcome, SessionEvent, SessionHandle};
