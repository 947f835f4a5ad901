//! Remote execution service boundary
//!
//! The controller never assembles or executes anything itself. It talks to
//! the simulator through [`ExecutionService`], which the HTTP client
//! implements for the real service and tests implement with a script.

mod http;
#[cfg(test)]
pub(crate) mod scripted;

pub use http::HttpExecutionService;

use std::future::Future;

use crate::error::Fault;
use crate::memory_edit::MemoryEdit;
use crate::types::{FlagConfiguration, ServiceResponse};

/// Request/response operations offered by the simulator
///
/// Every call either yields a response or a [`Fault::Service`]. Timeouts
/// are the implementation's concern and surface as faults too.
pub trait ExecutionService: Send {
    /// Load and assemble a program; `state.ready` tells whether it can run
    fn assemble(
        &mut self,
        source: &str,
        flags: &FlagConfiguration,
    ) -> impl Future<Output = Result<ServiceResponse, Fault>> + Send;

    /// Execute exactly one instruction
    fn step_once(&mut self) -> impl Future<Output = Result<ServiceResponse, Fault>> + Send;

    /// Discard the loaded program and simulator state
    fn reset(&mut self) -> impl Future<Output = Result<ServiceResponse, Fault>> + Send;

    fn edit_memory(
        &mut self,
        edit: &MemoryEdit,
    ) -> impl Future<Output = Result<ServiceResponse, Fault>> + Send;
}
