//! loratail Pipeline
//!
//! Wires the frame assembler to the ingestion governor and enforces the
//! error budget.

pub mod governor;
pub mod pipeline;

pub use governor::{ErrorBudget, Governor, GovernorReport, GovernorState, TerminationReason};
pub use pipeline::Pipeline;
