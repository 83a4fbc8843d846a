//! Use Case Infrastructure
//!
//! - `UseCaseResult<T>` - result type for use case outcomes
//! - `UseCaseError` - categorized error types for consistent HTTP mapping
//! - `ExecutionContext` - principal and execution id carried through a use case

pub mod result;
pub mod error;
pub mod execution_context;

pub use result::UseCaseResult;
pub use error::UseCaseError;
pub use execution_context::ExecutionContext;
