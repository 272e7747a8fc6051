//! Tool registration, validation and execution.
//!
//! A [`Tool`] pairs a [`ToolDefinition`] with a compiled JSON Schema and a
//! typed handler. Execution never fails outright: validation errors, handler
//! errors and handler panics all come back as a [`ToolResult`] failure, and
//! the context's audit hooks observe every outcome.

mod definitions;
mod registry;
mod result;
mod tool;

pub use definitions::{handler_fn, ApprovalPredicate, FnHandler, ToolDefinition, ToolHandler};
pub use registry::{DynTool, ToolRegistry};
pub use result::ToolResult;
pub use tool::Tool;
