//! The fixed, process-wide set of operations the model may call.
pub mod operations;
pub mod registry;
pub mod schema;

pub use registry::{ToolDescriptor, ToolRegistry};
pub use schema::{ParamKind, ParamSpec, SourceRef, ToolArgs};
