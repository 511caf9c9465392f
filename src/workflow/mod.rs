//! Native Workflow Module
//!
//! Shared data model for the lowered step graph.
//!
//! # Structure
//!
//! - [`encoding`]: Legacy JSON encoding of nested state strings
//! - [`model`]: Native step graph (NativeWorkflow, NativeStep)
//! - [`state_path`]: Structured addressing into tool state
//! - [`validator`]: Graph invariants checked after conversion

pub mod encoding;
pub mod model;
pub mod state_path;
pub mod validator;

pub use model::{
    describe_step, ConnectionRef, NativeStep, NativeWorkflow, Position, PostJobAction, StepInput,
    StepType, ToolState, WorkflowOutput,
};
pub use encoding::encode_json;
pub use state_path::{PathSegment, StatePath};
pub use validator::{validate_workflow, ValidationError};
