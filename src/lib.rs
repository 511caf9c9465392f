//! gxcompiler - Galaxy Workflow Lowering and Collection Rebuilding
//!
//! Converts hand-written Format 2 workflows into the native step graph a
//! workflow engine stores and runs, and rebuilds dataset collections from
//! declarative column rules.
//!
//! # Architecture
//!
//! The library is organized into three main modules:
//!
//! - [`workflow`]: The native step graph and the invariants it must satisfy
//! - [`format2`]: Format 2 loading, label resolution and step lowering
//! - [`rules`]: Rule application, identifier mapping and collection assembly
//!
//! # Example
//!
//! ```rust,no_run
//! use gxcompiler::format2::{convert_path, NoToolCatalog};
//! use gxcompiler::rules::RuleDocument;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Lower a Format 2 workflow
//!     let workflow = convert_path("pipeline.gxwf.yml", &NoToolCatalog)?;
//!     println!("{}", workflow.to_json_pretty()?);
//!
//!     // Rebuild a collection from a rule document
//!     let collection = RuleDocument::load("rules.yml")?.run()?;
//!     println!("{} elements", collection.element_count());
//!     Ok(())
//! }
//! ```

pub mod format2;
pub mod rules;
pub mod workflow;

// Re-export commonly used types
pub use format2::{convert, convert_path, ConversionError, ConversionOptions, Converter};
pub use rules::{rebuild_collection, RebuiltCollection, RuleDocument, RuleError, RuleSet};
pub use workflow::{NativeStep, NativeWorkflow, StepType};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "gxcompiler";
