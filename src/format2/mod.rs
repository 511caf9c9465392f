//! Format 2 to native workflow conversion.

pub mod actions;
pub mod connections;
pub mod context;
pub mod converter;
pub mod document;
pub mod error;
pub mod inputs;
pub mod loader;
pub mod outputs;
pub mod transform;

pub use context::{ContextArena, ScopeId};
pub use converter::{convert, convert_path, ConversionOptions, Converter, ImportedTool, NoToolCatalog, ToolCatalog};
pub use error::{ConversionError, Result};
pub use loader::{load_document, parse_document, save_native};
