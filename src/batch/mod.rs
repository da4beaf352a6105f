//! TOML batch files: the on-disk format the CLI feeds to the engine.

pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, BatchFileError};
pub use schema::{BatchFile, BatchIssue, BatchValidationError, Meta};
