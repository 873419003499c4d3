//! Scan engine: version tokens, path parsing, cache, worker pool, scanner.
//!
//! Nothing here touches a timeline host.

pub mod cache_man;
pub mod path_parser;
pub mod scanner;
pub mod versions;
pub mod workers;

// Re-exports for convenience
pub use cache_man::{CacheManager, CacheStats};
pub use path_parser::PathParser;
pub use scanner::ProjectScanner;
pub use versions::VersionManager;
pub use workers::Workers;
