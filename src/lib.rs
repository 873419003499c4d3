//! shotreel - review timeline assembly for episodic shot trees
//!
//! Scans `{Ep}/{sq}/{SH}/{dept}` hierarchies, resolves versions and builds
//! (or updates in place) review timelines through a host adapter.

// Scan engine (versions, paths, cache, workers, scanner)
pub mod core;

// Timeline assembly and mutators
pub mod timeline;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod progress;
pub mod utils;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-export commonly used types
pub use core::{CacheManager, PathParser, ProjectScanner, VersionManager};
pub use entities::{MemoryHost, TimelineHost};
pub use error::{BuildError, ConfigError, HostError, ItemError, ScanError};
pub use timeline::{TimelineBuilder, TimelineConfig};
