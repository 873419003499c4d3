//! Entities: scan snapshots, the timeline host interface and its
//! in-memory implementation.

pub mod models;
pub mod project;
pub mod traits;

pub use models::{DepartmentInfo, MediaFiles, MediaType, ScanResult, SequenceShots, ShotInfo, ShotRef};
pub use project::MemoryHost;
pub use traits::{
    BinId, ClipId, ClipSource, ItemId, ItemRange, Placement, TimelineHost, TimelineId, TrackId, TrackKind,
};
