//! Worldline Store - snapshot persistence
//!
//! Durable homes for world frames:
//!
//! - [`SnapshotStore`]: frames addressed by (pipeline, run, tick) plus a
//!   per-pipeline run index
//! - [`MemorySnapshotStore`]: in-process store for tests
//! - [`KvSnapshotStore`]: key-value binding over any [`KvBackend`], with
//!   [`SledBackend`] as the embedded engine
//! - [`ArchiveWriter`]: gzip JSON frame and archive files on disk
//! - Frame sinks plugging both into the pipeline runner

pub mod archive;
pub mod codec;
pub mod config;
pub mod error;
pub mod kv;
pub mod memory;
pub mod sink;
pub mod sled_backend;
pub mod traits;

pub use archive::{read_world_file, ArchiveWriter};
pub use codec::FrameCodec;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use kv::{KvBackend, KvSnapshotStore};
pub use memory::MemorySnapshotStore;
pub use sink::{ArchiveFrameSink, StoreFrameSink};
pub use sled_backend::SledBackend;
pub use traits::SnapshotStore;
