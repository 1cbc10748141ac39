// # nawala-core
//
// Core library for censorship detection and shortlink failover.
//
// ## Architecture Overview
//
// - **BlockSignalDetector**: Sinkhole-address and block-page classification
// - **SignalProber**: One target through one resolver, folded into a status
// - **fuse**: Many per-resolver statuses into one verdict with confidence
// - **CheckEngine**: Concurrent per-resolver probes, fusion and hysteresis
// - **RotationService**: Cooldown-guarded shortlink rotation and rollback
// - **Store**: Persistent rows with atomic compound writes
// - **ProbeRegistry**: Plugin-based registry for lookups, fetchers and stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Classification logic is separate from network I/O
// 2. **Plugin-Based**: Lookups, fetchers and stores are registered, not hardcoded
// 3. **Library-First**: Scheduling and notification delivery live outside the core
// 4. **Atomicity**: A check or a rotation is written completely or not at all

pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod events;
pub mod fusion;
pub mod locks;
pub mod model;
pub mod prober;
pub mod registry;
pub mod rotation;
pub mod state;
pub mod stats;
pub mod traits;

// Re-export core types for convenience
pub use config::{DetectorConfig, EngineConfig, NawalaConfig, ProbeConfig, StoreConfig};
pub use detector::BlockSignalDetector;
pub use engine::{CheckEngine, CheckOutcome, CheckSummary};
pub use error::{Error, Result};
pub use events::{EngineEvent, EventSink, StatusChange};
pub use fusion::{Verdict, fuse};
pub use model::ProbeStatus;
pub use prober::SignalProber;
pub use registry::ProbeRegistry;
pub use rotation::RotationService;
pub use state::{FileStore, MemoryStore};
pub use stats::TargetStatistics;
pub use traits::{NameLookup, Notifier, PageFetcher, Prober, Store};
