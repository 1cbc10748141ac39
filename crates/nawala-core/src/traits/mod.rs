//! Core traits for the probe engine
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`NameLookup`]: Resolve a hostname through one resolver
//! - [`PageFetcher`]: Fetch a page with typed failure classification
//! - [`Prober`]: Classify one (target, resolver) probe
//! - [`Store`]: Persistent rows and atomic compound writes
//! - [`Notifier`]: Deliver status-change events

pub mod fetcher;
pub mod lookup;
pub mod notifier;
pub mod prober;
pub mod store;

pub use fetcher::{FetchFailure, FetchedPage, PageFetcher, PageFetcherFactory};
pub use lookup::{NameLookup, NameLookupFactory};
pub use notifier::Notifier;
pub use prober::{ProbeOutcome, Prober};
pub use store::{
    CheckCommit, CommittedCheck, RotationCommit, StatusTransition, Store, StoreFactory,
};
