//! podsync client - live Data API access.
//!
//! [`TubeClient`] implements `podsync_core::MediaClient` against the video
//! platform's public Data API: paged playlist listings and batched video
//! statistics, one pool credential per call, with quota-aware rotation.

pub mod tube;

pub use tube::TubeClient;
