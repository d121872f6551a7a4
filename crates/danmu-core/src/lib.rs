//! danmu-core: cross-provider aggregation engine for timed video comments.
//!
//! This crate holds everything that does not touch the network:
//!
//! ## Core Types
//!
//! - [`DramaInfo`] / [`EpisodeInfo`] / [`SegmentInfo`] - provider-side records
//! - [`ProviderComment`] - a single comment as reported by one provider
//! - [`Comment`] - the canonical, deduplicated output entity
//! - [`DanmuProvider`] - trait implemented once per content provider
//!
//! ## Algorithms
//!
//! - [`codec`] - the opaque identifier encode/decode protocol
//! - [`episode`] - episode number parsing and junk-title filtering
//! - [`locator`] - floor binary search over time-sorted segments
//! - [`engine`] - concurrent fan-out aggregation with deduplication
//!
//! ## Configuration
//!
//! - [`ProviderParams`] - immutable parameter snapshot passed through every call

pub mod codec;
pub mod config;
pub mod engine;
pub mod episode;
pub mod error;
pub mod locator;
pub mod model;
pub mod provider;

pub use config::ProviderParams;
pub use engine::aggregate;
pub use error::{DanmuError, Result};
pub use locator::find_active_segment;
pub use model::{
    Comment, CommentMode, DramaInfo, EpisodeInfo, ProviderComment, SegmentInfo, sort_segments,
};
pub use provider::DanmuProvider;
