//! danmu-providers: concrete provider adapters and the aggregation registry.
//!
//! ## Adapters
//!
//! - [`platforms::Tencent`] - Tencent Video (search + episodes + segmented barrage)
//! - [`platforms::Iqiyi`] - iQiyi (zlib-compressed XML bullet buckets)
//! - [`platforms::Youku`] - Youku (signed mtop danmu list)
//! - [`platforms::MangoTv`] - MangoTV (galaxy barrage buckets)
//! - [`platforms::Bilibili`] - Bilibili (search + season episodes + list.so)
//!
//! ## Orchestration
//!
//! - [`ProviderRegistry`] - fixed adapter set plus the compound operations
//!   (episode fan-out, search fan-out, composite-id comment aggregation)
//! - [`matcher::MediaMatcher`] - best-effort external content identification

pub mod error;
pub mod fetch;
pub mod matcher;
pub mod platforms;
pub mod registry;
mod util;

pub use error::{ProviderError, Result};
pub use fetch::{Fetcher, default_client};
pub use matcher::{KanMatcher, MediaMatcher};
pub use platforms::{Bilibili, Iqiyi, MangoTv, Tencent, Youku};
pub use registry::ProviderRegistry;
