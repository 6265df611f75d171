//! Background directory sizes for nestfs.
//!
//! [`SizeScheduler`] computes aggregate sizes for paths the UI is showing,
//! a bounded number at a time, and keeps the results in a [`SizeCache`]
//! keyed by path. A cached size is reused only while the source's
//! modification time is unchanged and the entry is younger than its TTL.
//!
//! # Example
//!
//! ```rust,no_run
//! use nestfs_list::{EngineConfig, Lister};
//! use nestfs_size::SizeScheduler;
//!
//! # async fn demo() {
//! let config = EngineConfig::default();
//! let sizes = SizeScheduler::new(Lister::local(&config), &config);
//! let mut updates = sizes.subscribe();
//!
//! if sizes.request_size("/home/user/projects").await.is_none() {
//!     if let Ok(update) = updates.recv().await {
//!         println!("{}: {:?}", update.path.display(), update.size);
//!     }
//! }
//! sizes.shutdown().await;
//! # }
//! ```

mod cache;
mod scheduler;

pub use cache::{SizeCache, SizeCacheEntry};
pub use scheduler::{SizeScheduler, SizeState, SizeUpdate};
