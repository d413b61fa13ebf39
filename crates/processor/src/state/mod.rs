//! Counter state for windowed word counting
//!
//! All mutable counting state lives behind the [`CounterStore`] trait. The
//! pipeline is stateless apart from stream-time bookkeeping, and every worker
//! shares one store.
//!
//! ## Example Usage
//!
//! ```rust
//! use processor::core::CounterKey;
//! use processor::state::{CounterStore, MemoryCounterStore};
//! use processor::window::{TumblingWindowAssigner, WindowAssigner};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let store = MemoryCounterStore::with_max_entries(1_000_000);
//! let window = TumblingWindowAssigner::new(30_000)?.assign(42_000)?;
//!
//! store.increment(CounterKey::new("fox", window), 42_000, 60_000).await?;
//! store.increment(CounterKey::new("fox", window), 42_000, 60_000).await?;
//!
//! let entry = store.snapshot(&CounterKey::new("fox", window)).await?;
//! assert_eq!(entry.map(|e| e.count), Some(2));
//!
//! // stream time passes window end + grace
//! assert_eq!(store.expire(120_000, 60_000).await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod memory;

pub use backend::{CounterStore, CounterStoreStats};
pub use memory::MemoryCounterStore;

pub use crate::error::{StateError, StateResult};
