//! Windowing module for word counting
//!
//! Counts are bucketed into tumbling windows: fixed-size, non-overlapping,
//! epoch-aligned intervals. Each event belongs to exactly one window.
//!
//! ```text
//! Time:     0------30s-----60s-----90s
//! Windows:  [-------)[------)[------)
//! ```
//!
//! A window keeps accepting late records until stream time reaches
//! `end + grace`, after which it is closed for good.
//!
//! # Example Usage
//!
//! ```rust
//! use processor::window::{TumblingWindowAssigner, WindowAssigner};
//!
//! let assigner = TumblingWindowAssigner::new(30_000).unwrap();
//! let window = assigner.assign(29_999).unwrap();
//! assert_eq!(window.start_millis(), 0);
//! assert_eq!(window.end_millis(), 30_000);
//! ```

pub mod assigner;
pub mod types;

pub use assigner::{TumblingWindowAssigner, WindowAssigner};
pub use types::WindowBounds;
