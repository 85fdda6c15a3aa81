//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Registry read fails before first sync:
//!     → backoff.rs (exponential delay with jitter)
//!     → retry until success or shutdown
//! ```
//!
//! # Design Decisions
//! - Delays are jittered
//! - After first sync the reconciler never retries on its own; the next tick is the retry

pub mod backoff;

pub use backoff::Backoff;
