//! Memoization of pure unary functions, with a documented guarantee for
//! concurrent callers. See [`memoizer`] for the cache itself.

pub mod compose;
pub mod memoizer;

pub use crate::memoizer::{CacheStats, Guarantee, Memoized, Memoizer};
