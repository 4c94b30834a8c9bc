//! Key-value backend adapters.

pub mod redis;

pub use redis::{RedisKvConfig, RedisKvStore};
