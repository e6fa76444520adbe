//! # roomcast-backplane
//!
//! Cross-instance pub/sub backplane for the roomcast broker.
//!
//! Multiple broker instances share a backplane so that clients connected to
//! different instances still see each other's messages and presence
//! changes. The interface is deliberately narrow - publish a payload to a
//! channel, or subscribe to a channel and receive every payload published
//! by any publisher - so the broker's fan-out logic stays transport
//! agnostic and unit-testable with the in-process implementation.
//!
//! Implementations:
//!
//! - [`MemoryBackplane`] - in-process, always available. The single-instance
//!   default and the test fake.
//! - `RedisBackplane` - Redis pub/sub, behind the `redis` feature.

pub mod memory;
pub mod traits;

#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryBackplane;
pub use traits::{Backplane, BackplaneError};

#[cfg(feature = "redis")]
pub use redis::RedisBackplane;
