//! Time-ordered delay queues shared between stages. A [`DelayStore`] keeps one
//! score-ordered set per queue name; [`DelayQueue`] binds a store to one name.

pub mod delay;
pub mod memory;
pub mod redis;
pub mod store;

pub use delay::DelayQueue;
pub use memory::MemoryDelayStore;
pub use self::redis::RedisDelayStore;
pub use store::{DelayStore, QueueError};
