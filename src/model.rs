//! Records that move through a stage: the transient [`QueuedItem`] produced by a
//! producer and the immutable [`Item`] built from a successful fetch.

pub mod item;
pub mod queued;

pub use item::{Item, ItemId};
pub use queued::{ItemOrigin, QueuedItem};
