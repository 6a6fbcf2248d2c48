//! BoardGameGeek XML API: client, typed documents and stats parsing

pub mod client;
pub mod retry;
pub mod stats;
pub mod xml;

pub use client::BggClient;
pub use retry::{Attempt, RetryPolicy};
pub use stats::{collection_stats, parse_thing_stats};
pub use xml::{CollectionItem, ThingItem};
