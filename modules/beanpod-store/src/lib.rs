pub mod bolt;
pub mod client;
pub mod migrate;
pub mod query;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::StoreClient;
pub use migrate::{migrate, EMBEDDING_DIMENSIONS};
pub use query::{Filter, Projection, Sort};
pub use store::{SearchOpts, Store};
