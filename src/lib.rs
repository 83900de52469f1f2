//! Transfer engine for Tencent Cloud Object Service buckets: cursor-paged
//! listings, sliced parallel uploads, resumable downloads, and recursive
//! tree operations, all bounded by explicit worker pools.

pub mod config;
pub mod error;
pub mod types;

mod client;
mod download;
mod list;
mod pool;
mod signer;
mod transport;
mod upload;
mod walk;

pub use client::CosClient;
pub use config::CosConfig;
pub use error::{Error, Result};
pub use types::{RemoteEntry, TransferOutcome};
