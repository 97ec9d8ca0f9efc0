pub mod cli;
pub mod config;
mod error;
pub mod feature;
pub mod identity;
pub mod index;
pub mod indexer;
pub mod score;
mod server;
pub mod utils;

pub use config::Opts;
pub use error::Error;
pub use indexer::{Added, Indexer, RankedCandidate};
