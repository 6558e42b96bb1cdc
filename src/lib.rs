#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::must_use_candidate)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
pub mod block;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod memory_pool;
pub mod merkle;
pub mod node;
pub mod proof_of_work;
pub mod protocol;
pub mod server;
pub mod transactions;
pub mod utils;
pub mod utxo_set;
pub mod wallet;
pub mod wallets;

pub use error::{ChainError, ChainResult};
pub use utils::{base58_decode, base58_encode, current_timestamp, ripemd160_digest, sha256_digest};
