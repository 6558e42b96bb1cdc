use thiserror::Error;

/// The four error classes named in the node's error-handling design:
/// validation errors are returned to callers, protocol errors are confined to
/// one connection, storage and crypto errors are fatal.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("not enough funds")]
    InsufficientFunds,

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("transaction verification failed")]
    VerificationFailed,

    #[error("no existing blockchain found, create one first")]
    NoBlockchain,

    #[error("a blockchain already exists at this path")]
    BlockchainExists,

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("storage transaction error: {0}")]
    StorageTransaction(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),

    #[error("crypto error: {0}")]
    Crypto(String),
}

pub type ChainResult<T> = Result<T, ChainError>;
