use crate::error::{ChainError, ChainResult};
use crate::merkle::merkle_root;
use crate::proof_of_work::ProofOfWork;
use crate::transactions::Transaction;
use crate::utils::{current_timestamp, hex_encode};
use serde::{Deserialize, Serialize};
use sled::IVec;

/// A block of the chain: a coinbase-first list of transactions plus the
/// header fields proof-of-work fixes in place. `hash` and `nonce` are only
/// meaningful together — mutating any other field after mining invalidates
/// the block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    timestamp: i64,
    pre_block_hash: Vec<u8>,
    hash: Vec<u8>,
    transactions: Vec<Transaction>,
    nonce: i64,
    height: usize,
}

impl Block {
    /// Builds and mines a new block on top of `pre_block_hash` at `height`.
    #[must_use]
    pub fn new(pre_block_hash: Vec<u8>, transactions: &[Transaction], height: usize) -> Self {
        let mut block = Self {
            timestamp: current_timestamp(),
            pre_block_hash,
            hash: Vec::new(),
            transactions: transactions.to_vec(),
            nonce: 0,
            height,
        };
        let pow = ProofOfWork::new(&block);
        let (nonce, hash) = pow.run();
        block.nonce = nonce;
        block.hash = hash;
        block
    }

    /// Builds the genesis block: height zero, no predecessor, carrying only
    /// the genesis coinbase transaction.
    #[must_use]
    pub fn generate_genesis(transaction: &Transaction) -> Self {
        Self::new(Vec::new(), &[transaction.clone()], 0)
    }

    pub fn deserialize(bytes: &[u8]) -> ChainResult<Self> {
        bincode::deserialize(bytes).map_err(ChainError::Serialization)
    }

    pub fn serialize(&self) -> Vec<u8> {
        bincode::serialize(self).expect("block fields are always serializable")
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_pre_block_hash_hex(&self) -> String {
        hex_encode(&self.pre_block_hash)
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        hex_encode(&self.hash)
    }

    pub const fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub const fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub const fn get_height(&self) -> usize {
        self.height
    }

    /// The Merkle root over this block's transactions, part of the
    /// proof-of-work pre-image.
    pub fn hash_transactions(&self) -> Vec<u8> {
        let serialized: Vec<Vec<u8>> = self.transactions.iter().map(Transaction::serialize).collect();
        merkle_root(&serialized)
    }

    #[cfg(test)]
    pub fn set_nonce_for_test(&mut self, nonce: i64) {
        self.nonce = nonce;
    }
}

// TODO: implement `TryFrom` once `sled::Error` carries enough context to
// report serialization failures through it instead of panicking.
#[allow(clippy::fallible_impl_from)]
impl From<Block> for IVec {
    fn from(b: Block) -> Self {
        Self::from(b.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    #[test]
    fn genesis_has_no_predecessor() {
        let wallet = Wallet::new().unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), "reward").unwrap();
        let genesis = Block::generate_genesis(&coinbase);
        assert!(genesis.get_pre_block_hash().is_empty());
        assert_eq!(genesis.get_height(), 0);
    }

    #[test]
    fn block_round_trips_through_serialization() {
        let wallet = Wallet::new().unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), "reward").unwrap();
        let genesis = Block::generate_genesis(&coinbase);
        let bytes = genesis.serialize();
        let decoded = Block::deserialize(&bytes).unwrap();
        assert_eq!(decoded.get_hash(), genesis.get_hash());
        assert_eq!(decoded.get_nonce(), genesis.get_nonce());
        assert_eq!(decoded.get_timestamp(), genesis.get_timestamp());
    }
}
