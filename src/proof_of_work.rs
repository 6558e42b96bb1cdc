use crate::block::Block;
use crate::utils::i64_be_bytes;
use num::BigUint;
use std::sync::atomic::{AtomicBool, Ordering};

/// Fixed mining difficulty: the target is `1 << (256 - TARGET_BITS)`. This
/// node implements no difficulty retargeting.
pub const TARGET_BITS: i64 = 15;

/// A proof-of-work puzzle over a single block: find a nonce whose preimage
/// hash, read as a 256-bit big-endian integer, falls below `target`.
pub struct ProofOfWork<'a> {
    block: &'a Block,
    target: BigUint,
}

impl<'a> ProofOfWork<'a> {
    #[must_use]
    pub fn new(block: &'a Block) -> Self {
        let shift = usize::try_from(256 - TARGET_BITS).expect("target bits fits within 256");
        let target = BigUint::from(1u8) << shift;
        Self { block, target }
    }

    /// The canonical pre-image for `nonce`: predecessor hash, Merkle root,
    /// big-endian timestamp, big-endian target bits, big-endian nonce.
    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(self.block.get_pre_block_hash());
        data.extend_from_slice(&self.block.hash_transactions());
        data.extend_from_slice(&i64_be_bytes(self.block.get_timestamp()));
        data.extend_from_slice(&i64_be_bytes(TARGET_BITS));
        data.extend_from_slice(&i64_be_bytes(nonce));
        data
    }

    fn meets_target(&self, hash: &[u8]) -> bool {
        BigUint::from_bytes_be(hash) < self.target
    }

    /// Searches nonces `0..=i64::MAX` for the first that satisfies the
    /// target. With `TARGET_BITS = 15` this terminates almost immediately;
    /// the full `i64` range is never expected to be exhausted.
    #[must_use]
    pub fn run(&self) -> (i64, Vec<u8>) {
        self.run_cancelable(None).expect("proof-of-work search was not cancelled")
    }

    /// Like [`Self::run`], but checks `cancel` between nonce attempts and
    /// returns `None` if it becomes `true` before a solution is found.
    pub fn run_cancelable(&self, cancel: Option<&AtomicBool>) -> Option<(i64, Vec<u8>)> {
        let mut nonce: i64 = 0;
        loop {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    return None;
                }
            }
            let data = self.prepare_data(nonce);
            let hash = crate::utils::sha256_digest(&data);
            if self.meets_target(&hash) {
                return Some((nonce, hash));
            }
            nonce = nonce.checked_add(1)?;
        }
    }

    /// Recomputes the preimage hash for the block's stored nonce and checks
    /// it against the target — used to validate a block received from a peer.
    #[must_use]
    pub fn validate(&self) -> bool {
        let data = self.prepare_data(self.block.get_nonce());
        let hash = crate::utils::sha256_digest(&data);
        self.meets_target(&hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transactions::Transaction;
    use crate::wallet::Wallet;

    fn mined_block() -> Block {
        let wallet = Wallet::new().unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), "reward").unwrap();
        Block::generate_genesis(&coinbase)
    }

    #[test]
    fn mined_block_validates() {
        let block = mined_block();
        let pow = ProofOfWork::new(&block);
        assert!(pow.validate());
    }

    #[test]
    fn tampered_nonce_fails_validation() {
        let mut block = mined_block();
        let original_nonce = block.get_nonce();
        block.set_nonce_for_test(original_nonce.wrapping_add(1));
        let pow = ProofOfWork::new(&block);
        assert!(!pow.validate());
    }

    #[test]
    fn cancellation_stops_the_search() {
        let wallet = Wallet::new().unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), "reward").unwrap();
        let block = Block::generate_genesis(&coinbase);
        let pow = ProofOfWork::new(&block);
        let cancel = AtomicBool::new(true);
        assert!(pow.run_cancelable(Some(&cancel)).is_none());
    }
}
