use crate::block::Block;
use crate::error::{ChainError, ChainResult};
use crate::proof_of_work::ProofOfWork;
use crate::transactions::{TXOutput, Transaction};
use crate::utils::hex_encode;
use sled::transaction::TransactionResult;
use sled::{Db, Tree};
use std::collections::HashMap;
use std::env::current_dir;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

const TIP_BLOCK_HASH_KEY: &str = "tip_block_hash";
const BLOCKS_TREE: &str = "blocks";

/// The persistent, append-only sequence of blocks. Tracks one `tip`: the
/// hash of the highest-height block currently stored. Cheaply `Clone`-able —
/// the underlying `sled::Db` is a reference-counted handle and `tip_hash` is
/// shared through an `Arc`.
#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<String>>,
    db: Db,
    /// Guards the composite "append a block, then apply its UTXO delta" and
    /// "mine a block, then apply its UTXO delta" operations so readers never
    /// observe a block whose UTXO effects haven't landed yet.
    update_lock: Arc<Mutex<()>>,
}

impl Blockchain {
    /// Creates a new blockchain under the process's current directory,
    /// mining a genesis block that pays `genesis_address` the fixed
    /// subsidy. Refuses with [`ChainError::BlockchainExists`] if one
    /// already exists at that path.
    pub fn create(genesis_address: &str) -> ChainResult<Self> {
        Self::create_at(&current_dir().expect("process has a current directory").join("data"), genesis_address)
    }

    /// Like [`Self::create`], but against an explicit database directory —
    /// used by the CLI's `--db` override and by tests.
    pub fn create_at(path: &Path, genesis_address: &str) -> ChainResult<Self> {
        let db = sled::open(path)?;
        let blocks_tree = db.open_tree(BLOCKS_TREE)?;
        if blocks_tree.get(TIP_BLOCK_HASH_KEY)?.is_some() {
            return Err(ChainError::BlockchainExists);
        }
        let coinbase_tx = Transaction::new_coinbase_tx(genesis_address, crate::transactions::GENESIS_COINBASE_DATA)?;
        let block = Block::generate_genesis(&coinbase_tx);
        Self::write_block(&blocks_tree, &block)?;
        let tip_hash = block.get_hash_hex();
        Ok(Self {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            db,
            update_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Opens the blockchain stored under the process's current directory.
    pub fn new() -> ChainResult<Self> {
        Self::open_at(&current_dir().expect("process has a current directory").join("data"))
    }

    /// Like [`Self::new`], but against an explicit database directory.
    pub fn open_at(path: &Path) -> ChainResult<Self> {
        let db = sled::open(path)?;
        let blocks_tree = db.open_tree(BLOCKS_TREE)?;
        let tip_bytes = blocks_tree.get(TIP_BLOCK_HASH_KEY)?.ok_or(ChainError::NoBlockchain)?;
        let tip_hash = String::from_utf8_lossy(&tip_bytes).into_owned();
        Ok(Self {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            db,
            update_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Writes `block` into `blocks_tree` and advances the tip pointer in a
    /// single database transaction.
    fn write_block(blocks_tree: &Tree, block: &Block) -> ChainResult<()> {
        let hash_hex = block.get_hash_hex();
        let result: TransactionResult<(), ChainError> = blocks_tree.transaction(|tx_db| {
            tx_db.insert(hash_hex.as_bytes(), block.clone())?;
            tx_db.insert(TIP_BLOCK_HASH_KEY, hash_hex.as_bytes())?;
            Ok(())
        });
        result.map_err(|e| ChainError::StorageTransaction(e.to_string()))?;
        Ok(())
    }

    pub const fn get_db(&self) -> &Db {
        &self.db
    }

    /// The critical section used to make a chain append and its UTXO effects
    /// atomic from the perspective of concurrent readers.
    pub fn lock_for_update(&self) -> std::sync::MutexGuard<'_, ()> {
        self.update_lock.lock().expect("update lock poisoned by a panicking holder")
    }

    pub fn get_tip_hash(&self) -> String {
        self.tip_hash.read().expect("tip lock poisoned").clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &str) {
        let mut tip_hash = self.tip_hash.write().expect("tip lock poisoned");
        *tip_hash = String::from(new_tip_hash);
    }

    /// Verifies every supplied transaction, then builds, mines, stores, and
    /// becomes the tip for a new block containing them. Fails without
    /// mutating the chain if any transaction does not verify.
    pub fn mine_block(&self, transactions: &[Transaction]) -> ChainResult<Block> {
        for transaction in transactions {
            if !transaction.verify(self)? {
                return Err(ChainError::VerificationFailed);
            }
        }
        let best_height = self.get_best_height()?;
        let block = Block::new(hex_decode_hash(&self.get_tip_hash())?, transactions, best_height + 1);

        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        Self::write_block(&blocks_tree, &block)?;
        self.set_tip_hash(&block.get_hash_hex());
        Ok(block)
    }

    pub fn iterator(&self) -> Iter {
        Iter::new(self.get_tip_hash(), self.db.clone())
    }

    /// Reverse-scans the chain, maintaining a set of spent `(txid, vout)`
    /// pairs, and returns each transaction's unspent outputs paired with
    /// their original `vout` position — the representation the UTXO index
    /// persists (see `utxo_set.rs`).
    pub fn find_utxo(&self) -> HashMap<String, Vec<(usize, TXOutput)>> {
        let mut utxo: HashMap<String, Vec<(usize, TXOutput)>> = HashMap::new();
        let mut spent_txos: HashMap<String, Vec<usize>> = HashMap::new();

        let mut iterator = self.iterator();
        while let Some(block) = iterator.next() {
            for tx in block.get_transactions() {
                let txid_hex = tx.id_hex();
                for (idx, out) in tx.get_vout().iter().enumerate() {
                    let already_spent = spent_txos.get(txid_hex.as_str()).is_some_and(|outs| outs.contains(&idx));
                    if !already_spent {
                        utxo.entry(txid_hex.clone()).or_default().push((idx, out.clone()));
                    }
                }

                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    let txid_hex = hex_encode(txin.get_txid());
                    spent_txos.entry(txid_hex).or_default().push(txin.get_vout());
                }
            }
        }
        utxo
    }

    /// Reverse-scans the chain for the first transaction with the given id.
    pub fn find_transaction(&self, txid: &[u8]) -> Option<Transaction> {
        let mut iterator = self.iterator();
        while let Some(block) = iterator.next() {
            for transaction in block.get_transactions() {
                if txid == transaction.get_id() {
                    return Some(transaction.clone());
                }
            }
        }
        None
    }

    /// Adds a block received from a peer. A no-op if the block is already
    /// stored. Rejects blocks whose proof-of-work doesn't meet the target or
    /// whose predecessor isn't a block this node already has. Advances the
    /// tip only if the new block's height exceeds the current tip's — this
    /// node's fork-choice is "longest chain by height".
    pub fn add_block(&self, block: &Block) -> ChainResult<()> {
        if !ProofOfWork::new(block).validate() {
            return Err(ChainError::InvalidBlock(format!("block {} does not meet the proof-of-work target", block.get_hash_hex())));
        }
        let block_tree = self.db.open_tree(BLOCKS_TREE)?;
        if block_tree.get(block.get_hash_hex())?.is_some() {
            return Ok(());
        }
        if !block.get_pre_block_hash().is_empty() && block_tree.get(block.get_pre_block_hash_hex())?.is_none() {
            return Err(ChainError::InvalidBlock(format!(
                "block {} has no known predecessor {}",
                block.get_hash_hex(),
                block.get_pre_block_hash_hex()
            )));
        }
        block_tree.insert(block.get_hash_hex(), block.serialize())?;
        let tip_block_bytes = block_tree.get(self.get_tip_hash())?.ok_or(ChainError::NoBlockchain)?;
        let tip_block = Block::deserialize(&tip_block_bytes)?;
        if block.get_height() > tip_block.get_height() {
            block_tree.insert(TIP_BLOCK_HASH_KEY, block.get_hash_hex().as_bytes())?;
            self.set_tip_hash(&block.get_hash_hex());
        }
        Ok(())
    }

    /// The height of the highest-height block currently stored.
    pub fn get_best_height(&self) -> ChainResult<usize> {
        let block_tree = self.db.open_tree(BLOCKS_TREE)?;
        let tip_block_bytes = block_tree.get(self.get_tip_hash())?.ok_or(ChainError::NoBlockchain)?;
        let tip_block = Block::deserialize(&tip_block_bytes)?;
        Ok(tip_block.get_height())
    }

    pub fn get_block(&self, block_hash_hex: &str) -> ChainResult<Option<Block>> {
        let block_tree = self.db.open_tree(BLOCKS_TREE)?;
        block_tree.get(block_hash_hex)?.map(|bytes| Block::deserialize(&bytes)).transpose()
    }

    /// Block hashes from tip to genesis, hex-encoded — small chains are
    /// expected to fit in one `inv` message.
    pub fn get_block_hashes(&self) -> Vec<String> {
        let mut iterator = self.iterator();
        let mut hashes = vec![];
        while let Some(block) = iterator.next() {
            hashes.push(block.get_hash_hex());
        }
        hashes
    }
}

fn hex_decode_hash(hash_hex: &str) -> ChainResult<Vec<u8>> {
    crate::utils::hex_decode(hash_hex)
}

/// Walks the chain backwards from the tip, one stored block at a time.
pub struct Iter {
    db: Db,
    current_hash: String,
}

impl Iter {
    const fn new(tip_hash: String, db: Db) -> Self {
        Self { current_hash: tip_hash, db }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Block> {
        let block_tree = self.db.open_tree(BLOCKS_TREE).ok()?;
        let data = block_tree.get(self.current_hash.clone()).ok()??;
        let block = Block::deserialize(&data).ok()?;
        self.current_hash = block.get_pre_block_hash_hex();
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;
    use std::env::temp_dir;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_chain_dir() -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        temp_dir().join(format!("tinychain-chain-test-{n}-{}", std::process::id()))
    }

    #[test]
    fn genesis_pays_the_subsidy() {
        let dir = temp_chain_dir();
        let wallet = Wallet::new().unwrap();
        let blockchain = Blockchain::create_at(&dir, &wallet.get_address()).unwrap();
        let utxo = blockchain.find_utxo();
        let total: i64 = utxo.values().flatten().map(|(_, out)| out.get_value()).sum();
        assert_eq!(total, crate::transactions::SUBSIDY);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn mined_blocks_satisfy_proof_of_work() {
        let dir = temp_chain_dir();
        let wallet = Wallet::new().unwrap();
        let blockchain = Blockchain::create_at(&dir, &wallet.get_address()).unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), "reward").unwrap();
        let block = blockchain.mine_block(&[coinbase]).unwrap();
        let pow = crate::proof_of_work::ProofOfWork::new(&block);
        assert!(pow.validate());
        assert_eq!(blockchain.get_best_height().unwrap(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn find_transaction_locates_the_genesis_coinbase() {
        let dir = temp_chain_dir();
        let wallet = Wallet::new().unwrap();
        let blockchain = Blockchain::create_at(&dir, &wallet.get_address()).unwrap();
        let genesis = blockchain.iterator().next().unwrap();
        let coinbase_id = genesis.get_transactions()[0].get_id().to_vec();
        assert!(blockchain.find_transaction(&coinbase_id).is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
