use crate::blockchain::Blockchain;
use crate::block::Block;
use crate::error::{ChainError, ChainResult};
use crate::transactions::TXOutput;
use crate::utils::hex_encode;
use std::collections::HashMap;

const UTXO_TREE: &str = "chainstate";

/// A materialized, persisted view of unspent outputs, keyed by transaction
/// id. Each entry is the list of that transaction's currently unspent
/// outputs paired with their *original* `vout` position, so a later
/// incremental update can always find the output an input names by index
/// regardless of how many sibling outputs have already been spent.
pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    #[must_use]
    pub const fn new(blockchain: Blockchain) -> Self {
        Self { blockchain }
    }

    pub const fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    fn entries(&self) -> ChainResult<Vec<(String, Vec<(usize, TXOutput)>)>> {
        let tree = self.blockchain.get_db().open_tree(UTXO_TREE)?;
        let mut entries = Vec::new();
        for item in tree.iter() {
            let (key, value) = item?;
            let txid_hex = String::from_utf8_lossy(&key).into_owned();
            let outputs: Vec<(usize, TXOutput)> = bincode::deserialize(&value).map_err(ChainError::Serialization)?;
            entries.push((txid_hex, outputs));
        }
        Ok(entries)
    }

    /// Drops and recreates the UTXO index from a full reverse scan of the
    /// chain (see [`Blockchain::find_utxo`]).
    pub fn reindex(&self) -> ChainResult<()> {
        let db = self.blockchain.get_db();
        db.drop_tree(UTXO_TREE)?;
        let tree = db.open_tree(UTXO_TREE)?;

        let utxo = self.blockchain.find_utxo();
        for (txid_hex, outputs) in utxo {
            let key = txid_hex.into_bytes();
            let value = bincode::serialize(&outputs).map_err(ChainError::Serialization)?;
            tree.insert(key, value)?;
        }
        tree.flush()?;
        Ok(())
    }

    /// Applies the UTXO delta of a newly accepted block: for each
    /// non-coinbase transaction, removes the outputs its inputs spend (by
    /// original index, not position), then records all of its own outputs
    /// as unspent.
    pub fn update(&self, block: &Block) -> ChainResult<()> {
        let tree = self.blockchain.get_db().open_tree(UTXO_TREE)?;
        for tx in block.get_transactions() {
            if !tx.is_coinbase() {
                for vin in tx.get_vin() {
                    let key = hex_encode(vin.get_txid()).into_bytes();
                    if let Some(existing) = tree.get(&key)? {
                        let mut outputs: Vec<(usize, TXOutput)> =
                            bincode::deserialize(&existing).map_err(ChainError::Serialization)?;
                        outputs.retain(|(index, _)| *index != vin.get_vout());
                        if outputs.is_empty() {
                            tree.remove(&key)?;
                        } else {
                            let value = bincode::serialize(&outputs).map_err(ChainError::Serialization)?;
                            tree.insert(key, value)?;
                        }
                    }
                }
            }

            let new_outputs: Vec<(usize, TXOutput)> = tx.get_vout().iter().cloned().enumerate().collect();
            let key = tx.id_hex().into_bytes();
            let value = bincode::serialize(&new_outputs).map_err(ChainError::Serialization)?;
            tree.insert(key, value)?;
        }
        tree.flush()?;
        Ok(())
    }

    /// Accrues unspent outputs locked with `pub_key_hash` until the running
    /// total reaches `amount` (the result may overshoot it), returning the
    /// total accrued and, per transaction id, the indices selected. If the
    /// wallet's total unspent value is below `amount`, the returned total
    /// reflects that shortfall and the caller must treat it as insufficient
    /// funds rather than spend the partial result.
    pub fn find_spendable_outputs(&self, pub_key_hash: &[u8], amount: i64) -> ChainResult<(i64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0i64;

        'entries: for (txid_hex, outputs) in self.entries()? {
            for (index, output) in outputs {
                if output.is_locked_with_key(pub_key_hash) {
                    accumulated += output.get_value();
                    unspent_outputs.entry(txid_hex.clone()).or_default().push(index);
                    if accumulated >= amount {
                        break 'entries;
                    }
                }
            }
        }

        Ok((accumulated, unspent_outputs))
    }

    /// Returns every unspent output locked with `pub_key_hash`.
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> ChainResult<Vec<TXOutput>> {
        let mut utxos = Vec::new();
        for (_, outputs) in self.entries()? {
            for (_, output) in outputs {
                if output.is_locked_with_key(pub_key_hash) {
                    utxos.push(output);
                }
            }
        }
        Ok(utxos)
    }

    /// Number of transaction ids represented in the UTXO index.
    pub fn count_transactions(&self) -> ChainResult<usize> {
        let tree = self.blockchain.get_db().open_tree(UTXO_TREE)?;
        Ok(tree.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Blockchain;
    use crate::wallet::Wallet;
    use std::env::temp_dir;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_chain_dir() -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        temp_dir().join(format!("tinychain-utxo-test-{n}-{}", std::process::id()))
    }

    #[test]
    fn reindex_matches_incremental_update_after_a_spend() {
        let dir = temp_chain_dir();
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();

        let blockchain = Blockchain::create_at(&dir, &alice.get_address()).unwrap();
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().unwrap();

        let tx = crate::transactions::Transaction::new_utxo_transaction(
            &alice.get_address(),
            &bob.get_address(),
            4,
            &utxo_set,
        )
        .unwrap();
        let block = blockchain.mine_block(&[tx]).unwrap();
        utxo_set.update(&block).unwrap();

        let incremental_alice = utxo_set.find_utxo(&crate::wallet::hash_pub_key(alice.get_public_key())).unwrap();
        let incremental_bob = utxo_set.find_utxo(&crate::wallet::hash_pub_key(bob.get_public_key())).unwrap();

        utxo_set.reindex().unwrap();
        let reindexed_alice = utxo_set.find_utxo(&crate::wallet::hash_pub_key(alice.get_public_key())).unwrap();
        let reindexed_bob = utxo_set.find_utxo(&crate::wallet::hash_pub_key(bob.get_public_key())).unwrap();

        let sum = |v: &[TXOutput]| v.iter().map(TXOutput::get_value).sum::<i64>();
        assert_eq!(sum(&incremental_alice), sum(&reindexed_alice));
        assert_eq!(sum(&incremental_bob), sum(&reindexed_bob));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
