use crate::{
    blockchain::Blockchain,
    error::{ChainError, ChainResult},
    utils::{base58_decode, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, hex_decode, hex_encode, sha256_digest},
    utxo_set::UTXOSet,
    wallet::{self, hash_pub_key},
    wallets::Wallets,
};
use serde::{Deserialize, Serialize};

/// Fixed block reward; this node implements no transaction fees.
pub const SUBSIDY: i64 = 10;

/// Sentinel `vout` used by coinbase inputs in place of signed `-1`.
pub const COINBASE_VOUT: usize = usize::MAX;

/// Canonical payload carried by the genesis block's coinbase input.
pub const GENESIS_COINBASE_DATA: &str = "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

/// A reference to a previous transaction's output, plus proof of the right
/// to spend it. A coinbase input carries an empty `txid`, `vout` equal to
/// [`COINBASE_VOUT`], no signature, and a free-form payload in `pub_key`
/// instead of a real public key.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: usize,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: usize) -> Self {
        Self {
            txid: txid.to_vec(),
            vout,
            signature: Vec::new(),
            pub_key: Vec::new(),
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub const fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    /// Indicates whether the `pub_key` field of the input corresponds to the
    /// specified `pub_key_hash` byte vector.
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(self.pub_key.as_slice()) == pub_key_hash
    }
}

/// A transaction output: a value locked to the hash of a recipient's public
/// key. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TXOutput {
    value: i64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: i64, address: &str) -> ChainResult<Self> {
        let mut output = Self {
            value,
            pub_key_hash: Vec::new(),
        };
        output.lock(address)?;
        Ok(output)
    }

    pub const fn get_value(&self) -> i64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    fn lock(&mut self, address: &str) -> ChainResult<()> {
        let payload = base58_decode(address)?;
        if payload.len() < wallet::ADDRESS_CHECK_SUM_LEN + 1 {
            return Err(ChainError::InvalidAddress(address.to_string()));
        }
        self.pub_key_hash = payload[1..payload.len() - wallet::ADDRESS_CHECK_SUM_LEN].to_vec();
        Ok(())
    }

    /// Checks whether the given `pub_key_hash` matches the stored value.
    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }
}

/// A value-transfer transaction: a non-empty set of inputs spending prior
/// outputs, and a non-empty set of new outputs. Its id is the SHA-256 of its
/// canonical serialization with `id` zeroed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Creates a new coinbase transaction paying the fixed subsidy to `to`,
    /// carrying `data` as the input's free-form payload in place of a public
    /// key. The genesis block uses [`GENESIS_COINBASE_DATA`]; ordinary
    /// mining rewards carry an arbitrary per-block string.
    pub fn new_coinbase_tx(to: &str, data: &str) -> ChainResult<Self> {
        let tx_output = TXOutput::new(SUBSIDY, to)?;
        let tx_input = TXInput {
            txid: Vec::new(),
            vout: COINBASE_VOUT,
            signature: Vec::new(),
            pub_key: data.as_bytes().to_vec(),
        };
        let mut tx = Self {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![tx_output],
        };
        tx.id = tx.hash();
        Ok(tx)
    }

    /// Constructs a new transaction spending `amount` from `from`'s unspent
    /// outputs to `to`, paying any remainder back to `from` as change, then
    /// signs it. Fails with [`ChainError::InsufficientFunds`] without
    /// mutating any state if `from`'s spendable balance is below `amount`.
    pub fn new_utxo_transaction(from: &str, to: &str, amount: i64, utxo_set: &UTXOSet) -> ChainResult<Self> {
        let wallets = Wallets::new()?;
        let wallet = wallets
            .get_wallet(from)
            .ok_or_else(|| ChainError::InvalidAddress(from.to_string()))?;
        let public_key_hash = hash_pub_key(wallet.get_public_key());
        let (accumulated, valid_outputs) = utxo_set.find_spendable_outputs(public_key_hash.as_slice(), amount)?;
        if accumulated < amount {
            return Err(ChainError::InsufficientFunds);
        }

        let mut inputs = vec![];
        for (txid_hex, indices) in valid_outputs {
            let txid = hex_decode(&txid_hex)?;
            for index in indices {
                inputs.push(TXInput {
                    txid: txid.clone(),
                    vout: index,
                    signature: vec![],
                    pub_key: wallet.get_public_key().to_vec(),
                });
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        if accumulated > amount {
            outputs.push(TXOutput::new(accumulated - amount, from)?);
        }

        let mut tx = Self {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash();
        tx.sign(utxo_set.get_blockchain(), wallet.get_pkcs8())?;
        Ok(tx)
    }

    /// Creates a copy of the transaction with every input's signature and
    /// public key cleared — the canonical pre-image used for both signing
    /// and verification.
    fn trimmed_copy(&self) -> Self {
        let inputs = self.vin.iter().map(|input| TXInput::new(input.get_txid(), input.get_vout())).collect();
        let outputs = self.vout.clone();
        Self {
            id: self.id.clone(),
            vin: inputs,
            vout: outputs,
        }
    }

    /// Signs each input of the transaction using ECDSA over a per-input
    /// digest: the trimmed copy with that input's `pub_key` temporarily set
    /// to the referenced output's `pub_key_hash`, re-hashed, then cleared.
    /// Coinbase transactions are not signed.
    fn sign(&mut self, blockchain: &Blockchain, pkcs8: &[u8]) -> ChainResult<()> {
        if self.is_coinbase() {
            return Ok(());
        }
        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter_mut().enumerate() {
            let prev_tx = blockchain
                .find_transaction(vin.get_txid())
                .ok_or(ChainError::TransactionNotFound)?;
            tx_copy.vin[idx].signature = Vec::new();
            tx_copy.vin[idx].pub_key = prev_tx.vout[vin.vout].pub_key_hash.clone();
            tx_copy.id = tx_copy.hash();
            tx_copy.vin[idx].pub_key = Vec::new();
            vin.signature = ecdsa_p256_sha256_sign_digest(pkcs8, tx_copy.get_id())?;
        }
        Ok(())
    }

    /// Verifies every input's signature against the public key it carries
    /// and the output it claims to spend. Coinbase transactions always
    /// verify. Fails if any referenced previous transaction is missing or
    /// any signature does not validate.
    pub fn verify(&self, blockchain: &Blockchain) -> ChainResult<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }
        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_tx = blockchain
                .find_transaction(vin.get_txid())
                .ok_or(ChainError::TransactionNotFound)?;
            tx_copy.vin[idx].signature = Vec::new();
            tx_copy.vin[idx].pub_key = prev_tx.vout[vin.vout].pub_key_hash.clone();
            tx_copy.id = tx_copy.hash();
            tx_copy.vin[idx].pub_key = Vec::new();
            if !ecdsa_p256_sha256_sign_verify(vin.pub_key.as_slice(), vin.signature.as_slice(), tx_copy.get_id()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A transaction is a coinbase iff it has exactly one input whose
    /// `txid` is empty and whose `vout` is the coinbase sentinel.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    /// Computes the transaction's id: `SHA-256` of the canonical
    /// serialization with `id` zeroed.
    fn hash(&self) -> Vec<u8> {
        let tx_copy = Self {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        sha256_digest(tx_copy.serialize().as_slice())
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn id_hex(&self) -> String {
        hex_encode(&self.id)
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    /// Bytes fed to the Merkle tree as this transaction's leaf pre-image.
    pub fn serialize(&self) -> Vec<u8> {
        bincode::serialize(self).expect("transaction fields are always serializable")
    }

    pub fn deserialize(bytes: &[u8]) -> ChainResult<Self> {
        bincode::deserialize(bytes).map_err(ChainError::Serialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn address_for(wallet: &Wallet) -> String {
        wallet.get_address()
    }

    #[test]
    fn coinbase_is_recognized() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&address_for(&wallet), "reward").unwrap();
        assert!(tx.is_coinbase());
        assert_eq!(tx.get_vout()[0].get_value(), SUBSIDY);
    }

    #[test]
    fn transaction_round_trips_through_serialization() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&address_for(&wallet), "reward").unwrap();
        let bytes = tx.serialize();
        let decoded = Transaction::deserialize(&bytes).unwrap();
        assert_eq!(decoded.get_id(), tx.get_id());
        assert_eq!(decoded.get_vout().len(), tx.get_vout().len());
    }
}
