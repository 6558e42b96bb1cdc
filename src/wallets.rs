use crate::error::{ChainError, ChainResult};
use crate::wallet::Wallet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::{collections::HashMap, env::current_dir};

pub const WALLET_FILE: &str = "wallet.dat";

/// The local collection of wallets, persisted to a single file. File I/O
/// failures here are storage errors (fatal, per the crate's error taxonomy)
/// rather than something a caller can meaningfully recover from.
pub struct Wallets(HashMap<String, Wallet>);

impl Wallets {
    /// Loads the wallet collection from [`WALLET_FILE`] in the current
    /// directory, or starts empty if it doesn't exist yet.
    pub fn new() -> ChainResult<Self> {
        let mut wallets = Self(HashMap::new());
        wallets.load_from_file()?;
        Ok(wallets)
    }

    /// Generates a new wallet, persists it, and returns its address.
    pub fn create_wallet(&mut self) -> ChainResult<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.0.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.0.get(address)
    }

    fn load_from_file(&mut self) -> ChainResult<()> {
        let path = current_dir().expect("process has a current directory").join(WALLET_FILE);
        if !path.exists() {
            return Ok(());
        }
        let mut file = File::open(path).map_err(|e| ChainError::Crypto(e.to_string()))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|e| ChainError::Crypto(e.to_string()))?;
        self.0 = bincode::deserialize(&buf).map_err(ChainError::Serialization)?;
        Ok(())
    }

    fn save_to_file(&self) -> ChainResult<()> {
        let path = current_dir().expect("process has a current directory").join(WALLET_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .map_err(|e| ChainError::Crypto(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = bincode::serialize(&self.0).map_err(ChainError::Serialization)?;
        writer.write_all(wallets_bytes.as_slice()).map_err(|e| ChainError::Crypto(e.to_string()))?;
        writer.flush().map_err(|e| ChainError::Crypto(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    #[test]
    fn create_wallet_persists_across_instances() {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("tinychain-wallets-test-{n}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let original_dir = env::current_dir().unwrap();
        env::set_current_dir(&dir).unwrap();

        let mut wallets = Wallets::new().unwrap();
        let address = wallets.create_wallet().unwrap();
        let reloaded = Wallets::new().unwrap();
        assert!(reloaded.get_wallet(&address).is_some());

        env::set_current_dir(original_dir).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
