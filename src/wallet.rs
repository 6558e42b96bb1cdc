use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

use crate::error::ChainResult;
use crate::utils::{base58_decode, base58_encode, new_key_pair, ripemd160_digest, sha256_digest};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

/// A key pair plus the address it derives. Addresses are Base58Check-encoded
/// `VERSION || RIPEMD160(SHA256(pub_key)) || checksum`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    /// Generates a new key pair and derives its public key.
    pub fn new() -> ChainResult<Self> {
        let pkcs8 = new_key_pair()?;
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &SystemRandom::new())
            .map_err(|_| crate::error::ChainError::Crypto("invalid generated pkcs8 key".into()))?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Self { pkcs8, public_key })
    }

    /// Constructs this wallet's address in Base58Check format.
    pub fn get_address(&self) -> String {
        let pub_key_hash = hash_pub_key(self.public_key.as_slice());
        convert_address(&pub_key_hash)
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    /// The PKCS#8-encoded private key, used to sign transactions.
    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

/// Hashes a public key with SHA-256 then RIPEMD-160.
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = sha256_digest(pub_key);
    ripemd160_digest(pub_key_sha256.as_slice())
}

/// Double-SHA256 checksum, truncated to [`ADDRESS_CHECK_SUM_LEN`] bytes.
fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = sha256_digest(payload);
    let second_sha = sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// Validates an address's checksum. Returns `false` (rather than erroring)
/// for malformed Base58 input, since this is used at the CLI boundary to
/// decide whether to report an `InvalidAddress` error in the first place.
pub fn validate_address(address: &str) -> bool {
    let Ok(payload) = base58_decode(address) else {
        return false;
    };
    if payload.len() <= ADDRESS_CHECK_SUM_LEN {
        return false;
    }
    let actual_checksum = payload[payload.len() - ADDRESS_CHECK_SUM_LEN..].to_vec();
    let version = payload[0];
    let pub_key_hash = payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec();
    let mut target_vec = vec![version];
    target_vec.extend(pub_key_hash);
    let target_checksum = checksum(target_vec.as_slice());
    actual_checksum == target_checksum
}

/// Converts a public key hash into a Base58Check address.
pub fn convert_address(pub_key_hash: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![VERSION];
    payload.extend(pub_key_hash);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    base58_encode(payload.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trips_through_validation() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        assert!(validate_address(&address));
    }

    #[test]
    fn tampered_address_fails_validation() {
        let wallet = Wallet::new().unwrap();
        let mut address = wallet.get_address().into_bytes();
        let last = address.len() - 1;
        address[last] = if address[last] == b'1' { b'2' } else { b'1' };
        assert!(!validate_address(&String::from_utf8(address).unwrap()));
    }
}
