use crate::error::{ChainError, ChainResult};
use crypto::digest::Digest;
use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING};
use std::iter::repeat;
use std::time::{SystemTime, UNIX_EPOCH};

/// Length, in bytes, of the zero-padded command prefix used to frame peer
/// protocol messages on the wire.
pub const COMMAND_LENGTH: usize = 12;

/// Retrieves the current timestamp as seconds since the Unix epoch.
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
        .try_into()
        .expect("timestamp does not fit in an i64")
}

/// Performs a SHA-256 hash operation on the input.
pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// Calculates the RIPEMD-160 hash of the input.
pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut ripemd160 = crypto::ripemd160::Ripemd160::new();
    ripemd160.input(data);
    let mut buf: Vec<u8> = repeat(0).take(ripemd160.output_bytes()).collect();
    ripemd160.result(&mut buf);
    buf
}

/// Encodes a slice of bytes using the Base58 encoding scheme.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decodes a Base58 encoded string back into its original byte representation.
pub fn base58_decode(data: &str) -> ChainResult<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| ChainError::InvalidAddress(e.to_string()))
}

/// Encodes bytes as lowercase hex, used for display and transaction/block ids.
pub fn hex_encode(data: &[u8]) -> String {
    data_encoding::HEXLOWER.encode(data)
}

/// Decodes a lowercase hex string back into bytes.
pub fn hex_decode(data: &str) -> ChainResult<Vec<u8>> {
    data_encoding::HEXLOWER
        .decode(data.as_bytes())
        .map_err(|e| ChainError::Crypto(e.to_string()))
}

/// Generates a new ECDSA P-256 key pair, returning the private key in PKCS#8 form.
pub fn new_key_pair() -> ChainResult<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|_| ChainError::Crypto("failed to generate key pair".into()))?;
    Ok(pkcs8.as_ref().to_vec())
}

/// Signs `message` using ECDSA P-256 SHA-256 with the key encoded in `pkcs8`.
pub fn ecdsa_p256_sha256_sign_digest(pkcs8: &[u8], message: &[u8]) -> ChainResult<Vec<u8>> {
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &SystemRandom::new())
        .map_err(|_| ChainError::Crypto("invalid pkcs8 key".into()))?;
    let rng = SystemRandom::new();
    let signature = key_pair
        .sign(&rng, message)
        .map_err(|_| ChainError::Crypto("signing failed".into()))?;
    Ok(signature.as_ref().to_vec())
}

/// Verifies an ECDSA P-256 SHA-256 `signature` over `message` against `public_key`.
pub fn ecdsa_p256_sha256_sign_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let peer_public_key = ring::signature::UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key);
    peer_public_key.verify(message, signature).is_ok()
}

/// Encodes an `i64` as 8 big-endian bytes, used in the proof-of-work preimage.
#[must_use]
pub fn i64_be_bytes(n: i64) -> [u8; 8] {
    n.to_be_bytes()
}

/// Encodes a peer protocol command name as a fixed, zero-padded 12-byte prefix.
///
/// # Panics
///
/// Panics if `command` is longer than [`COMMAND_LENGTH`] bytes; all commands
/// used by this crate are short string literals, so this can't happen here.
#[must_use]
pub fn command_to_bytes(command: &str) -> [u8; COMMAND_LENGTH] {
    assert!(
        command.len() <= COMMAND_LENGTH,
        "command name longer than the wire frame allows"
    );
    let mut bytes = [0u8; COMMAND_LENGTH];
    bytes[..command.len()].copy_from_slice(command.as_bytes());
    bytes
}

/// Recovers a command name from its zero-padded 12-byte wire prefix.
#[must_use]
pub fn bytes_to_command(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_framing_round_trips() {
        let framed = command_to_bytes("version");
        assert_eq!(framed.len(), COMMAND_LENGTH);
        assert_eq!(bytes_to_command(&framed), "version");
    }

    #[test]
    fn command_framing_zero_pads() {
        let framed = command_to_bytes("tx");
        assert_eq!(&framed[2..], &[0u8; COMMAND_LENGTH - 2]);
    }

    #[test]
    fn base58_round_trips() {
        let data = sha256_digest(b"tinychain");
        let encoded = base58_encode(&data);
        let decoded = base58_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256_digest(b"abc"), sha256_digest(b"abc"));
        assert_ne!(sha256_digest(b"abc"), sha256_digest(b"abd"));
    }

    #[test]
    fn signature_round_trips() {
        let pkcs8 = new_key_pair().unwrap();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &SystemRandom::new())
                .unwrap();
        let public_key = key_pair.public_key().as_ref().to_vec();
        let message = sha256_digest(b"trimmed transaction");
        let signature = ecdsa_p256_sha256_sign_digest(&pkcs8, &message).unwrap();
        assert!(ecdsa_p256_sha256_sign_verify(&public_key, &signature, &message));
        assert!(!ecdsa_p256_sha256_sign_verify(&public_key, &signature, b"tampered"));
    }
}
