// Copyright 2024. The SQLChain Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Signing primitives: Ed25519 keys, sha256 digests and the address derivations used by the
//! billing layer. Addresses and node ids are both the sha256 of the raw public key bytes.

use std::{fs, path::Path};

use ed25519_dalek::Signer;
pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::{Address, DatabaseId, Hash, NodeId, HASH_LENGTH};

pub const SEED_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Key file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Key file is not valid hex: {0}")]
    MalformedHex(#[from] hex::FromHexError),
    #[error("Hex value does not decode to 32 bytes")]
    WrongLength,
}

pub fn sha256(data: &[u8]) -> Hash {
    Hash(Sha256::digest(data).into())
}

pub fn sha256_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash(hasher.finalize().into())
}

pub fn public_key_address(key: &VerifyingKey) -> Address {
    Address(sha256(key.as_bytes()).0)
}

pub fn public_key_node_id(key: &VerifyingKey) -> NodeId {
    NodeId(sha256(key.as_bytes()).0)
}

/// The billing receiver account for a database.
pub fn database_address(id: &DatabaseId) -> Address {
    Address(sha256(id.as_str().as_bytes()).0)
}

pub fn sign_hash(key: &SigningKey, hash: &Hash) -> Signature {
    key.sign(hash.as_bytes())
}

pub fn verify_hash(key: &VerifyingKey, hash: &Hash, signature: &Signature) -> bool {
    key.verify_strict(hash.as_bytes(), signature).is_ok()
}

/// Loads the local signing key from `path`, generating and persisting a fresh one if the file
/// does not exist. The file holds the hex-encoded 32-byte seed.
pub fn load_or_create_key(path: &Path) -> Result<SigningKey, KeyError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let seed = hex::decode(contents.trim())?;
        let seed: [u8; SEED_LENGTH] = seed.try_into().map_err(|_| KeyError::WrongLength)?;
        Ok(SigningKey::from_bytes(&seed))
    } else {
        let key = SigningKey::generate(&mut OsRng);
        fs::write(path, hex::encode(key.to_bytes()))?;
        Ok(key)
    }
}

/// Build a `NodeId` from a hex public key digest, mostly useful for configuration loading.
pub fn node_id_from_hex(hex_str: &str) -> Result<NodeId, KeyError> {
    let bytes = hex::decode(hex_str.trim())?;
    let bytes: [u8; HASH_LENGTH] = bytes.try_into().map_err(|_| KeyError::WrongLength)?;
    Ok(NodeId(bytes))
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sign_verify_roundtrip() {
        let key = SigningKey::generate(&mut OsRng);
        let digest = sha256(b"payload");
        let signature = sign_hash(&key, &digest);
        assert!(verify_hash(&key.verifying_key(), &digest, &signature));
        assert!(!verify_hash(&key.verifying_key(), &sha256(b"other"), &signature));
    }

    #[test]
    fn address_derivation_is_stable() {
        let key = SigningKey::generate(&mut OsRng);
        let vk = key.verifying_key();
        assert_eq!(public_key_address(&vk), public_key_address(&vk));
        assert_eq!(public_key_address(&vk).0, public_key_node_id(&vk).0);
    }

    #[test]
    fn load_or_create_persists_identity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.key");
        let first = load_or_create_key(&path).unwrap();
        let second = load_or_create_key(&path).unwrap();
        assert_eq!(first.to_bytes(), second.to_bytes());
    }

    #[test]
    fn malformed_key_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.key");
        std::fs::write(&path, "not-hex").unwrap();
        assert!(matches!(load_or_create_key(&path), Err(KeyError::MalformedHex(_))));
        std::fs::write(&path, hex::encode([0u8; 16])).unwrap();
        assert!(matches!(load_or_create_key(&path), Err(KeyError::WrongLength)));
    }
}
