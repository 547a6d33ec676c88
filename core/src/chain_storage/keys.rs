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

//! Store key layout: four-byte tag ‖ big-endian height (4 bytes) ‖ 32-byte content hash.
//! Big-endian heights make a plain prefix scan come back in height order, which the startup
//! replay depends on.

use super::ChainStorageError;
use crate::types::{Hash, HASH_LENGTH};

pub const KEY_TAG_LENGTH: usize = 4;
pub const STORE_KEY_LENGTH: usize = KEY_TAG_LENGTH + 4 + HASH_LENGTH;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyTag {
    Block,
    /// Reserved for request records; nothing writes it today.
    Request,
    Response,
    Ack,
}

impl KeyTag {
    pub const fn as_bytes(self) -> &'static [u8; KEY_TAG_LENGTH] {
        match self {
            KeyTag::Block => b"BLCK",
            KeyTag::Request => b"REQU",
            KeyTag::Response => b"RESP",
            KeyTag::Ack => b"QACK",
        }
    }
}

pub fn encode_key(tag: KeyTag, height: i64, hash: &Hash) -> Result<[u8; STORE_KEY_LENGTH], ChainStorageError> {
    let height = u32::try_from(height).map_err(|_| ChainStorageError::HeightOutOfRange(height))?;
    let mut key = [0u8; STORE_KEY_LENGTH];
    key[..KEY_TAG_LENGTH].copy_from_slice(tag.as_bytes());
    key[KEY_TAG_LENGTH..KEY_TAG_LENGTH + 4].copy_from_slice(&height.to_be_bytes());
    key[KEY_TAG_LENGTH + 4..].copy_from_slice(hash.as_bytes());
    Ok(key)
}

pub fn decode_height(key: &[u8]) -> Result<i64, ChainStorageError> {
    let bytes: [u8; 4] = key
        .get(KEY_TAG_LENGTH..KEY_TAG_LENGTH + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| ChainStorageError::MalformedKey(hex::encode(key)))?;
    Ok(i64::from(u32::from_be_bytes(bytes)))
}

pub fn decode_hash(key: &[u8]) -> Result<Hash, ChainStorageError> {
    key.get(KEY_TAG_LENGTH + 4..STORE_KEY_LENGTH)
        .and_then(Hash::from_slice)
        .ok_or_else(|| ChainStorageError::MalformedKey(hex::encode(key)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto;

    #[test]
    fn key_layout_is_bit_exact() {
        let hash = crypto::sha256(b"block");
        let key = encode_key(KeyTag::Block, 0x0102, &hash).unwrap();
        assert_eq!(&key[..4], b"BLCK");
        assert_eq!(&key[4..8], &[0x00, 0x00, 0x01, 0x02]);
        assert_eq!(&key[8..], hash.as_bytes());
        assert_eq!(key.len(), STORE_KEY_LENGTH);
    }

    #[test]
    fn height_and_hash_are_recoverable() {
        let hash = crypto::sha256(b"resp");
        let key = encode_key(KeyTag::Response, 77, &hash).unwrap();
        assert_eq!(decode_height(&key).unwrap(), 77);
        assert_eq!(decode_hash(&key).unwrap(), hash);
    }

    #[test]
    fn negative_height_cannot_be_persisted() {
        let hash = crypto::sha256(b"x");
        assert!(matches!(
            encode_key(KeyTag::Ack, -1, &hash),
            Err(ChainStorageError::HeightOutOfRange(-1))
        ));
    }

    #[test]
    fn truncated_key_is_rejected() {
        assert!(decode_height(b"BLCK").is_err());
        assert!(decode_hash(b"BLCK\x00\x00\x00\x01short").is_err());
    }

    #[test]
    fn big_endian_heights_sort_in_height_order() {
        let hash = crypto::sha256(b"k");
        let lo = encode_key(KeyTag::Block, 2, &hash).unwrap();
        let hi = encode_key(KeyTag::Block, 256, &hash).unwrap();
        assert!(lo < hi);
    }
}
