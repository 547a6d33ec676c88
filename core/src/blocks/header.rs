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

use serde::{Deserialize, Serialize};

use super::BlockError;
use crate::{
    codec::{self, CodecError},
    crypto::{self, Signature, SigningKey, VerifyingKey},
    types::{Hash, NodeId},
};

pub const BLOCK_VERSION: u32 = 0x0100_0000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub producer: NodeId,
    pub genesis_hash: Hash,
    pub parent_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: i64,
}

impl BlockHeader {
    pub fn hash(&self) -> Result<Hash, CodecError> {
        codec::hash_of(self)
    }
}

/// Header plus producer signature. The carried `hash` is the block's identity and is persisted
/// with the block so peers never need to recompute it on the read path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedBlockHeader {
    pub header: BlockHeader,
    pub signee: VerifyingKey,
    pub signature: Signature,
    pub hash: Hash,
}

impl SignedBlockHeader {
    pub fn sign(header: BlockHeader, key: &SigningKey) -> Result<Self, CodecError> {
        let hash = header.hash()?;
        Ok(Self {
            signee: key.verifying_key(),
            signature: crypto::sign_hash(key, &hash),
            header,
            hash,
        })
    }

    pub fn verify(&self) -> Result<(), BlockError> {
        if self.header.hash()? != self.hash {
            return Err(BlockError::HashMismatch);
        }
        if !crypto::verify_hash(&self.signee, &self.hash, &self.signature) {
            return Err(BlockError::InvalidSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::OsRng;

    fn header() -> BlockHeader {
        BlockHeader {
            version: BLOCK_VERSION,
            producer: NodeId([7u8; 32]),
            genesis_hash: Hash::ZERO,
            parent_hash: crypto::sha256(b"parent"),
            merkle_root: crypto::sha256(b"body"),
            timestamp: 10_000,
        }
    }

    #[test]
    fn signed_header_verifies() {
        let key = SigningKey::generate(&mut OsRng);
        let signed = SignedBlockHeader::sign(header(), &key).unwrap();
        signed.verify().unwrap();
    }

    #[test]
    fn carried_hash_is_checked() {
        let key = SigningKey::generate(&mut OsRng);
        let mut signed = SignedBlockHeader::sign(header(), &key).unwrap();
        signed.hash = crypto::sha256(b"not the header");
        assert!(matches!(signed.verify(), Err(BlockError::HashMismatch)));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let mut signed = SignedBlockHeader::sign(header(), &key).unwrap();
        signed.signee = other.verifying_key();
        assert!(matches!(signed.verify(), Err(BlockError::InvalidSignature)));
    }
}
