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

//! Canonical MessagePack encoding.
//!
//! Persisted values and every hashed payload use the struct-as-tuple MessagePack form produced
//! by `rmp-serde`. The encoding is deterministic for a fixed struct definition, which makes it
//! safe to use the digest of an encoded header as the identity of a block or query record.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{crypto, types::Hash};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("MessagePack encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("MessagePack decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec(value)?)
}

pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// sha256 over the canonical encoding of `value`.
pub fn hash_of<T: Serialize>(value: &T) -> Result<Hash, CodecError> {
    Ok(crypto::sha256(&to_vec(value)?))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        id: u64,
        name: String,
    }

    #[test]
    fn roundtrip() {
        let payload = Payload {
            id: 42,
            name: "turn".to_string(),
        };
        let bytes = to_vec(&payload).unwrap();
        let back: Payload = from_slice(&bytes).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn encoding_is_deterministic() {
        let payload = Payload {
            id: 7,
            name: "stable".to_string(),
        };
        assert_eq!(hash_of(&payload).unwrap(), hash_of(&payload).unwrap());
        assert_ne!(
            hash_of(&payload).unwrap(),
            hash_of(&Payload {
                id: 8,
                name: "stable".to_string()
            })
            .unwrap()
        );
    }
}
