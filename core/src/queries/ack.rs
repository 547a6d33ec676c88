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

use super::SignatureError;
use crate::{
    codec::{self, CodecError},
    crypto::{self, Signature, SigningKey, VerifyingKey},
    types::Hash,
};

/// A client's confirmation that it received a query response. An ack becomes billable once a
/// block includes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AckHeader {
    /// Timestamp of the original request; places the ack in its height bucket.
    pub request_timestamp: i64,
    pub response_timestamp: i64,
    /// Digest of the acknowledged response header.
    pub response_hash: Hash,
    /// When the client produced the ack.
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedAckHeader {
    pub header: AckHeader,
    pub signee: VerifyingKey,
    pub signature: Signature,
}

impl SignedAckHeader {
    pub fn sign(header: AckHeader, key: &SigningKey) -> Result<Self, CodecError> {
        let digest = codec::hash_of(&header)?;
        Ok(Self {
            header,
            signee: key.verifying_key(),
            signature: crypto::sign_hash(key, &digest),
        })
    }

    pub fn hash(&self) -> Result<Hash, CodecError> {
        codec::hash_of(&self.header)
    }

    pub fn verify(&self) -> Result<(), SignatureError> {
        let digest = self.hash()?;
        if crypto::verify_hash(&self.signee, &digest, &self.signature) {
            Ok(())
        } else {
            Err(SignatureError::InvalidSignature)
        }
    }

    pub fn request_timestamp(&self) -> i64 {
        self.header.request_timestamp
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn ack_signature_covers_response_hash() {
        let key = SigningKey::generate(&mut OsRng);
        let header = AckHeader {
            request_timestamp: 100,
            response_timestamp: 150,
            response_hash: crypto::sha256(b"response"),
            timestamp: 160,
        };
        let mut ack = SignedAckHeader::sign(header, &key).unwrap();
        ack.verify().unwrap();
        ack.header.response_hash = crypto::sha256(b"forged");
        assert!(ack.verify().is_err());
    }
}
