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
    types::{DatabaseId, Hash},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    Read,
    Write,
}

/// Client-visible description of a query batch. The SQL text itself never enters the chain
/// layer; only the billing-relevant envelope does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub database_id: DatabaseId,
    pub query_type: QueryType,
    /// When the client issued the request. Drives the acknowledgement bucket of the query.
    pub timestamp: i64,
    /// Number of queries in the batch.
    pub batch_count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedRequestHeader {
    pub header: RequestHeader,
    pub signee: VerifyingKey,
    pub signature: Signature,
}

impl SignedRequestHeader {
    pub fn sign(header: RequestHeader, key: &SigningKey) -> Result<Self, CodecError> {
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
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::OsRng;

    fn request(ts: i64) -> RequestHeader {
        RequestHeader {
            database_id: DatabaseId::new("db-0"),
            query_type: QueryType::Write,
            timestamp: ts,
            batch_count: 3,
        }
    }

    #[test]
    fn sign_and_verify() {
        let key = SigningKey::generate(&mut OsRng);
        let signed = SignedRequestHeader::sign(request(1_000), &key).unwrap();
        signed.verify().unwrap();
    }

    #[test]
    fn tampered_header_fails_verification() {
        let key = SigningKey::generate(&mut OsRng);
        let mut signed = SignedRequestHeader::sign(request(1_000), &key).unwrap();
        signed.header.batch_count = 99;
        assert!(matches!(signed.verify(), Err(SignatureError::InvalidSignature)));
    }
}
