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

use super::{RequestHeader, SignatureError, SignedRequestHeader};
use crate::{
    codec::{self, CodecError},
    crypto::{self, Signature, SigningKey, VerifyingKey},
    types::{Address, Hash, NodeId},
};

/// A miner's signed record of a completed query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// The request envelope this response answers.
    pub request: RequestHeader,
    pub request_hash: Hash,
    /// The client that signed the request. Acknowledgements must come from this key.
    pub request_signee: VerifyingKey,
    /// The responding miner.
    pub node_id: NodeId,
    /// When the miner committed the query.
    pub timestamp: i64,
    pub row_count: u64,
    pub affected_rows: u64,
    /// Position of this query in the SQL state's write-ahead sequence. The chain uses the
    /// maximum observed offset to re-seed the SQL state after a restart.
    pub log_offset: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedResponseHeader {
    pub header: ResponseHeader,
    pub signee: VerifyingKey,
    pub signature: Signature,
}

impl SignedResponseHeader {
    pub fn sign(header: ResponseHeader, key: &SigningKey) -> Result<Self, CodecError> {
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

    /// The billing account credited for serving this query.
    pub fn response_account(&self) -> Address {
        crypto::public_key_address(&self.signee)
    }

    /// The billing account debited for issuing this query.
    pub fn request_account(&self) -> Address {
        crypto::public_key_address(&self.header.request_signee)
    }

    pub fn request_timestamp(&self) -> i64 {
        self.header.request.timestamp
    }
}

/// A request and the response it got, as packed into a block body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryTx {
    pub request: SignedRequestHeader,
    pub response: SignedResponseHeader,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{queries::QueryType, types::DatabaseId};
    use rand::rngs::OsRng;

    #[test]
    fn response_account_tracks_signee() {
        let client = SigningKey::generate(&mut OsRng);
        let miner = SigningKey::generate(&mut OsRng);
        let request = RequestHeader {
            database_id: DatabaseId::new("db-0"),
            query_type: QueryType::Read,
            timestamp: 500,
            batch_count: 1,
        };
        let signed_request = SignedRequestHeader::sign(request.clone(), &client).unwrap();
        let response = ResponseHeader {
            request,
            request_hash: signed_request.hash().unwrap(),
            request_signee: signed_request.signee,
            node_id: crypto::public_key_node_id(&miner.verifying_key()),
            timestamp: 600,
            row_count: 10,
            affected_rows: 0,
            log_offset: 0,
        };
        let signed = SignedResponseHeader::sign(response, &miner).unwrap();
        signed.verify().unwrap();
        assert_eq!(
            signed.response_account(),
            crypto::public_key_address(&miner.verifying_key())
        );
        assert_eq!(signed.request_timestamp(), 500);
    }
}
