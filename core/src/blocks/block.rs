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

use super::{
    header::{BlockHeader, SignedBlockHeader, BLOCK_VERSION},
    merkle::merkle_root,
    BlockError,
};
use crate::{
    codec::CodecError,
    crypto::SigningKey,
    queries::{QueryTx, SignedAckHeader, SignedRequestHeader},
    types::{Hash, NodeId},
};

/// A signed, immutable unit of chain history. The body carries the requests rejected before
/// execution, the executed query transactions and the acknowledgements collected this turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub signed_header: SignedBlockHeader,
    pub failed_requests: Vec<SignedRequestHeader>,
    pub query_txs: Vec<QueryTx>,
    pub acks: Vec<SignedAckHeader>,
}

impl Block {
    pub fn hash(&self) -> &Hash {
        &self.signed_header.hash
    }

    pub fn producer(&self) -> &NodeId {
        &self.signed_header.header.producer
    }

    pub fn parent_hash(&self) -> Hash {
        self.signed_header.header.parent_hash
    }

    pub fn genesis_hash(&self) -> Hash {
        self.signed_header.header.genesis_hash
    }

    pub fn timestamp(&self) -> i64 {
        self.signed_header.header.timestamp
    }

    pub fn is_genesis(&self) -> bool {
        self.parent_hash().is_zero() && self.genesis_hash().is_zero()
    }

    pub fn compute_merkle_root(&self) -> Result<Hash, CodecError> {
        body_merkle_root(&self.failed_requests, &self.query_txs, &self.acks)
    }

    /// Full structural verification: body commitment and producer signature.
    pub fn verify(&self) -> Result<(), BlockError> {
        if self.compute_merkle_root()? != self.signed_header.header.merkle_root {
            return Err(BlockError::MerkleMismatch);
        }
        self.signed_header.verify()
    }

    /// The SQL state sequence id implied by this block, if it carries any queries.
    pub fn calc_next_id(&self) -> Option<u64> {
        self.query_txs
            .iter()
            .map(|tx| tx.response.header.log_offset + 1)
            .max()
    }
}

/// The merkle leaves of a body, in pack order: failed requests, then query responses, then
/// acknowledgements. A response digest commits to its request digest, so requests do not get
/// separate leaves.
fn body_merkle_root(
    failed_requests: &[SignedRequestHeader],
    query_txs: &[QueryTx],
    acks: &[SignedAckHeader],
) -> Result<Hash, CodecError> {
    let mut leaves = Vec::with_capacity(failed_requests.len() + query_txs.len() + acks.len());
    for request in failed_requests {
        leaves.push(request.hash()?);
    }
    for tx in query_txs {
        leaves.push(tx.response.hash()?);
    }
    for ack in acks {
        leaves.push(ack.hash()?);
    }
    Ok(merkle_root(leaves))
}

#[derive(Debug, Default)]
pub struct BlockBuilder {
    producer: NodeId,
    genesis_hash: Hash,
    parent_hash: Hash,
    timestamp: i64,
    failed_requests: Vec<SignedRequestHeader>,
    query_txs: Vec<QueryTx>,
    acks: Vec<SignedAckHeader>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_producer(mut self, producer: NodeId) -> Self {
        self.producer = producer;
        self
    }

    pub fn with_genesis_hash(mut self, hash: Hash) -> Self {
        self.genesis_hash = hash;
        self
    }

    pub fn with_parent_hash(mut self, hash: Hash) -> Self {
        self.parent_hash = hash;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_failed_requests(mut self, failed_requests: Vec<SignedRequestHeader>) -> Self {
        self.failed_requests = failed_requests;
        self
    }

    pub fn with_query_txs(mut self, query_txs: Vec<QueryTx>) -> Self {
        self.query_txs = query_txs;
        self
    }

    pub fn with_acks(mut self, acks: Vec<SignedAckHeader>) -> Self {
        self.acks = acks;
        self
    }

    /// Packs the body, computes the merkle root and signs the header.
    pub fn build(self, key: &SigningKey) -> Result<Block, CodecError> {
        let merkle_root = body_merkle_root(&self.failed_requests, &self.query_txs, &self.acks)?;
        let header = BlockHeader {
            version: BLOCK_VERSION,
            producer: self.producer,
            genesis_hash: self.genesis_hash,
            parent_hash: self.parent_hash,
            merkle_root,
            timestamp: self.timestamp,
        };
        Ok(Block {
            signed_header: SignedBlockHeader::sign(header, key)?,
            failed_requests: self.failed_requests,
            query_txs: self.query_txs,
            acks: self.acks,
        })
    }
}

/// An empty, self-parented block anchoring a fresh chain. Its timestamp becomes the genesis
/// instant of the chain's turn clock.
pub fn genesis_block(producer: NodeId, timestamp: i64, key: &SigningKey) -> Result<Block, CodecError> {
    BlockBuilder::new()
        .with_producer(producer)
        .with_genesis_hash(Hash::ZERO)
        .with_parent_hash(Hash::ZERO)
        .with_timestamp(timestamp)
        .build(key)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        crypto,
        queries::{QueryType, RequestHeader, ResponseHeader, SignedResponseHeader},
        types::DatabaseId,
    };
    use rand::rngs::OsRng;

    fn query_tx(client: &SigningKey, miner: &SigningKey, log_offset: u64) -> QueryTx {
        let header = RequestHeader {
            database_id: DatabaseId::new("db-0"),
            query_type: QueryType::Write,
            timestamp: 1_000,
            batch_count: 1,
        };
        let request = SignedRequestHeader::sign(header.clone(), client).unwrap();
        let response = SignedResponseHeader::sign(
            ResponseHeader {
                request: header,
                request_hash: request.hash().unwrap(),
                request_signee: request.signee,
                node_id: crypto::public_key_node_id(&miner.verifying_key()),
                timestamp: 1_100,
                row_count: 0,
                affected_rows: 2,
                log_offset,
            },
            miner,
        )
        .unwrap();
        QueryTx { request, response }
    }

    #[test]
    fn genesis_block_verifies() {
        let key = SigningKey::generate(&mut OsRng);
        let genesis = genesis_block(crypto::public_key_node_id(&key.verifying_key()), 0, &key).unwrap();
        assert!(genesis.is_genesis());
        genesis.verify().unwrap();
        assert_eq!(genesis.calc_next_id(), None);
    }

    #[test]
    fn built_block_verifies_and_tampering_breaks_merkle() {
        let producer = SigningKey::generate(&mut OsRng);
        let client = SigningKey::generate(&mut OsRng);
        let mut block = BlockBuilder::new()
            .with_producer(crypto::public_key_node_id(&producer.verifying_key()))
            .with_parent_hash(crypto::sha256(b"parent"))
            .with_genesis_hash(crypto::sha256(b"genesis"))
            .with_timestamp(10_000)
            .with_query_txs(vec![query_tx(&client, &producer, 3), query_tx(&client, &producer, 7)])
            .build(&producer)
            .unwrap();
        block.verify().unwrap();
        assert_eq!(block.calc_next_id(), Some(8));

        block.query_txs.pop();
        assert!(matches!(block.verify(), Err(BlockError::MerkleMismatch)));
    }
}
