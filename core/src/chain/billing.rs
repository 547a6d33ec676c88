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

//! The billing aggregator. Every `update_period` counts, the chain walks that many finalized
//! blocks back from head, folds query activity into per-user per-miner cost deltas and submits
//! a signed `UpdateBilling` transaction to the main chain. Users and miners are emitted in
//! ascending address order, so the payload is reproducible across nodes.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    blocks::Block,
    chain_storage::ChainStorageError,
    codec::{self, CodecError},
    comms::CommsError,
    crypto::{self, Signature, SigningKey, VerifyingKey},
    queries::{QueryType, SignatureError},
    types::{Address, Hash},
};

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Missing block body for {0} while walking the billing window")]
    MissingBody(Hash),
    #[error("Chain storage error: {0}")]
    Storage(#[from] ChainStorageError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Transport error: {0}")]
    Comms(#[from] CommsError),
    #[error("Billing round cancelled by shutdown")]
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerIncome {
    pub miner: Address,
    pub income: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCost {
    pub user: Address,
    pub cost: u64,
    pub miners: Vec<MinerIncome>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBillingHeader {
    /// The database's own account on the main chain.
    pub receiver: Address,
    pub users: Vec<UserCost>,
    pub nonce: u64,
}

/// The signed billing transaction submitted to the main chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateBilling {
    pub header: UpdateBillingHeader,
    pub signee: VerifyingKey,
    pub signature: Signature,
}

impl UpdateBilling {
    pub fn sign(header: UpdateBillingHeader, key: &SigningKey) -> Result<Self, CodecError> {
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

/// user → miner → credit. BTreeMaps keep the fold deterministic.
pub type CostMatrix = BTreeMap<Address, BTreeMap<Address, u64>>;

/// Folds a window of blocks into per-user per-miner cost deltas. Reads credit their row count,
/// writes their affected rows; requests that failed before execution credit their batch size to
/// the block producer.
pub fn aggregate_costs(blocks: &[Arc<Block>]) -> CostMatrix {
    let mut matrix = CostMatrix::new();
    for block in blocks {
        let block_miner = crypto::public_key_address(&block.signed_header.signee);
        for tx in &block.query_txs {
            let user = tx.response.request_account();
            let miner = tx.response.response_account();
            let credit = match tx.request.header.query_type {
                QueryType::Read => tx.response.header.row_count,
                QueryType::Write => tx.response.header.affected_rows,
            };
            *matrix.entry(user).or_default().entry(miner).or_default() += credit;
        }
        for failed in &block.failed_requests {
            let user = crypto::public_key_address(&failed.signee);
            *matrix.entry(user).or_default().entry(block_miner).or_default() += failed.header.batch_count;
        }
    }
    matrix
}

/// Shapes a cost matrix into the signed transaction. Output ordering follows the matrix's
/// ascending address order; each user's cost is the sum of its per-miner incomes.
pub fn build_update(
    matrix: CostMatrix,
    receiver: Address,
    nonce: u64,
    key: &SigningKey,
) -> Result<UpdateBilling, CodecError> {
    let users = matrix
        .into_iter()
        .map(|(user, miners)| {
            let cost = miners.values().sum();
            UserCost {
                user,
                cost,
                miners: miners
                    .into_iter()
                    .map(|(miner, income)| MinerIncome { miner, income })
                    .collect(),
            }
        })
        .collect();
    UpdateBilling::sign(
        UpdateBillingHeader {
            receiver,
            users,
            nonce,
        },
        key,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        blocks::BlockBuilder,
        queries::{QueryTx, RequestHeader, ResponseHeader, SignedRequestHeader, SignedResponseHeader},
        types::DatabaseId,
    };
    use rand::rngs::OsRng;

    fn query_tx(client: &SigningKey, miner: &SigningKey, query_type: QueryType, rows: u64, affected: u64) -> QueryTx {
        let header = RequestHeader {
            database_id: DatabaseId::new("db-0"),
            query_type,
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
                row_count: rows,
                affected_rows: affected,
                log_offset: 0,
            },
            miner,
        )
        .unwrap();
        QueryTx { request, response }
    }

    /// One read of 10 rows on miner M1 and one write of 3 affected rows on miner M2 by the same
    /// user comes out as cost 13 split 10/3.
    #[test]
    fn read_and_write_credits_split_by_miner() {
        let user_key = SigningKey::generate(&mut OsRng);
        let m1 = SigningKey::generate(&mut OsRng);
        let m2 = SigningKey::generate(&mut OsRng);
        let producer = SigningKey::generate(&mut OsRng);

        let block = Arc::new(
            BlockBuilder::new()
                .with_producer(crypto::public_key_node_id(&producer.verifying_key()))
                .with_parent_hash(crypto::sha256(b"parent"))
                .with_genesis_hash(crypto::sha256(b"genesis"))
                .with_timestamp(50_000)
                .with_query_txs(vec![
                    query_tx(&user_key, &m1, QueryType::Read, 10, 0),
                    query_tx(&user_key, &m2, QueryType::Write, 0, 3),
                ])
                .build(&producer)
                .unwrap(),
        );

        let matrix = aggregate_costs(&[block]);
        let user = crypto::public_key_address(&user_key.verifying_key());
        let update = build_update(matrix, Address([9u8; 32]), 7, &producer).unwrap();
        update.verify().unwrap();

        assert_eq!(update.header.nonce, 7);
        assert_eq!(update.header.users.len(), 1);
        let cost = &update.header.users[0];
        assert_eq!(cost.user, user);
        assert_eq!(cost.cost, 13);

        let mut incomes: Vec<u64> = cost.miners.iter().map(|m| m.income).collect();
        incomes.sort_unstable();
        assert_eq!(incomes, vec![3, 10]);
        let m1_addr = crypto::public_key_address(&m1.verifying_key());
        assert!(cost
            .miners
            .iter()
            .any(|m| m.miner == m1_addr && m.income == 10));
        // Canonical ordering: miners ascend by address.
        let addrs: Vec<Address> = cost.miners.iter().map(|m| m.miner).collect();
        let mut sorted = addrs.clone();
        sorted.sort();
        assert_eq!(addrs, sorted);
    }

    /// Requests rejected before execution credit their batch size to the block's producer.
    #[test]
    fn failed_requests_credit_the_block_producer() {
        let user_key = SigningKey::generate(&mut OsRng);
        let producer = SigningKey::generate(&mut OsRng);
        let failed = SignedRequestHeader::sign(
            RequestHeader {
                database_id: DatabaseId::new("db-0"),
                query_type: QueryType::Write,
                timestamp: 1_000,
                batch_count: 4,
            },
            &user_key,
        )
        .unwrap();
        let block = Arc::new(
            BlockBuilder::new()
                .with_producer(crypto::public_key_node_id(&producer.verifying_key()))
                .with_parent_hash(crypto::sha256(b"parent"))
                .with_genesis_hash(crypto::sha256(b"genesis"))
                .with_timestamp(50_000)
                .with_failed_requests(vec![failed])
                .build(&producer)
                .unwrap(),
        );

        let matrix = aggregate_costs(&[block]);
        let user = crypto::public_key_address(&user_key.verifying_key());
        let producer_addr = crypto::public_key_address(&producer.verifying_key());
        assert_eq!(matrix[&user][&producer_addr], 4);
    }

    #[test]
    fn deterministic_across_identical_windows() {
        let user_key = SigningKey::generate(&mut OsRng);
        let miner = SigningKey::generate(&mut OsRng);
        let producer = SigningKey::generate(&mut OsRng);
        let block = Arc::new(
            BlockBuilder::new()
                .with_producer(crypto::public_key_node_id(&producer.verifying_key()))
                .with_parent_hash(crypto::sha256(b"parent"))
                .with_genesis_hash(crypto::sha256(b"genesis"))
                .with_timestamp(50_000)
                .with_query_txs(vec![query_tx(&user_key, &miner, QueryType::Read, 5, 0)])
                .build(&producer)
                .unwrap(),
        );
        let a = build_update(aggregate_costs(&[block.clone()]), Address([1u8; 32]), 0, &producer).unwrap();
        let b = build_update(aggregate_costs(&[block]), Address([1u8; 32]), 0, &producer).unwrap();
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
    }
}
