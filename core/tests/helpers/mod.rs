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

//! Shared fixtures for the chain integration tests: an in-memory SQL state, recording
//! transport mocks and block/committee builders.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::OsRng;

use sqlchain_core::{
    blocks::{genesis_block, Block, BlockBuilder},
    chain::HeadState,
    comms::{
        AddTxRequest, AddTxResponse, AdviseNewBlockRequest, CommsError, FetchBlockRequest, FetchBlockResponse,
        MainChainClient, NextAccountNonceRequest, NextAccountNonceResponse, PeerClient,
    },
    config::{ChainConfig, IsolationLevel, TokenType},
    crypto::{self, SigningKey},
    queries::{
        query_tracker, AckHeader, QueryTracker, QueryTrackerHandle, QueryTx, QueryType, RequestHeader, ResponseHeader,
        SignedAckHeader, SignedRequestHeader, SignedResponseHeader,
    },
    state::{CommitResult, SqlState, StateError},
    types::{now_millis, DatabaseId, Hash, NodeId},
};

pub const PERIOD_MS: i64 = 10_000;

pub struct TestNode {
    pub key: SigningKey,
    pub id: NodeId,
}

pub fn test_node() -> TestNode {
    let key = SigningKey::generate(&mut OsRng);
    let id = crypto::public_key_node_id(&key.verifying_key());
    TestNode { key, id }
}

pub fn committee(size: usize) -> Vec<TestNode> {
    (0..size).map(|_| test_node()).collect()
}

pub fn database_id() -> DatabaseId {
    DatabaseId::new("db-test")
}

/// A config anchored at `genesis_time` with `nodes[0]` signing the genesis block.
pub fn test_config(data_dir: &Path, server: NodeId, nodes: &[TestNode], genesis_time: i64, period: Duration) -> ChainConfig {
    let genesis = genesis_block(nodes[0].id, genesis_time, &nodes[0].key).unwrap();
    ChainConfig {
        database_id: database_id(),
        data_dir: data_dir.to_path_buf(),
        chain_file_prefix: "chain".to_string(),
        period,
        update_period: 5,
        query_ttl: 30,
        block_cache_ttl: 30,
        token_type: TokenType::default(),
        gas_price: 1,
        isolation_level: IsolationLevel::default(),
        server,
        peers: nodes.iter().map(|n| n.id).collect(),
        genesis: Some(genesis),
    }
}

pub fn make_request(client: &SigningKey, query_type: QueryType, timestamp: i64, batch_count: u64) -> SignedRequestHeader {
    SignedRequestHeader::sign(
        RequestHeader {
            database_id: database_id(),
            query_type,
            timestamp,
            batch_count,
        },
        client,
    )
    .unwrap()
}

pub fn make_response(
    request: &SignedRequestHeader,
    miner: &SigningKey,
    row_count: u64,
    affected_rows: u64,
    log_offset: u64,
) -> SignedResponseHeader {
    SignedResponseHeader::sign(
        ResponseHeader {
            request: request.header.clone(),
            request_hash: request.hash().unwrap(),
            request_signee: request.signee,
            node_id: crypto::public_key_node_id(&miner.verifying_key()),
            timestamp: request.header.timestamp + 50,
            row_count,
            affected_rows,
            log_offset,
        },
        miner,
    )
    .unwrap()
}

pub fn make_ack(response: &SignedResponseHeader, client: &SigningKey) -> SignedAckHeader {
    SignedAckHeader::sign(
        AckHeader {
            request_timestamp: response.header.request.timestamp,
            response_timestamp: response.header.timestamp,
            response_hash: response.hash().unwrap(),
            timestamp: response.header.timestamp + 10,
        },
        client,
    )
    .unwrap()
}

/// A block extending `head`, timestamped into the turn of `height`.
pub fn make_block(
    producer: &TestNode,
    genesis_hash: Hash,
    genesis_time: i64,
    head: &HeadState,
    height: i64,
    query_txs: Vec<QueryTx>,
    acks: Vec<SignedAckHeader>,
) -> Block {
    BlockBuilder::new()
        .with_producer(producer.id)
        .with_genesis_hash(genesis_hash)
        .with_parent_hash(head.hash)
        .with_timestamp(genesis_time + height * PERIOD_MS + 1)
        .with_query_txs(query_txs)
        .with_acks(acks)
        .build(&producer.key)
        .unwrap()
}

struct PendingQuery {
    request: SignedRequestHeader,
    response: SignedResponseHeader,
    handle: QueryTrackerHandle,
    tracker: QueryTracker,
}

/// An in-memory stand-in for the transactional SQL backend. Queries queue until `commit`,
/// which completes their trackers; replayed blocks are recorded by hash.
pub struct MemorySqlState {
    key: SigningKey,
    pending: Mutex<Vec<PendingQuery>>,
    next_offset: AtomicU64,
    pub replayed: Mutex<Vec<Hash>>,
    pub seq: AtomicU64,
    pub closed: AtomicBool,
    pub fail_replay: AtomicBool,
}

impl MemorySqlState {
    pub fn new() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
            pending: Mutex::new(Vec::new()),
            next_offset: AtomicU64::new(0),
            replayed: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            fail_replay: AtomicBool::new(false),
        }
    }

    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

impl Default for MemorySqlState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SqlState for MemorySqlState {
    async fn query(
        &self,
        request: SignedRequestHeader,
        _is_leader: bool,
    ) -> Result<(QueryTracker, SignedResponseHeader), StateError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StateError::Closed);
        }
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let (row_count, affected_rows) = match request.header.query_type {
            QueryType::Read => (1, 0),
            QueryType::Write => (0, 1),
        };
        let response = SignedResponseHeader::sign(
            ResponseHeader {
                request: request.header.clone(),
                request_hash: request.hash().map_err(|e| StateError::QueryFailed(e.to_string()))?,
                request_signee: request.signee,
                node_id: crypto::public_key_node_id(&self.key.verifying_key()),
                timestamp: now_millis(),
                row_count,
                affected_rows,
                log_offset: offset,
            },
            &self.key,
        )
        .map_err(|e| StateError::QueryFailed(e.to_string()))?;
        let (handle, tracker) = query_tracker();
        self.pending.lock().push(PendingQuery {
            request,
            response: response.clone(),
            handle,
            tracker: tracker.clone(),
        });
        Ok((tracker, response))
    }

    async fn commit(&self) -> Result<CommitResult, StateError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StateError::Closed);
        }
        let pending: Vec<PendingQuery> = self.pending.lock().drain(..).collect();
        let mut trackers = Vec::with_capacity(pending.len());
        for entry in pending {
            entry.handle.complete(QueryTx {
                request: entry.request,
                response: entry.response,
            });
            trackers.push(entry.tracker);
        }
        Ok(CommitResult {
            failed_requests: Vec::new(),
            trackers,
        })
    }

    async fn replay_block(&self, block: &Block) -> Result<(), StateError> {
        if self.fail_replay.load(Ordering::SeqCst) {
            return Err(StateError::ReplayFailed("injected replay failure".into()));
        }
        self.replayed.lock().push(*block.hash());
        if let Some(next_id) = block.calc_next_id() {
            let current = self.next_offset.load(Ordering::SeqCst);
            self.next_offset.store(current.max(next_id), Ordering::SeqCst);
        }
        Ok(())
    }

    fn set_seq(&self, id: u64) {
        self.seq.store(id, Ordering::SeqCst);
        self.next_offset.store(id, Ordering::SeqCst);
    }

    async fn close(&self, _drop_data: bool) -> Result<(), StateError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A peer transport that records every call. Fetches serve from a scripted height map.
pub struct RecordingPeerClient {
    pub advised: Mutex<Vec<(NodeId, AdviseNewBlockRequest)>>,
    pub fetches: Mutex<Vec<(NodeId, i64)>>,
    pub blocks: Mutex<HashMap<i64, Block>>,
}

impl RecordingPeerClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            advised: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            blocks: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl PeerClient for RecordingPeerClient {
    async fn advise_new_block(&self, peer: &NodeId, request: AdviseNewBlockRequest) -> Result<(), CommsError> {
        self.advised.lock().push((*peer, request));
        Ok(())
    }

    async fn fetch_block(&self, peer: &NodeId, request: FetchBlockRequest) -> Result<FetchBlockResponse, CommsError> {
        self.fetches.lock().push((*peer, request.height));
        Ok(FetchBlockResponse {
            height: request.height,
            block: self.blocks.lock().get(&request.height).cloned(),
        })
    }
}

/// A main-chain client that hands out sequential nonces and records submissions.
pub struct RecordingMainChain {
    pub nonce: AtomicU64,
    pub submitted: Mutex<Vec<AddTxRequest>>,
}

impl RecordingMainChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nonce: AtomicU64::new(0),
            submitted: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl MainChainClient for RecordingMainChain {
    async fn next_account_nonce(
        &self,
        _request: NextAccountNonceRequest,
    ) -> Result<NextAccountNonceResponse, CommsError> {
        Ok(NextAccountNonceResponse {
            nonce: self.nonce.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn add_tx(&self, request: AddTxRequest) -> Result<AddTxResponse, CommsError> {
        self.submitted.lock().push(request);
        Ok(AddTxResponse)
    }
}
