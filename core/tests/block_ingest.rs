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

//! Validation-ladder coverage for peer block ingestion: rotation slots, parent linkage,
//! acknowledgement lifecycle and expiry boundaries.

mod helpers;

use std::{sync::Arc, time::Duration};

use helpers::*;
use rand::rngs::OsRng;
use sqlchain_core::{
    chain::{Chain, ChainError},
    comms::{FetchBlockByCountRequest, FetchBlockRequest},
    crypto::{self, SigningKey},
    queries::QueryType,
    types::now_millis,
};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    nodes: Vec<TestNode>,
    state: Arc<MemorySqlState>,
    chain: Chain<Arc<MemorySqlState>>,
    genesis_time: i64,
}

/// A three-peer committee with `nodes[0]` as the local server; the chain is not started, so
/// blocks are driven through the validation ladder directly.
fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let nodes = committee(3);
    let genesis_time = now_millis();
    let config = test_config(
        dir.path(),
        nodes[0].id,
        &nodes,
        genesis_time,
        Duration::from_millis(PERIOD_MS as u64),
    );
    let state = Arc::new(MemorySqlState::new());
    let chain = Chain::new(config, state.clone(), RecordingPeerClient::new(), RecordingMainChain::new()).unwrap();
    Fixture {
        _dir: dir,
        nodes,
        state,
        chain,
        genesis_time,
    }
}

#[tokio::test]
async fn valid_peer_block_is_replayed_and_applied() {
    let fx = setup();
    // Rotation: the turn at height 2 belongs to nodes[1].
    let block = Arc::new(make_block(
        &fx.nodes[1],
        fx.chain.genesis_hash(),
        fx.genesis_time,
        &fx.chain.head(),
        2,
        vec![],
        vec![],
    ));
    fx.chain.check_and_push_new_block(block.clone()).await.unwrap();

    let head = fx.chain.head();
    assert_eq!(head.hash, *block.hash());
    assert_eq!(head.height, 2);
    assert_eq!(head.node.count(), 1);
    assert_eq!(*fx.state.replayed.lock(), vec![*block.hash()]);
}

#[tokio::test]
async fn own_block_short_circuits_and_is_idempotent() {
    let fx = setup();
    let block = Arc::new(make_block(
        &fx.nodes[0],
        fx.chain.genesis_hash(),
        fx.genesis_time,
        &fx.chain.head(),
        1,
        vec![],
        vec![],
    ));
    fx.chain.check_and_push_new_block(block.clone()).await.unwrap();
    let head_after_first = fx.chain.head();
    assert_eq!(head_after_first.hash, *block.hash());
    // Locally produced blocks were already executed at production time; no replay.
    assert!(fx.state.replayed.lock().is_empty());

    // The same block advised back to its producer is a no-op.
    fx.chain.check_and_push_new_block(block).await.unwrap();
    let head_after_second = fx.chain.head();
    assert_eq!(head_after_second.hash, head_after_first.hash);
    assert_eq!(head_after_second.node.count(), 1);
}

#[tokio::test]
async fn parent_counts_stay_linked_over_a_block_sequence() {
    let fx = setup();
    for height in [1i64, 2, 3] {
        let producer = &fx.nodes[((height - 1) % 3) as usize];
        let block = Arc::new(make_block(
            producer,
            fx.chain.genesis_hash(),
            fx.genesis_time,
            &fx.chain.head(),
            height,
            vec![],
            vec![],
        ));
        fx.chain.check_and_push_new_block(block).await.unwrap();
    }
    let head = fx.chain.head();
    assert_eq!(head.node.count(), 3);
    assert_eq!(fx.chain.block_hashes().len(), 4);

    // Every node's parent resolves with parent.count + 1 == node.count.
    let mut cursor = Some(head.node);
    while let Some(node) = cursor {
        if let Some(parent) = node.parent() {
            assert_eq!(parent.count() + 1, node.count());
        } else {
            assert_eq!(node.count(), 0);
        }
        cursor = node.parent();
    }
}

#[tokio::test]
async fn block_with_unexpected_parent_is_rejected() {
    let fx = setup();
    let mut fake_head = fx.chain.head();
    fake_head.hash = crypto::sha256(b"not the head");
    let block = Arc::new(make_block(
        &fx.nodes[1],
        fx.chain.genesis_hash(),
        fx.genesis_time,
        &fake_head,
        2,
        vec![],
        vec![],
    ));
    let err = fx.chain.check_and_push_new_block(block).await.unwrap_err();
    assert!(matches!(err, ChainError::InvalidBlock(_)));
    assert_eq!(fx.chain.head().height, 0);
}

#[tokio::test]
async fn block_from_the_wrong_rotation_slot_is_rejected() {
    let fx = setup();
    // Height 2 belongs to nodes[1]; nodes[2] signing it is an InvalidProducer.
    let block = Arc::new(make_block(
        &fx.nodes[2],
        fx.chain.genesis_hash(),
        fx.genesis_time,
        &fx.chain.head(),
        2,
        vec![],
        vec![],
    ));
    let err = fx.chain.check_and_push_new_block(block).await.unwrap_err();
    assert!(matches!(err, ChainError::InvalidProducer { height: 2, .. }));
}

#[tokio::test]
async fn block_from_outside_the_committee_is_rejected() {
    let fx = setup();
    let stranger = test_node();
    let block = Arc::new(make_block(
        &stranger,
        fx.chain.genesis_hash(),
        fx.genesis_time,
        &fx.chain.head(),
        2,
        vec![],
        vec![],
    ));
    let err = fx.chain.check_and_push_new_block(block).await.unwrap_err();
    assert!(matches!(err, ChainError::UnknownProducer(id) if id == stranger.id));
}

#[tokio::test]
async fn replay_failure_drops_the_block() {
    let fx = setup();
    fx.state.fail_replay.store(true, std::sync::atomic::Ordering::SeqCst);
    let block = Arc::new(make_block(
        &fx.nodes[1],
        fx.chain.genesis_hash(),
        fx.genesis_time,
        &fx.chain.head(),
        2,
        vec![],
        vec![],
    ));
    let err = fx.chain.check_and_push_new_block(block).await.unwrap_err();
    assert!(matches!(err, ChainError::State(_)));
    assert_eq!(fx.chain.head().height, 0);
}

#[tokio::test]
async fn acknowledged_query_leaves_the_index_once_a_block_includes_it() {
    let fx = setup();
    let client = SigningKey::generate(&mut OsRng);

    // Request issued during turn 1; its acknowledgement bucket is height 1.
    let request = make_request(&client, QueryType::Read, fx.genesis_time + PERIOD_MS + 5, 1);
    let response = make_response(&request, &fx.nodes[0].key, 10, 0, 0);
    fx.chain.add_response(response.clone()).unwrap();
    let ack = make_ack(&response, &client);
    fx.chain.verify_and_push_acked_query(ack.clone()).unwrap();
    assert_eq!(fx.chain.pending_acks(10).len(), 1);

    let block = Arc::new(make_block(
        &fx.nodes[1],
        fx.chain.genesis_hash(),
        fx.genesis_time,
        &fx.chain.head(),
        2,
        vec![],
        vec![ack],
    ));
    fx.chain.check_and_push_new_block(block).await.unwrap();
    assert!(fx.chain.pending_acks(10).is_empty());
}

#[tokio::test]
async fn fetch_block_serves_the_latest_ancestor_at_or_before_a_height() {
    let fx = setup();
    // Heights 2 and 3 exist; turn 1 was skipped.
    let b2 = Arc::new(make_block(
        &fx.nodes[1],
        fx.chain.genesis_hash(),
        fx.genesis_time,
        &fx.chain.head(),
        2,
        vec![],
        vec![],
    ));
    fx.chain.check_and_push_new_block(b2.clone()).await.unwrap();
    let b3 = Arc::new(make_block(
        &fx.nodes[2],
        fx.chain.genesis_hash(),
        fx.genesis_time,
        &fx.chain.head(),
        3,
        vec![],
        vec![],
    ));
    fx.chain.check_and_push_new_block(b3.clone()).await.unwrap();

    let rpc = fx.chain.rpc_service();
    let exact = rpc
        .fetch_block(FetchBlockRequest {
            database_id: database_id(),
            height: 2,
        })
        .unwrap();
    assert_eq!(exact.height, 2);
    assert_eq!(exact.block.unwrap().hash(), &*b2.hash());

    // The skipped turn resolves to the latest ancestor below it, which is genesis.
    let skipped = rpc
        .fetch_block(FetchBlockRequest {
            database_id: database_id(),
            height: 1,
        })
        .unwrap();
    assert_eq!(skipped.height, 0);
    assert_eq!(skipped.block.unwrap().hash(), &fx.chain.genesis_hash());

    // Far-future heights resolve to head.
    let future = rpc
        .fetch_block(FetchBlockRequest {
            database_id: database_id(),
            height: 50,
        })
        .unwrap();
    assert_eq!(future.height, 3);

    // Counts are exact; negative means head.
    let head = rpc
        .fetch_block_by_count(FetchBlockByCountRequest {
            database_id: database_id(),
            count: -1,
        })
        .unwrap();
    assert_eq!(head.block.unwrap().hash(), &*b3.hash());
    let first = rpc
        .fetch_block_by_count(FetchBlockByCountRequest {
            database_id: database_id(),
            count: 1,
        })
        .unwrap();
    assert_eq!(first.block.unwrap().hash(), &*b2.hash());

    let foreign = rpc.fetch_block(FetchBlockRequest {
        database_id: sqlchain_core::types::DatabaseId::new("someone-else"),
        height: 0,
    });
    assert!(matches!(foreign, Err(ChainError::WrongDatabase(_, _))));
}

#[tokio::test]
async fn ack_below_the_window_floor_is_rejected() {
    let fx = setup();
    let client = SigningKey::generate(&mut OsRng);

    // query_ttl is 30 turns and head is at height 0, so requests below height -30 are expired.
    let request = make_request(&client, QueryType::Read, fx.genesis_time - 31 * PERIOD_MS, 1);
    let response = make_response(&request, &fx.nodes[0].key, 1, 0, 0);
    let ack = make_ack(&response, &client);
    let err = fx.chain.verify_and_push_acked_query(ack).unwrap_err();
    assert!(err.is_query_expired(), "unexpected error: {err}");
}

#[tokio::test]
async fn unsolicited_ack_is_rejected() {
    let fx = setup();
    let client = SigningKey::generate(&mut OsRng);
    let request = make_request(&client, QueryType::Read, fx.genesis_time + PERIOD_MS + 5, 1);
    let response = make_response(&request, &fx.nodes[0].key, 1, 0, 0);
    // No add_response: the index has never seen this response.
    let ack = make_ack(&response, &client);
    let err = fx.chain.verify_and_push_acked_query(ack).unwrap_err();
    assert!(matches!(err, ChainError::AckIndex(_)));
}
