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

//! The genesis-anchored turn clock and the rotation schedule. Turn `t` spans
//! `[genesis + t*period, genesis + (t+1)*period)`; the block produced in turn `t` carries a
//! timestamp inside that slot and therefore has height `t`. The producer of turn `t` is
//! `peers[(t - 1) mod |peers|]`, so the first post-genesis block belongs to the first peer.

use std::{
    cmp::max,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::block_index::BlockNode;
use crate::{
    config::ChainConfig,
    types::{now_millis, Hash, NodeId},
};

/// Time-derived slot index of `timestamp_ms`. Negative when the instant precedes genesis, in
/// which case the chain has not started yet from the caller's point of view.
pub fn height_of(genesis_ms: i64, period: Duration, timestamp_ms: i64) -> i64 {
    let period_ms = period.as_millis() as i64;
    (timestamp_ms - genesis_ms).div_euclid(period_ms)
}

/// The committee, with a version bumped on every swap so divergent views show up in logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerList {
    pub version: u64,
    pub nodes: Vec<NodeId>,
}

impl PeerList {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self { version: 0, nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n == id)
    }

    /// Rotation slot owning turn `turn`.
    pub fn slot_for_turn(&self, turn: i64) -> Option<usize> {
        if self.nodes.is_empty() {
            return None;
        }
        Some((turn - 1).rem_euclid(self.nodes.len() as i64) as usize)
    }

    pub fn producer_for_turn(&self, turn: i64) -> Option<&NodeId> {
        self.slot_for_turn(turn).map(|i| &self.nodes[i])
    }
}

/// The current tip: always a node present in the block index, with its hash and height
/// denormalized for lock-free-ish reads. Replaced atomically on every extension.
#[derive(Clone, Debug)]
pub struct HeadState {
    pub node: Arc<BlockNode>,
    pub hash: Hash,
    pub height: i64,
}

impl HeadState {
    pub fn of(node: Arc<BlockNode>) -> Self {
        Self {
            hash: *node.hash(),
            height: node.height(),
            node,
        }
    }
}

/// Per-chain clock, identity and shared head/peer state.
#[derive(Debug)]
pub struct ChainRuntime {
    genesis_time: i64,
    period: Duration,
    server: NodeId,
    query_ttl: i64,
    block_cache_ttl: u64,
    peers: RwLock<Arc<PeerList>>,
    head: RwLock<HeadState>,
    next_turn: AtomicI64,
}

impl ChainRuntime {
    /// `next_turn` starts after the restored head, or at the current wall-clock turn when the
    /// node was down long enough that turns were skipped; the gap is then filled by head sync.
    pub fn new(config: &ChainConfig, genesis_time: i64, head: HeadState) -> Self {
        let wall_turn = height_of(genesis_time, config.period, now_millis()) + 1;
        let next_turn = max(head.height + 1, wall_turn);
        Self {
            genesis_time,
            period: config.period,
            server: config.server,
            query_ttl: config.query_ttl,
            block_cache_ttl: config.block_cache_ttl,
            peers: RwLock::new(Arc::new(PeerList::new(config.peers.clone()))),
            head: RwLock::new(head),
            next_turn: AtomicI64::new(next_turn),
        }
    }

    pub fn genesis_time(&self) -> i64 {
        self.genesis_time
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn server(&self) -> &NodeId {
        &self.server
    }

    pub fn block_cache_ttl(&self) -> u64 {
        self.block_cache_ttl
    }

    pub fn height_of(&self, timestamp_ms: i64) -> i64 {
        height_of(self.genesis_time, self.period, timestamp_ms)
    }

    pub fn next_turn(&self) -> i64 {
        self.next_turn.load(Ordering::SeqCst)
    }

    /// Moves the clock one turn forward and returns the new next turn.
    pub fn advance_turn(&self) -> i64 {
        self.next_turn.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// `(target, delay)` of the next tick. A zero delay means the tick is due.
    pub fn next_tick(&self) -> (i64, Duration) {
        let period_ms = self.period.as_millis() as i64;
        let target = self.genesis_time + self.next_turn() * period_ms;
        let delay = max(0, target - now_millis());
        (target, Duration::from_millis(delay as u64))
    }

    pub fn is_my_turn(&self) -> bool {
        let peers = self.peers();
        match peers.index_of(&self.server) {
            Some(index) => peers.slot_for_turn(self.next_turn()) == Some(index),
            None => false,
        }
    }

    pub fn head(&self) -> HeadState {
        self.head.read().clone()
    }

    pub fn set_head(&self, head: HeadState) {
        *self.head.write() = head;
    }

    pub fn peers(&self) -> Arc<PeerList> {
        self.peers.read().clone()
    }

    /// Atomic committee swap; readers observe either the old or the new list, never a mix.
    pub fn update_peers(&self, nodes: Vec<NodeId>) -> u64 {
        let mut guard = self.peers.write();
        let version = guard.version + 1;
        *guard = Arc::new(PeerList { version, nodes });
        version
    }

    /// Acknowledgements whose request height is below this are expired.
    pub fn min_valid_height(&self) -> i64 {
        self.head().height - self.query_ttl
    }
}
