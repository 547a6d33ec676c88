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

//! The chain engine. One instance per logical database.
//!
//! Three long-lived tasks run per chain: the main tick loop, the block ingest loop and (outside
//! this crate) the transport service. Head mutations are totally ordered: blocks reach
//! [`ChainInner::push_block`] only through the ingest loop, and the local producer feeds its own
//! blocks through the same pending channel, so the ingest loop is the sole writer of head.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::future;
use log::*;
use parking_lot::Mutex;
use sqlchain_shutdown::{Shutdown, ShutdownSignal};
use tokio::{sync::mpsc, task::JoinHandle, time};

use super::{
    ack_index::AckIndex,
    billing::{aggregate_costs, build_update, BillingError},
    block_index::{BlockIndex, BlockNode},
    error::ChainError,
    runtime::{height_of, ChainRuntime, HeadState},
    stats::ChainStats,
};
use crate::{
    blocks::{Block, BlockBuilder},
    chain_storage::{BlockStore, QueryStore},
    comms::{
        AddTxRequest, AdviseNewBlockRequest, FetchBlockRequest, FetchBlockResponse, MainChainClient,
        NextAccountNonceRequest, PeerClient,
    },
    config::ChainConfig,
    crypto::{self, SigningKey},
    queries::{QueryTracker, SignedAckHeader, SignedRequestHeader, SignedResponseHeader},
    state::{SqlState, StateError},
    types::{now_millis, Address, Hash, NodeId},
};

const LOG_TARGET: &str = "sqlchain::chain";

/// How many past-height blocks are kept around for offline fork analysis.
const MAX_FORK_CANDIDATES: usize = 64;

const PENDING_CHANNEL_SIZE: usize = 64;
const HEIGHT_CHANNEL_SIZE: usize = 16;

/// A block observed at an already-passed turn. Fork resolution is intentionally not implemented;
/// candidates are only retained for diagnostics and never mutate state.
#[derive(Clone, Debug)]
pub struct ForkCandidate {
    pub hash: Hash,
    pub height: i64,
    pub producer: NodeId,
    pub received_at: i64,
}

/// A per-database SQL-chain instance.
///
/// Constructing a `Chain` opens the persistent stores and replays them into the in-memory
/// index ([startup](Chain::new)); [`start`](Chain::start) brings the worker tasks up and
/// [`stop`](Chain::stop) tears everything down in order.
pub struct Chain<B: SqlState> {
    inner: Arc<ChainInner<B>>,
    shutdown: Mutex<Shutdown>,
    receivers: Mutex<Option<(mpsc::Receiver<Arc<Block>>, mpsc::Receiver<i64>)>>,
    stopped: AtomicBool,
}

impl<B: SqlState> Chain<B> {
    /// Opens the chain: stores, signing key, index replay and, for a fresh database, genesis
    /// initialization. Startup errors are fatal and nothing is spawned.
    pub fn new(
        mut config: ChainConfig,
        state: B,
        peer_client: Arc<dyn PeerClient>,
        main_chain: Arc<dyn MainChainClient>,
    ) -> Result<Self, ChainError> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let block_store = BlockStore::open(config.block_store_path())?;
        let query_store = QueryStore::open(config.query_store_path())?;
        let key = crypto::load_or_create_key(&config.key_path())?;
        let address = crypto::public_key_address(&key.verifying_key());

        let index = BlockIndex::new();
        let stats = ChainStats::default();
        let mut genesis_time = 0i64;
        let mut max_next_id: Option<u64> = None;
        let mut prev: Option<Arc<BlockNode>> = None;
        let mut loaded = 0usize;

        for entry in block_store.blocks() {
            let (stored_height, _, block) = entry?;
            let block = Arc::new(block);
            let node = match &prev {
                None => {
                    block.verify()?;
                    if !block.is_genesis() {
                        return Err(ChainError::InvalidBlock(
                            "first persisted block is not a genesis block".into(),
                        ));
                    }
                    if let Some(expected) = &config.genesis {
                        if expected.hash() != block.hash() {
                            return Err(ChainError::InvalidBlock(
                                "persisted genesis does not match the configured genesis".into(),
                            ));
                        }
                    }
                    genesis_time = block.timestamp();
                    BlockNode::root(Arc::clone(&block), 0)
                }
                Some(prev_node) => {
                    let height = height_of(genesis_time, config.period, block.timestamp());
                    if height != stored_height {
                        warn!(
                            target: LOG_TARGET,
                            "block {} stored at height {} but computes to {}", block.hash(), stored_height, height
                        );
                    }
                    let parent_hash = block.parent_hash();
                    let parent = if *prev_node.hash() == parent_hash {
                        Arc::clone(prev_node)
                    } else {
                        index
                            .lookup_node(&parent_hash)
                            .ok_or(ChainError::ParentNotFound(parent_hash))?
                    };
                    BlockNode::child_of(&parent, Arc::clone(&block), height)
                }
            };
            stats.inc_cached_blocks();
            index.add_block(Arc::clone(&node));
            if let Some(next_id) = block.calc_next_id() {
                max_next_id = Some(max_next_id.map_or(next_id, |m| m.max(next_id)));
            }
            prev = Some(node);
            loaded += 1;
        }

        let head_node = match prev {
            Some(node) => {
                info!(
                    target: LOG_TARGET,
                    "replayed {} blocks for {}, head {} at height {}",
                    loaded,
                    config.database_id,
                    node.hash(),
                    node.height()
                );
                node
            }
            None => {
                let genesis = config.genesis.clone().ok_or(ChainError::MissingGenesis)?;
                genesis.verify()?;
                if !genesis.is_genesis() {
                    return Err(ChainError::InvalidBlock(
                        "configured genesis block is not a genesis block".into(),
                    ));
                }
                genesis_time = genesis.timestamp();
                block_store.put_block(0, &genesis)?;
                let node = BlockNode::root(Arc::new(genesis), 0);
                stats.inc_cached_blocks();
                index.add_block(Arc::clone(&node));
                info!(
                    target: LOG_TARGET,
                    "initialized fresh chain for {} from genesis {}", config.database_id, node.hash()
                );
                node
            }
        };
        state.set_seq(max_next_id.unwrap_or(0));

        // Responses and acks do not survive restarts by design; the persisted records are only
        // inspected for diagnostics and re-arrive through live traffic.
        let mut stored_responses = 0usize;
        for entry in query_store.responses() {
            match entry {
                Ok(_) => stored_responses += 1,
                Err(e) => warn!(target: LOG_TARGET, "undecodable response record: {}", e),
            }
        }
        let mut stored_acks = 0usize;
        for entry in query_store.acks() {
            match entry {
                Ok(_) => stored_acks += 1,
                Err(e) => warn!(target: LOG_TARGET, "undecodable ack record: {}", e),
            }
        }
        debug!(
            target: LOG_TARGET,
            "query store carries {} responses / {} acks from earlier runs", stored_responses, stored_acks
        );

        let genesis_hash = match head_node.ancestor_by_count(0) {
            Some(root) => *root.hash(),
            None => return Err(ChainError::ParentNotFound(*head_node.hash())),
        };
        let runtime = ChainRuntime::new(&config, genesis_time, HeadState::of(Arc::clone(&head_node)));

        let (pending_tx, pending_rx) = mpsc::channel(PENDING_CHANNEL_SIZE);
        let (height_tx, height_rx) = mpsc::channel(HEIGHT_CHANNEL_SIZE);
        let shutdown = Shutdown::new();

        let inner = Arc::new(ChainInner {
            config,
            genesis_hash,
            key,
            address,
            runtime,
            index,
            acks: AckIndex::new(),
            block_store,
            query_store,
            state,
            peer_client,
            main_chain,
            pending_tx,
            height_tx,
            signal: shutdown.to_signal(),
            stats,
            handles: Mutex::new(Vec::new()),
            fork_candidates: Mutex::new(VecDeque::new()),
        });
        inner.prune_block_cache();

        Ok(Self {
            inner,
            shutdown: Mutex::new(shutdown),
            receivers: Mutex::new(Some((pending_rx, height_rx))),
            stopped: AtomicBool::new(false),
        })
    }

    /// Spawns the ingest loop, runs the initial catch-up synchronization, then spawns the main
    /// tick loop. The transport service is registered by the hosting node through
    /// [`rpc_service`](Chain::rpc_service).
    pub async fn start(&self) -> Result<(), ChainError> {
        let (pending_rx, height_rx) = self
            .receivers
            .lock()
            .take()
            .ok_or(ChainError::AlreadyStarted)?;

        let ingest = tokio::spawn(Arc::clone(&self.inner).process_blocks(pending_rx, height_rx));
        self.inner.sync_head().await;
        let cycle = tokio::spawn(Arc::clone(&self.inner).main_cycle());
        self.inner.handles.lock().extend([ingest, cycle]);
        info!(
            target: LOG_TARGET,
            "chain for {} started as {}", self.inner.config.database_id, self.inner.runtime.server()
        );
        Ok(())
    }

    /// Cancels the workers, waits for them to drain, then closes the block store, the query
    /// store and the SQL state, in that order. The first close error is returned; later ones
    /// are logged. Safe to call more than once.
    pub async fn stop(&self) -> Result<(), ChainError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.lock().trigger();
        let handles: Vec<JoinHandle<()>> = self.inner.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(target: LOG_TARGET, "worker terminated abnormally: {}", e);
            }
        }

        let mut first_error: Option<ChainError> = None;
        let mut record = |result: Result<(), ChainError>| {
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    error!(target: LOG_TARGET, "close error after first failure: {}", e);
                }
            }
        };
        record(self.inner.block_store.close().map_err(Into::into));
        record(self.inner.query_store.close().map_err(Into::into));
        record(self.inner.state.close(false).await.map_err(Into::into));
        info!(target: LOG_TARGET, "chain for {} stopped", self.inner.config.database_id);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Forwards a client request to the SQL state.
    pub async fn query(
        &self,
        request: SignedRequestHeader,
        is_leader: bool,
    ) -> Result<(QueryTracker, SignedResponseHeader), ChainError> {
        if request.header.database_id != self.inner.config.database_id {
            return Err(ChainError::WrongDatabase(
                request.header.database_id.clone(),
                self.inner.config.database_id.clone(),
            ));
        }
        request.verify()?;
        Ok(self.inner.state.query(request, is_leader).await?)
    }

    /// Registers a response served to a local client; it now awaits acknowledgement.
    pub fn add_response(&self, response: SignedResponseHeader) -> Result<(), ChainError> {
        self.inner.add_response(response)
    }

    /// Validates a client acknowledgement and registers it for inclusion in a future block.
    pub fn verify_and_push_acked_query(&self, ack: SignedAckHeader) -> Result<(), ChainError> {
        self.inner.verify_and_push_acked_query(ack)
    }

    /// Validates a peer's block against the current head and rotation slot and applies it.
    pub async fn check_and_push_new_block(&self, block: Arc<Block>) -> Result<(), ChainError> {
        self.inner.check_and_push_new_block(block).await
    }

    /// Routes a peer-advertised block to the ingest loop after sanity checks.
    pub async fn advise_new_block(&self, request: AdviseNewBlockRequest) -> Result<(), ChainError> {
        self.inner.advise_new_block(request).await
    }

    /// The block at the latest ancestor with height at or below `height`.
    pub fn fetch_block(&self, height: i64) -> Result<Option<(i64, Block)>, ChainError> {
        self.inner.fetch_block(height)
    }

    /// The block at exactly `count`; a negative count means head.
    pub fn fetch_block_by_count(&self, count: i64) -> Result<Option<(i64, Block)>, ChainError> {
        self.inner.fetch_block_by_count(count)
    }

    /// Atomically replaces the committee.
    pub fn update_peers(&self, peers: Vec<NodeId>) {
        let version = self.inner.runtime.update_peers(peers);
        info!(target: LOG_TARGET, "peer list swapped, now at version {}", version);
    }

    /// The inbound RPC facade for the hosting transport service.
    pub fn rpc_service(&self) -> super::rpc::ChainRpcService<B> {
        super::rpc::ChainRpcService::new(Arc::clone(&self.inner))
    }

    pub fn head(&self) -> HeadState {
        self.inner.runtime.head()
    }

    pub fn genesis_hash(&self) -> Hash {
        self.inner.genesis_hash
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn stats(&self) -> &ChainStats {
        &self.inner.stats
    }

    /// Hashes of every indexed block node.
    pub fn block_hashes(&self) -> Vec<Hash> {
        self.inner.index.hashes()
    }

    /// Past-turn blocks retained for offline fork analysis.
    pub fn fork_candidates(&self) -> Vec<ForkCandidate> {
        self.inner.fork_candidates.lock().iter().cloned().collect()
    }

    /// Registered acknowledgements in buckets strictly below `height` that no block has
    /// included yet.
    pub fn pending_acks(&self, height: i64) -> Vec<SignedAckHeader> {
        self.inner
            .acks
            .acks(height)
            .into_iter()
            .map(|ack| (*ack).clone())
            .collect()
    }
}

pub(crate) struct ChainInner<B: SqlState> {
    pub(crate) config: ChainConfig,
    genesis_hash: Hash,
    key: SigningKey,
    address: Address,
    pub(crate) runtime: ChainRuntime,
    index: BlockIndex,
    acks: AckIndex,
    block_store: BlockStore,
    query_store: QueryStore,
    state: B,
    peer_client: Arc<dyn PeerClient>,
    main_chain: Arc<dyn MainChainClient>,
    pending_tx: mpsc::Sender<Arc<Block>>,
    height_tx: mpsc::Sender<i64>,
    signal: ShutdownSignal,
    stats: ChainStats,
    handles: Mutex<Vec<JoinHandle<()>>>,
    fork_candidates: Mutex<VecDeque<ForkCandidate>>,
}

impl<B: SqlState> ChainInner<B> {
    /// The ingest loop: serial over the pending-block channel and the height-advance channel.
    /// Sole writer of head state.
    async fn process_blocks(
        self: Arc<Self>,
        mut pending_rx: mpsc::Receiver<Arc<Block>>,
        mut height_rx: mpsc::Receiver<i64>,
    ) {
        let signal = self.signal.clone();
        let mut stash: Vec<Arc<Block>> = Vec::new();
        loop {
            tokio::select! {
                _ = signal.wait() => break,
                maybe_block = pending_rx.recv() => match maybe_block {
                    Some(block) => self.evaluate_block(block, &mut stash).await,
                    None => break,
                },
                maybe_height = height_rx.recv() => match maybe_height {
                    Some(height) => {
                        debug!(target: LOG_TARGET, "height advanced to {}, replaying {} stashed blocks", height, stash.len());
                        // Original arrival order is preserved across the replay.
                        let stashed: Vec<_> = std::mem::take(&mut stash);
                        for block in stashed {
                            self.evaluate_block(block, &mut stash).await;
                        }
                        self.stats.set_stashed_blocks(stash.len() as i64);
                    }
                    None => break,
                },
            }
        }
        debug!(target: LOG_TARGET, "block ingest loop exited");
    }

    async fn evaluate_block(&self, block: Arc<Block>, stash: &mut Vec<Arc<Block>>) {
        let height = self.runtime.height_of(block.timestamp());
        let current_turn = self.runtime.next_turn() - 1;
        if height > current_turn {
            debug!(
                target: LOG_TARGET,
                "stashing future block {} at height {} (current turn {})", block.hash(), height, current_turn
            );
            stash.push(block);
            self.stats.set_stashed_blocks(stash.len() as i64);
            return;
        }
        if height < current_turn {
            // Fork resolution is an explicit no-op: the block is recorded for offline analysis
            // and dropped without touching chain state.
            warn!(
                target: LOG_TARGET,
                "dropping block {} at past height {} (current turn {}); kept as fork candidate",
                block.hash(),
                height,
                current_turn
            );
            self.record_fork_candidate(&block, height);
            return;
        }

        let applied = tokio::select! {
            _ = self.signal.wait() => Err(ChainError::Cancelled),
            result = self.check_and_push_new_block(Arc::clone(&block)) => result,
        };
        match applied {
            Ok(()) => {
                let head = self.runtime.head();
                let count = head.node.count();
                if count > 0 && count % self.config.update_period == 0 {
                    self.run_billing(&head).await;
                }
            }
            Err(ChainError::Cancelled) => {}
            Err(e) => warn!(target: LOG_TARGET, "dropping block {}: {}", block.hash(), e),
        }
    }

    /// The block-acceptance ladder: already-applied short circuit, parent and genesis linkage,
    /// signature and merkle verification, rotation-slot check, deterministic replay, push.
    /// Callers are the ingest loop and trusted in-process callers; peers reach it through the
    /// pending channel.
    pub(crate) async fn check_and_push_new_block(&self, block: Arc<Block>) -> Result<(), ChainError> {
        let head = self.runtime.head();
        if *block.hash() == head.hash {
            debug!(target: LOG_TARGET, "block {} already applied", block.hash());
            return Ok(());
        }
        if block.parent_hash() != head.hash {
            return Err(ChainError::InvalidBlock(format!(
                "parent {} does not extend head {}",
                block.parent_hash(),
                head.hash
            )));
        }
        if block.genesis_hash() != self.genesis_hash {
            return Err(ChainError::InvalidBlock(format!(
                "genesis {} does not match chain genesis {}",
                block.genesis_hash(),
                self.genesis_hash
            )));
        }
        block.verify()?;

        if block.producer() == self.runtime.server() {
            // One of ours, already executed against the SQL state at production time.
            return self.push_block(block);
        }

        let peers = self.runtime.peers();
        let producer = *block.producer();
        let producer_index = peers
            .index_of(&producer)
            .ok_or(ChainError::UnknownProducer(producer))?;
        let height = self.runtime.height_of(block.timestamp());
        if peers.slot_for_turn(height) != Some(producer_index) {
            return Err(ChainError::InvalidProducer { producer, height });
        }

        self.state.replay_block(&block).await?;
        self.push_block(block)
    }

    /// Append-only tail of a validated block: persist, swap head, index, maintain the ack
    /// index. A store failure aborts before any in-memory mutation; a crash after the store
    /// write but before the head swap leaves an orphan suffix block on disk, which the startup
    /// replay re-accepts.
    fn push_block(&self, block: Arc<Block>) -> Result<(), ChainError> {
        let head = self.runtime.head();
        let height = self.runtime.height_of(block.timestamp());
        let node = BlockNode::child_of(&head.node, Arc::clone(&block), height);
        self.block_store.put_block(height, &block)?;

        self.stats.inc_cached_blocks();
        self.index.add_block(Arc::clone(&node));
        self.runtime.set_head(HeadState::of(Arc::clone(&node)));
        info!(
            target: LOG_TARGET,
            "head extended to {} at height {} (count {})",
            node.hash(),
            node.height(),
            node.count()
        );

        for tx in &block.query_txs {
            if let Err(e) = self.track_response(&tx.response) {
                debug!(target: LOG_TARGET, "response from block {} not tracked: {}", block.hash(), e);
            }
        }
        for ack in &block.acks {
            let bucket = self.runtime.height_of(ack.request_timestamp());
            if let Err(e) = self.acks.remove(bucket, ack) {
                debug!(target: LOG_TARGET, "ack from block {} not removed: {}", block.hash(), e);
            }
        }
        Ok(())
    }

    /// Commits the SQL state, waits for every tracker, packs and signs the block, feeds it
    /// through the ingest channel and fans the advisory out to the committee.
    async fn produce_block(&self) -> Result<(), ChainError> {
        let commit = self.state.commit().await?;
        if commit.failed_requests.is_empty() && commit.trackers.is_empty() {
            debug!(target: LOG_TARGET, "nothing to pack, skipping this turn");
            return Ok(());
        }

        let mut query_txs = Vec::with_capacity(commit.trackers.len());
        for mut tracker in commit.trackers {
            let query_tx = tokio::select! {
                _ = self.signal.wait() => return Err(ChainError::Cancelled),
                result = tracker.wait_ready() => result.map_err(StateError::from)?,
            };
            query_txs.push((*query_tx).clone());
        }

        let head = self.runtime.head();
        let acks: Vec<SignedAckHeader> = self
            .acks
            .acks(self.runtime.next_turn())
            .into_iter()
            .map(|ack| (*ack).clone())
            .collect();
        let block = Arc::new(
            BlockBuilder::new()
                .with_producer(*self.runtime.server())
                .with_genesis_hash(self.genesis_hash)
                .with_parent_hash(head.hash)
                .with_timestamp(now_millis())
                .with_failed_requests(commit.failed_requests)
                .with_query_txs(query_txs)
                .with_acks(acks)
                .build(&self.key)?,
        );
        info!(
            target: LOG_TARGET,
            "produced block {} at height {} with {} queries / {} acks",
            block.hash(),
            self.runtime.height_of(block.timestamp()),
            block.query_txs.len(),
            block.acks.len()
        );

        self.send_pending(Arc::clone(&block)).await?;
        self.advise_peers(block, head.node.count() + 1);
        Ok(())
    }

    /// Per-peer advisory fan-out: parallel, logged, no retry. The spawned drain task is tracked
    /// so `stop` waits for outstanding fan-outs.
    fn advise_peers(&self, block: Arc<Block>, count: u64) {
        let peers = self.runtime.peers();
        let server = *self.runtime.server();
        let request = AdviseNewBlockRequest {
            database_id: self.config.database_id.clone(),
            block: (*block).clone(),
            count,
        };

        let mut calls = Vec::new();
        for peer in peers.nodes.iter().filter(|p| **p != server).copied() {
            let client = Arc::clone(&self.peer_client);
            let request = request.clone();
            let signal = self.signal.clone();
            let hash = *block.hash();
            calls.push(async move {
                tokio::select! {
                    _ = signal.wait() => {
                        debug!(target: LOG_TARGET, "advisory of {} to {} cancelled", hash, peer);
                    }
                    result = client.advise_new_block(&peer, request) => match result {
                        Ok(()) => debug!(target: LOG_TARGET, "advised block {} to {}", hash, peer),
                        Err(e) => warn!(target: LOG_TARGET, "failed to advise block {} to {}: {}", hash, peer, e),
                    },
                }
            });
        }
        if calls.is_empty() {
            return;
        }
        let drain = tokio::spawn(async move {
            future::join_all(calls).await;
        });
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(drain);
    }

    /// The main tick loop: sync, sleep to the next tick, run the turn.
    async fn main_cycle(self: Arc<Self>) {
        let signal = self.signal.clone();
        loop {
            if signal.is_triggered() {
                break;
            }
            self.sync_head().await;
            let (target, delay) = self.runtime.next_tick();
            if !delay.is_zero() {
                tokio::select! {
                    _ = signal.wait() => break,
                    _ = time::sleep(delay) => {}
                }
            } else {
                self.run_current_turn(target).await;
            }
        }
        debug!(target: LOG_TARGET, "main cycle exited");
    }

    async fn run_current_turn(&self, target: i64) {
        let head = self.runtime.head();
        let next_turn = self.runtime.next_turn();
        if head.height < next_turn - 1 {
            info!(
                target: LOG_TARGET,
                "head at height {} lags turn {} at tick {}", head.height, next_turn, target
            );
        }
        if self.runtime.is_my_turn() {
            match self.produce_block().await {
                Ok(()) => {}
                Err(ChainError::Cancelled) => debug!(target: LOG_TARGET, "block production cancelled"),
                Err(e) => error!(target: LOG_TARGET, "block production failed: {}", e),
            }
        }

        self.log_stats();
        self.prune_block_cache();
        self.runtime.advance_turn();
        self.acks.advance(self.runtime.min_valid_height());

        let height = self.runtime.head().height;
        tokio::select! {
            _ = self.signal.wait() => {}
            result = self.height_tx.send(height) => {
                if result.is_err() {
                    debug!(target: LOG_TARGET, "ingest loop gone, height notification dropped");
                }
            }
        }
    }

    /// When head lags the clock, asks peers (in list order, skipping self) for the block of the
    /// just-completed turn. First non-empty answer wins; an all-miss stalls the chain until the
    /// next tick.
    pub(crate) async fn sync_head(&self) {
        let target_height = self.runtime.next_turn() - 1;
        if self.runtime.head().height >= target_height {
            return;
        }
        let peers = self.runtime.peers();
        let server = *self.runtime.server();
        for peer in peers.nodes.iter().filter(|p| **p != server) {
            let request = FetchBlockRequest {
                database_id: self.config.database_id.clone(),
                height: target_height,
            };
            let response = tokio::select! {
                _ = self.signal.wait() => return,
                result = self.peer_client.fetch_block(peer, request) => result,
            };
            match response {
                Ok(FetchBlockResponse { block: Some(block), .. }) => {
                    let height = self.runtime.height_of(block.timestamp());
                    if height != target_height {
                        debug!(
                            target: LOG_TARGET,
                            "peer {} served height {} instead of {}", peer, height, target_height
                        );
                        continue;
                    }
                    debug!(target: LOG_TARGET, "fetched block at height {} from {}", target_height, peer);
                    let _ = self.send_pending(Arc::new(block)).await;
                    return;
                }
                Ok(FetchBlockResponse { block: None, .. }) => {
                    debug!(target: LOG_TARGET, "peer {} has no block at height {}", peer, target_height);
                }
                Err(e) => {
                    debug!(target: LOG_TARGET, "block fetch from {} failed: {}", peer, e);
                }
            }
        }
        debug!(target: LOG_TARGET, "no peer served height {}, stalling this turn", target_height);
    }

    /// Drops cached bodies older than the cache TTL, walking parents from the first node
    /// outside the protected window until an already-evicted node is reached.
    fn prune_block_cache(&self) {
        let head = self.runtime.head();
        let cutoff = head.node.count() as i64 - self.runtime.block_cache_ttl() as i64;
        if cutoff < 0 {
            return;
        }
        let mut cursor = head.node.ancestor_by_count(cutoff as u64);
        let mut dropped = 0usize;
        while let Some(node) = cursor {
            if !node.evict_block() {
                break;
            }
            self.stats.dec_cached_blocks();
            dropped += 1;
            cursor = node.parent();
        }
        if dropped > 0 {
            debug!(target: LOG_TARGET, "pruned {} block bodies at or below count {}", dropped, cutoff);
        }
    }

    /// Best-effort: any failure logs and aborts the round; the next period re-attempts for the
    /// subsequent window.
    async fn run_billing(&self, head: &HeadState) {
        match self.try_run_billing(head).await {
            Ok(true) => {}
            Ok(false) => debug!(target: LOG_TARGET, "billing window empty, nothing submitted"),
            Err(e) => warn!(target: LOG_TARGET, "billing round aborted: {}", e),
        }
    }

    async fn try_run_billing(&self, head: &HeadState) -> Result<bool, BillingError> {
        let window = self.collect_billing_window(&head.node)?;
        let matrix = aggregate_costs(&window);
        if matrix.is_empty() {
            return Ok(false);
        }

        let receiver = crypto::database_address(&self.config.database_id);
        let nonce = tokio::select! {
            _ = self.signal.wait() => return Err(BillingError::Cancelled),
            result = self.main_chain.next_account_nonce(NextAccountNonceRequest { address: self.address }) => result?,
        };
        let update = build_update(matrix, receiver, nonce.nonce, &self.key)?;
        tokio::select! {
            _ = self.signal.wait() => return Err(BillingError::Cancelled),
            result = self.main_chain.add_tx(AddTxRequest { tx: update, ttl: 1 }) => result?,
        };
        info!(
            target: LOG_TARGET,
            "billing update submitted for window ending at count {} (nonce {})",
            head.node.count(),
            nonce.nonce
        );
        Ok(true)
    }

    /// Up to `update_period` blocks back from `head_node`, refetching evicted bodies from the
    /// block store.
    fn collect_billing_window(&self, head_node: &Arc<BlockNode>) -> Result<Vec<Arc<Block>>, BillingError> {
        let mut window = Vec::new();
        let mut cursor = Some(Arc::clone(head_node));
        while let Some(node) = cursor {
            if window.len() as u64 >= self.config.update_period {
                break;
            }
            let block = match node.block() {
                Some(block) => block,
                None => Arc::new(
                    self.block_store
                        .get_block(node.height(), node.hash())?
                        .ok_or_else(|| BillingError::MissingBody(*node.hash()))?,
                ),
            };
            window.push(block);
            cursor = node.parent();
        }
        Ok(window)
    }

    pub(crate) async fn advise_new_block(&self, request: AdviseNewBlockRequest) -> Result<(), ChainError> {
        if request.database_id != self.config.database_id {
            return Err(ChainError::WrongDatabase(
                request.database_id,
                self.config.database_id.clone(),
            ));
        }
        // Cheap sanity here; the full validation runs on the ingest loop.
        request.block.signed_header.verify()?;
        self.send_pending(Arc::new(request.block)).await
    }

    pub(crate) fn add_response(&self, response: SignedResponseHeader) -> Result<(), ChainError> {
        response.verify()?;
        let height = self.runtime.height_of(response.request_timestamp());
        let min_valid = self.runtime.min_valid_height();
        if height < min_valid {
            return Err(ChainError::QueryExpired { height, min_valid });
        }
        let response = Arc::new(response);
        self.acks.add_response(height, Arc::clone(&response))?;
        if let Err(e) = self.query_store.put_response(height, &response) {
            warn!(target: LOG_TARGET, "response not persisted: {}", e);
        }
        Ok(())
    }

    pub(crate) fn verify_and_push_acked_query(&self, ack: SignedAckHeader) -> Result<(), ChainError> {
        ack.verify()?;
        let height = self.runtime.height_of(ack.request_timestamp());
        let min_valid = self.runtime.min_valid_height();
        if height < min_valid {
            return Err(ChainError::QueryExpired { height, min_valid });
        }
        let ack = Arc::new(ack);
        self.acks.register(height, Arc::clone(&ack))?;
        if let Err(e) = self.query_store.put_ack(height, &ack) {
            warn!(target: LOG_TARGET, "ack not persisted: {}", e);
        }
        Ok(())
    }

    pub(crate) fn fetch_block(&self, height: i64) -> Result<Option<(i64, Block)>, ChainError> {
        let head = self.runtime.head();
        let node = match head.node.ancestor(height) {
            Some(node) => node,
            None => return Ok(None),
        };
        Ok(self.load_block_body(&node)?.map(|block| (node.height(), block)))
    }

    pub(crate) fn fetch_block_by_count(&self, count: i64) -> Result<Option<(i64, Block)>, ChainError> {
        let head = self.runtime.head();
        let node = if count < 0 {
            head.node
        } else {
            match head.node.ancestor_by_count(count as u64) {
                Some(node) => node,
                None => return Ok(None),
            }
        };
        Ok(self.load_block_body(&node)?.map(|block| (node.height(), block)))
    }

    fn load_block_body(&self, node: &Arc<BlockNode>) -> Result<Option<Block>, ChainError> {
        if let Some(block) = node.block() {
            return Ok(Some((*block).clone()));
        }
        Ok(self.block_store.get_block(node.height(), node.hash())?)
    }

    /// A response learned from a block: it awaits acknowledgement like a locally-served one.
    fn track_response(&self, response: &SignedResponseHeader) -> Result<(), ChainError> {
        let height = self.runtime.height_of(response.request_timestamp());
        self.acks.add_response(height, Arc::new(response.clone()))?;
        Ok(())
    }

    async fn send_pending(&self, block: Arc<Block>) -> Result<(), ChainError> {
        tokio::select! {
            _ = self.signal.wait() => Err(ChainError::Cancelled),
            result = self.pending_tx.send(block) => result.map_err(|_| ChainError::Cancelled),
        }
    }

    fn record_fork_candidate(&self, block: &Block, height: i64) {
        let mut candidates = self.fork_candidates.lock();
        if candidates.len() == MAX_FORK_CANDIDATES {
            candidates.pop_front();
        }
        candidates.push_back(ForkCandidate {
            hash: *block.hash(),
            height,
            producer: *block.producer(),
            received_at: now_millis(),
        });
        self.stats.inc_fork_candidates();
    }

    fn log_stats(&self) {
        let head = self.runtime.head();
        debug!(
            target: LOG_TARGET,
            "stats: head_height={} head_count={} next_turn={} cached_blocks={} stashed_blocks={} \
             pending_responses={} pending_acks={} fork_candidates={}",
            head.height,
            head.node.count(),
            self.runtime.next_turn(),
            self.stats.cached_blocks(),
            self.stats.stashed_blocks(),
            self.acks.response_count(),
            self.acks.ack_count(),
            self.stats.fork_candidates(),
        );
    }
}
