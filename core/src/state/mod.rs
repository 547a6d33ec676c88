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

//! The contract the chain consumes from its transactional SQL backend. The backend owns its own
//! locking and durability; the chain only drives it through this seam. Cancellation is by
//! dropping the returned futures — every engine call site races them against the chain's
//! shutdown signal.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    blocks::Block,
    queries::{QueryTracker, SignedRequestHeader, SignedResponseHeader, TrackerError},
};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Query rejected by the SQL backend: {0}")]
    QueryFailed(String),
    #[error("Commit failed: {0}")]
    CommitFailed(String),
    #[error("Block replay failed: {0}")]
    ReplayFailed(String),
    #[error("Query tracker error: {0}")]
    Tracker(#[from] TrackerError),
    #[error("SQL state is closed")]
    Closed,
}

/// Everything a commit hands to the block producer: the requests rejected before execution and
/// a tracker per query that made it in.
#[derive(Debug, Default)]
pub struct CommitResult {
    pub failed_requests: Vec<SignedRequestHeader>,
    pub trackers: Vec<QueryTracker>,
}

#[async_trait]
pub trait SqlState: Send + Sync + 'static {
    /// Executes a client request. Returns a tracker for the in-flight query together with the
    /// response header already sent back to the client.
    async fn query(
        &self,
        request: SignedRequestHeader,
        is_leader: bool,
    ) -> Result<(QueryTracker, SignedResponseHeader), StateError>;

    /// Commits everything queued since the previous commit.
    async fn commit(&self) -> Result<CommitResult, StateError>;

    /// Deterministically applies a peer block's failed requests and query transactions.
    async fn replay_block(&self, block: &Block) -> Result<(), StateError>;

    /// Re-seeds the backend's query sequence after a chain replay.
    fn set_seq(&self, id: u64);

    /// Releases the backend. `drop_data` discards the underlying data file.
    async fn close(&self, drop_data: bool) -> Result<(), StateError>;
}

/// The chain owns its `SqlState` by value; hosts that also need a handle to the backend can
/// hand the chain an `Arc` of it.
#[async_trait]
impl<T: SqlState> SqlState for std::sync::Arc<T> {
    async fn query(
        &self,
        request: SignedRequestHeader,
        is_leader: bool,
    ) -> Result<(QueryTracker, SignedResponseHeader), StateError> {
        (**self).query(request, is_leader).await
    }

    async fn commit(&self) -> Result<CommitResult, StateError> {
        (**self).commit().await
    }

    async fn replay_block(&self, block: &Block) -> Result<(), StateError> {
        (**self).replay_block(block).await
    }

    fn set_seq(&self, id: u64) {
        (**self).set_seq(id)
    }

    async fn close(&self, drop_data: bool) -> Result<(), StateError> {
        (**self).close(drop_data).await
    }
}
