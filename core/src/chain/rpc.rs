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

use std::sync::Arc;

use super::{chain::ChainInner, error::ChainError};
use crate::{
    comms::{AdviseNewBlockRequest, FetchBlockByCountRequest, FetchBlockRequest, FetchBlockResponse},
    queries::{SignedAckHeader, SignedResponseHeader},
    state::SqlState,
    types::NodeId,
};

/// The inbound surface the hosting transport service exposes to sibling miners. Handlers are
/// deliberately thin: a peer-advertised block only gets sanity checks here and full validation
/// on the ingest loop.
pub struct ChainRpcService<B: SqlState> {
    inner: Arc<ChainInner<B>>,
}

impl<B: SqlState> Clone for ChainRpcService<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SqlState> ChainRpcService<B> {
    pub(crate) fn new(inner: Arc<ChainInner<B>>) -> Self {
        Self { inner }
    }

    /// A peer pushing a newly produced block.
    pub async fn advise_new_block(&self, request: AdviseNewBlockRequest) -> Result<(), ChainError> {
        self.inner.advise_new_block(request).await
    }

    /// Serves the block at the latest ancestor with height at or below the requested one.
    pub fn fetch_block(&self, request: FetchBlockRequest) -> Result<FetchBlockResponse, ChainError> {
        if request.database_id != self.inner.config.database_id {
            return Err(ChainError::WrongDatabase(
                request.database_id,
                self.inner.config.database_id.clone(),
            ));
        }
        Ok(match self.inner.fetch_block(request.height)? {
            Some((height, block)) => FetchBlockResponse {
                height,
                block: Some(block),
            },
            None => FetchBlockResponse {
                height: request.height,
                block: None,
            },
        })
    }

    /// Serves the block at exactly the requested count; negative counts mean head.
    pub fn fetch_block_by_count(&self, request: FetchBlockByCountRequest) -> Result<FetchBlockResponse, ChainError> {
        if request.database_id != self.inner.config.database_id {
            return Err(ChainError::WrongDatabase(
                request.database_id,
                self.inner.config.database_id.clone(),
            ));
        }
        Ok(match self.inner.fetch_block_by_count(request.count)? {
            Some((height, block)) => FetchBlockResponse {
                height,
                block: Some(block),
            },
            None => FetchBlockResponse {
                height: request.count,
                block: None,
            },
        })
    }

    /// Registers a served response as awaiting acknowledgement.
    pub fn add_response(&self, response: SignedResponseHeader) -> Result<(), ChainError> {
        self.inner.add_response(response)
    }

    /// Validates and registers a client acknowledgement.
    pub fn verify_and_push_acked_query(&self, ack: SignedAckHeader) -> Result<(), ChainError> {
        self.inner.verify_and_push_acked_query(ack)
    }

    /// Atomic committee swap pushed from outside.
    pub fn update_peers(&self, peers: Vec<NodeId>) {
        self.inner.runtime.update_peers(peers);
    }
}
