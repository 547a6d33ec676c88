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

//! Transport contracts. Wire framing, connection management and authentication belong to the
//! hosting node; the chain only issues logical calls against these traits and serves the
//! mirror-image inbound surface through [`crate::chain::ChainRpcService`].

mod messages;

use async_trait::async_trait;
use thiserror::Error;

use crate::{codec::CodecError, types::NodeId};

pub use messages::{
    AddTxRequest, AddTxResponse, AdviseNewBlockRequest, FetchBlockByCountRequest, FetchBlockRequest,
    FetchBlockResponse, NextAccountNonceRequest, NextAccountNonceResponse,
};

#[derive(Debug, Error)]
pub enum CommsError {
    #[error("Peer {peer} is unreachable: {details}")]
    Unreachable { peer: NodeId, details: String },
    #[error("Request to peer {peer} timed out")]
    TimedOut { peer: NodeId },
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Calls issued to sibling miners of the same chain.
#[async_trait]
pub trait PeerClient: Send + Sync + 'static {
    async fn advise_new_block(&self, peer: &NodeId, request: AdviseNewBlockRequest) -> Result<(), CommsError>;

    async fn fetch_block(&self, peer: &NodeId, request: FetchBlockRequest) -> Result<FetchBlockResponse, CommsError>;
}

/// Calls issued to the main (token ledger) chain.
#[async_trait]
pub trait MainChainClient: Send + Sync + 'static {
    async fn next_account_nonce(
        &self,
        request: NextAccountNonceRequest,
    ) -> Result<NextAccountNonceResponse, CommsError>;

    async fn add_tx(&self, request: AddTxRequest) -> Result<AddTxResponse, CommsError>;
}
