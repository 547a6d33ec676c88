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

use thiserror::Error;

use super::ack_index::AckIndexError;
use crate::{
    blocks::BlockError,
    chain_storage::ChainStorageError,
    codec::CodecError,
    comms::CommsError,
    config::ConfigError,
    crypto::KeyError,
    queries::SignatureError,
    state::StateError,
    types::{DatabaseId, Hash, NodeId},
};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Block parent {0} not found")]
    ParentNotFound(Hash),
    #[error("Producer {0} is not in the current peer list")]
    UnknownProducer(NodeId),
    #[error("Producer {producer} does not own the rotation slot for height {height}")]
    InvalidProducer { producer: NodeId, height: i64 },
    #[error("Query expired: request height {height} is below the acknowledgement window floor {min_valid}")]
    QueryExpired { height: i64, min_valid: i64 },
    #[error("Block for database {0} does not belong to this chain ({1})")]
    WrongDatabase(DatabaseId, DatabaseId),
    #[error("Block error: {0}")]
    Block(#[from] BlockError),
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),
    #[error("Acknowledgement index error: {0}")]
    AckIndex(#[from] AckIndexError),
    #[error("Chain storage error: {0}")]
    Storage(#[from] ChainStorageError),
    #[error("SQL state error: {0}")]
    State(#[from] StateError),
    #[error("Transport error: {0}")]
    Comms(#[from] CommsError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Genesis block required for an empty chain store")]
    MissingGenesis,
    #[error("Chain has already been started")]
    AlreadyStarted,
    #[error("Chain is shutting down")]
    Cancelled,
}

impl ChainError {
    /// Acknowledgement-window expiry from either the runtime check or the index itself.
    pub fn is_query_expired(&self) -> bool {
        matches!(
            self,
            ChainError::QueryExpired { .. } | ChainError::AckIndex(AckIndexError::Expired { .. })
        )
    }
}
