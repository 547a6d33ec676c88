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

use std::{path::PathBuf, time::Duration};

use log::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    blocks::Block,
    types::{DatabaseId, NodeId},
};

const LOG_TARGET: &str = "sqlchain::config";

/// Floor for the body-cache window, in counts behind head.
pub const MIN_BLOCK_CACHE_TTL: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Peer list cannot be empty")]
    EmptyPeers,
    #[error("Turn period cannot be zero")]
    ZeroPeriod,
    #[error("Update (billing) period cannot be zero")]
    ZeroUpdatePeriod,
    #[error("Query TTL cannot be negative")]
    NegativeQueryTtl,
    #[error("Chain file prefix cannot be empty")]
    EmptyFilePrefix,
}

/// Transaction isolation level requested from the SQL state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    #[default]
    Serializable,
}

/// Token denomination billed on the main chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenType(pub u32);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    pub database_id: DatabaseId,
    pub data_dir: PathBuf,
    /// Prefix for the chain's on-disk artifacts (stores and key file).
    pub chain_file_prefix: String,
    /// Length of one producer turn.
    pub period: Duration,
    /// Billing sweep interval, in counts.
    pub update_period: u64,
    /// Acknowledgement window, in turns behind head.
    pub query_ttl: i64,
    /// Body-cache window, in counts behind head. Clamped up to [`MIN_BLOCK_CACHE_TTL`].
    pub block_cache_ttl: u64,
    pub token_type: TokenType,
    pub gas_price: u64,
    pub isolation_level: IsolationLevel,
    /// This node's identity. Need not be a committee member; a non-member never produces.
    pub server: NodeId,
    pub peers: Vec<NodeId>,
    /// Required when the block store is empty; ignored (but checked against) otherwise.
    pub genesis: Option<Block>,
}

impl ChainConfig {
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.peers.is_empty() {
            return Err(ConfigError::EmptyPeers);
        }
        if self.period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.update_period == 0 {
            return Err(ConfigError::ZeroUpdatePeriod);
        }
        if self.query_ttl < 0 {
            return Err(ConfigError::NegativeQueryTtl);
        }
        if self.chain_file_prefix.is_empty() {
            return Err(ConfigError::EmptyFilePrefix);
        }
        if self.block_cache_ttl < MIN_BLOCK_CACHE_TTL {
            warn!(
                target: LOG_TARGET,
                "block_cache_ttl {} below floor, clamping to {}", self.block_cache_ttl, MIN_BLOCK_CACHE_TTL
            );
            self.block_cache_ttl = MIN_BLOCK_CACHE_TTL;
        }
        Ok(())
    }

    pub fn block_store_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}-block-state.db", self.chain_file_prefix))
    }

    pub fn query_store_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}-query.db", self.chain_file_prefix))
    }

    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.key", self.chain_file_prefix))
    }
}
