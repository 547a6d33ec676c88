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

use std::path::Path;

use sqlchain_storage::RocksStore;

use super::{
    keys::{decode_height, encode_key, KeyTag},
    ChainStorageError,
};
use crate::{
    codec,
    queries::{SignedAckHeader, SignedResponseHeader},
};

/// The per-height response/acknowledgement namespace of the persistent log. Entries here are
/// diagnostic after a restart; the live acknowledgement index is rebuilt from traffic.
pub struct QueryStore {
    kv: RocksStore,
}

impl QueryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ChainStorageError> {
        Ok(Self {
            kv: RocksStore::open(path)?,
        })
    }

    pub fn put_response(&self, height: i64, response: &SignedResponseHeader) -> Result<(), ChainStorageError> {
        let key = encode_key(KeyTag::Response, height, &response.hash()?)?;
        self.kv.put(&key, &codec::to_vec(response)?)?;
        Ok(())
    }

    pub fn put_ack(&self, height: i64, ack: &SignedAckHeader) -> Result<(), ChainStorageError> {
        let key = encode_key(KeyTag::Ack, height, &ack.hash()?)?;
        self.kv.put(&key, &codec::to_vec(ack)?)?;
        Ok(())
    }

    pub fn responses(&self) -> impl Iterator<Item = Result<(i64, SignedResponseHeader), ChainStorageError>> + '_ {
        self.kv
            .iter_prefix(KeyTag::Response.as_bytes())
            .map(|entry| {
                let (key, value) = entry?;
                Ok((decode_height(&key)?, codec::from_slice(&value)?))
            })
    }

    pub fn acks(&self) -> impl Iterator<Item = Result<(i64, SignedAckHeader), ChainStorageError>> + '_ {
        self.kv
            .iter_prefix(KeyTag::Ack.as_bytes())
            .map(|entry| {
                let (key, value) = entry?;
                Ok((decode_height(&key)?, codec::from_slice(&value)?))
            })
    }

    pub fn close(&self) -> Result<(), ChainStorageError> {
        Ok(self.kv.close()?)
    }
}
