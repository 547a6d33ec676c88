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
    keys::{decode_hash, decode_height, encode_key, KeyTag},
    ChainStorageError,
};
use crate::{blocks::Block, codec, types::Hash};

/// The block/state namespace of the persistent log.
pub struct BlockStore {
    kv: RocksStore,
}

impl BlockStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ChainStorageError> {
        Ok(Self {
            kv: RocksStore::open(path)?,
        })
    }

    /// Idempotent by key; re-persisting a block is harmless.
    pub fn put_block(&self, height: i64, block: &Block) -> Result<(), ChainStorageError> {
        let key = encode_key(KeyTag::Block, height, block.hash())?;
        let value = codec::to_vec(block)?;
        self.kv.put(&key, &value)?;
        Ok(())
    }

    pub fn get_block(&self, height: i64, hash: &Hash) -> Result<Option<Block>, ChainStorageError> {
        let key = encode_key(KeyTag::Block, height, hash)?;
        match self.kv.get(&key)? {
            Some(bytes) => Ok(Some(codec::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every persisted block in ascending height order, ready for the startup replay.
    pub fn blocks(&self) -> impl Iterator<Item = Result<(i64, Hash, Block), ChainStorageError>> + '_ {
        self.kv
            .iter_prefix(KeyTag::Block.as_bytes())
            .map(|entry| {
                let (key, value) = entry?;
                let height = decode_height(&key)?;
                let hash = decode_hash(&key)?;
                let block: Block = codec::from_slice(&value)?;
                Ok((height, hash, block))
            })
    }

    pub fn close(&self) -> Result<(), ChainStorageError> {
        Ok(self.kv.close()?)
    }
}
