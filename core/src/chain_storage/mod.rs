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

//! The persistent log: two independent key-value namespaces, one for blocks and head state,
//! one for per-height responses and acknowledgements. Key layout is bit-exact and stable
//! across restarts; heights are recoverable from keys alone.

mod block_store;
mod keys;
mod query_store;

use thiserror::Error;

use crate::codec::CodecError;

pub use block_store::BlockStore;
pub use keys::{decode_hash, decode_height, encode_key, KeyTag, KEY_TAG_LENGTH, STORE_KEY_LENGTH};
pub use query_store::QueryStore;

#[derive(Debug, Error)]
pub enum ChainStorageError {
    #[error("Store error: {0}")]
    Store(#[from] sqlchain_storage::StoreError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Height {0} is outside the persistable range")]
    HeightOutOfRange(i64),
    #[error("Malformed store key: {0}")]
    MalformedKey(String),
}
