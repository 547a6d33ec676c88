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

//! Blocks and their headers. A block is immutable after signing; its identity is the sha256 of
//! the canonical encoding of its header, which commits to the body through the merkle root.

mod block;
mod header;
mod merkle;

use thiserror::Error;

use crate::{codec::CodecError, queries::SignatureError};

pub use block::{genesis_block, Block, BlockBuilder};
pub use header::{BlockHeader, SignedBlockHeader, BLOCK_VERSION};
pub use merkle::merkle_root;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Header digest does not match the signed hash")]
    HashMismatch,
    #[error("Block signature is invalid")]
    InvalidSignature,
    #[error("Merkle root does not match the block body")]
    MerkleMismatch,
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<SignatureError> for BlockError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidSignature => BlockError::InvalidSignature,
            SignatureError::Codec(e) => BlockError::Codec(e),
        }
    }
}
