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

//! The query data model: signed requests, signed response headers, client acknowledgements and
//! the tracker handle for in-flight queries. All signed records follow the same shape: a plain
//! header struct, its canonical-encoding sha256 as identity, and an Ed25519 signature over that
//! digest.

mod ack;
mod request;
mod response;
mod tracker;

use thiserror::Error;

use crate::codec::CodecError;

pub use ack::{AckHeader, SignedAckHeader};
pub use request::{QueryType, RequestHeader, SignedRequestHeader};
pub use response::{QueryTx, ResponseHeader, SignedResponseHeader};
pub use tracker::{query_tracker, QueryTracker, QueryTrackerHandle, TrackerError};

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Signature does not verify against the payload digest")]
    InvalidSignature,
    #[error("Codec error while hashing payload: {0}")]
    Codec(#[from] CodecError),
}
