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

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    codec::CodecError,
    queries::{SignedAckHeader, SignedResponseHeader},
    types::Hash,
};

#[derive(Debug, Error)]
pub enum AckIndexError {
    #[error("Height {height} is below the acknowledgement window floor {min_valid}")]
    Expired { height: i64, min_valid: i64 },
    #[error("No response with hash {0} is awaiting acknowledgement")]
    UnknownResponse(Hash),
    #[error("Acknowledgement signee does not match the recorded request signee")]
    SigneeMismatch,
    #[error("No acknowledgement with hash {0} in bucket {1}")]
    UnknownAck(Hash, i64),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Default)]
struct Bucket {
    responses: HashMap<Hash, Arc<SignedResponseHeader>>,
    acks: BTreeMap<Hash, Arc<SignedAckHeader>>,
}

#[derive(Debug)]
struct Inner {
    min_valid: i64,
    buckets: BTreeMap<i64, Bucket>,
}

/// Height-bucketed index of responses awaiting acknowledgement and of acknowledgements awaiting
/// block inclusion. All mutation is serialized behind the index's own lock; callers are the
/// ingest loop and the inbound RPC surface.
#[derive(Debug)]
pub struct AckIndex {
    inner: Mutex<Inner>,
}

impl Default for AckIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AckIndex {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                min_valid: i64::MIN,
                buckets: BTreeMap::new(),
            }),
        }
    }

    /// Records a response in its request-height bucket; the response is now awaiting
    /// acknowledgement. Re-adding the same response is a no-op.
    pub fn add_response(&self, height: i64, response: Arc<SignedResponseHeader>) -> Result<(), AckIndexError> {
        let hash = response.hash()?;
        let mut inner = self.inner.lock();
        if height < inner.min_valid {
            return Err(AckIndexError::Expired {
                height,
                min_valid: inner.min_valid,
            });
        }
        inner.buckets.entry(height).or_default().responses.insert(hash, response);
        Ok(())
    }

    /// Associates an acknowledgement with its previously-seen response. The ack must reference
    /// a known response and be signed by the client that signed the original request.
    pub fn register(&self, height: i64, ack: Arc<SignedAckHeader>) -> Result<(), AckIndexError> {
        let hash = ack.hash()?;
        let mut inner = self.inner.lock();
        if height < inner.min_valid {
            return Err(AckIndexError::Expired {
                height,
                min_valid: inner.min_valid,
            });
        }
        let bucket = inner
            .buckets
            .get_mut(&height)
            .ok_or(AckIndexError::UnknownResponse(ack.header.response_hash))?;
        let response = bucket
            .responses
            .get(&ack.header.response_hash)
            .ok_or(AckIndexError::UnknownResponse(ack.header.response_hash))?;
        if response.header.request.timestamp != ack.header.request_timestamp
            || response.header.request_signee != ack.signee
        {
            return Err(AckIndexError::SigneeMismatch);
        }
        bucket.acks.insert(hash, ack);
        Ok(())
    }

    /// Deletes an acknowledgement once a block has included it, completing its billing journey.
    pub fn remove(&self, height: i64, ack: &SignedAckHeader) -> Result<(), AckIndexError> {
        let hash = ack.hash()?;
        let mut inner = self.inner.lock();
        let bucket = inner
            .buckets
            .get_mut(&height)
            .ok_or(AckIndexError::UnknownAck(hash, height))?;
        bucket
            .acks
            .remove(&hash)
            .map(|_| ())
            .ok_or(AckIndexError::UnknownAck(hash, height))
    }

    /// Every registered, not-yet-included acknowledgement in buckets strictly below `height`,
    /// in (height ascending, ack hash ascending) order so block production is deterministic.
    pub fn acks(&self, height: i64) -> Vec<Arc<SignedAckHeader>> {
        let inner = self.inner.lock();
        inner
            .buckets
            .range(..height)
            .flat_map(|(_, bucket)| bucket.acks.values().cloned())
            .collect()
    }

    /// Drops every bucket below `min_valid`. Returns the number of buckets dropped. `min_valid`
    /// never moves backwards.
    pub fn advance(&self, min_valid: i64) -> usize {
        let mut inner = self.inner.lock();
        if min_valid <= inner.min_valid {
            return 0;
        }
        inner.min_valid = min_valid;
        let keep = inner.buckets.split_off(&min_valid);
        let dropped = inner.buckets.len();
        inner.buckets = keep;
        dropped
    }

    pub fn min_valid(&self) -> i64 {
        self.inner.lock().min_valid
    }

    pub fn response_count(&self) -> usize {
        self.inner.lock().buckets.values().map(|b| b.responses.len()).sum()
    }

    pub fn ack_count(&self) -> usize {
        self.inner.lock().buckets.values().map(|b| b.acks.len()).sum()
    }
}
