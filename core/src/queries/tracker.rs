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

use thiserror::Error;
use tokio::sync::watch;

use super::QueryTx;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Query tracker was abandoned before completion")]
    Abandoned,
}

/// Creates a tracker pair for an in-flight query. The SQL state keeps the handle and completes
/// it once the query has committed; the block producer awaits the tracker.
pub fn query_tracker() -> (QueryTrackerHandle, QueryTracker) {
    let (tx, rx) = watch::channel(None);
    (QueryTrackerHandle { tx }, QueryTracker { rx })
}

/// Awaitable handle for an in-flight query. Resolves to the packed request/response pair once
/// the SQL state has committed the query.
#[derive(Clone, Debug)]
pub struct QueryTracker {
    rx: watch::Receiver<Option<Arc<QueryTx>>>,
}

impl QueryTracker {
    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn result(&self) -> Option<Arc<QueryTx>> {
        self.rx.borrow().clone()
    }

    /// Waits for the completion signal. Callers race this against their cancellation signal.
    pub async fn wait_ready(&mut self) -> Result<Arc<QueryTx>, TrackerError> {
        loop {
            if let Some(tx) = self.rx.borrow_and_update().clone() {
                return Ok(tx);
            }
            self.rx.changed().await.map_err(|_| TrackerError::Abandoned)?;
        }
    }
}

/// Completion side of a tracker, owned by the SQL state.
#[derive(Debug)]
pub struct QueryTrackerHandle {
    tx: watch::Sender<Option<Arc<QueryTx>>>,
}

impl QueryTrackerHandle {
    pub fn complete(self, query_tx: QueryTx) {
        // All trackers may already be gone if the producer was cancelled; nothing to do then.
        let _ = self.tx.send(Some(Arc::new(query_tx)));
    }
}
