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

use std::sync::atomic::{AtomicI64, Ordering};

/// Observability counters, scoped to one chain instance and emitted as a stats log line every
/// turn. Purely diagnostic; nothing reads them for control flow.
#[derive(Debug, Default)]
pub struct ChainStats {
    cached_blocks: AtomicI64,
    stashed_blocks: AtomicI64,
    fork_candidates: AtomicI64,
}

impl ChainStats {
    pub fn cached_blocks(&self) -> i64 {
        self.cached_blocks.load(Ordering::Relaxed)
    }

    pub fn inc_cached_blocks(&self) {
        self.cached_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_cached_blocks(&self) {
        self.cached_blocks.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn stashed_blocks(&self) -> i64 {
        self.stashed_blocks.load(Ordering::Relaxed)
    }

    pub fn set_stashed_blocks(&self, n: i64) {
        self.stashed_blocks.store(n, Ordering::Relaxed);
    }

    pub fn fork_candidates(&self) -> i64 {
        self.fork_candidates.load(Ordering::Relaxed)
    }

    pub fn inc_fork_candidates(&self) {
        self.fork_candidates.fetch_add(1, Ordering::Relaxed);
    }
}
