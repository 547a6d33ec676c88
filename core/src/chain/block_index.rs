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
    collections::HashMap,
    sync::{Arc, Weak},
};

use parking_lot::{Mutex, RwLock};

use crate::{blocks::Block, types::Hash};

/// In-memory mirror of a persisted block. Nodes form a tree rooted at genesis: the index holds
/// the owning `Arc` for every node, parents are weak back-references, so no cycles exist and a
/// node is never freed while the chain runs. The cached body can be dropped independently of
/// the node itself.
#[derive(Debug)]
pub struct BlockNode {
    hash: Hash,
    height: i64,
    count: u64,
    parent: Option<Weak<BlockNode>>,
    body: Mutex<Option<Arc<Block>>>,
}

impl BlockNode {
    /// The genesis node: count 0, no parent.
    pub fn root(block: Arc<Block>, height: i64) -> Arc<BlockNode> {
        Arc::new(BlockNode {
            hash: *block.hash(),
            height,
            count: 0,
            parent: None,
            body: Mutex::new(Some(block)),
        })
    }

    pub fn child_of(parent: &Arc<BlockNode>, block: Arc<Block>, height: i64) -> Arc<BlockNode> {
        Arc::new(BlockNode {
            hash: *block.hash(),
            height,
            count: parent.count + 1,
            parent: Some(Arc::downgrade(parent)),
            body: Mutex::new(Some(block)),
        })
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    /// 0-based position from genesis along the chain; contiguous, unlike height.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn parent(&self) -> Option<Arc<BlockNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn block(&self) -> Option<Arc<Block>> {
        self.body.lock().clone()
    }

    pub fn has_block(&self) -> bool {
        self.body.lock().is_some()
    }

    /// Returns true if the slot was empty and the body is now cached.
    pub fn cache_block(&self, block: Arc<Block>) -> bool {
        let mut body = self.body.lock();
        if body.is_some() {
            return false;
        }
        *body = Some(block);
        true
    }

    /// Returns true if a cached body was dropped.
    pub fn evict_block(&self) -> bool {
        self.body.lock().take().is_some()
    }

    /// The latest ancestor at or before `height` (heights may skip turns), or `None` if the
    /// walk climbs past genesis.
    pub fn ancestor(self: &Arc<Self>, height: i64) -> Option<Arc<BlockNode>> {
        let mut current = Arc::clone(self);
        while current.height > height {
            current = current.parent()?;
        }
        Some(current)
    }

    /// The ancestor at exactly `count`.
    pub fn ancestor_by_count(self: &Arc<Self>, count: u64) -> Option<Arc<BlockNode>> {
        let mut current = Arc::clone(self);
        while current.count > count {
            current = current.parent()?;
        }
        (current.count == count).then_some(current)
    }
}

/// Fork-aware map of every known block node, keyed by hash. Append-only while the chain runs;
/// only body caches are ever pruned.
#[derive(Debug, Default)]
pub struct BlockIndex {
    nodes: RwLock<HashMap<Hash, Arc<BlockNode>>>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_block(&self, node: Arc<BlockNode>) {
        self.nodes.write().insert(*node.hash(), node);
    }

    pub fn lookup_node(&self, hash: &Hash) -> Option<Arc<BlockNode>> {
        self.nodes.read().get(hash).cloned()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.nodes.read().contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Hashes of every indexed node, for restart-equivalence checks.
    pub fn hashes(&self) -> Vec<Hash> {
        self.nodes.read().keys().copied().collect()
    }
}
