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

//! A cooperative shutdown signal shared by every long-lived task of a chain instance.
//!
//! [`Shutdown`] owns the trigger. [`ShutdownSignal`] is a cheaply cloneable future that resolves
//! once the trigger fires (or the owning `Shutdown` is dropped), so it can be used directly in
//! `tokio::select!` arms.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    channel::oneshot,
    future::{FutureExt, Shared},
};

/// Trigger half of the shutdown pair. Dropping a `Shutdown` also triggers it, so a task tree
/// never outlives its owner.
#[derive(Debug)]
pub struct Shutdown {
    trigger: Option<oneshot::Sender<()>>,
    signal: ShutdownSignal,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            trigger: Some(tx),
            signal: ShutdownSignal { inner: rx.shared() },
        }
    }

    /// Fire the signal. Subsequent calls are no-ops.
    pub fn trigger(&mut self) {
        if let Some(tx) = self.trigger.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.trigger.is_none()
    }

    pub fn to_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        self.trigger();
    }
}

/// Listener half of the shutdown pair.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Shared<oneshot::Receiver<()>>,
}

impl ShutdownSignal {
    /// True once the signal has resolved. A dropped trigger counts as triggered.
    pub fn is_triggered(&self) -> bool {
        self.inner.peek().is_some()
    }

    /// Returns a future that resolves on shutdown, for use in `select!` arms without consuming
    /// the signal itself.
    pub fn wait(&self) -> ShutdownSignal {
        self.clone()
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A cancelled oneshot means the Shutdown was dropped, which is a trigger.
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}
