//! Holding area for requests issued while disconnected.

use std::collections::VecDeque;

use parking_lot::Mutex;
use sockreq_core::logging::targets;

use crate::error::{Result, SocketError};
use crate::request::VirtualRequest;

/// A thread-safe, order-preserving queue of deferred requests.
///
/// Requests are replayed in the order they were issued. Every operation holds
/// the internal lock only for its own critical section, so callers never
/// block on emission or acknowledgment work.
///
/// Requests removed by [`remove_by_tag`](Self::remove_by_tag) or
/// [`clear_all`](Self::clear_all) are dropped without their completion
/// running.
#[derive(Default)]
pub struct RequestQueue {
    entries: Mutex<VecDeque<VirtualRequest>>,
}

impl RequestQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request.
    pub fn enqueue(&self, request: VirtualRequest) {
        let mut entries = self.entries.lock();
        tracing::debug!(
            target: targets::QUEUE,
            method = %request.method(),
            path = request.path(),
            tag = request.tag(),
            queued = entries.len() + 1,
            "queued request until the socket connects"
        );
        entries.push_back(request);
    }

    /// Remove and return every queued request, oldest first.
    ///
    /// The queue is empty afterwards regardless of what the caller does with
    /// the returned requests.
    pub fn drain_all(&self) -> Vec<VirtualRequest> {
        let drained: Vec<VirtualRequest> = self.entries.lock().drain(..).collect();
        if !drained.is_empty() {
            tracing::debug!(target: targets::QUEUE, count = drained.len(), "drained request queue");
        }
        drained
    }

    /// Remove every queued request whose tag equals `tag`.
    ///
    /// Returns the number of requests removed. Fails with
    /// [`SocketError::InvalidArgument`] for an empty tag.
    pub fn remove_by_tag(&self, tag: &str) -> Result<usize> {
        if tag.is_empty() {
            return Err(SocketError::InvalidArgument("tag cannot be empty".into()));
        }

        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|request| request.tag() != Some(tag));
        let removed = before - entries.len();

        tracing::trace!(target: targets::QUEUE, tag, removed, "removed tagged requests");
        Ok(removed)
    }

    /// Remove every queued request. Returns the number removed.
    pub fn clear_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Tags of the queued requests, oldest first.
    pub fn tags(&self) -> Vec<Option<String>> {
        self.entries
            .lock()
            .iter()
            .map(|request| request.tag().map(str::to_string))
            .collect()
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("len", &self.len())
            .finish()
    }
}
