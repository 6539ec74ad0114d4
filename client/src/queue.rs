//! The pending-request queue.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// A thread safe FIFO of requests not yet handed to a connection.
///
/// Any thread may append to the queue.
/// Requests are only removed by the sending state,
/// and only after the connection accepted them for transmission.
#[derive(Debug)]
pub(crate) struct RequestQueue<R> {
    inner: Mutex<VecDeque<Arc<R>>>,
}

impl<R> Default for RequestQueue<R> {
    fn default() -> Self {
        RequestQueue {
            inner: Mutex::new(VecDeque::new()),
        }
    }
}

impl<R> RequestQueue<R> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<R>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, request: R) {
        self.lock().push_back(Arc::new(request));
    }

    /// Append the given requests, returning how many were added.
    pub fn extend(&self, requests: impl IntoIterator<Item = R>) -> usize {
        let mut queue = self.lock();
        let before = queue.len();
        queue.extend(requests.into_iter().map(Arc::new));
        queue.len() - before
    }

    /// Peek at the request at the front of the queue.
    pub fn front(&self) -> Option<Arc<R>> {
        self.lock().front().cloned()
    }

    /// Remove the request at the front of the queue,
    /// provided that it is still the given one.
    pub fn remove_sent(&self, request: &Arc<R>) -> bool {
        let mut queue = self.lock();
        match queue.front() {
            Some(front) if Arc::ptr_eq(front, request) => {
                queue.pop_front();
                true
            }
            _ => {
                // not at the front: look it up further down
                if let Some(i) = queue.iter().position(|r| Arc::ptr_eq(r, request)) {
                    queue.remove(i);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of the queued requests, in queue order.
    pub fn snapshot(&self) -> Vec<Arc<R>> {
        self.lock().iter().cloned().collect()
    }
}
