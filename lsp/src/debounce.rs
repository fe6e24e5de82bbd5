//! Per-document debounce with generation markers.
//!
//! Every edit takes a new ticket. A ticket is current until a newer one is
//! taken for the same document or the document is forgotten, so a pass that
//! wakes up or finishes with an old ticket knows its result is stale.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    pub key: K,
    pub generation: u64,
}

pub struct Debouncer<K> {
    delay: Duration,
    next_generation: AtomicU64,
    generations: DashMap<K, u64>,
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_generation: AtomicU64::new(1),
            generations: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Supersede any pending pass for `key`.
    pub fn bump(&self, key: &K) -> Ticket<K> {
        // generations are global so a forgotten-then-reopened key never reuses one
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.generations.insert(key.clone(), generation);
        Ticket {
            key: key.clone(),
            generation,
        }
    }

    /// Invalidate every outstanding ticket for `key`.
    pub fn forget(&self, key: &K) {
        self.generations.remove(key);
        self.locks.remove(key);
    }

    pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
        self.generations
            .get(&ticket.key)
            .is_some_and(|g| *g == ticket.generation)
    }

    /// Wait out the delay, then take the document's pass lock. Returns `None`
    /// when the ticket was superseded in the meantime.
    pub async fn settle(&self, ticket: &Ticket<K>) -> Option<OwnedMutexGuard<()>> {
        tokio::time::sleep(self.delay).await;
        if !self.is_current(ticket) {
            return None;
        }
        let lock = self
            .locks
            .entry(ticket.key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        if !self.is_current(ticket) {
            return None;
        }
        Some(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debouncer() -> Arc<Debouncer<&'static str>> {
        Arc::new(Debouncer::new(Duration::from_millis(20)))
    }

    #[tokio::test]
    async fn only_the_latest_ticket_settles() {
        let d = debouncer();
        let first = d.bump(&"a.md");
        let second = d.bump(&"a.md");
        let (first, second) = tokio::join!(d.settle(&first), d.settle(&second));
        assert!(first.is_none());
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn forgotten_documents_never_settle() {
        let d = debouncer();
        let ticket = d.bump(&"a.md");
        d.forget(&"a.md");
        assert!(d.settle(&ticket).await.is_none());

        let reopened = d.bump(&"a.md");
        assert!(!d.is_current(&ticket));
        assert!(d.is_current(&reopened));
    }

    #[tokio::test]
    async fn documents_are_independent() {
        let d = debouncer();
        let a = d.bump(&"a.md");
        let b = d.bump(&"b.md");
        let (a, b) = tokio::join!(d.settle(&a), d.settle(&b));
        assert!(a.is_some());
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn result_is_stale_after_a_newer_edit() {
        let d = debouncer();
        let ticket = d.bump(&"a.md");
        let guard = d.settle(&ticket).await;
        assert!(guard.is_some());
        d.bump(&"a.md");
        assert!(!d.is_current(&ticket));
    }

    #[tokio::test]
    async fn passes_for_one_document_are_serialized() {
        let d = debouncer();
        let first = d.bump(&"a.md");
        let held = d.settle(&first).await.expect("first pass runs");

        let second = d.bump(&"a.md");
        let waiter = {
            let d = Arc::clone(&d);
            tokio::spawn(async move { d.settle(&second).await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!waiter.is_finished());
        drop(held);
        assert!(waiter.await.unwrap());
    }
}
