//! Frontier (C4, §4.4): thin wrapper over `FrontierRepository` that keeps an
//! in-memory queued-size counter so workers can cheaply check "is there
//! more work" without round-tripping to SQLite on every idle tick.

use crate::domain::models::{CrawlQueueItem, NewQueueItem, QueueState};
use crate::error::Result;
use crate::repository::FrontierRepository;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct Frontier {
    repo: FrontierRepository,
    queued_count: AtomicI64,
    total_discovered: AtomicI64,
}

impl Frontier {
    pub async fn new(repo: FrontierRepository, project_id: i64) -> Result<Self> {
        let queued_count = repo.count_queued(project_id).await?;
        Ok(Self {
            repo,
            queued_count: AtomicI64::new(queued_count),
            total_discovered: AtomicI64::new(queued_count),
        })
    }

    pub async fn enqueue(&self, item: &NewQueueItem) -> Result<bool> {
        let inserted = self.repo.enqueue(item).await?;
        if inserted {
            self.queued_count.fetch_add(1, Ordering::SeqCst);
            self.total_discovered.fetch_add(1, Ordering::SeqCst);
        }
        Ok(inserted)
    }

    /// Count of distinct normalized URLs ever successfully enqueued this run
    /// (§6 `CrawlProgress.total_discovered`), seeded from the queue's
    /// existing size when resuming a prior run.
    pub fn total_discovered(&self) -> i64 {
        self.total_discovered.load(Ordering::SeqCst)
    }

    pub async fn get_next(&self, project_id: i64) -> Result<Option<CrawlQueueItem>> {
        let next = self.repo.get_next(project_id).await?;
        if next.is_some() {
            self.queued_count.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(next)
    }

    pub async fn mark_completed(&self, id: i64) -> Result<()> {
        self.repo.update_state(id, QueueState::Completed).await
    }

    pub async fn mark_failed(&self, id: i64) -> Result<()> {
        self.repo.update_state(id, QueueState::Failed).await
    }

    pub fn queued_len(&self) -> i64 {
        self.queued_count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.queued_len() <= 0
    }

    /// Reverts any `InProgress` stragglers from a prior crashed/killed run
    /// back to `Queued` before a resumed run starts dequeuing.
    pub async fn reclaim_stale(&self, project_id: i64) -> Result<()> {
        let reclaimed = self.repo.requeue_stale_in_progress(project_id).await?;
        self.queued_count.fetch_add(reclaimed as i64, Ordering::SeqCst);
        Ok(())
    }
}
