use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    client::{attendance::SessionClient, error::ClientError},
    models::{
        record::{Classification, RecordView},
        session::{SessionState, SessionView},
    },
};

/// Default polling interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// What one poll observed.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub session: SessionView,
    pub present: usize,
    pub late: usize,
    pub latest: Option<RecordView>,
    /// Records not seen by any earlier poll of this feed.
    pub new_records: Vec<RecordView>,
}

impl FeedSnapshot {
    pub fn total(&self) -> usize {
        self.present + self.late
    }

    pub fn closed(&self) -> bool {
        self.session.state == SessionState::Closed
    }
}

/// A read-only monitor that polls one session's records.
pub struct LiveFeed {
    client: SessionClient,
    session_id: Uuid,
    interval: Duration,
    seen: HashSet<Uuid>,
}

impl LiveFeed {
    pub fn new(client: SessionClient, session_id: Uuid) -> Self {
        Self {
            client,
            session_id,
            interval: POLL_INTERVAL,
            seen: HashSet::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fetches the session and its records once.
    pub async fn poll_once(&mut self) -> Result<FeedSnapshot, ClientError> {
        let session = self.client.view(self.session_id).await?;
        let records = self.client.records(self.session_id).await?;

        let present = records
            .iter()
            .filter(|r| r.classification == Classification::Present)
            .count();
        let late = records.len() - present;
        let latest = records.iter().max_by_key(|r| r.recorded_at).cloned();

        let new_records: Vec<RecordView> = records
            .into_iter()
            .filter(|r| self.seen.insert(r.student_id))
            .collect();

        Ok(FeedSnapshot {
            session,
            present,
            late,
            latest,
            new_records,
        })
    }

    /// Polls until the session is observed closed or `cancel` fires,
    /// handing every snapshot to `on_snapshot`. A network failure skips
    /// that tick; any other error ends the feed.
    ///
    /// # Returns
    ///
    /// The last snapshot taken, if any.
    pub async fn run<F>(mut self, cancel: CancellationToken, mut on_snapshot: F) -> Result<Option<FeedSnapshot>, ClientError>
    where
        F: FnMut(&FeedSnapshot),
    {
        let mut ticker = tokio::time::interval(self.interval);
        let mut last = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.poll_once() => polled,
            };

            let snapshot = match polled {
                Ok(snapshot) => snapshot,
                Err(err) if err.is_transient() => {
                    tracing::warn!("⚠️ Live feed for {} skipped a poll: {}", self.session_id, err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            on_snapshot(&snapshot);
            let closed = snapshot.closed();
            last = Some(snapshot);
            if closed {
                tracing::debug!("📕 Session {} closed, feed stopped", self.session_id);
                return Ok(last);
            }
        }

        tracing::debug!("🛑 Live feed for {} cancelled", self.session_id);
        Ok(last)
    }
}
