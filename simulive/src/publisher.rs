use crate::errors::StreamerError;
use crate::manifest::ManifestSynthesizer;
use crate::store::ManifestStore;
use crate::timeline::Timeline;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PublisherState {
    Idle = 0,
    Publishing = 1,
}

/// Regenerates the published manifest once per segment.
pub struct Publisher {
    timeline: Arc<Timeline>,
    synthesizer: ManifestSynthesizer,
    store: Arc<dyn ManifestStore + Send + Sync>,
    state: AtomicU8,
}

impl Publisher {
    pub fn new(
        timeline: Arc<Timeline>,
        synthesizer: ManifestSynthesizer,
        store: Arc<dyn ManifestStore + Send + Sync>,
    ) -> Self {
        Publisher {
            timeline,
            synthesizer,
            store,
            state: AtomicU8::new(PublisherState::Idle as u8),
        }
    }

    pub fn state(&self) -> PublisherState {
        match self.state.load(Ordering::Acquire) {
            1 => PublisherState::Publishing,
            _ => PublisherState::Idle,
        }
    }

    /// Publish the window that is live at `now` and return its last sequence.
    pub async fn publish_once(&self, now: DateTime<Utc>) -> Result<i64, StreamerError> {
        self.state
            .store(PublisherState::Publishing as u8, Ordering::Release);

        let last_sequence = self.timeline.sequence_at(now);
        let text = self.synthesizer.synthesize(last_sequence);

        if let Some(window) = self.synthesizer.window(last_sequence) {
            debug!(
                "publishing manifest gen {} starting at {} ({:.3}s)",
                last_sequence,
                window.start(),
                *window.start() as f64 * self.timeline.segment_seconds()
            );
        } else {
            debug!(
                "publishing empty manifest, stream starts at {}",
                self.timeline.epoch()
            );
        }

        let result = self.store.write(text).await;
        self.state.store(PublisherState::Idle as u8, Ordering::Release);
        result?;

        Ok(last_sequence)
    }

    /// Publish forever. Each wake-up is scheduled one segment after the
    /// previous sampling point, so the time spent publishing does not
    /// accumulate. Returns only when the store fails.
    pub async fn run(&self) -> Result<(), StreamerError> {
        let interval = self.timeline.segment_duration();
        loop {
            let sampled = Instant::now();
            let now = Utc::now();

            if let Err(e) = self.publish_once(now).await {
                error!("publisher: {}", e);
                return Err(e);
            }

            tokio::time::sleep_until(sampled + interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{TimeDelta, TimeZone};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn publisher(
        epoch: DateTime<Utc>,
        segment_ms: u64,
        store: Arc<dyn ManifestStore + Send + Sync>,
    ) -> Publisher {
        let timeline = Arc::new(Timeline::new(epoch, 1000, segment_ms, 3).unwrap());
        let synthesizer = ManifestSynthesizer::new(Arc::clone(&timeline), 3 * segment_ms);
        Publisher::new(timeline, synthesizer, store)
    }

    #[derive(Default)]
    struct RecordingStore {
        writes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ManifestStore for RecordingStore {
        async fn write(&self, text: String) -> Result<(), StreamerError> {
            self.writes.lock().push(text);
            Ok(())
        }

        async fn read(&self) -> Result<Bytes, StreamerError> {
            Ok(Bytes::from(self.writes.lock().last().cloned().unwrap_or_default()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ManifestStore for BrokenStore {
        async fn write(&self, _text: String) -> Result<(), StreamerError> {
            Err(StreamerError::StorageError("read-only".to_string()))
        }

        async fn read(&self) -> Result<Bytes, StreamerError> {
            Ok(Bytes::new())
        }
    }

    /// Takes 300ms per write and records when each write completed.
    #[derive(Default)]
    struct SlowStore {
        completed: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl ManifestStore for SlowStore {
        async fn write(&self, _text: String) -> Result<(), StreamerError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.completed.lock().push(Instant::now());
            Ok(())
        }

        async fn read(&self) -> Result<Bytes, StreamerError> {
            Ok(Bytes::new())
        }
    }

    #[tokio::test]
    async fn publish_once_writes_live_window() {
        let store = Arc::new(MemoryStore::new());
        let publisher = publisher(epoch(), 2000, store.clone());

        let last = publisher
            .publish_once(epoch() + TimeDelta::milliseconds(11_500))
            .await
            .unwrap();

        let text = store.read().await.unwrap();
        let text = String::from_utf8(text.to_vec()).unwrap();
        assert_eq!(last, 5);
        assert!(text.contains("#EXT-X-MEDIA-SEQUENCE:2\n"));
        assert!(text.ends_with("segment5.mp4?offset=2\n"));
        assert_eq!(publisher.state(), PublisherState::Idle);
    }

    #[tokio::test]
    async fn publish_once_before_epoch_writes_empty_window() {
        let store = Arc::new(MemoryStore::new());
        let publisher = publisher(epoch(), 2000, store.clone());

        let last = publisher
            .publish_once(epoch() - TimeDelta::seconds(1))
            .await
            .unwrap();

        let text = store.read().await.unwrap();
        assert_eq!(last, -1);
        assert!(!text.is_empty());
        assert!(!String::from_utf8_lossy(&text).contains("#EXTINF"));
    }

    #[tokio::test]
    async fn run_stops_on_store_failure() {
        let publisher = publisher(Utc::now(), 2000, Arc::new(BrokenStore));

        let result = publisher.run().await;

        assert!(matches!(result, Err(StreamerError::StorageError(_))));
        assert_eq!(publisher.state(), PublisherState::Idle);
    }

    #[tokio::test]
    async fn run_publishes_every_segment() {
        let store = Arc::new(RecordingStore::default());
        let publisher = Arc::new(publisher(Utc::now(), 50, store.clone()));

        let task = {
            let publisher = Arc::clone(&publisher);
            tokio::spawn(async move { publisher.run().await })
        };
        tokio::time::sleep(Duration::from_millis(320)).await;
        task.abort();

        let writes = store.writes.lock().clone();
        assert!(writes.len() >= 3, "only {} publications", writes.len());
        assert!(writes.len() <= 8, "{} publications", writes.len());
        assert!(writes.last().unwrap().contains("segment"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_wakes_one_segment_after_each_sample() {
        let store = Arc::new(SlowStore::default());
        let publisher = Arc::new(publisher(Utc::now(), 2000, store.clone()));

        let task = {
            let publisher = Arc::clone(&publisher);
            tokio::spawn(async move { publisher.run().await })
        };
        tokio::time::sleep(Duration::from_millis(8_500)).await;
        task.abort();

        let completed = store.completed.lock().clone();
        assert_eq!(completed.len(), 5);
        for pair in completed.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(2));
        }
    }
}
