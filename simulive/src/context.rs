use crate::config::StreamSettings;
use crate::errors::StreamerError;
use crate::fragment::FragmentPatcher;
use crate::manifest::ManifestSynthesizer;
use crate::pool::SegmentPool;
use crate::publisher::Publisher;
use crate::store::ManifestStore;
use crate::timeline::Timeline;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Process-wide stream state, built once at startup and shared by the
/// publisher and the request handlers.
pub struct StreamContext {
    pub timeline: Arc<Timeline>,
    pub pool: Arc<SegmentPool>,
    pub store: Arc<dyn ManifestStore + Send + Sync>,
    patcher: FragmentPatcher,
    window_duration: u64,
}

impl StreamContext {
    pub fn new(
        epoch: DateTime<Utc>,
        settings: &StreamSettings,
        pool: SegmentPool,
        store: Arc<dyn ManifestStore + Send + Sync>,
    ) -> Result<Self, StreamerError> {
        let timeline = Timeline::new(
            epoch,
            settings.time_scale,
            settings.segment_duration,
            pool.len(),
        )?;

        Ok(StreamContext {
            patcher: FragmentPatcher::new(timeline.segment_units()),
            timeline: Arc::new(timeline),
            pool: Arc::new(pool),
            store,
            window_duration: settings.window_duration,
        })
    }

    pub fn synthesizer(&self) -> ManifestSynthesizer {
        ManifestSynthesizer::new(Arc::clone(&self.timeline), self.window_duration)
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(
            Arc::clone(&self.timeline),
            self.synthesizer(),
            Arc::clone(&self.store),
        )
    }

    /// Physical segment `index` patched for virtual `sequence`, `None` when
    /// the index is outside the pool.
    pub fn fragment(&self, sequence: u64, index: usize) -> Option<Bytes> {
        let segment = self.pool.get(index)?;
        Some(self.patcher.patch(segment, sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{base_decode_time, TFDT_MARKER};
    use crate::store::MemoryStore;
    use std::path::PathBuf;

    fn settings() -> StreamSettings {
        StreamSettings {
            time_scale: 1000,
            segment_duration: 2000,
            window_duration: 6000,
            segments: vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")],
        }
    }

    fn payload(decode_time: u64) -> Bytes {
        let mut data = b"\x00\x00\x00\x14".to_vec();
        data.extend_from_slice(&TFDT_MARKER);
        data.extend_from_slice(&decode_time.to_be_bytes());
        Bytes::from(data)
    }

    fn context() -> StreamContext {
        let pool = SegmentPool::from_payloads(vec![payload(0), payload(2000)]).unwrap();
        StreamContext::new(Utc::now(), &settings(), pool, Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn fragment_patches_selected_segment() {
        let context = context();
        let fragment = context.fragment(7, 1).unwrap();

        assert_eq!(context.timeline.segment_index_for(7), 1);
        assert_eq!(base_decode_time(&fragment), Some(2000 + 7 * 2000));
    }

    #[test]
    fn fragment_outside_pool() {
        assert!(context().fragment(7, 2).is_none());
    }

    #[test]
    fn synthesizer_uses_window() {
        assert_eq!(context().synthesizer().window_segments(), 3);
    }

    #[tokio::test]
    async fn publisher_writes_to_shared_store() {
        let context = context();
        context.publisher().publish_once(Utc::now()).await.unwrap();

        let text = context.store.read().await.unwrap();
        assert!(text.starts_with(b"#EXTM3U\n"));
    }
}
