//! Correlates the "file payload path" (spec §4.6): an [`ImageMetadataPayload`]
//! arrives over the ordinary packet channel while the raw bytes arrive as a
//! [`gitchat_transport::TransportEvent::FileReceived`] on a different
//! channel. Finalization fires whichever of the two completes the pair.

use std::collections::HashMap;

use gitchat_core::packet::ImageMetadataPayload;
use tokio::sync::Mutex;

#[derive(Default)]
struct Pending {
    metadata: Option<ImageMetadataPayload>,
    bytes: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct FileTransferTable {
    by_payload_id: Mutex<HashMap<u64, Pending>>,
    progress: Mutex<HashMap<u64, (u64, u64)>>,
    message_id_by_payload: Mutex<HashMap<u64, String>>,
}

impl FileTransferTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the metadata packet side. Returns `Some` if the bytes had
    /// already arrived, finalizing the transfer.
    pub async fn record_metadata(&self, meta: ImageMetadataPayload) -> Option<(ImageMetadataPayload, Vec<u8>)> {
        self.message_id_by_payload.lock().await.insert(meta.payload_id, meta.message_id.clone());
        let mut guard = self.by_payload_id.lock().await;
        let entry = guard.entry(meta.payload_id).or_default();
        if let Some(bytes) = entry.bytes.take() {
            guard.remove(&meta.payload_id);
            return Some((meta, bytes));
        }
        entry.metadata = Some(meta);
        None
    }

    /// Record the transport-delivered bytes side. Returns `Some` if the
    /// metadata had already arrived.
    pub async fn record_bytes(&self, payload_id: u64, bytes: Vec<u8>) -> Option<(ImageMetadataPayload, Vec<u8>)> {
        let mut guard = self.by_payload_id.lock().await;
        let entry = guard.entry(payload_id).or_default();
        if let Some(meta) = entry.metadata.take() {
            guard.remove(&payload_id);
            return Some((meta, bytes));
        }
        entry.bytes = Some(bytes);
        None
    }

    pub async fn record_progress(&self, payload_id: u64, transferred: u64, total: u64) {
        self.progress.lock().await.insert(payload_id, (transferred, total));
    }

    /// Clear all bookkeeping for a payload on SUCCESS or FAILURE (spec §4.6).
    pub async fn clear(&self, payload_id: u64) {
        self.by_payload_id.lock().await.remove(&payload_id);
        self.progress.lock().await.remove(&payload_id);
        self.message_id_by_payload.lock().await.remove(&payload_id);
    }

    pub async fn progress_for_message(&self, message_id: &str) -> Option<(u64, u64)> {
        let by_payload = self.message_id_by_payload.lock().await;
        let payload_id = by_payload.iter().find(|(_, m)| m.as_str() == message_id).map(|(p, _)| *p)?;
        self.progress.lock().await.get(&payload_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(payload_id: u64) -> ImageMetadataPayload {
        ImageMetadataPayload {
            message_id: "m1".into(),
            payload_id,
            from: "alice".into(),
            to: "broadcast".into(),
            group_id: None,
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn metadata_then_bytes_finalizes() {
        let table = FileTransferTable::new();
        assert!(table.record_metadata(meta(7)).await.is_none());
        let (m, bytes) = table.record_bytes(7, vec![1, 2, 3]).await.unwrap();
        assert_eq!(m.message_id, "m1");
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn bytes_then_metadata_finalizes() {
        let table = FileTransferTable::new();
        assert!(table.record_bytes(7, vec![9]).await.is_none());
        let (_, bytes) = table.record_metadata(meta(7)).await.unwrap();
        assert_eq!(bytes, vec![9]);
    }

    #[tokio::test]
    async fn progress_lookup_by_message_id_after_metadata() {
        let table = FileTransferTable::new();
        table.record_metadata(meta(7)).await;
        table.record_progress(7, 50, 100).await;
        assert_eq!(table.progress_for_message("m1").await, Some((50, 100)));
    }
}
