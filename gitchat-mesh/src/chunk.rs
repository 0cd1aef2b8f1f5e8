//! Reassembly of an [`ImageChunkPayload`] stream keyed by message id (spec
//! §3 "chunk collector", §4.6, invariant 6: any frame permutation without
//! loss must reassemble to the same body).

use std::collections::HashMap;

use gitchat_core::packet::{ImageChunkMeta, ImageChunkPayload};
use tokio::sync::Mutex;

struct Pending {
    total_chunks: u32,
    meta: Option<ImageChunkMeta>,
    pieces: HashMap<u32, String>,
}

#[derive(Default)]
pub struct ChunkCollector {
    pending: Mutex<HashMap<String, Pending>>,
}

impl ChunkCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one chunk. Returns the assembled `(meta, base64 body)` once
    /// every index `0..total_chunks` and the metadata (carried on index 0)
    /// have both arrived, in whatever order.
    pub async fn insert(&self, payload: ImageChunkPayload) -> Option<(ImageChunkMeta, String)> {
        let mut guard = self.pending.lock().await;
        let entry = guard.entry(payload.message_id.clone()).or_insert_with(|| Pending {
            total_chunks: payload.total_chunks,
            meta: None,
            pieces: HashMap::new(),
        });
        entry.pieces.insert(payload.chunk_index, payload.data);
        if let Some(meta) = payload.meta {
            entry.meta = Some(meta);
        }
        if entry.pieces.len() as u32 != entry.total_chunks {
            return None;
        }
        let meta = entry.meta.clone()?;
        let mut body = String::new();
        for idx in 0..entry.total_chunks {
            body.push_str(entry.pieces.get(&idx)?);
        }
        guard.remove(&payload.message_id);
        Some((meta, body))
    }

    pub async fn drop_partial(&self, message_id: &str) {
        self.pending.lock().await.remove(message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(message_id: &str, idx: u32, total: u32, data: &str, meta: bool) -> ImageChunkPayload {
        ImageChunkPayload {
            message_id: message_id.to_string(),
            chunk_index: idx,
            total_chunks: total,
            data: data.to_string(),
            meta: meta.then(|| ImageChunkMeta {
                from: "alice".into(),
                to: "broadcast".into(),
                group_id: None,
                timestamp: 1,
            }),
        }
    }

    #[tokio::test]
    async fn in_order_assembly() {
        let collector = ChunkCollector::new();
        assert!(collector.insert(chunk("m1", 0, 3, "AAA", true)).await.is_none());
        assert!(collector.insert(chunk("m1", 1, 3, "BBB", false)).await.is_none());
        let (meta, body) = collector.insert(chunk("m1", 2, 3, "CCC", false)).await.unwrap();
        assert_eq!(body, "AAABBBCCC");
        assert_eq!(meta.from, "alice");
    }

    #[tokio::test]
    async fn reversed_order_assembly_same_result() {
        let collector = ChunkCollector::new();
        assert!(collector.insert(chunk("m1", 2, 3, "CCC", false)).await.is_none());
        assert!(collector.insert(chunk("m1", 1, 3, "BBB", false)).await.is_none());
        let (_, body) = collector.insert(chunk("m1", 0, 3, "AAA", true)).await.unwrap();
        assert_eq!(body, "AAABBBCCC");
    }

    #[tokio::test]
    async fn missing_meta_withholds_completion() {
        let collector = ChunkCollector::new();
        assert!(collector.insert(chunk("m1", 0, 2, "AAA", false)).await.is_none());
        assert!(collector.insert(chunk("m1", 1, 2, "BBB", false)).await.is_none());
    }
}
