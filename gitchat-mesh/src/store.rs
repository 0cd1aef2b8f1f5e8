//! The persistent store boundary (spec §6): owned and implemented outside
//! this crate, consumed through this narrow async trait. [`InMemoryStore`]
//! is the reference implementation used by every test in this workspace.

use async_trait::async_trait;
use gitchat_core::{ChatMessage, MeshGroup};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::StoreError;

#[async_trait]
pub trait Store: Send + Sync {
    async fn save_message(&self, message: ChatMessage) -> Result<(), StoreError>;
    async fn has_message(&self, id: &str) -> Result<bool, StoreError>;
    async fn edit_message(&self, id: &str, body: &str) -> Result<(), StoreError>;
    async fn delete_message(&self, id: &str) -> Result<(), StoreError>;
    /// `None, None` returns every message; `Some(group_id), None` restricts to
    /// that group; `None, Some(peer)` restricts to broadcast messages to/from
    /// `peer` or the literal `"broadcast"`.
    async fn get_messages(&self, group_id: Option<&str>, peer: Option<&str>) -> Result<Vec<ChatMessage>, StoreError>;
    async fn clear_group_messages(&self, group_id: &str) -> Result<(), StoreError>;
    async fn clear_broadcast_messages(&self) -> Result<(), StoreError>;

    async fn save_group(&self, group: MeshGroup) -> Result<(), StoreError>;
    async fn get_group(&self, id: &str) -> Result<Option<MeshGroup>, StoreError>;
    async fn get_groups(&self) -> Result<Vec<MeshGroup>, StoreError>;
    async fn is_group_member(&self, id: &str, name: &str) -> Result<bool, StoreError>;
    async fn add_member_to_group(&self, id: &str, name: &str) -> Result<(), StoreError>;
    async fn remove_member_from_group(&self, id: &str, name: &str) -> Result<(), StoreError>;
    async fn rename_group(&self, id: &str, new_name: &str) -> Result<(), StoreError>;
    async fn delete_group(&self, id: &str) -> Result<(), StoreError>;

    async fn get_username(&self) -> Result<Option<String>, StoreError>;
    async fn save_username(&self, name: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Inner {
    messages: HashMap<String, ChatMessage>,
    groups: HashMap<String, MeshGroup>,
    username: Option<String>,
}

/// Plain-memory reference store. Insertion order is not preserved across
/// `get_messages`; callers that need a stable order should sort by timestamp.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_message(&self, message: ChatMessage) -> Result<(), StoreError> {
        self.inner.lock().await.messages.insert(message.id.clone(), message);
        Ok(())
    }

    async fn has_message(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.messages.contains_key(id))
    }

    async fn edit_message(&self, id: &str, body: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().await;
        if let Some(m) = guard.messages.get_mut(id) {
            m.body = body.to_string();
            m.is_edited = true;
        }
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().await;
        if let Some(m) = guard.messages.get_mut(id) {
            m.is_deleted = true;
        }
        Ok(())
    }

    async fn get_messages(&self, group_id: Option<&str>, peer: Option<&str>) -> Result<Vec<ChatMessage>, StoreError> {
        let guard = self.inner.lock().await;
        let mut out: Vec<ChatMessage> = guard
            .messages
            .values()
            .filter(|m| match group_id {
                Some(g) => m.group_id.as_deref() == Some(g),
                None => match peer {
                    Some(p) => m.to == p || m.from == p || m.to == gitchat_core::BROADCAST,
                    None => true,
                },
            })
            .cloned()
            .collect();
        out.sort_by_key(|m| m.timestamp);
        Ok(out)
    }

    async fn clear_group_messages(&self, group_id: &str) -> Result<(), StoreError> {
        self.inner.lock().await.messages.retain(|_, m| m.group_id.as_deref() != Some(group_id));
        Ok(())
    }

    async fn clear_broadcast_messages(&self) -> Result<(), StoreError> {
        self.inner.lock().await.messages.retain(|_, m| m.group_id.is_some());
        Ok(())
    }

    async fn save_group(&self, group: MeshGroup) -> Result<(), StoreError> {
        self.inner.lock().await.groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn get_group(&self, id: &str) -> Result<Option<MeshGroup>, StoreError> {
        Ok(self.inner.lock().await.groups.get(id).cloned())
    }

    async fn get_groups(&self) -> Result<Vec<MeshGroup>, StoreError> {
        Ok(self.inner.lock().await.groups.values().cloned().collect())
    }

    async fn is_group_member(&self, id: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.groups.get(id).is_some_and(|g| g.is_member(name)))
    }

    async fn add_member_to_group(&self, id: &str, name: &str) -> Result<(), StoreError> {
        if let Some(g) = self.inner.lock().await.groups.get_mut(id) {
            g.add_member(name);
        }
        Ok(())
    }

    async fn remove_member_from_group(&self, id: &str, name: &str) -> Result<(), StoreError> {
        if let Some(g) = self.inner.lock().await.groups.get_mut(id) {
            g.remove_member(name);
        }
        Ok(())
    }

    async fn rename_group(&self, id: &str, new_name: &str) -> Result<(), StoreError> {
        if let Some(g) = self.inner.lock().await.groups.get_mut(id) {
            g.name = new_name.to_string();
        }
        Ok(())
    }

    async fn delete_group(&self, id: &str) -> Result<(), StoreError> {
        self.inner.lock().await.groups.remove(id);
        Ok(())
    }

    async fn get_username(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().await.username.clone())
    }

    async fn save_username(&self, name: &str) -> Result<(), StoreError> {
        self.inner.lock().await.username = Some(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitchat_core::MessageType;

    fn msg(id: &str, group: Option<&str>) -> ChatMessage {
        ChatMessage::new(id, "alice", gitchat_core::BROADCAST, "hi", 1, 3, group.map(String::from), MessageType::Text)
    }

    #[tokio::test]
    async fn save_then_has_then_edit_then_delete() {
        let store = InMemoryStore::new();
        store.save_message(msg("m1", None)).await.unwrap();
        assert!(store.has_message("m1").await.unwrap());
        store.edit_message("m1", "hello").await.unwrap();
        let got = store.get_messages(None, None).await.unwrap();
        assert_eq!(got[0].body, "hello");
        assert!(got[0].is_edited);
        store.delete_message("m1").await.unwrap();
        assert!(store.get_messages(None, None).await.unwrap()[0].is_deleted);
    }

    #[tokio::test]
    async fn clear_group_leaves_broadcast_untouched() {
        let store = InMemoryStore::new();
        store.save_message(msg("m1", Some("MESH_AAAAAA"))).await.unwrap();
        store.save_message(msg("m2", None)).await.unwrap();
        store.clear_group_messages("MESH_AAAAAA").await.unwrap();
        let remaining = store.get_messages(None, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "m2");
    }
}
