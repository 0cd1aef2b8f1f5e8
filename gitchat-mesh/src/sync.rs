//! Compare-and-send history exchange (spec §4.5, invariants 7 & 8).
//!
//! Pure functions over the [`Store`] snapshot; sync never suspends beyond
//! the store reads themselves (spec §5: "sync response construction does
//! not suspend").

use std::collections::HashSet;

use gitchat_core::packet::{SyncRequestPayload, SyncResponsePayload};
use gitchat_core::MessageType;

use crate::error::MeshError;
use crate::store::Store;

/// Build the outbound request: every locally known message id plus every
/// joined group id.
pub async fn build_sync_request(store: &dyn Store) -> Result<SyncRequestPayload, MeshError> {
    let messages = store.get_messages(None, None).await?;
    let groups = store.get_groups().await?;
    Ok(SyncRequestPayload {
        message_ids: messages.into_iter().map(|m| m.id).collect(),
        group_ids: groups.into_iter().map(|g| g.id).collect(),
    })
}

/// Build the reply: up to `cap` missing text messages (broadcast first, then
/// messages from groups the requester shares), plus every group we know that
/// the requester doesn't.
pub async fn build_sync_response(
    store: &dyn Store,
    request: &SyncRequestPayload,
    cap: usize,
) -> Result<SyncResponsePayload, MeshError> {
    let known: HashSet<&str> = request.message_ids.iter().map(String::as_str).collect();
    let shared_groups: HashSet<&str> = request.group_ids.iter().map(String::as_str).collect();
    let all_messages = store.get_messages(None, None).await?;

    let eligible = |m: &gitchat_core::ChatMessage| {
        !m.is_deleted && m.message_type == MessageType::Text && !known.contains(m.id.as_str())
    };

    let mut out = Vec::new();
    for m in all_messages.iter().filter(|m| m.group_id.is_none() && eligible(m)) {
        if out.len() >= cap {
            break;
        }
        out.push(m.clone());
    }
    if out.len() < cap {
        for m in all_messages
            .iter()
            .filter(|m| m.group_id.as_deref().is_some_and(|g| shared_groups.contains(g)) && eligible(m))
        {
            if out.len() >= cap {
                break;
            }
            out.push(m.clone());
        }
    }

    let groups = store.get_groups().await?;
    let missing_groups = groups.into_iter().filter(|g| !shared_groups.contains(g.id.as_str())).collect();

    Ok(SyncResponsePayload { messages: out, groups: missing_groups })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use gitchat_core::ChatMessage;

    fn msg(id: &str, group: Option<&str>, ts: u64) -> ChatMessage {
        ChatMessage::new(id, "p", gitchat_core::BROADCAST, "hi", ts, 3, group.map(String::from), MessageType::Text)
    }

    #[tokio::test]
    async fn s4_sync_scenario() {
        // Peer P: broadcast {a,b,c}, groups {g1}.
        let p = InMemoryStore::new();
        p.save_message(msg("a", None, 1)).await.unwrap();
        p.save_message(msg("b", None, 2)).await.unwrap();
        p.save_message(msg("c", None, 3)).await.unwrap();
        p.save_group(gitchat_core::MeshGroup::new("g1", "g1", "p", 0, "k", None)).await.unwrap();

        // Peer Q: broadcast {b,d}, groups {g1,g2}.
        let request = SyncRequestPayload {
            message_ids: vec!["b".into(), "d".into()],
            group_ids: vec!["g1".into(), "g2".into()],
        };
        let response = build_sync_response(&p, &request, 50).await.unwrap();
        let ids: HashSet<_> = response.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, HashSet::from(["a", "c"]));
        assert!(response.groups.is_empty());
    }

    #[tokio::test]
    async fn response_is_capped() {
        let store = InMemoryStore::new();
        for i in 0..60 {
            store.save_message(msg(&format!("m{i}"), None, i as u64)).await.unwrap();
        }
        let request = SyncRequestPayload { message_ids: vec![], group_ids: vec![] };
        let response = build_sync_response(&store, &request, 50).await.unwrap();
        assert_eq!(response.messages.len(), 50);
    }

    #[tokio::test]
    async fn deleted_and_non_text_messages_never_sync() {
        let store = InMemoryStore::new();
        store.save_message(msg("a", None, 1)).await.unwrap();
        store.delete_message("a").await.unwrap();
        let mut image = msg("b", None, 2);
        image.message_type = MessageType::Image;
        store.save_message(image).await.unwrap();
        let request = SyncRequestPayload { message_ids: vec![], group_ids: vec![] };
        let response = build_sync_response(&store, &request, 50).await.unwrap();
        assert!(response.messages.is_empty());
    }
}
