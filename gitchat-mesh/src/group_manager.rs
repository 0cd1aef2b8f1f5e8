//! Pending invites and the join/leave protocol (spec §4.4 GroupInvite/
//! GroupJoinAck, §8 S3).

use std::collections::HashMap;
use std::sync::Arc;

use gitchat_core::ids::{generate_group_id, generate_symmetric_key};
use gitchat_core::MeshGroup;
use tokio::sync::Mutex;

use crate::error::MeshError;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Success,
    WrongPassword,
    NotPending,
}

#[derive(Default)]
pub struct GroupManager {
    pending_invites: Mutex<HashMap<String, MeshGroup>>,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// `GroupInvite` handler. Drops the invite if we're already a member.
    pub async fn receive_invite(&self, store: &dyn Store, invite: MeshGroup) -> Result<(), MeshError> {
        if let Some(username) = store.get_username().await? {
            if invite.is_member(&username) {
                return Ok(());
            }
        }
        self.pending_invites.lock().await.entry(invite.id.clone()).or_insert(invite);
        Ok(())
    }

    pub async fn pending(&self) -> Vec<MeshGroup> {
        self.pending_invites.lock().await.values().cloned().collect()
    }

    /// User-driven join with the group's id (from a pending invite) and, if
    /// the group is password-gated, the candidate password.
    pub async fn join_with_credentials(
        &self,
        store: &dyn Store,
        group_id: &str,
        username: &str,
        password: Option<&str>,
    ) -> Result<JoinOutcome, MeshError> {
        let mut invites = self.pending_invites.lock().await;
        let Some(invite) = invites.get(group_id) else {
            return Ok(JoinOutcome::NotPending);
        };
        if invite.password.is_some() && invite.password.as_deref() != password {
            return Ok(JoinOutcome::WrongPassword);
        }
        let mut group = invites.remove(group_id).expect("checked above");
        group.add_member(username);
        store.save_group(group).await?;
        Ok(JoinOutcome::Success)
    }

    /// Locally create a new group; caller still needs to gossip a
    /// `GroupInvite` to connected peers.
    pub fn create_group(&self, name: &str, created_by: &str, now: u64, password: Option<String>) -> MeshGroup {
        MeshGroup::new(generate_group_id(), name, created_by, now, generate_symmetric_key(), password)
    }

    /// `GroupJoinAck` handler: append the acker to the local copy, idempotent.
    pub async fn apply_join_ack(&self, store: &dyn Store, group_id: &str, username: &str) -> Result<(), MeshError> {
        store.add_member_to_group(group_id, username).await?;
        Ok(())
    }

    /// Local-only rename; no wire packet carries it, so it never
    /// propagates to other members.
    pub async fn rename_group(&self, store: &dyn Store, group_id: &str, new_name: &str) -> Result<(), MeshError> {
        store.rename_group(group_id, new_name).await?;
        Ok(())
    }

    /// Remove the local membership and purge the group's local message
    /// history. Does not notify other members (no leave packet in the wire
    /// format).
    pub async fn leave_group(&self, store: &dyn Store, group_id: &str, username: &str) -> Result<(), MeshError> {
        store.remove_member_from_group(group_id, username).await?;
        store.clear_group_messages(group_id).await?;
        Ok(())
    }
}

pub type SharedGroupManager = Arc<GroupManager>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn invite(password: Option<&str>) -> MeshGroup {
        MeshGroup::new("MESH_AB12CD", "friends", "remote-user", 0, "key", password.map(String::from))
    }

    #[tokio::test]
    async fn wrong_password_leaves_state_unchanged() {
        let gm = GroupManager::new();
        let store = InMemoryStore::new();
        gm.receive_invite(&store, invite(Some("secret"))).await.unwrap();
        let outcome = gm.join_with_credentials(&store, "MESH_AB12CD", "me", Some("nope")).await.unwrap();
        assert_eq!(outcome, JoinOutcome::WrongPassword);
        assert!(store.get_group("MESH_AB12CD").await.unwrap().is_none());
        assert_eq!(gm.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn correct_password_joins_and_clears_pending() {
        let gm = GroupManager::new();
        let store = InMemoryStore::new();
        gm.receive_invite(&store, invite(Some("secret"))).await.unwrap();
        let outcome = gm.join_with_credentials(&store, "MESH_AB12CD", "me", Some("secret")).await.unwrap();
        assert_eq!(outcome, JoinOutcome::Success);
        let group = store.get_group("MESH_AB12CD").await.unwrap().unwrap();
        assert!(group.is_member("me"));
        assert!(gm.pending().await.is_empty());
    }

    #[tokio::test]
    async fn already_member_drops_invite() {
        let gm = GroupManager::new();
        let store = InMemoryStore::new();
        store.save_username("me").await.unwrap();
        let mut g = invite(None);
        g.add_member("me");
        gm.receive_invite(&store, g).await.unwrap();
        assert!(gm.pending().await.is_empty());
    }
}
