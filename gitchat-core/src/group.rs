//! Mesh group records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshGroup {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: u64,
    pub members: Vec<String>,
    pub symmetric_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl MeshGroup {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        created_by: impl Into<String>,
        created_at: u64,
        symmetric_key: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        let created_by = created_by.into();
        Self {
            id: id.into(),
            name: name.into(),
            members: vec![created_by.clone()],
            created_by,
            created_at,
            symmetric_key: symmetric_key.into(),
            password,
        }
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    /// Idempotent append; the creator is always present from `new`.
    pub fn add_member(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.is_member(&name) {
            self.members.push(name);
        }
    }

    pub fn remove_member(&mut self, name: &str) {
        self.members.retain(|m| m != name);
    }
}
