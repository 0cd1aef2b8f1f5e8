//! Loads `gitchat.toml` overrides on top of [`MeshConfig::default()`], the
//! way a deployed node lets an operator retune timers without recompiling
//! (spec.md names these as constants; nothing here changes their meaning).

use std::path::Path;

use gitchat_mesh::MeshConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// This device's advertised peer name (`self_name` throughout the mesh
    /// core).
    pub self_name: String,
    /// Advertised device model string carried in `PeerInfo`.
    #[serde(default = "default_device_model")]
    pub device_model: String,
    /// All mesh magic numbers; any field omitted from the `[mesh]` table
    /// keeps its compiled-in default.
    #[serde(default)]
    pub mesh: MeshConfig,
}

fn default_device_model() -> String {
    "GitChat Node".to_string()
}

/// Reads and parses `path`. Returns `Ok(None)` if the file does not exist
/// at all (a node is free to run entirely off `Default`/CLI args); any
/// other I/O or parse failure is returned as an error.
pub fn load_from_file(path: &Path) -> anyhow::Result<Option<NodeConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let config: NodeConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_returns_none_without_error() {
        let result = load_from_file(Path::new("/nonexistent/gitchat.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn partial_mesh_overrides_leave_the_rest_at_default() {
        let toml_text = r#"
            self_name = "alice"

            [mesh]
            default_ttl = 5
        "#;
        let config: NodeConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.self_name, "alice");
        assert_eq!(config.device_model, "GitChat Node");
        assert_eq!(config.mesh.default_ttl, 5);
        assert_eq!(config.mesh.sync_batch_cap, MeshConfig::default().sync_batch_cap);
    }
}
