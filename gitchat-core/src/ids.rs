//! Identifier and key-material generation helpers.

use base64::{engine::general_purpose, Engine as _};
use rand::Rng;
use uuid::Uuid;

const GROUP_ID_PREFIX: &str = "MESH_";
const GROUP_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GROUP_ID_SUFFIX_LEN: usize = 6;

/// `MESH_` + 6 random alphanumeric (uppercase) characters, matching
/// `^MESH_[A-Z0-9]{6}$`.
pub fn generate_group_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..GROUP_ID_SUFFIX_LEN)
        .map(|_| GROUP_ID_ALPHABET[rng.gen_range(0..GROUP_ID_ALPHABET.len())] as char)
        .collect();
    format!("{GROUP_ID_PREFIX}{suffix}")
}

/// Opaque, caller-generated message id. The reference client uses a v4 UUID;
/// we do the same.
pub fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// 32 random bytes, base64 encoded (44 chars). Carried as metadata only;
/// never applied in-core (spec §3, §9 open question 3).
pub fn generate_symmetric_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches_group_id_pattern(s: &str) -> bool {
        let Some(suffix) = s.strip_prefix("MESH_") else {
            return false;
        };
        suffix.len() == 6 && suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    }

    #[test]
    fn group_id_matches_pattern() {
        for _ in 0..200 {
            let id = generate_group_id();
            assert!(matches_group_id_pattern(&id), "{id} did not match");
        }
    }

    #[test]
    fn symmetric_key_is_44_char_base64_32_bytes() {
        let k = generate_symmetric_key();
        assert_eq!(k.len(), 44);
    }

    #[test]
    fn message_ids_are_unique() {
        let a = generate_message_id();
        let b = generate_message_id();
        assert_ne!(a, b);
    }
}
