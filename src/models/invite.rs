use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const INVITE_CODE_LEN: usize = 6;
pub const INVITE_CODE_EXPIRATION_HOURS: i64 = 72;

/// Charset excludes I, O, 0 and 1 so codes read unambiguously.
const CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "invite_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Active,
    Used,
}

/// Single-use pairing token keyed by its 6-character code. At most one
/// couple may ever consume a given code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InviteCode {
    pub code: String,
    pub couple_id: Uuid,
    pub creator_id: Uuid,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_by: Option<Uuid>,
    pub used_at: Option<DateTime<Utc>>,
}

pub fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| CODE_CHARS[rng.gen_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Uppercase and validate the shape of a user-supplied code.
pub fn sanitize_invite_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_uppercase();
    if code.len() == INVITE_CODE_LEN && code.bytes().all(|b| CODE_CHARS.contains(&b)) {
        Some(code)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_use_safe_charset() {
        for _ in 0..100 {
            let code = generate_invite_code();
            assert_eq!(code.len(), INVITE_CODE_LEN);
            assert!(code.bytes().all(|b| CODE_CHARS.contains(&b)));
            assert!(!code.contains('I'));
            assert!(!code.contains('O'));
            assert!(!code.contains('0'));
            assert!(!code.contains('1'));
        }
    }

    #[test]
    fn sanitize_uppercases_and_trims() {
        assert_eq!(sanitize_invite_code(" abcdef "), Some("ABCDEF".into()));
    }

    #[test]
    fn sanitize_rejects_bad_shapes() {
        assert_eq!(sanitize_invite_code("ABC"), None);
        assert_eq!(sanitize_invite_code("ABCDE0"), None);
        assert_eq!(sanitize_invite_code("ABCDEFG"), None);
    }
}
