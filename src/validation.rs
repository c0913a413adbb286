//! Input validation for identity handles, item ids, and edit scripts.
//!
//! Handles and item ids end up inside storage keys (`avatars:<handle>`), so
//! the key separator and control characters are rejected up front.

/// Identity handle validation errors with helpful messages
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandleError {
    #[error("Handle is empty")]
    Empty,

    #[error("Handle is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Handle cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Handle contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScriptError {
    /// Script exceeds maximum allowed size
    #[error("Script exceeds size limit ({limit} bytes)")]
    SizeExceeded { limit: usize },

    /// JSON format is invalid or malformed
    #[error("Invalid script format: {reason}")]
    InvalidFormat { reason: String },
}

pub const MAX_HANDLE_LEN: usize = 64;
pub const MAX_ITEM_ID_LEN: usize = 128;

fn validate_key_part(value: &str, max: usize) -> Result<String, HandleError> {
    if value.is_empty() {
        return Err(HandleError::Empty);
    }
    if value.trim() != value {
        return Err(HandleError::InvalidWhitespace);
    }
    if value.chars().count() > max {
        return Err(HandleError::TooLong { max });
    }

    let bad: String = value
        .chars()
        .filter(|c| *c == ':' || c.is_control())
        .map(|c| if c.is_control() { '?' } else { c })
        .collect();
    if !bad.is_empty() {
        return Err(HandleError::InvalidCharacters { chars: bad });
    }

    Ok(value.to_string())
}

/// Validate the identity handle a session is keyed by.
pub fn validate_handle(handle: &str) -> Result<String, HandleError> {
    validate_key_part(handle, MAX_HANDLE_LEN)
}

/// Validate an inventory item reference.
pub fn validate_item_id(item_id: &str) -> Result<String, HandleError> {
    validate_key_part(item_id, MAX_ITEM_ID_LEN)
}

/// Parse JSON with a size limit.
pub fn secure_json_parse<T>(content: &str, max_bytes: usize) -> Result<T, ScriptError>
where
    T: serde::de::DeserializeOwned,
{
    if content.len() > max_bytes {
        return Err(ScriptError::SizeExceeded { limit: max_bytes });
    }

    // Interrupted writes occasionally leave leading NULs; valid JSON never starts with one.
    let normalized = content.trim_start_matches('\0');

    serde_json::from_str(normalized).map_err(|e| ScriptError::InvalidFormat {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_handles() {
        assert_eq!(validate_handle("student-042").unwrap(), "student-042");
        assert!(validate_handle("Mia Chen").is_ok());
        assert!(validate_item_id("top_hat_01").is_ok());
    }

    #[test]
    fn rejects_key_separator_and_controls() {
        assert_eq!(
            validate_handle("a:b"),
            Err(HandleError::InvalidCharacters { chars: ":".into() })
        );
        assert!(matches!(
            validate_handle("a\nb"),
            Err(HandleError::InvalidCharacters { .. })
        ));
        assert_eq!(validate_handle(""), Err(HandleError::Empty));
        assert_eq!(validate_handle(" pad"), Err(HandleError::InvalidWhitespace));
        assert_eq!(
            validate_handle(&"x".repeat(65)),
            Err(HandleError::TooLong { max: 64 })
        );
    }

    #[test]
    fn json_parse_enforces_limit() {
        let parsed: Vec<u32> = secure_json_parse("\0[1,2]", 64).unwrap();
        assert_eq!(parsed, vec![1, 2]);
        assert_eq!(
            secure_json_parse::<Vec<u32>>("[1,2,3]", 3),
            Err(ScriptError::SizeExceeded { limit: 3 })
        );
        assert!(matches!(
            secure_json_parse::<Vec<u32>>("{", 64),
            Err(ScriptError::InvalidFormat { .. })
        ));
    }
}
