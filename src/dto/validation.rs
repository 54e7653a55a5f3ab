//! Validation helpers for DTOs.

use validator::ValidationError;

/// Shortest room code accepted.
pub const MIN_ROOM_CODE_LENGTH: usize = 4;
/// Longest room code accepted.
pub const MAX_ROOM_CODE_LENGTH: usize = 8;

/// Validates that a room code is 4 to 8 uppercase ASCII letters or digits.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("AB12")  // Ok
/// validate_room_code("ab12")  // Err - lowercase
/// validate_room_code("AB1")   // Err - too short
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if !(MIN_ROOM_CODE_LENGTH..=MAX_ROOM_CODE_LENGTH).contains(&code.len()) {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be {MIN_ROOM_CODE_LENGTH} to {MAX_ROOM_CODE_LENGTH} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only uppercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a user id is non-blank and free of control characters.
pub fn validate_user_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() || id.chars().any(char::is_control) {
        let mut err = ValidationError::new("user_id_format");
        err.message = Some("User id must be non-blank printable text".into());
        return Err(err);
    }
    Ok(())
}
