use validator::ValidationError;

use crate::error::ApiError;

pub const MAX_ATTACHMENTS: usize = 5;

const USERNAME_CHARS: std::ops::RangeInclusive<usize> = 3..=32;
const DISPLAY_NAME_CHARS: std::ops::RangeInclusive<usize> = 1..=64;
const GROUP_NAME_CHARS: std::ops::RangeInclusive<usize> = 1..=100;
const MESSAGE_CHARS: std::ops::RangeInclusive<usize> = 1..=4000;

fn bounded(
    value: &str,
    bounds: std::ops::RangeInclusive<usize>,
    code: &'static str,
) -> Result<(), ValidationError> {
    if bounds.contains(&value.trim().chars().count()) {
        Ok(())
    } else {
        Err(ValidationError::new(code))
    }
}

/// Login handles: ASCII letters, digits, `_`, `-` and `.`.
pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    bounded(value, USERNAME_CHARS, "username_length")?;
    let handle_chars = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.');
    if value.trim().chars().all(handle_chars) {
        Ok(())
    } else {
        Err(ValidationError::new("username_chars"))
    }
}

pub fn validate_display_name(value: &str) -> Result<(), ValidationError> {
    bounded(value, DISPLAY_NAME_CHARS, "name_length")
}

pub fn validate_group_name(value: &str) -> Result<(), ValidationError> {
    bounded(value, GROUP_NAME_CHARS, "group_name_length")
}

pub fn validate_message_content(value: &str) -> Result<(), ValidationError> {
    bounded(value, MESSAGE_CHARS, "message_length")
}

/// Usernames are unique case-insensitively.
pub fn normalize_username(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

/// Runs one rule outside a derive and maps it to the boundary error type.
pub fn check(
    field: &str,
    value: &str,
    rule: fn(&str) -> Result<(), ValidationError>,
) -> Result<(), ApiError> {
    rule(value).map_err(|err| ApiError::validation(format!("Invalid {field}: {}", err.code)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_accept_dots_dashes_and_underscores() {
        assert!(validate_username("jane.doe").is_ok());
        assert!(validate_username("x_y-z").is_ok());
        assert!(validate_username("jo").is_err());
        assert!(validate_username("two words").is_err());
        assert!(validate_username("émile").is_err());
    }

    #[test]
    fn lengths_count_characters_after_trimming() {
        assert!(validate_group_name("  Team  ").is_ok());
        assert!(validate_group_name("   ").is_err());
        assert!(validate_group_name(&"é".repeat(100)).is_ok());
        assert!(validate_group_name(&"é".repeat(101)).is_err());
        assert!(validate_message_content(" ").is_err());
        assert!(validate_message_content(&"a".repeat(4000)).is_ok());
    }

    #[test]
    fn usernames_normalize_to_lowercase() {
        assert_eq!(normalize_username("  Alice "), "alice");
    }

    #[test]
    fn check_names_the_field() {
        let err = check("name", "", validate_display_name).unwrap_err();
        assert_eq!(err.to_string(), "Invalid name: name_length");
    }
}
