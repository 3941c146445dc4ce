/// Maximum display name length.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 32;

/// Maximum guild name length.
pub const MAX_GUILD_NAME_LENGTH: usize = 50;

/// Validate a display name. Must be 1-32 chars, alphanumeric + underscore/hyphen.
/// Uniqueness is deliberately not checked; colliding names are tolerated.
pub fn validate_display_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Display name cannot be empty".into());
    }
    if name.len() > MAX_DISPLAY_NAME_LENGTH {
        return Err(format!(
            "Display name too long (max {} characters)",
            MAX_DISPLAY_NAME_LENGTH
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(
            "Display name can only contain letters, numbers, underscores, and hyphens".into(),
        );
    }
    Ok(())
}

/// Validate a guild name. Non-blank, at most 50 chars.
pub fn validate_guild_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Guild name cannot be empty".into());
    }
    if name.len() > MAX_GUILD_NAME_LENGTH {
        return Err(format!(
            "Guild name too long (max {} characters)",
            MAX_GUILD_NAME_LENGTH
        ));
    }
    Ok(())
}

/// Validate text message content against the configured length limit.
pub fn validate_message(content: &str, max_len: usize) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Message cannot be empty".into());
    }
    if content.len() > max_len {
        return Err(format!("Message too long (max {} characters)", max_len));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_display_names() {
        assert!(validate_display_name("alice").is_ok());
        assert!(validate_display_name("bob_123").is_ok());
        assert!(validate_display_name("screen-name").is_ok());
    }

    #[test]
    fn test_invalid_display_names() {
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name("has space").is_err());
        assert!(validate_display_name("has!special").is_err());
        assert!(validate_display_name(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_guild_names() {
        assert!(validate_guild_name("Test").is_ok());
        assert!(validate_guild_name("My Guild").is_ok());
        assert!(validate_guild_name("").is_err());
        assert!(validate_guild_name("   ").is_err());
        assert!(validate_guild_name(&"g".repeat(51)).is_err());
    }

    #[test]
    fn test_message_content() {
        assert!(validate_message("hello", 4000).is_ok());
        assert!(validate_message("", 4000).is_err());
        assert!(validate_message("   ", 4000).is_err());
        assert!(validate_message(&"a".repeat(11), 10).is_err());
    }
}
