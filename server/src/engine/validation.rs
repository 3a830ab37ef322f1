/// Maximum message content length (bytes), the game client's input limit.
pub const MAX_MESSAGE_LENGTH: usize = 255;

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 50;

/// Maximum character name length.
pub const MAX_PLAYER_NAME_LENGTH: usize = 29;

/// Validate a character name given as an invite or exclude target.
/// Letters, spaces, apostrophes and hyphens only.
pub fn validate_player_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Player name cannot be empty".into());
    }
    if name.len() > MAX_PLAYER_NAME_LENGTH {
        return Err(format!(
            "Player name too long (max {} characters)",
            MAX_PLAYER_NAME_LENGTH
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '\'' || c == '-')
    {
        return Err("Player name can only contain letters, spaces, apostrophes, and hyphens".into());
    }
    Ok(())
}

/// Validate a channel display name. Must be non-blank and under the length limit.
pub fn validate_channel_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Channel name cannot be empty".into());
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err(format!(
            "Channel name too long (max {} characters)",
            MAX_CHANNEL_NAME_LENGTH
        ));
    }
    Ok(())
}

/// Validate message content against a length limit. Must be non-blank.
pub fn validate_message(content: &str, max_length: usize) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Message cannot be empty".into());
    }
    if content.len() > max_length {
        return Err(format!("Message too long (max {} characters)", max_length));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_player_names() {
        assert!(validate_player_name("Alice").is_ok());
        assert!(validate_player_name("Sir Bob").is_ok());
        assert!(validate_player_name("O'Neil-Smith").is_ok());
    }

    #[test]
    fn test_invalid_player_names() {
        assert!(validate_player_name("").is_err());
        assert!(validate_player_name("   ").is_err());
        assert!(validate_player_name("bob_123").is_err());
        assert!(validate_player_name(&"a".repeat(30)).is_err());
    }

    #[test]
    fn test_channel_names() {
        assert!(validate_channel_name("Trade").is_ok());
        assert!(validate_channel_name("World Chat").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name(" ").is_err());
        assert!(validate_channel_name(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_message_validation() {
        assert!(validate_message("hello", MAX_MESSAGE_LENGTH).is_ok());
        assert!(validate_message("", MAX_MESSAGE_LENGTH).is_err());
        assert!(validate_message("   ", MAX_MESSAGE_LENGTH).is_err());
        assert!(validate_message(&"a".repeat(255), MAX_MESSAGE_LENGTH).is_ok());
        assert!(validate_message(&"a".repeat(256), MAX_MESSAGE_LENGTH).is_err());
    }
}
