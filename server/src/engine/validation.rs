/// Maximum raid name length.
pub const MAX_RAID_NAME_LENGTH: usize = 64;

/// Maximum channel identifier length.
pub const MAX_CHANNEL_LENGTH: usize = 80;

/// Maximum user identifier length.
pub const MAX_USER_ID_LENGTH: usize = 64;

fn validate_identifier(kind: &str, value: &str, max: usize) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} cannot be empty"));
    }
    if value.len() > max {
        return Err(format!("{kind} too long (max {max} characters)"));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("{kind} cannot contain whitespace"));
    }
    Ok(())
}

/// Validate a raid name. Must be 1-64 chars with no whitespace.
pub fn validate_raid_name(name: &str) -> Result<(), String> {
    validate_identifier("Raid name", name, MAX_RAID_NAME_LENGTH)
}

/// Validate a channel identifier. Must be 1-80 chars with no whitespace.
pub fn validate_channel(channel: &str) -> Result<(), String> {
    validate_identifier("Channel", channel, MAX_CHANNEL_LENGTH)
}

/// Validate a user identifier. Must be 1-64 chars with no whitespace.
pub fn validate_user_id(user: &str) -> Result<(), String> {
    validate_identifier("User", user, MAX_USER_ID_LENGTH)
}
