//! Validation of user-composed message text

/// Longest message body accepted by the composer, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Validates outbound message text
pub fn validate_message(msg: &str) -> Result<(), String> {
    if msg.trim().is_empty() {
        return Err("Message cannot be empty".to_string());
    }

    if msg.chars().count() > MAX_MESSAGE_CHARS {
        return Err(format!("Message too long (max {} characters)", MAX_MESSAGE_CHARS));
    }

    Ok(())
}

/// Strips control characters other than newline and tab, and surrounding whitespace
pub fn sanitize_message(msg: &str) -> String {
    msg.chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitizes then validates; returns the text that should be sent
pub fn prepare_outbound(msg: &str) -> Result<String, String> {
    let text = sanitize_message(msg);
    validate_message(&text)?;
    Ok(text)
}
