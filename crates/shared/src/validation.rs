use crate::constants::*;
use crate::model::Attachment;

/// A message needs text unless it carries an attachment.
pub fn validate_message(content: &str, attachment: Option<&Attachment>) -> Result<(), String> {
    if content.trim().is_empty() && attachment.is_none() {
        return Err("Message content is required".into());
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }
    if let Some(att) = attachment {
        validate_attachment(att)?;
    }
    Ok(())
}

pub fn validate_attachment(att: &Attachment) -> Result<(), String> {
    if att.url.trim().is_empty() {
        return Err("Attachment url is required".into());
    }
    if !(att.url.starts_with("https://") || att.url.starts_with("http://")) {
        return Err("Attachment url must be http(s)".into());
    }
    if att.content_type.trim().is_empty() || !att.content_type.contains('/') {
        return Err("Attachment type must be a mime type".into());
    }
    let name = att.filename.trim();
    if name.is_empty() {
        return Err("Attachment name is required".into());
    }
    if name.len() > MAX_FILENAME_LENGTH {
        return Err(format!(
            "Attachment name must be at most {} characters",
            MAX_FILENAME_LENGTH
        ));
    }
    if att.size <= 0 {
        return Err("Attachment size must be positive".into());
    }
    if att.size > MAX_ATTACHMENT_BYTES {
        return Err("Attachment too large".into());
    }
    Ok(())
}

pub fn validate_emoji(emoji: &str) -> Result<(), String> {
    let trimmed = emoji.trim();
    if trimmed.is_empty() {
        return Err("Emoji is required".into());
    }
    if trimmed.len() > MAX_EMOJI_LENGTH || trimmed.chars().any(char::is_whitespace) {
        return Err("Invalid emoji".into());
    }
    Ok(())
}
