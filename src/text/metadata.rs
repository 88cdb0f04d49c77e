use regex::Regex;
use std::sync::LazyLock;

// "[6:14 p. m., 15/12/2025] Name: " as copied from a chat export or web client.
static CHAT_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[[0-9]{1,2}:[0-9]{2}(?:\s*[ap]\.?\s*m\.?)?,?\s*[0-9]{1,2}/[0-9]{1,2}/(?:[0-9]{4}|[0-9]{2})\]\s*[^:\n]+:\s*",
    )
    .expect("valid chat header regex")
});

/// Removes every `[time, date] Sender:` header copied along with chat
/// messages, leaving the message bodies untouched.
pub fn remove_whatsapp_metadata(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    CHAT_HEADER_REGEX.replace_all(text, "").into_owned()
}
