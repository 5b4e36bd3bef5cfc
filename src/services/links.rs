use std::sync::OnceLock;

use regex::Regex;

use crate::models::canonical_url;

use super::slack::SlackMessage;

static URL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn url_pattern() -> Option<&'static Regex> {
    URL_PATTERN
        .get_or_init(|| Regex::new(r#"https?://[^\s<>|"']+"#).ok())
        .as_ref()
}

fn first_url(text: &str) -> Option<String> {
    url_pattern()?
        .find(text)
        .map(|m: regex::Match| m.as_str().to_string())
}

/// First link in a chat message, looking at the text, then attachments,
/// then section blocks. Returned in canonical form.
pub fn extract_url(message: &SlackMessage) -> Option<String> {
    let raw = first_url(&message.text)
        .or_else(|| {
            message
                .attachments
                .iter()
                .find_map(|attachment| first_url(&attachment.text))
        })
        .or_else(|| {
            message
                .blocks
                .iter()
                .filter(|block| block.block_type == "section")
                .filter_map(|block| block.text.as_ref())
                .find_map(|text| first_url(&text.text))
        })?;

    canonical_url(&raw)
}
