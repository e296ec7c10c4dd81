use once_cell::sync::Lazy;
use regex::Regex;

pub const ELLIPSIS: char = '…';

static HTML_STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(<!--.*?-->|<[^>]*>)").expect("valid regex"));

/// Remove HTML comments and tags.
///
/// Note that this is not a sanitizer: it only makes feed summaries readable
/// as plain text and must not be used on content that needs to be safe.
pub fn strip_html(text: &str) -> String {
    HTML_STRIP_RE.replace_all(text, "").into_owned()
}

/// Strip markup, decode entities, trim.
pub fn to_plain_text(html: &str) -> String {
    let stripped = strip_html(html);
    html_escape::decode_html_entities(&stripped).trim().to_string()
}

/// The first `max_chars` characters of `text` followed by an ellipsis. The
/// ellipsis marks an excerpt and is appended even when nothing was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let end = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(byte_idx, _)| byte_idx);
    let mut excerpt = text[..end].to_string();
    excerpt.push(ELLIPSIS);
    excerpt
}

/// Whether a Reddit feed title is one of the user-profile boilerplate entries
/// (comments listed as "/u/<user> on <post>") rather than a real post.
pub fn is_profile_boilerplate(title: &str, username: &str) -> bool {
    title.contains(&format!("u/{username} on"))
}
