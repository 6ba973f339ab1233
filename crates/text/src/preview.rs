use crate::linearize::get_text;

/// Maximum preview length in characters.
pub const PREVIEW_SIZE: usize = 250;

/// Single-line plain-text preview of a message body, at most
/// [`PREVIEW_SIZE`] characters. `None` only when there is no body.
pub fn get_preview(body: Option<&str>) -> Option<String> {
    get_preview_len(body, PREVIEW_SIZE)
}

pub fn get_preview_len(body: Option<&str>, max_chars: usize) -> Option<String> {
    let body = body?;
    let text = get_text(body);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => collapsed[..cut].to_string(),
        None => collapsed,
    })
}
