use core_types::Preferences;
use html::dom_utils::starts_with_ignore_ascii_case;
use html::{Document, parse_document, to_html};

use crate::tracking::is_tracking_pixel;

/// Quick pass used when the full sanitizer is not run: drops tracking-pixel
/// sources, `javascript:` attribute values and `script` elements.
///
/// Returns `html` untouched when `enabled` is false.
pub fn remove_tracking(html: &str, enabled: bool) -> String {
    if !enabled {
        return html.to_string();
    }
    let mut doc = parse_document(html);
    strip_active_content(&mut doc);
    to_html(&doc)
}

/// [`remove_tracking`] gated on the `paranoid` preference.
pub fn remove_tracking_with_prefs(html: &str, prefs: &dyn Preferences) -> String {
    remove_tracking(html, core_types::paranoid(prefs))
}

pub fn strip_active_content(doc: &mut Document) {
    let mut pixels = 0usize;
    for img in doc.elements_by_tag("img") {
        if is_tracking_pixel(doc, img) {
            doc.remove_attr(img, "src");
            pixels += 1;
        }
    }

    let mut scripted = 0usize;
    for element in doc.all_elements() {
        scripted += doc.retain_attrs(element, |_, value| !is_javascript_url(value));
    }

    let scripts = doc.elements_by_tag("script");
    doc.detach_all(&scripts);

    log::debug!(
        target: "sanitize",
        "stripped {pixels} tracking pixels, {scripted} javascript attributes, {} scripts",
        scripts.len()
    );
}

pub fn is_javascript_url(value: &str) -> bool {
    starts_with_ignore_ascii_case(value.trim(), "javascript:")
}
