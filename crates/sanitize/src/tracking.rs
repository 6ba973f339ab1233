use html::{Document, NodeId};

/// Images covering at most this many pixels are treated as tracking pixels.
pub const TRACKING_PIXEL_SURFACE: u64 = 25;

/// Decides whether an image with the given declared `src`, `width` and
/// `height` attribute values is a tracking pixel.
///
/// Missing or malformed dimensions never classify as tracking.
pub fn is_tracking(src: &str, width: &str, height: &str) -> bool {
    if src.is_empty() {
        return false;
    }
    let (Some(w), Some(h)) = (parse_dimension(width), parse_dimension(height)) else {
        return false;
    };
    w.checked_mul(h)
        .is_some_and(|surface| surface <= TRACKING_PIXEL_SURFACE)
}

pub fn is_tracking_pixel(doc: &Document, img: NodeId) -> bool {
    is_tracking(
        doc.attr_or_empty(img, "src"),
        doc.attr_or_empty(img, "width"),
        doc.attr_or_empty(img, "height"),
    )
}

fn parse_dimension(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
