//! Turns untrusted mail markup into a small, inert subset of HTML.
//!
//! [`sanitize`] is the full pass used for display. [`remove_tracking`] is the
//! lighter pass that only removes active content and tracking pixels while
//! keeping the rest of the document intact.

mod autolink;
mod policy;
mod rewrite;
mod strip;
mod tracking;

pub use crate::autolink::autolink;
pub use crate::policy::{Policy, url_allowed};
pub use crate::rewrite::{
    QUOTE_PLACEHOLDER, RULE_TEXT, SanitizeOptions, TrackingHint, default_tracking_hint, sanitize,
    sanitize_with_prefs,
};
pub use crate::strip::{
    is_javascript_url, remove_tracking, remove_tracking_with_prefs, strip_active_content,
};
pub use crate::tracking::{TRACKING_PIXEL_SURFACE, is_tracking, is_tracking_pixel};
