//! Plain-text and styled-text views of mail markup.

mod linearize;
mod preview;
mod rich;

pub use crate::linearize::{Linearizer, get_text};
pub use crate::preview::{PREVIEW_SIZE, get_preview, get_preview_len};
pub use crate::rich::{OBJECT_CHAR, Style, StyleSpan, StyledText};
