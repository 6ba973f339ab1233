use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use html::dom_utils::starts_with_ignore_ascii_case;

use crate::error::ImageError;

// Mail clients are sloppy with padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Where an image `src` points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSource<'a> {
    Empty,
    /// Bare content id, without the `cid:` prefix or angle brackets.
    ContentId(&'a str),
    /// The whole `data:` URI.
    Data(&'a str),
    Remote(&'a str),
}

impl<'a> ImageSource<'a> {
    pub fn parse(src: &'a str) -> Self {
        let src = src.trim();
        if src.is_empty() {
            ImageSource::Empty
        } else if starts_with_ignore_ascii_case(src, "cid:") {
            ImageSource::ContentId(&src[4..])
        } else if starts_with_ignore_ascii_case(src, "data:") {
            ImageSource::Data(src)
        } else {
            ImageSource::Remote(src)
        }
    }

    /// Content carried by the message itself rather than fetched.
    pub fn is_embedded(&self) -> bool {
        matches!(self, ImageSource::ContentId(_) | ImageSource::Data(_))
    }
}

/// Key used by the attachment store for a bare content id.
pub fn content_id_key(cid: &str) -> String {
    format!("<{cid}>")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataUri {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Parses `data:[<media type>][;params];base64,<payload>`. Only base64
/// payloads are accepted.
pub fn parse_data_uri(uri: &str) -> Result<DataUri, ImageError> {
    let uri = uri.trim();
    if !starts_with_ignore_ascii_case(uri, "data:") {
        return Err(ImageError::DataUri("missing data: prefix"));
    }
    let rest = &uri[5..];
    let (meta, payload) = rest
        .split_once(',')
        .ok_or(ImageError::DataUri("missing payload separator"))?;
    let mut params = meta.split(';');
    let media_type = params.next().unwrap_or("").trim().to_ascii_lowercase();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(ImageError::DataUri("payload is not base64"));
    }
    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let bytes = LENIENT_BASE64
        .decode(&compact)
        .map_err(|_| ImageError::DataUri("invalid base64 payload"))?;
    Ok(DataUri {
        media_type: if media_type.is_empty() {
            "text/plain".to_string()
        } else {
            media_type
        },
        bytes,
    })
}
