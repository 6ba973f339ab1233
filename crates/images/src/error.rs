use std::io;

use net::TransportError;
use thiserror::Error;

/// Failure to inline a locally stored part. Fails the whole call.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("attachment {content_id}: read {read} of {expected} bytes")]
    ShortRead {
        content_id: String,
        read: u64,
        expected: u64,
    },
    #[error("attachment {content_id}: {source}")]
    Io {
        content_id: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("empty image data")]
    Empty,
    #[error("image data exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("decoded image size {width}x{height} is not supported")]
    Dimensions { width: u32, height: u32 },
    #[error("malformed data uri: {0}")]
    DataUri(&'static str),
    #[error(transparent)]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ImageError {
    /// Network trouble, as opposed to a resource that is missing or not an
    /// image.
    pub fn is_network(&self) -> bool {
        matches!(self, ImageError::Transport(TransportError::Network(_)))
    }
}
