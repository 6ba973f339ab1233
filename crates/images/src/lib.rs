//! Image references in mail bodies: inlining embedded parts, decoding, and
//! the asynchronous fetch-and-cache path for remote images.

mod cache;
mod decode;
mod embed;
mod error;
mod icons;
mod pipeline;
mod source;

pub use crate::cache::DiskCache;
pub use crate::decode::{
    DecodedImage, MAX_IMAGE_BYTES, MAX_IMAGE_PIXELS, PROBE_BYTES, decode_image, downscale,
    encode_png, fit_width, probe_dimensions, scale_factor,
};
pub use crate::embed::inline_embedded;
pub use crate::error::{ImageError, ResourceError};
pub use crate::icons::{DisplayMetrics, ICON_DP, Icon, icon_size_px};
pub use crate::pipeline::{
    Completion, DisplaySurface, Displayable, ImagePipeline, PipelineConfig, Resolution,
    ResolveState, WakeHook,
};
pub use crate::source::{DataUri, ImageSource, content_id_key, parse_data_uri};
