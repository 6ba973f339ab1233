use std::fmt;
use std::io::{Cursor, Read};

use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, ImageReader, RgbaImage};

use crate::error::ImageError;

pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;
pub const MAX_IMAGE_PIXELS: u64 = 16_777_216; // 4096 * 4096
pub const PROBE_BYTES: u64 = 64 * 1024;

#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pixels: RgbaImage,
}

impl DecodedImage {
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size_px(&self) -> [u32; 2] {
        [self.width(), self.height()]
    }

    pub fn rgba(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

pub fn decode_image(bytes: &[u8], max_bytes: usize) -> Result<DecodedImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(ImageError::TooLarge { limit: max_bytes });
    }
    let img = image::load_from_memory(bytes)?;
    let (width, height) = (img.width(), img.height());
    let pixels = u64::from(width) * u64::from(height);
    if pixels == 0 || pixels > MAX_IMAGE_PIXELS {
        return Err(ImageError::Dimensions { width, height });
    }
    Ok(DecodedImage::from_rgba(img.to_rgba8()))
}

/// Reads the whole stream, refusing anything longer than `max_bytes`.
pub fn read_limited<R: Read>(reader: R, max_bytes: usize) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    reader
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut buf)?;
    if buf.len() > max_bytes {
        return Err(ImageError::TooLarge { limit: max_bytes });
    }
    Ok(buf)
}

/// Reads at most `limit` bytes and extracts the image dimensions from the
/// header without decoding pixels.
pub fn probe_dimensions<R: Read>(reader: R, limit: u64) -> Result<(u32, u32), ImageError> {
    let mut head = Vec::new();
    reader.take(limit).read_to_end(&mut head)?;
    if head.is_empty() {
        return Err(ImageError::Empty);
    }
    let dims = ImageReader::new(Cursor::new(head))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(dims)
}

/// Smallest power of two such that `width / factor <= target`.
pub fn scale_factor(width: u32, target: u32) -> u32 {
    if target == 0 {
        return 1;
    }
    let mut factor = 1u32;
    while width / factor > target {
        factor *= 2;
    }
    factor
}

pub fn downscale(image: DecodedImage, factor: u32) -> DecodedImage {
    if factor <= 1 {
        return image;
    }
    let width = (image.width() / factor).max(1);
    let height = (image.height() / factor).max(1);
    let pixels = imageops::resize(&image.pixels, width, height, FilterType::Triangle);
    DecodedImage::from_rgba(pixels)
}

/// Downscales so the width fits `target`, in powers of two.
pub fn fit_width(image: DecodedImage, target: u32) -> DecodedImage {
    let factor = scale_factor(image.width(), target);
    downscale(image, factor)
}

pub fn encode_png(image: &DecodedImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(
        image.rgba(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgba;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let pixels = RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]));
        encode_png(&DecodedImage::from_rgba(pixels)).expect("encode")
    }

    #[test]
    fn decodes_png_at_intrinsic_size() {
        let img = decode_image(&png_bytes(3, 2), MAX_IMAGE_BYTES).expect("decode");
        assert_eq!(img.size_px(), [3, 2]);
        assert_eq!(img.rgba().len(), 3 * 2 * 4);
    }

    #[test]
    fn rejects_empty_oversized_and_garbage() {
        assert!(matches!(decode_image(&[], MAX_IMAGE_BYTES), Err(ImageError::Empty)));
        assert!(matches!(
            decode_image(&png_bytes(1, 1), 8),
            Err(ImageError::TooLarge { limit: 8 })
        ));
        assert!(matches!(
            decode_image(b"not an image", MAX_IMAGE_BYTES),
            Err(ImageError::Decode(_))
        ));
    }

    #[test]
    fn scale_factor_is_power_of_two() {
        assert_eq!(scale_factor(100, 200), 1);
        assert_eq!(scale_factor(200, 200), 1);
        assert_eq!(scale_factor(201, 200), 2);
        assert_eq!(scale_factor(400, 100), 4);
        assert_eq!(scale_factor(401, 100), 8);
        assert_eq!(scale_factor(4000, 0), 1);
    }

    #[test]
    fn downscale_divides_both_axes() {
        let img = decode_image(&png_bytes(400, 100), MAX_IMAGE_BYTES).expect("decode");
        let small = fit_width(img, 100);
        assert_eq!(small.size_px(), [100, 25]);
    }

    #[test]
    fn probe_reads_dimensions_from_prefix() {
        let bytes = png_bytes(640, 480);
        assert_eq!(probe_dimensions(&bytes[..], 512).expect("probe"), (640, 480));
        assert!(probe_dimensions(&b"GIF8"[..], 512).is_err());
    }

    #[test]
    fn read_limited_refuses_long_streams() {
        assert_eq!(read_limited(&b"abc"[..], 3).expect("fits"), b"abc");
        assert!(matches!(
            read_limited(&b"abcd"[..], 3),
            Err(ImageError::TooLarge { limit: 3 })
        ));
    }
}
