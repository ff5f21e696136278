//! Minimal image plumbing: sniff dimensions from PNG/BMP headers, encode
//! 24-bit BMP for the built-in renderer. Real plotting backends live behind
//! [`Renderer`](crate::handlers::visualize::Renderer); this module only has
//! to recognize what they hand back.

use std::fmt;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Bmp,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Bmp => "image/bmp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Png => write!(f, "png"),
            ImageFormat::Bmp => write!(f, "bmp"),
        }
    }
}

/// Decoded image header + raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Recognize an image by its header. Returns `None` for anything that is not
/// a PNG or BMP we can read dimensions out of.
pub fn sniff(bytes: &[u8]) -> Option<ImageData> {
    if let Some((width, height)) = sniff_png(bytes) {
        return Some(ImageData {
            format: ImageFormat::Png,
            width,
            height,
            bytes: bytes.to_vec(),
        });
    }
    if let Some((width, height)) = sniff_bmp(bytes) {
        return Some(ImageData {
            format: ImageFormat::Bmp,
            width,
            height,
            bytes: bytes.to_vec(),
        });
    }
    None
}

/// PNG: 8-byte magic, then the IHDR chunk with big-endian width/height.
fn sniff_png(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || &bytes[..8] != PNG_MAGIC {
        return None;
    }
    if &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// BMP: "BM" magic, BITMAPINFOHEADER with little-endian i32 dimensions.
/// Height may be negative (top-down rows).
fn sniff_bmp(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 26 || &bytes[..2] != b"BM" {
        return None;
    }
    let width = i32::from_le_bytes(bytes[18..22].try_into().ok()?);
    let height = i32::from_le_bytes(bytes[22..26].try_into().ok()?);
    if width <= 0 || height == 0 {
        return None;
    }
    Some((width as u32, height.unsigned_abs()))
}

/// Encode an RGB pixel buffer (row-major, top-down, 3 bytes per pixel) as a
/// 24-bit uncompressed BMP.
pub fn encode_bmp(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    assert_eq!(pixels.len(), (width * height * 3) as usize);

    let row_bytes = (width * 3) as usize;
    let padding = (4 - row_bytes % 4) % 4;
    let image_size = (row_bytes + padding) * height as usize;
    let file_size = 54 + image_size;

    let mut out = Vec::with_capacity(file_size);
    // File header
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&(file_size as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&54u32.to_le_bytes());
    // BITMAPINFOHEADER
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(height as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(image_size as u32).to_le_bytes());
    out.extend_from_slice(&2835u32.to_le_bytes());
    out.extend_from_slice(&2835u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    // Pixel rows, bottom-up, BGR order
    for y in (0..height).rev() {
        for x in 0..width {
            let i = ((y * width + x) * 3) as usize;
            out.push(pixels[i + 2]);
            out.push(pixels[i + 1]);
            out.push(pixels[i]);
        }
        out.extend(std::iter::repeat_n(0u8, padding));
    }
    out
}
