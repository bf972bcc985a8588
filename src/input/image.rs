//! Image codec contract, the built-in BMP encoder and the per-input cache

use deckhand_protocol::{ImageMode, PixelFormat, Rotation};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("pixel buffer holds {actual} bytes, {expected} expected")]
    BufferSize { expected: usize, actual: usize },

    #[error("image is {actual:?}, target expects {expected:?}")]
    SizeMismatch {
        expected: (u16, u16),
        actual: (u16, u16),
    },

    #[error("no encoder for {0:?} images")]
    UnsupportedFormat(PixelFormat),
}

/// Raw image, 3 bytes (R, G, B) per pixel, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: u16,
    height: u16,
    data: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: u16, height: u16, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(ImageError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Single-colour image
    pub fn filled(width: u16, height: u16, rgb: [u8; 3]) -> Self {
        let data = rgb.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u16, y: u16) -> [u8; 3] {
        let at = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[at], self.data[at + 1], self.data[at + 2]]
    }

    fn map(&self, width: u16, height: u16, source: impl Fn(u16, u16) -> (u16, u16)) -> RgbImage {
        let mut data = Vec::with_capacity(self.data.len());
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = source(x, y);
                data.extend_from_slice(&self.pixel(sx, sy));
            }
        }
        RgbImage {
            width,
            height,
            data,
        }
    }

    /// Rotate clockwise
    pub fn rotated(&self, rotation: Rotation) -> RgbImage {
        let (w, h) = (self.width, self.height);
        match rotation {
            Rotation::None => self.clone(),
            Rotation::Cw90 => self.map(h, w, |x, y| (y, h - 1 - x)),
            Rotation::Cw180 => self.map(w, h, |x, y| (w - 1 - x, h - 1 - y)),
            Rotation::Cw270 => self.map(h, w, |x, y| (w - 1 - y, x)),
        }
    }

    pub fn flipped(&self, horizontal: bool, vertical: bool) -> RgbImage {
        let (w, h) = (self.width, self.height);
        self.map(w, h, |x, y| {
            (
                if horizontal { w - 1 - x } else { x },
                if vertical { h - 1 - y } else { y },
            )
        })
    }
}

/// Turns a raw image into the bytes a device expects for `target`.
///
/// Resizing is the caller's job; implementations reject size mismatches.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, image: &RgbImage, target: &ImageMode) -> Result<Vec<u8>, ImageError>;
}

/// 24-bit uncompressed BMP encoder for the legacy models
#[derive(Debug, Clone, Copy, Default)]
pub struct BmpEncoder;

const BMP_HEADER_LEN: usize = 54;
const BMP_PIXELS_PER_METER: u32 = 2835;

impl ImageEncoder for BmpEncoder {
    fn encode(&self, image: &RgbImage, target: &ImageMode) -> Result<Vec<u8>, ImageError> {
        if target.format != PixelFormat::Bmp {
            return Err(ImageError::UnsupportedFormat(target.format));
        }

        let oriented = image
            .rotated(target.rotation)
            .flipped(target.flip_horizontal, target.flip_vertical);
        if (oriented.width, oriented.height) != (target.width, target.height) {
            return Err(ImageError::SizeMismatch {
                expected: (target.width, target.height),
                actual: (image.width, image.height),
            });
        }

        let (w, h) = (oriented.width as usize, oriented.height as usize);
        let row_len = (w * 3).div_ceil(4) * 4;
        let pixels_len = row_len * h;
        let file_len = BMP_HEADER_LEN + pixels_len;

        let mut out = Vec::with_capacity(file_len);
        out.extend_from_slice(b"BM");
        out.extend_from_slice(&(file_len as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(BMP_HEADER_LEN as u32).to_le_bytes());
        out.extend_from_slice(&40u32.to_le_bytes());
        out.extend_from_slice(&(w as i32).to_le_bytes());
        out.extend_from_slice(&(h as i32).to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&24u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(pixels_len as u32).to_le_bytes());
        out.extend_from_slice(&BMP_PIXELS_PER_METER.to_le_bytes());
        out.extend_from_slice(&BMP_PIXELS_PER_METER.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());

        // Bottom-up rows, BGR
        for y in (0..oriented.height).rev() {
            let start = out.len();
            for x in 0..oriented.width {
                let [r, g, b] = oriented.pixel(x, y);
                out.extend_from_slice(&[b, g, r]);
            }
            out.resize(start + row_len, 0);
        }
        Ok(out)
    }
}

// ── Cache ──────────────────────────────────────────────────────────

/// Bounded map of encoded images, evicting the oldest upload first
#[derive(Debug)]
pub struct ImageCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, Arc<[u8]>>,
}

impl ImageCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Store `bytes` under `key`, returning the evicted key if any.
    ///
    /// Re-uploading a key replaces it and makes it the newest entry.
    pub fn insert(&mut self, key: &str, bytes: Arc<[u8]>) -> Option<String> {
        if self.entries.insert(key.to_string(), bytes).is_some() {
            self.order.retain(|k| k != key);
        }
        self.order.push_back(key.to_string());

        if self.order.len() > self.capacity {
            let evicted = self.order.pop_front()?;
            self.entries.remove(&evicted);
            return Some(evicted);
        }
        None
    }

    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
