// THEORY:
// A `Raster` is the unit of work that crosses the channel: a width, a height
// and a flat RGBA byte buffer in row-major order. Pixel `(x, y)` starts at byte
// `4 * (y * width + x)`.
//
// Invariants:
// 1.  **Shape**: the buffer holds exactly `4 * width * height` bytes and both
//     dimensions are positive. `Raster::new` enforces this. A raster that
//     arrives through deserialization is trusted only after `validate`, which
//     the filter calls before touching the buffer.
// 2.  **Bounds**: coordinate accessors return `None` for anything outside the
//     raster instead of computing an offset that would land in another row.
// 3.  **Ownership**: a raster moves into a filter request and moves back out
//     with the response. Nothing in the engine keeps a copy.

use serde::{Deserialize, Serialize};

use crate::core_modules::pixel::pixel::{ALPHA_OFFSET, CHANNELS, Pixel};
use crate::errors::MaskError;

/// A width/height-tagged RGBA pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    /// Wraps an existing RGBA buffer, rejecting a mismatched shape.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, MaskError> {
        let raster = Self {
            width,
            height,
            data,
        };
        raster.validate()?;
        Ok(raster)
    }

    /// A raster with every pixel set to `pixel`.
    pub fn filled(width: u32, height: u32, pixel: Pixel) -> Result<Self, MaskError> {
        let len = Self::expected_len(width, height)?;
        let bytes: [u8; CHANNELS] = pixel.into();
        let data = bytes.iter().copied().cycle().take(len).collect();
        Self::new(width, height, data)
    }

    /// Byte length required for a `width` x `height` RGBA buffer.
    pub fn expected_len(width: u32, height: u32) -> Result<usize, MaskError> {
        if width == 0 || height == 0 {
            return Err(MaskError::EmptyRaster { width, height });
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(CHANNELS))
            .ok_or(MaskError::TooLarge { width, height })
    }

    /// Checks the shape invariant.
    pub fn validate(&self) -> Result<(), MaskError> {
        let expected = Self::expected_len(self.width, self.height)?;
        if self.data.len() != expected {
            return Err(MaskError::ShapeMismatch {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte offset of pixel `(x, y)`, or `None` outside the raster.
    pub fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        (offset + CHANNELS <= self.data.len()).then_some(offset)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        let offset = self.offset(x, y)?;
        let bytes: [u8; CHANNELS] = self.data[offset..offset + CHANNELS].try_into().ok()?;
        Some(Pixel::from(bytes))
    }

    /// Overwrites pixel `(x, y)`. Returns `false` when it is out of range.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) -> bool {
        match self.offset(x, y) {
            Some(offset) => {
                let bytes: [u8; CHANNELS] = pixel.into();
                self.data[offset..offset + CHANNELS].copy_from_slice(&bytes);
                true
            }
            None => false,
        }
    }

    pub fn alpha(&self, x: u32, y: u32) -> Option<u8> {
        self.offset(x, y).map(|offset| self.data[offset + ALPHA_OFFSET])
    }

    /// All pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.data
            .chunks_exact(CHANNELS)
            .map(|bytes| Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3]))
    }

    /// The alpha channel alone, one byte per pixel.
    pub fn alpha_channel(&self) -> Vec<u8> {
        self.data
            .chunks_exact(CHANNELS)
            .map(|bytes| bytes[ALPHA_OFFSET])
            .collect()
    }

    /// Decodes into an `image` buffer for encoding or display.
    pub fn into_rgba_image(self) -> Result<image::RgbaImage, MaskError> {
        self.validate()?;
        let (width, height) = self.dimensions();
        let actual = self.data.len();
        image::RgbaImage::from_raw(width, height, self.data).ok_or(MaskError::ShapeMismatch {
            width,
            height,
            expected: Self::expected_len(width, height)?,
            actual,
        })
    }
}

impl TryFrom<image::RgbaImage> for Raster {
    type Error = MaskError;

    fn try_from(image: image::RgbaImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        Raster::new(width, height, image.into_raw())
    }
}

impl TryFrom<&image::DynamicImage> for Raster {
    type Error = MaskError;

    fn try_from(image: &image::DynamicImage) -> Result<Self, Self::Error> {
        Raster::try_from(image.to_rgba8())
    }
}
