/// Input raster image handling.
///
/// The pipeline consumes a plain decoded pixel buffer (interleaved 8-bit RGBA
/// or a single intensity channel) and never assumes any particular image
/// loading mechanism. Malformed input is the one condition that aborts an
/// analysis before the pipeline starts.
use anyhow::{bail, Result};

/// Pixel layout of a [`RasterImage`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Interleaved 8-bit R,G,B,A.
    Rgba8,
    /// Single 8-bit intensity channel.
    Luma8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelLayout::Rgba8 => 4,
            PixelLayout::Luma8 => 1,
        }
    }
}

/// An immutable input image. The pipeline only reads it.
#[derive(Debug, Clone)]
pub struct RasterImage {
    width: usize,
    height: usize,
    layout: PixelLayout,
    pixels: Vec<u8>,
}

/// Region of interest in full-image coordinates. Analysis of a crop returns
/// ROI-relative coordinates; the caller adds the ROI offset back.
#[derive(Debug, Clone, Copy)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl RasterImage {
    pub fn new(
        width: usize,
        height: usize,
        layout: PixelLayout,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("image has zero-sized dimension: {}x{}", width, height);
        }
        let expected = width * height * layout.bytes_per_pixel();
        if pixels.len() != expected {
            bail!(
                "pixel buffer size mismatch: expected {} bytes for {}x{} {:?}, got {}",
                expected,
                width,
                height,
                layout,
                pixels.len()
            );
        }
        Ok(Self {
            width,
            height,
            layout,
            pixels,
        })
    }

    pub fn from_rgba8(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelLayout::Rgba8, pixels)
    }

    pub fn from_luma8(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelLayout::Luma8, pixels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// R,G,B channels at (x, y). Luma images report the same value on all
    /// three channels.
    pub fn rgb_at(&self, x: usize, y: usize) -> (u8, u8, u8) {
        debug_assert!(x < self.width && y < self.height);
        match self.layout {
            PixelLayout::Rgba8 => {
                let i = (y * self.width + x) * 4;
                (self.pixels[i], self.pixels[i + 1], self.pixels[i + 2])
            }
            PixelLayout::Luma8 => {
                let v = self.pixels[y * self.width + x];
                (v, v, v)
            }
        }
    }

    /// Mean of R,G,B at (x, y), the brightness measure used for star
    /// localization.
    pub fn brightness_at(&self, x: usize, y: usize) -> f64 {
        let (r, g, b) = self.rgb_at(x, y);
        (r as f64 + g as f64 + b as f64) / 3.0
    }

    /// Extract a sub-image. The ROI must lie fully inside the image.
    pub fn crop(&self, roi: &Roi) -> Result<RasterImage> {
        if roi.width == 0 || roi.height == 0 {
            bail!("ROI has zero-sized dimension: {}x{}", roi.width, roi.height);
        }
        if roi.x + roi.width > self.width || roi.y + roi.height > self.height {
            bail!(
                "ROI {}x{}+{}+{} exceeds image bounds {}x{}",
                roi.width,
                roi.height,
                roi.x,
                roi.y,
                self.width,
                self.height
            );
        }

        let bpp = self.layout.bytes_per_pixel();
        let mut pixels = Vec::with_capacity(roi.width * roi.height * bpp);
        for y in roi.y..roi.y + roi.height {
            let start = (y * self.width + roi.x) * bpp;
            pixels.extend_from_slice(&self.pixels[start..start + roi.width * bpp]);
        }
        RasterImage::new(roi.width, roi.height, self.layout, pixels)
    }
}
