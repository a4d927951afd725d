use std::fmt;

use anyhow::{Context, Result};
use image::RgbImage;

use super::motion::MotionVector;

/// Bytes per pixel of the converted output (packed RGB24).
pub const BYTES_PER_PIXEL: usize = 3;

/// Picture type of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameType {
    /// Intra-coded.
    I,
    /// Predicted from past frames.
    P,
    /// Predicted from past and future frames.
    B,
    /// S(GMC)-VOP.
    S,
    /// Switching intra.
    Si,
    /// Switching predicted.
    Sp,
    /// BI type.
    Bi,
    #[default]
    Unknown,
}

impl FrameType {
    /// Diagnostic character of the picture type, `?` when unknown.
    pub fn as_char(self) -> char {
        match self {
            FrameType::I => 'I',
            FrameType::P => 'P',
            FrameType::B => 'B',
            FrameType::S => 'S',
            FrameType::Si => 'i',
            FrameType::Sp => 'p',
            FrameType::Bi => 'b',
            FrameType::Unknown => '?',
        }
    }

    pub fn is_intra(self) -> bool {
        matches!(self, FrameType::I | FrameType::Si)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A converted pixel plane as handed out by a converter.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes per row, including any alignment padding.
    pub stride: usize,
}

/// The display region of the most recently converted frame.
///
/// Borrows the session's conversion buffer: the next `grab`, `retrieve` or
/// `release` invalidates it, which the borrow checker enforces. Use
/// [`FrameView::to_rgb_image`] to keep a copy.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    stride: usize,
    width: u32,
    height: u32,
}

impl<'a> FrameView<'a> {
    /// Returns None if `plane` cannot hold `width x height` packed pixels.
    pub(crate) fn new(plane: Plane<'a>, width: u32, height: u32) -> Option<Self> {
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        if plane.stride < row_bytes || plane.data.len() < required_len(plane.stride, width, height) {
            return None;
        }
        Some(Self {
            data: plane.data,
            stride: plane.stride,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Packed pixels of row `y`, without padding.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * BYTES_PER_PIXEL]
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = x as usize * BYTES_PER_PIXEL;
        let row = self.row(y);
        [row[offset], row[offset + 1], row[offset + 2]]
    }

    /// Copy the view into an owned image.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let mut pixels =
            Vec::with_capacity(self.width as usize * self.height as usize * BYTES_PER_PIXEL);
        for y in 0..self.height {
            pixels.extend_from_slice(self.row(y));
        }
        RgbImage::from_raw(self.width, self.height, pixels)
            .context("failed to create RgbImage from converted frame")
    }
}

pub(crate) fn required_len(stride: usize, width: u32, height: u32) -> usize {
    if height == 0 {
        return 0;
    }
    (height as usize - 1) * stride + width as usize * BYTES_PER_PIXEL
}

/// Output of a successful `retrieve`.
#[derive(Debug)]
pub struct Retrieved<'a> {
    pub frame: FrameView<'a>,
    /// Freshly allocated for every call; empty for intra-coded frames.
    pub motion_vectors: Vec<MotionVector>,
    pub frame_type: FrameType,
    /// Unix time computed when the frame was grabbed.
    pub timestamp: f64,
}
