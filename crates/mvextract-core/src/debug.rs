use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut};
use tracing::{debug, info, warn};

use crate::video::{MotionVector, Retrieved};

const TEXT_SCALE: f32 = 20.0;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_LINE_HEIGHT: i32 = 22;
const ARROW_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Length of each arrowhead stroke in pixels.
const ARROW_HEAD: f32 = 3.0;

/// Renders decoded frames with their motion vectors drawn on top.
pub struct DebugRenderer {
    font: Option<FontVec>,
    draw_arrows: bool,
}

impl DebugRenderer {
    /// Without a usable font the text header is skipped.
    pub fn new(font_path: Option<&Path>, draw_arrows: bool) -> Self {
        let font = font_path.and_then(Self::load_font);
        Self { font, draw_arrows }
    }

    pub fn render(&self, retrieved: &Retrieved<'_>, frame_number: u64) -> Result<RgbImage> {
        let mut img = retrieved.frame.to_rgb_image()?;

        if self.draw_arrows {
            for mv in &retrieved.motion_vectors {
                draw_arrow(&mut img, mv);
            }
        }

        self.draw_text_overlay(&mut img, retrieved, frame_number);
        Ok(img)
    }

    /// Render and save as `frame-<n>.png` in `dir`.
    pub fn save_frame(
        &self,
        retrieved: &Retrieved<'_>,
        frame_number: u64,
        dir: &Path,
    ) -> Result<PathBuf> {
        let img = self.render(retrieved, frame_number)?;

        let path = dir.join(format!("frame-{frame_number:08}.png"));
        img.save(&path)
            .with_context(|| format!("failed to save debug frame to {}", path.display()))?;

        debug!(?path, "saved debug frame");
        Ok(path)
    }

    fn draw_text_overlay(&self, img: &mut RgbImage, retrieved: &Retrieved<'_>, frame_number: u64) {
        let Some(font) = &self.font else { return };
        let scale = PxScale::from(TEXT_SCALE);
        let x = 8;
        let mut y = 8;

        let header = format!("F:{} {}", frame_number, retrieved.frame_type);
        draw_text_mut(img, TEXT_COLOR, x, y, scale, font, &header);
        y += TEXT_LINE_HEIGHT;

        let time = format!("T:{:.6}", retrieved.timestamp);
        draw_text_mut(img, TEXT_COLOR, x, y, scale, font, &time);
        y += TEXT_LINE_HEIGHT;

        let vectors = format!("MV:{}", retrieved.motion_vectors.len());
        draw_text_mut(img, TEXT_COLOR, x, y, scale, font, &vectors);
    }

    fn load_font(path: &Path) -> Option<FontVec> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!(?path, error = %e, "failed to read font file");
                return None;
            }
        };
        match FontVec::try_from_vec(data) {
            Ok(font) => {
                info!(?path, "loaded debug font");
                Some(font)
            }
            Err(e) => {
                warn!(?path, error = %e, "failed to parse font file");
                None
            }
        }
    }
}

/// Arrow from the block's source position to its destination.
fn draw_arrow(img: &mut RgbImage, mv: &MotionVector) {
    let start = (mv.src_x as f32, mv.src_y as f32);
    let end = (mv.dst_x as f32, mv.dst_y as f32);
    draw_line_segment_mut(img, start, end, ARROW_COLOR);

    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length < f32::EPSILON {
        return;
    }

    // two strokes at +-30 degrees back from the tip
    let (ux, uy) = (dx / length, dy / length);
    let (sin, cos) = std::f32::consts::FRAC_PI_6.sin_cos();
    for side in [-1.0f32, 1.0] {
        let hx = -(ux * cos - side * uy * sin) * ARROW_HEAD;
        let hy = -(uy * cos + side * ux * sin) * ARROW_HEAD;
        draw_line_segment_mut(img, end, (end.0 + hx, end.1 + hy), ARROW_COLOR);
    }
}
