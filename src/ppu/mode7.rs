//! Mode 7 affine background.
//!
//! The scanline start position is latched from the matrix, center and scroll
//! registers when the line begins; each pixel then steps by (A, C).

use super::background::direct_color;
use super::memory::{VideoMemory, Vram};
use super::registers::{sign_extend_13, LayerMask, Mode7Repeat, Mode7State, PpuState};
use super::renderer::{LayerPixel, LayerRow};
use super::LineSpan;

/// Affine start point for one scanline, in 1/256 playfield pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode7Line {
    pub start_x: i32,
    pub start_y: i32,
}

// Scroll-minus-center keeps 10 bits of magnitude with the sign taken from bit 13.
#[inline]
fn clip_offset(value: i32) -> i32 {
    if value & 0x2000 != 0 {
        value | !0x3FF
    } else {
        value & 0x3FF
    }
}

impl Mode7Line {
    pub fn latch(m7: &Mode7State, y: u16) -> Self {
        let hscroll = sign_extend_13(m7.hscroll);
        let vscroll = sign_extend_13(m7.vscroll);
        let cx = sign_extend_13(m7.center_x);
        let cy = sign_extend_13(m7.center_y);
        let (a, b, c, d) = (m7.a as i32, m7.b as i32, m7.c as i32, m7.d as i32);

        let dh = clip_offset(hscroll - cx);
        let dv = clip_offset(vscroll - cy);
        let ry = if m7.flip_y { 255 - y as i32 } else { y as i32 };

        // The hardware multiplier drops the low 6 bits of each product.
        let start_x = ((a * dh) & !63) + ((b * ry) & !63) + ((b * dv) & !63) + (cx << 8);
        let start_y = ((c * dh) & !63) + ((d * ry) & !63) + ((d * dv) & !63) + (cy << 8);
        Self { start_x, start_y }
    }

    /// Playfield coordinate sampled at screen column `x`.
    #[inline]
    pub fn sample(&self, m7: &Mode7State, x: i32) -> (i32, i32) {
        let rx = if m7.flip_x { 255 - x } else { x };
        (
            (self.start_x + m7.a as i32 * rx) >> 8,
            (self.start_y + m7.c as i32 * rx) >> 8,
        )
    }
}

/// 8-bit pixel at playfield position, honoring the repeat mode.
#[inline]
pub fn fetch_pixel(vram: &Vram, repeat: Mode7Repeat, px: i32, py: i32) -> u8 {
    let outside = !(0..1024).contains(&px) || !(0..1024).contains(&py);
    let (x, y) = (px & 0x3FF, py & 0x3FF);
    let tile = match (outside, repeat) {
        (true, Mode7Repeat::Transparent) => return 0,
        (true, Mode7Repeat::Tile0) => 0,
        _ => vram.word(((y >> 3) * 128 + (x >> 3)) as u16) & 0xFF,
    };
    (vram.word(tile * 64 + ((y & 7) * 8 + (x & 7)) as u16) >> 8) as u8
}

/// Render BG1 (and BG2 when EXTBG is on) for one scanline.
pub fn render_line(
    line: u16,
    mosaic_line: u16,
    state: &PpuState,
    mem: &VideoMemory,
    span: LineSpan,
    bg1: &mut LayerRow,
    bg2: Option<&mut LayerRow>,
) {
    bg1.clear(span.width);
    let m7 = &state.mode7;
    let mosaic_size = state.mosaic_size as i32;
    let bg1_mosaic = mosaic_size > 1 && state.mosaic_layers.contains(LayerMask::BG1);
    let bg2_mosaic = mosaic_size > 1 && state.mosaic_layers.contains(LayerMask::BG2);
    let latched = Mode7Line::latch(m7, if bg1_mosaic { mosaic_line } else { line });
    let direct = state.color_math.direct_color;

    for (col, out) in bg1.pixels_mut().iter_mut().enumerate() {
        let mut x = span.origin + col as i32;
        if bg1_mosaic {
            x -= x.rem_euclid(mosaic_size);
        }
        let (px, py) = latched.sample(m7, x);
        let pixel = fetch_pixel(&mem.vram, m7.repeat, px, py);
        if pixel == 0 {
            continue;
        }
        *out = LayerPixel {
            color: if direct {
                direct_color(pixel, 0)
            } else {
                mem.cgram.color(pixel)
            },
            priority: 0,
            opaque: true,
            math: true,
        };
    }

    let Some(bg2) = bg2 else {
        return;
    };
    bg2.clear(span.width);
    // Vertical mosaic for both layers follows BG1's enable.
    let latched = Mode7Line::latch(m7, if bg1_mosaic { mosaic_line } else { line });
    for (col, out) in bg2.pixels_mut().iter_mut().enumerate() {
        let mut x = span.origin + col as i32;
        if bg2_mosaic {
            x -= x.rem_euclid(mosaic_size);
        }
        let (px, py) = latched.sample(m7, x);
        let pixel = fetch_pixel(&mem.vram, m7.repeat, px, py);
        if pixel & 0x7F == 0 {
            continue;
        }
        *out = LayerPixel {
            color: mem.cgram.color(pixel & 0x7F),
            priority: pixel >> 7,
            opaque: true,
            math: true,
        };
    }
}
