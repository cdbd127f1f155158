//! Per-scanline window masks.
//!
//! Window registers can change between scanlines, so the six masks
//! (BG1-BG4, OBJ, color) are resolved once per line into lookup rows and the
//! compositor only indexes them.

use super::registers::{PpuState, WindowMask, WindowRange};
use super::{LineSpan, MAX_LINE_WIDTH};

pub const WINDOW_SOURCES: usize = 6;

pub struct WindowLuts {
    inside: [[bool; MAX_LINE_WIDTH]; WINDOW_SOURCES],
    active: [bool; WINDOW_SOURCES],
}

impl Default for WindowLuts {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether screen column `x` lies inside the combined window for `mask`.
/// Columns outside 0..=255 (widescreen padding) are outside both windows.
#[inline]
pub fn window_state(mask: &WindowMask, w1: &WindowRange, w2: &WindowRange, x: i32) -> bool {
    mask.resolve(w1.contains(x), w2.contains(x))
}

impl WindowLuts {
    pub fn new() -> Self {
        Self {
            inside: [[false; MAX_LINE_WIDTH]; WINDOW_SOURCES],
            active: [false; WINDOW_SOURCES],
        }
    }

    pub fn prepare(&mut self, state: &PpuState, span: LineSpan) {
        for (source, mask) in state.window_masks.iter().enumerate() {
            let row = &mut self.inside[source];
            self.active[source] = mask.is_active();
            if !mask.is_active() {
                row[..span.width].fill(false);
                continue;
            }
            for (col, slot) in row[..span.width].iter_mut().enumerate() {
                *slot = window_state(mask, &state.window1, &state.window2, span.origin + col as i32);
            }
        }
    }

    #[inline]
    pub fn inside(&self, source: usize, col: usize) -> bool {
        self.active[source] && self.inside[source][col]
    }
}
