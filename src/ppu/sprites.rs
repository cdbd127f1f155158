//! Per-scanline sprite evaluation.
//!
//! OAM is scanned once in index order (starting at the rotation base when
//! priority rotation is on). At most 32 sprites are accepted per line, and
//! at most 34 8-pixel tile slivers are fetched for them. Both limits evict
//! the highest-index sprites first. Among accepted sprites the lower OAM
//! index always owns a pixel, whatever the sprites' priorities are.

use super::background::{decode_tile_row, BitDepth};
use super::memory::{OamEntry, VideoMemory, OAM_SPRITES};
use super::registers::PpuState;
use super::renderer::{LayerPixel, LayerRow};
use super::LineSpan;

pub const MAX_SPRITES_PER_LINE: usize = 32;
pub const MAX_TILES_PER_LINE: usize = 34;

/// (width, height) for the small and large size of each `$2101` preset.
const SPRITE_SIZES: [[(u16, u16); 2]; 8] = [
    [(8, 8), (16, 16)],
    [(8, 8), (32, 32)],
    [(8, 8), (64, 64)],
    [(16, 16), (32, 32)],
    [(16, 16), (64, 64)],
    [(32, 32), (64, 64)],
    [(16, 32), (32, 64)],
    [(16, 32), (32, 32)],
];

#[inline]
pub fn sprite_size(obj_size: u8, large: bool) -> (u16, u16) {
    SPRITE_SIZES[(obj_size & 7) as usize][large as usize]
}

/// Outcome of one line's evaluation, mirrored into `$213E`-style flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteLineStatus {
    pub sprites: u8,
    pub tiles: u8,
    /// More than 32 sprites were in range.
    pub range_over: bool,
    /// More than 34 tiles were needed.
    pub time_over: bool,
}

impl SpriteLineStatus {
    /// Bit 6 range over, bit 7 time over.
    pub fn status_bits(&self) -> u8 {
        (if self.range_over { 0x40 } else { 0 }) | (if self.time_over { 0x80 } else { 0 })
    }
}

pub struct SpriteEvaluator {
    accepted: [u8; OAM_SPRITES],
    count: usize,
}

impl Default for SpriteEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Row of `sprite` that lands on `line`, if any, handling Y wraparound.
#[inline]
fn sprite_row(entry: &OamEntry, height: u16, line: u16) -> Option<u16> {
    let row = line.wrapping_sub(entry.y as u16) & 0xFF;
    (row < height).then_some(row)
}

impl SpriteEvaluator {
    pub fn new() -> Self {
        Self {
            accepted: [0; OAM_SPRITES],
            count: 0,
        }
    }

    /// OAM indices accepted on the last evaluated line, in scan order.
    pub fn accepted(&self) -> &[u8] {
        &self.accepted[..self.count]
    }

    /// Evaluate `line` and fill `row` with sprite pixels.
    pub fn evaluate(
        &mut self,
        line: u16,
        state: &PpuState,
        mem: &VideoMemory,
        span: LineSpan,
        unlimited: bool,
        row: &mut LayerRow,
    ) -> SpriteLineStatus {
        row.clear(span.width);
        self.count = 0;
        let mut status = SpriteLineStatus::default();
        let first = if state.oam_priority_rotation {
            state.oam_first_sprite as usize
        } else {
            0
        };

        for step in 0..OAM_SPRITES {
            let index = (first + step) % OAM_SPRITES;
            let entry = mem.oam.entry(index);
            let (width, height) = sprite_size(state.obj_size, entry.large);
            if sprite_row(&entry, height, line).is_none() {
                continue;
            }
            // Sprites entirely outside the visible span never enter the range list.
            let left = entry.x as i32;
            if left + width as i32 <= span.origin || left >= span.end() {
                continue;
            }
            if self.count == MAX_SPRITES_PER_LINE && !unlimited {
                status.range_over = true;
                break;
            }
            self.accepted[self.count] = index as u8;
            self.count += 1;
        }
        status.sprites = self.count as u8;

        let mut tiles = 0usize;
        'sprites: for &index in &self.accepted[..self.count] {
            let entry = mem.oam.entry(index as usize);
            let (width, height) = sprite_size(state.obj_size, entry.large);
            let Some(mut y) = sprite_row(&entry, height, line) else {
                continue;
            };
            if entry.flip_y {
                y = flip_row(y, width, height);
            }
            let across = width / 8;
            for t in 0..across {
                let tile_x = entry.x as i32 + (t * 8) as i32;
                if tile_x + 8 <= span.origin || tile_x >= span.end() {
                    continue;
                }
                if tiles == MAX_TILES_PER_LINE && !unlimited {
                    status.time_over = true;
                    break 'sprites;
                }
                tiles += 1;

                let column = if entry.flip_x { across - 1 - t } else { t };
                let pixels = decode_tile_row(&mem.vram, tile_row_addr(state, &entry, column, y), BitDepth::Bpp4);
                let palette_base = 128 + entry.palette as u16 * 16;
                for i in 0..8 {
                    let px = pixels[if entry.flip_x { 7 - i } else { i }];
                    if px == 0 {
                        continue;
                    }
                    let col = tile_x + i as i32 - span.origin;
                    if col < 0 || col >= span.width as i32 {
                        continue;
                    }
                    let col = col as usize;
                    // Lower index was accepted first and keeps the pixel.
                    if row.get(col).opaque {
                        continue;
                    }
                    row.set(
                        col,
                        LayerPixel {
                            color: mem.cgram.color((palette_base + px as u16) as u8),
                            priority: entry.priority,
                            opaque: true,
                            math: entry.palette >= 4,
                        },
                    );
                }
            }
        }
        status.tiles = tiles.min(u8::MAX as usize) as u8;
        status
    }
}

/// Vertical flip of sprite row `y`. Rectangular presets flip each square
/// half in place instead of the whole sprite.
#[inline]
fn flip_row(y: u16, width: u16, height: u16) -> u16 {
    if height > width {
        if y < width {
            width - 1 - y
        } else {
            width + (width - 1 - (y - width))
        }
    } else {
        height - 1 - y
    }
}

/// VRAM word address of the 4bpp row for `column` (8-pixel units) and
/// sprite-relative line `y`.
fn tile_row_addr(state: &PpuState, entry: &OamEntry, column: u16, y: u16) -> u16 {
    let name = entry.tile & 0xFF;
    // Character rows wrap inside the 16x16 name grid.
    let row_part = ((name & 0xF0) + ((y / 8) << 4)) & 0xF0;
    let col_part = (name + column) & 0x0F;
    let tile = row_part | col_part;
    let table = if entry.tile & 0x100 != 0 {
        state.obj_name_base.wrapping_add(state.obj_name_gap)
    } else {
        state.obj_name_base
    };
    table
        .wrapping_add(tile * 16)
        .wrapping_add(y & 7)
}
