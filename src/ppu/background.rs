//! Tiled background layers (modes 0-6).

use super::memory::{Cgram, VideoMemory, Vram};
use super::registers::{BgLayer, LayerMask, PpuState};
use super::renderer::{LayerPixel, LayerRow};
use super::LineSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Bpp2,
    Bpp4,
    Bpp8,
}

impl BitDepth {
    #[inline]
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Bpp2 => 2,
            BitDepth::Bpp4 => 4,
            BitDepth::Bpp8 => 8,
        }
    }

    /// Words occupied by one 8x8 tile.
    #[inline]
    pub fn tile_words(self) -> u16 {
        self.bits() * 4
    }
}

const NO_LAYER: Option<BitDepth> = None;
const B2: Option<BitDepth> = Some(BitDepth::Bpp2);
const B4: Option<BitDepth> = Some(BitDepth::Bpp4);
const B8: Option<BitDepth> = Some(BitDepth::Bpp8);

const DEPTHS: [[Option<BitDepth>; 4]; 8] = [
    [B2, B2, B2, B2],
    [B4, B4, B2, NO_LAYER],
    [B4, B4, NO_LAYER, NO_LAYER],
    [B8, B4, NO_LAYER, NO_LAYER],
    [B8, B2, NO_LAYER, NO_LAYER],
    [B4, B2, NO_LAYER, NO_LAYER],
    [B4, NO_LAYER, NO_LAYER, NO_LAYER],
    // Mode 7 has its own fetch path.
    [NO_LAYER, NO_LAYER, NO_LAYER, NO_LAYER],
];

/// Bit depth of `layer` in `mode`, or `None` when the mode does not show it.
pub fn bit_depth(mode: u8, layer: usize) -> Option<BitDepth> {
    DEPTHS[(mode & 7) as usize][layer & 3]
}

fn uses_offset_per_tile(mode: u8) -> bool {
    matches!(mode & 7, 2 | 4 | 6)
}

/// Unpack one planar tile row into eight palette indices, leftmost first.
pub fn decode_tile_row(vram: &Vram, row_addr: u16, depth: BitDepth) -> [u8; 8] {
    let mut out = [0u8; 8];
    for pair in 0..depth.bits() / 2 {
        let word = vram.word(row_addr.wrapping_add(pair * 8));
        let (lo, hi) = (word as u8, (word >> 8) as u8);
        let shift = (pair * 2) as u32;
        for (i, px) in out.iter_mut().enumerate() {
            let bit = 7 - i as u32;
            *px |= ((lo >> bit) & 1) << shift;
            *px |= ((hi >> bit) & 1) << (shift + 1);
        }
    }
    out
}

/// Direct color: the 8-bit pixel plus the tile's palette bits form BGR555.
#[inline]
pub fn direct_color(pixel: u8, palette: u8) -> u16 {
    let p = pixel as u16;
    let pal = palette as u16;
    let r = ((p & 0x07) << 2) | ((pal & 1) << 1);
    let g = (((p >> 3) & 0x07) << 2) | (pal & 2);
    let b = (((p >> 6) & 0x03) << 3) | (pal & 4);
    r | (g << 5) | (b << 10)
}

/// Tilemap word address for world position (x, y).
fn tilemap_addr(bg: &BgLayer, x: i32, y: i32, wide_tiles: bool) -> u16 {
    let (bits_x, high_x) = if wide_tiles { (4, 0x200) } else { (3, 0x100) };
    let (bits_y, high_y) = if bg.large_tiles { (4, 0x200) } else { (3, 0x100) };
    let index = (((y >> bits_y) & 0x1F) << 5) | ((x >> bits_x) & 0x1F);
    let mut addr = bg.tilemap_base.wrapping_add(index as u16);
    if x & high_x != 0 && bg.screen_size.wide() {
        addr = addr.wrapping_add(0x400);
    }
    if y & high_y != 0 && bg.screen_size.tall() {
        addr = addr.wrapping_add(if bg.screen_size.wide() { 0x800 } else { 0x400 });
    }
    addr
}

/// BG3 tilemap entry used as the scroll override for `column`.
fn offset_value(state: &PpuState, vram: &Vram, column: i32, row: i32) -> u16 {
    let bg3 = &state.layers[2];
    let x = (column * 8 + bg3.hscroll as i32) & 0x3FF;
    let y = (row * 8 + bg3.vscroll as i32) & 0x3FF;
    vram.word(tilemap_addr(bg3, x, y, bg3.large_tiles))
}

/// Apply offset-per-tile to world coordinates of BG1/BG2.
fn apply_offset_per_tile(state: &PpuState, vram: &Vram, layer: usize, x: &mut i32, y: &mut i32) {
    let mode = state.bg_mode & 7;
    let bg = &state.layers[layer];
    let column = if mode == 6 {
        ((*x - (*x & 0xF)) - ((bg.hscroll as i32 * 2) & 0xFFF0)) >> 4
    } else {
        ((*x - (*x & 0x7)) - (bg.hscroll as i32 & 0xFFF8)) >> 3
    };
    // The leftmost column never takes an override.
    if column <= 0 {
        return;
    }
    let valid = if layer == 0 { 0x2000 } else { 0x4000 };
    let mut h = offset_value(state, vram, column - 1, 0);
    let mut v = 0;
    if mode == 4 {
        if h & 0x8000 != 0 {
            v = h;
            h = 0;
        }
    } else {
        v = offset_value(state, vram, column - 1, 1);
    }
    if h & valid != 0 {
        let base = (h & 0x3F8) as i32 + column * 8;
        *x = if mode == 6 {
            (base * 2) | (*x & 0xF)
        } else {
            base | (*x & 0x7)
        };
    }
    if v & valid != 0 {
        *y = (v & 0x3FF) as i32 + (*y - bg.vscroll as i32);
    }
}

/// Small single-entry cache for the last decoded tile row.
struct RowCache {
    addr: Option<u16>,
    pixels: [u8; 8],
}

impl RowCache {
    fn fetch(&mut self, vram: &Vram, addr: u16, depth: BitDepth) -> &[u8; 8] {
        if self.addr != Some(addr) {
            self.pixels = decode_tile_row(vram, addr, depth);
            self.addr = Some(addr);
        }
        &self.pixels
    }
}

fn resolve_color(
    cgram: &Cgram,
    depth: BitDepth,
    direct: bool,
    palette_base: u16,
    palette: u8,
    pixel: u8,
) -> u16 {
    match depth {
        BitDepth::Bpp8 if direct => direct_color(pixel, palette),
        BitDepth::Bpp8 => cgram.color(pixel),
        BitDepth::Bpp4 => cgram.color(((palette as u16) * 16 + pixel as u16) as u8),
        BitDepth::Bpp2 => cgram.color((palette_base + (palette as u16) * 4 + pixel as u16) as u8),
    }
}

/// Render one scanline of background `layer` into `row`.
///
/// `mosaic_line` is the first line of the current vertical mosaic block;
/// it is only used when mosaic is enabled for the layer. Modes 5 and 6 are
/// sampled at the even hires column so the row stays 256 pixels wide.
pub fn render_line(
    layer: usize,
    line: u16,
    mosaic_line: u16,
    state: &PpuState,
    mem: &VideoMemory,
    span: LineSpan,
    row: &mut LayerRow,
) {
    row.clear(span.width);
    let Some(depth) = bit_depth(state.bg_mode, layer) else {
        return;
    };
    let mode = state.bg_mode & 7;
    let bg = &state.layers[layer];
    let hires = mode == 5 || mode == 6;
    let wide_tiles = bg.large_tiles || hires;
    let mosaic = state.mosaic_size > 1 && state.mosaic_layers.contains(LayerMask::bg(layer));
    let mosaic_size = state.mosaic_size as i32;
    let screen_y = (if mosaic { mosaic_line } else { line }) as i32;
    let opt = uses_offset_per_tile(mode) && layer < 2;
    let palette_base = if mode == 0 { layer as u16 * 32 } else { 0 };
    let direct = state.color_math.direct_color;
    let vram = &mem.vram;

    let mut cache = RowCache {
        addr: None,
        pixels: [0; 8],
    };

    for (col, out) in row.pixels_mut().iter_mut().enumerate() {
        let mut sx = span.origin + col as i32;
        if mosaic {
            sx -= sx.rem_euclid(mosaic_size);
        }
        let mut x = sx + bg.hscroll as i32;
        if hires {
            x *= 2;
        }
        let mut y = screen_y + bg.vscroll as i32;
        if opt {
            apply_offset_per_tile(state, vram, layer, &mut x, &mut y);
        }
        let (x, y) = (x & 0x3FF, y & 0x3FF);

        let entry = vram.word(tilemap_addr(bg, x, y, wide_tiles));
        let flip_x = entry & 0x4000 != 0;
        let flip_y = entry & 0x8000 != 0;
        let mut tile = entry & 0x3FF;
        if wide_tiles && ((x & 8 != 0) != flip_x) {
            tile += 1;
        }
        if bg.large_tiles && ((y & 8 != 0) != flip_y) {
            tile += 0x10;
        }
        let fine_y = (if flip_y { 7 - (y & 7) } else { y & 7 }) as u16;
        let fine_x = (if flip_x { 7 - (x & 7) } else { x & 7 }) as usize;
        let row_addr = bg
            .chr_base
            .wrapping_add((tile & 0x3FF) * depth.tile_words())
            .wrapping_add(fine_y);

        let pixel = cache.fetch(vram, row_addr, depth)[fine_x];
        if pixel == 0 {
            continue;
        }
        let palette = ((entry >> 10) & 7) as u8;
        *out = LayerPixel {
            color: resolve_color(&mem.cgram, depth, direct, palette_base, palette, pixel),
            priority: ((entry >> 13) & 1) as u8,
            opaque: true,
            math: true,
        };
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ppu::registers::ScreenSize;

    /// Write a solid 8x8 tile of `index` at `chr_base` + tile.
    pub(crate) fn solid_tile(mem: &mut VideoMemory, chr_base: u16, tile: u16, depth: BitDepth, index: u8) {
        let base = chr_base as usize + (tile * depth.tile_words()) as usize;
        for pair in 0..depth.bits() as usize / 2 {
            let lo = if index & (1 << (pair * 2)) != 0 { 0xFF } else { 0 };
            let hi = if index & (1 << (pair * 2 + 1)) != 0 { 0xFF } else { 0 };
            for r in 0..8 {
                mem.vram
                    .write_word(base + pair * 8 + r, lo | (hi << 8))
                    .unwrap();
            }
        }
    }

    fn span256() -> LineSpan {
        LineSpan {
            origin: 0,
            width: 256,
        }
    }

    #[test]
    fn decode_planar_rows() {
        let mut vram = Vram::new();
        // plane0 = 1000_0001, plane1 = 1000_0000
        vram.write_word(0, 0x8081).unwrap();
        let px = decode_tile_row(&vram, 0, BitDepth::Bpp2);
        assert_eq!(px, [3, 0, 0, 0, 0, 0, 0, 1]);

        // 4bpp adds planes 2/3 eight words later.
        vram.write_word(8, 0x0100).unwrap();
        let px = decode_tile_row(&vram, 0, BitDepth::Bpp4);
        assert_eq!(px, [3, 0, 0, 0, 0, 0, 0, 1 | 8]);
    }

    #[test]
    fn depth_table_covers_all_modes() {
        assert_eq!(bit_depth(0, 3), Some(BitDepth::Bpp2));
        assert_eq!(bit_depth(1, 2), Some(BitDepth::Bpp2));
        assert_eq!(bit_depth(1, 3), None);
        assert_eq!(bit_depth(3, 0), Some(BitDepth::Bpp8));
        assert_eq!(bit_depth(7, 0), None);
        assert_eq!(bit_depth(0xFF, 0), None);
    }

    #[test]
    fn direct_color_bits() {
        // Full intensity tops out at (30, 30, 28).
        assert_eq!(direct_color(0xFF, 7), 30 | (30 << 5) | (28 << 10));
        assert_eq!(direct_color(0x07, 0), 0x1C);
        assert_eq!(direct_color(0, 1), 0x02);
    }

    #[test]
    fn transparent_index_is_not_opaque() {
        let mut state = PpuState::new();
        state.bg_mode = 1;
        state.layers[0].chr_base = 0x1000;
        let mem = VideoMemory::new();
        let mut row = LayerRow::new();
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        assert!(row.pixels().iter().all(|p| !p.opaque));
    }

    #[test]
    fn horizontal_scroll_wraps_around_the_tilemap() {
        let mut state = PpuState::new();
        state.bg_mode = 1;
        state.layers[0].chr_base = 0x1000;
        state.layers[0].tilemap_base = 0x0000;
        state.layers[0].hscroll = 252;
        let mut mem = VideoMemory::new();
        mem.cgram.write(1, 0x001F).unwrap();
        solid_tile(&mut mem, 0x1000, 1, BitDepth::Bpp4, 1);
        // Entry (0, 0) uses tile 1; everything else is the empty tile 0.
        mem.vram.write_word(0, 1).unwrap();

        let mut row = LayerRow::new();
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        let opaque: Vec<usize> = (0..256).filter(|&c| row.get(c).opaque).collect();
        assert_eq!(opaque, (4..12).collect::<Vec<_>>());
        assert_eq!(row.get(4).color, 0x001F);
    }

    #[test]
    fn wide_map_uses_second_screen() {
        let mut state = PpuState::new();
        state.bg_mode = 1;
        state.layers[0].chr_base = 0x1000;
        state.layers[0].screen_size = ScreenSize::Map64x32;
        state.layers[0].hscroll = 256;
        let mut mem = VideoMemory::new();
        mem.cgram.write(2, 0x03E0).unwrap();
        solid_tile(&mut mem, 0x1000, 1, BitDepth::Bpp4, 2);
        // First entry of the right-hand screen.
        mem.vram.write_word(0x400, 1).unwrap();
        let mut row = LayerRow::new();
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        assert!(row.get(0).opaque && row.get(7).opaque);
        assert!(!row.get(8).opaque);
    }

    #[test]
    fn large_tiles_select_flipped_subtiles() {
        let mut state = PpuState::new();
        state.bg_mode = 1;
        state.layers[0].chr_base = 0x1000;
        state.layers[0].large_tiles = true;
        let mut mem = VideoMemory::new();
        for (i, color) in [0x001Fu16, 0x03E0].iter().enumerate() {
            mem.cgram.write(i + 1, *color).unwrap();
        }
        // Tile 4 is the top-left quarter, tile 5 the top-right.
        solid_tile(&mut mem, 0x1000, 4, BitDepth::Bpp4, 1);
        solid_tile(&mut mem, 0x1000, 5, BitDepth::Bpp4, 2);

        mem.vram.write_word(0, 4).unwrap();
        let mut row = LayerRow::new();
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        assert_eq!(row.get(0).color, 0x001F);
        assert_eq!(row.get(8).color, 0x03E0);

        // Horizontal flip swaps the halves.
        mem.vram.write_word(0, 4 | 0x4000).unwrap();
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        assert_eq!(row.get(0).color, 0x03E0);
        assert_eq!(row.get(15).color, 0x001F);
    }

    #[test]
    fn mode0_palettes_are_banked_per_layer() {
        let mut state = PpuState::new();
        state.bg_mode = 0;
        state.layers[2].chr_base = 0x1000;
        state.layers[2].tilemap_base = 0x0800;
        let mut mem = VideoMemory::new();
        mem.cgram.write(64 + 4 + 3, 0x1234).unwrap();
        solid_tile(&mut mem, 0x1000, 1, BitDepth::Bpp2, 3);
        mem.vram.write_word(0x0800, 1 | (1 << 10)).unwrap();
        let mut row = LayerRow::new();
        render_line(2, 0, 0, &state, &mem, span256(), &mut row);
        assert_eq!(row.get(0).color, 0x1234);
    }

    #[test]
    fn horizontal_mosaic_repeats_block_origin() {
        let mut state = PpuState::new();
        state.bg_mode = 1;
        state.layers[0].chr_base = 0x1000;
        state.mosaic_size = 4;
        state.mosaic_layers = LayerMask::BG1;
        let mut mem = VideoMemory::new();
        // Alternate two tiles so the unmosaiced row changes every 8 pixels,
        // and give tile 1 a one-pixel stripe at column 0.
        mem.cgram.write(1, 0x001F).unwrap();
        mem.vram.write_word(0x1000 + 16, 0x0080).unwrap();
        for i in 0..32 {
            mem.vram.write_word(i, 1).unwrap();
        }
        let mut row = LayerRow::new();
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        for block in 0..64 {
            let first = row.get(block * 4);
            for col in block * 4..block * 4 + 4 {
                assert_eq!(row.get(col), first, "col {}", col);
            }
        }
        assert!(row.get(0).opaque && row.get(3).opaque);
        assert!(!row.get(4).opaque);
    }

    #[test]
    fn offset_per_tile_overrides_column_scroll() {
        let mut state = PpuState::new();
        state.bg_mode = 2;
        state.layers[0].chr_base = 0x1000;
        state.layers[0].tilemap_base = 0x0000;
        state.layers[2].tilemap_base = 0x0800;
        let mut mem = VideoMemory::new();
        mem.cgram.write(1, 0x7C00).unwrap();
        solid_tile(&mut mem, 0x1000, 1, BitDepth::Bpp4, 1);
        // BG1 map: only world column 10 holds tile 1.
        mem.vram.write_word(10, 1).unwrap();
        // BG3 row 0 column 0 -> override for screen column 1: h = 72, valid for BG1.
        mem.vram.write_word(0x0800, 0x2000 | 72).unwrap();

        let mut row = LayerRow::new();
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        // Screen column 1 reads world x = 72 + 8 = 80 -> map column 10.
        assert!(row.get(8).opaque && row.get(15).opaque);
        assert!(!row.get(0).opaque && !row.get(16).opaque);
        // Without the override, map column 10 appears at screen x 80.
        assert!(row.get(80).opaque);
    }

    #[test]
    fn mode4_offset_uses_bit15_to_pick_vertical() {
        let mut state = PpuState::new();
        state.bg_mode = 4;
        state.layers[1].chr_base = 0x1000;
        state.layers[1].tilemap_base = 0x0000;
        state.layers[2].tilemap_base = 0x0800;
        let mut mem = VideoMemory::new();
        mem.cgram.write(1, 0x001F).unwrap();
        solid_tile(&mut mem, 0x1000, 1, BitDepth::Bpp2, 1);

        // Horizontal variant: BG2 column 1 reads world x = 72 + 8.
        mem.vram.write_word(10, 1).unwrap();
        mem.vram.write_word(0x0800, 0x4000 | 72).unwrap();
        let mut row = LayerRow::new();
        render_line(1, 0, 0, &state, &mem, span256(), &mut row);
        assert!(row.get(8).opaque && row.get(15).opaque);
        assert!(!row.get(16).opaque);

        // Bit 15 turns the same entry into a vertical offset of 8 lines.
        mem.vram.write_word(10, 0).unwrap();
        mem.vram.write_word(32 + 1, 1).unwrap();
        mem.vram.write_word(0x0800, 0x8000 | 0x4000 | 8).unwrap();
        render_line(1, 0, 0, &state, &mem, span256(), &mut row);
        assert!(row.get(8).opaque && row.get(15).opaque);
        assert!(!row.get(0).opaque && !row.get(16).opaque);

        // BG1 ignores entries marked valid only for BG2.
        state.layers[0].chr_base = 0x2000;
        solid_tile(&mut mem, 0x2000, 1, BitDepth::Bpp8, 1);
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        assert!(!row.get(8).opaque);
    }

    #[test]
    fn mode6_offset_steps_in_16_pixel_columns() {
        let mut state = PpuState::new();
        state.bg_mode = 6;
        state.layers[0].chr_base = 0x1000;
        state.layers[0].tilemap_base = 0x0000;
        state.layers[2].tilemap_base = 0x0800;
        let mut mem = VideoMemory::new();
        mem.cgram.write(1, 0x7C00).unwrap();
        solid_tile(&mut mem, 0x1000, 1, BitDepth::Bpp4, 1);
        solid_tile(&mut mem, 0x1000, 2, BitDepth::Bpp4, 1);
        // Hires world column 10 is 16 pixels wide: screen x 80..87 unscrolled.
        mem.vram.write_word(10, 1).unwrap();
        mem.vram.write_word(0x0800, 0x2000 | 72).unwrap();

        let mut row = LayerRow::new();
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        assert!((8..16).all(|c| row.get(c).opaque));
        assert!(!row.get(7).opaque && !row.get(16).opaque);
        assert!((80..88).all(|c| row.get(c).opaque));
    }

    #[test]
    fn hires_modes_sample_even_columns_of_wide_tiles() {
        for mode in [5u8, 6] {
            let mut state = PpuState::new();
            state.bg_mode = mode;
            state.layers[0].chr_base = 0x1000;
            state.layers[0].tilemap_base = 0x0000;
            let mut mem = VideoMemory::new();
            mem.cgram.write(1, 0x001F).unwrap();
            mem.cgram.write(2, 0x03E0).unwrap();
            // Tile 1 row 0: only even pixels are set.
            mem.vram.write_word(0x1000 + 16, 0x00AA).unwrap();
            solid_tile(&mut mem, 0x1000, 2, BitDepth::Bpp4, 2);
            mem.vram.write_word(0, 1).unwrap();

            let mut row = LayerRow::new();
            render_line(0, 0, 0, &state, &mem, span256(), &mut row);
            assert!((0..4).all(|c| row.get(c).color == 0x001F && row.get(c).opaque), "mode {}", mode);
            assert!((4..8).all(|c| row.get(c).color == 0x03E0), "mode {}", mode);
            assert!(!row.get(8).opaque, "mode {}", mode);
        }
    }

    #[test]
    fn direct_color_applies_to_8bpp_layers() {
        let mut state = PpuState::new();
        state.bg_mode = 3;
        state.layers[0].chr_base = 0x1000;
        state.layers[0].tilemap_base = 0x0000;
        let mut mem = VideoMemory::new();
        mem.cgram.write(0xFF, 0x1111).unwrap();
        solid_tile(&mut mem, 0x1000, 1, BitDepth::Bpp8, 0xFF);
        mem.vram.write_word(0, 1 | (7 << 10)).unwrap();

        let mut row = LayerRow::new();
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        assert_eq!(row.get(0).color, 0x1111);

        state.color_math.direct_color = true;
        render_line(0, 0, 0, &state, &mem, span256(), &mut row);
        assert_eq!(row.get(0).color, direct_color(0xFF, 7));
        // BG2 in mode 3 is 4bpp and stays on CGRAM.
        assert_eq!(bit_depth(3, 1), Some(BitDepth::Bpp4));
    }
}
