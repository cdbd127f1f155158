//! Priority resolution and final pixel output.
//!
//! Each layer renders into a `LayerRow`; `merge_layer` offers its opaque
//! pixels to the main and sub `PixelPriorityBuffer`s using the per-mode
//! z-rank table, and `composite_line` turns the two buffers into ARGB.

use super::registers::{
    LayerMask, MathOp, PpuState, COLOR_WINDOW,
};
use super::window::WindowLuts;
use super::MAX_LINE_WIDTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Layer {
    Bg1 = 0,
    Bg2 = 1,
    Bg3 = 2,
    Bg4 = 3,
    Obj = 4,
    Backdrop = 5,
}

impl Layer {
    pub const BACKGROUNDS: [Layer; 4] = [Layer::Bg1, Layer::Bg2, Layer::Bg3, Layer::Bg4];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn mask(self) -> LayerMask {
        LayerMask::from_bits_truncate(1 << self as u8)
    }
}

/// One candidate pixel produced by a BG, Mode 7 or sprite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerPixel {
    /// Resolved BGR555 color.
    pub color: u16,
    /// Tile priority bit for BGs, 0-3 for sprites.
    pub priority: u8,
    pub opaque: bool,
    /// False for OBJ palettes 0-3, which never take part in color math.
    pub math: bool,
}

/// A full row of candidates for a single layer.
pub struct LayerRow {
    pixels: [LayerPixel; MAX_LINE_WIDTH],
    width: usize,
}

impl Default for LayerRow {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerRow {
    pub fn new() -> Self {
        Self {
            pixels: [LayerPixel::default(); MAX_LINE_WIDTH],
            width: 0,
        }
    }

    pub fn clear(&mut self, width: usize) {
        self.width = width.min(MAX_LINE_WIDTH);
        self.pixels[..self.width].fill(LayerPixel::default());
    }

    #[inline]
    pub fn set(&mut self, col: usize, pixel: LayerPixel) {
        self.pixels[col] = pixel;
    }

    #[inline]
    pub fn get(&self, col: usize) -> LayerPixel {
        self.pixels[col]
    }

    pub fn pixels(&self) -> &[LayerPixel] {
        &self.pixels[..self.width]
    }

    pub fn pixels_mut(&mut self) -> &mut [LayerPixel] {
        &mut self.pixels[..self.width]
    }
}

/// The winning pixel at one screen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityPixel {
    pub color: u16,
    /// 0 is the backdrop; larger values are in front.
    pub z: u8,
    pub layer: Layer,
    pub math: bool,
}

impl PriorityPixel {
    pub const fn backdrop(color: u16) -> Self {
        Self {
            color,
            z: 0,
            layer: Layer::Backdrop,
            math: true,
        }
    }
}

/// Per-scanline resolution buffer for one screen.
pub struct PixelPriorityBuffer {
    pixels: [PriorityPixel; MAX_LINE_WIDTH],
    width: usize,
}

impl Default for PixelPriorityBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelPriorityBuffer {
    pub fn new() -> Self {
        Self {
            pixels: [PriorityPixel::backdrop(0); MAX_LINE_WIDTH],
            width: 0,
        }
    }

    pub fn reset(&mut self, width: usize, backdrop: u16) {
        self.width = width.min(MAX_LINE_WIDTH);
        self.pixels[..self.width].fill(PriorityPixel::backdrop(backdrop));
    }

    /// Store `candidate` only if it is strictly in front of the current pixel.
    #[inline]
    pub fn offer(&mut self, col: usize, candidate: PriorityPixel) -> bool {
        let slot = &mut self.pixels[col];
        if candidate.z > slot.z {
            *slot = candidate;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn get(&self, col: usize) -> PriorityPixel {
        self.pixels[col]
    }

    pub fn pixels(&self) -> &[PriorityPixel] {
        &self.pixels[..self.width]
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

use Layer::{Bg1, Bg2, Bg3, Bg4, Obj};

// Front-to-back draw order per mode, as (source, priority).
const ORDER_MODE0: &[(Layer, u8)] = &[
    (Obj, 3), (Bg1, 1), (Bg2, 1), (Obj, 2), (Bg1, 0), (Bg2, 0),
    (Obj, 1), (Bg3, 1), (Bg4, 1), (Obj, 0), (Bg3, 0), (Bg4, 0),
];
const ORDER_MODE1: &[(Layer, u8)] = &[
    (Obj, 3), (Bg1, 1), (Bg2, 1), (Obj, 2), (Bg1, 0), (Bg2, 0),
    (Obj, 1), (Bg3, 1), (Obj, 0), (Bg3, 0),
];
const ORDER_MODE1_BG3_HIGH: &[(Layer, u8)] = &[
    (Bg3, 1), (Obj, 3), (Bg1, 1), (Bg2, 1), (Obj, 2), (Bg1, 0),
    (Bg2, 0), (Obj, 1), (Obj, 0), (Bg3, 0),
];
const ORDER_MODE2_TO_5: &[(Layer, u8)] = &[
    (Obj, 3), (Bg1, 1), (Obj, 2), (Bg2, 1), (Obj, 1), (Bg1, 0),
    (Obj, 0), (Bg2, 0),
];
const ORDER_MODE6: &[(Layer, u8)] = &[
    (Obj, 3), (Bg1, 1), (Obj, 2), (Obj, 1), (Bg1, 0), (Obj, 0),
];
const ORDER_MODE7: &[(Layer, u8)] = &[(Obj, 3), (Obj, 2), (Obj, 1), (Bg1, 0), (Obj, 0)];
const ORDER_MODE7_EXTBG: &[(Layer, u8)] = &[
    (Obj, 3), (Obj, 2), (Bg2, 1), (Obj, 1), (Bg1, 0), (Obj, 0),
    (Bg2, 0),
];

/// z-rank lookup for one BG mode: `z[source][priority]`, 0 when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityTable {
    z: [[u8; 4]; 5],
}

impl PriorityTable {
    pub fn for_mode(mode: u8, bg3_priority: bool, extbg: bool) -> Self {
        let order = match mode & 7 {
            0 => ORDER_MODE0,
            1 if bg3_priority => ORDER_MODE1_BG3_HIGH,
            1 => ORDER_MODE1,
            2..=5 => ORDER_MODE2_TO_5,
            6 => ORDER_MODE6,
            _ if extbg => ORDER_MODE7_EXTBG,
            _ => ORDER_MODE7,
        };
        let mut z = [[0u8; 4]; 5];
        for (rank, &(layer, priority)) in order.iter().enumerate() {
            z[layer.index()][priority as usize] = (order.len() - rank) as u8;
        }
        Self { z }
    }

    #[inline]
    pub fn z(&self, layer: Layer, priority: u8) -> u8 {
        match layer {
            Layer::Backdrop => 0,
            _ => self.z[layer.index()][(priority & 3) as usize],
        }
    }
}

/// Offer a layer row to both screens, honoring screen enables and window masks.
pub fn merge_layer(
    layer: Layer,
    row: &LayerRow,
    state: &PpuState,
    table: &PriorityTable,
    windows: &WindowLuts,
    main: &mut PixelPriorityBuffer,
    sub: &mut PixelPriorityBuffer,
) {
    let bit = layer.mask();
    let on_main = state.main_screen.contains(bit);
    let on_sub = state.sub_screen.contains(bit);
    if !on_main && !on_sub {
        return;
    }
    let main_clip = state.main_window.contains(bit);
    let sub_clip = state.sub_window.contains(bit);
    let source = layer.index();

    for (col, px) in row.pixels().iter().enumerate() {
        if !px.opaque {
            continue;
        }
        let z = table.z(layer, px.priority);
        if z == 0 {
            continue;
        }
        let candidate = PriorityPixel {
            color: px.color,
            z,
            layer,
            math: px.math,
        };
        let masked = (main_clip || sub_clip) && windows.inside(source, col);
        if on_main && !(main_clip && masked) {
            main.offer(col, candidate);
        }
        if on_sub && !(sub_clip && masked) {
            sub.offer(col, candidate);
        }
    }
}

#[inline]
pub fn split_bgr555(color: u16) -> (i32, i32, i32) {
    (
        (color & 0x1F) as i32,
        ((color >> 5) & 0x1F) as i32,
        ((color >> 10) & 0x1F) as i32,
    )
}

#[inline]
pub fn join_bgr555(r: i32, g: i32, b: i32) -> u16 {
    (r.clamp(0, 31) as u16) | ((g.clamp(0, 31) as u16) << 5) | ((b.clamp(0, 31) as u16) << 10)
}

/// Blend two BGR555 colors, halving before the clamp like the hardware adder.
#[inline]
pub fn blend(main: u16, operand: u16, op: MathOp, half: bool) -> u16 {
    let (r1, g1, b1) = split_bgr555(main);
    let (r2, g2, b2) = split_bgr555(operand);
    let (mut r, mut g, mut b) = match op {
        MathOp::Add => (r1 + r2, g1 + g2, b1 + b2),
        MathOp::Subtract => (r1 - r2, g1 - g2, b1 - b2),
    };
    if half {
        r >>= 1;
        g >>= 1;
        b >>= 1;
    }
    join_bgr555(r, g, b)
}

#[inline]
fn expand5(c: u32) -> u32 {
    (c << 3) | (c >> 2)
}

/// BGR555 to opaque 0xAARRGGBB, scaled by the 0-15 master brightness.
#[inline]
pub fn apply_brightness(color: u16, brightness: u8) -> u32 {
    let level = brightness.min(15) as u32;
    let r = expand5((color & 0x1F) as u32) * level / 15;
    let g = expand5(((color >> 5) & 0x1F) as u32) * level / 15;
    let b = expand5(((color >> 10) & 0x1F) as u32) * level / 15;
    0xFF00_0000 | (r << 16) | (g << 8) | b
}

/// Counters drained by `Ppu::take_render_metrics_summary`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderMetrics {
    pub lines: u64,
    pub forced_blank_lines: u64,
    pub clipped_black: u64,
    pub math_add: u64,
    pub math_sub: u64,
    pub math_half: u64,
    pub obj_range_over_lines: u64,
    pub obj_time_over_lines: u64,
}

impl RenderMetrics {
    pub fn summary(&self) -> String {
        format!(
            "RENDER_METRICS: lines={} blank={} clip_black={} add={} sub={} half={} obj_range_over={} obj_time_over={}",
            self.lines,
            self.forced_blank_lines,
            self.clipped_black,
            self.math_add,
            self.math_sub,
            self.math_half,
            self.obj_range_over_lines,
            self.obj_time_over_lines
        )
    }
}

/// Resolve windows, color math and brightness into one output row.
pub fn composite_line(
    state: &PpuState,
    main: &PixelPriorityBuffer,
    sub: &PixelPriorityBuffer,
    windows: &WindowLuts,
    out: &mut [u32],
    metrics: &mut RenderMetrics,
) {
    let cm = &state.color_math;
    for (col, slot) in out.iter_mut().enumerate().take(main.width()) {
        let top = main.get(col);
        let in_color_window = windows.inside(COLOR_WINDOW, col);

        let mut color = top.color;
        let clipped = cm.force_black.applies(in_color_window);
        if clipped {
            color = 0;
            metrics.clipped_black += 1;
        }

        let math = top.math
            && cm.layers.contains(top.layer.mask())
            && cm.math_region.applies(in_color_window);
        if math {
            let below = sub.get(col);
            let (operand, half) = if cm.add_subscreen && below.layer != Layer::Backdrop {
                (below.color, cm.half)
            } else if cm.add_subscreen {
                // Transparent sub screen falls back to the fixed color at full strength.
                (cm.fixed_color, false)
            } else {
                (cm.fixed_color, cm.half)
            };
            // A main pixel clipped to black is never halved.
            let half = half && !clipped;
            color = blend(color, operand, cm.op, half);
            match cm.op {
                MathOp::Add => metrics.math_add += 1,
                MathOp::Subtract => metrics.math_sub += 1,
            }
            if half {
                metrics.math_half += 1;
            }
        }

        *slot = apply_brightness(color, state.brightness);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppu::registers::WindowRegion;
    use crate::ppu::LineSpan;

    fn rgb(r: u16, g: u16, b: u16) -> u16 {
        r | (g << 5) | (b << 10)
    }

    #[test]
    fn priority_tables_rank_every_slot_uniquely() {
        for mode in 0..8u8 {
            for (bg3, ext) in [(false, false), (true, false), (false, true)] {
                let table = PriorityTable::for_mode(mode, bg3, ext);
                let mut seen = Vec::new();
                for layer in [Bg1, Bg2, Bg3, Bg4, Obj] {
                    for p in 0..4 {
                        let z = table.z(layer, p);
                        if z != 0 {
                            assert!(!seen.contains(&z), "mode {} duplicate z {}", mode, z);
                            seen.push(z);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn mode1_order_matches_hardware() {
        let t = PriorityTable::for_mode(1, false, false);
        assert!(t.z(Obj, 3) > t.z(Bg1, 1));
        assert!(t.z(Bg1, 1) > t.z(Bg2, 1));
        assert!(t.z(Bg2, 1) > t.z(Obj, 2));
        assert!(t.z(Obj, 1) > t.z(Bg3, 1));
        assert!(t.z(Bg3, 1) > t.z(Obj, 0));
        assert!(t.z(Obj, 0) > t.z(Bg3, 0));
        assert_eq!(t.z(Bg4, 1), 0);

        let t = PriorityTable::for_mode(1, true, false);
        assert!(t.z(Bg3, 1) > t.z(Obj, 3));
    }

    #[test]
    fn mode7_extbg_places_bg2_by_pixel_priority() {
        let t = PriorityTable::for_mode(7, false, true);
        assert!(t.z(Bg2, 1) > t.z(Obj, 1));
        assert!(t.z(Bg1, 0) > t.z(Bg2, 0));
        assert_eq!(PriorityTable::for_mode(7, false, false).z(Bg2, 1), 0);
    }

    #[test]
    fn offer_requires_strict_win() {
        let mut buf = PixelPriorityBuffer::new();
        buf.reset(4, 0x1234);
        let a = PriorityPixel {
            color: 1,
            z: 5,
            layer: Bg1,
            math: true,
        };
        assert!(buf.offer(0, a));
        assert!(!buf.offer(0, PriorityPixel { color: 2, ..a }));
        assert_eq!(buf.get(0).color, 1);
        assert_eq!(buf.get(1), PriorityPixel::backdrop(0x1234));
    }

    #[test]
    fn transparent_pixels_never_reach_the_buffer() {
        let mut state = PpuState::new();
        state.main_screen = LayerMask::BG1 | LayerMask::BG2;
        let table = PriorityTable::for_mode(1, false, false);
        let windows = WindowLuts::new();
        let mut main = PixelPriorityBuffer::new();
        let mut sub = PixelPriorityBuffer::new();
        main.reset(8, 0);
        sub.reset(8, 0);

        let mut low = LayerRow::new();
        low.clear(8);
        for col in 0..8 {
            low.set(
                col,
                LayerPixel {
                    color: 0x001F,
                    priority: 0,
                    opaque: true,
                    math: true,
                },
            );
        }
        merge_layer(Bg2, &low, &state, &table, &windows, &mut main, &mut sub);

        // BG1 high priority, but only even columns are opaque.
        let mut high = LayerRow::new();
        high.clear(8);
        for col in (0..8).step_by(2) {
            high.set(
                col,
                LayerPixel {
                    color: 0x7C00,
                    priority: 1,
                    opaque: true,
                    math: true,
                },
            );
        }
        merge_layer(Bg1, &high, &state, &table, &windows, &mut main, &mut sub);

        for col in 0..8 {
            let expected = if col % 2 == 0 { 0x7C00 } else { 0x001F };
            assert_eq!(main.get(col).color, expected, "col {}", col);
        }
        // Sub screen not enabled for either layer.
        assert!(sub.pixels().iter().all(|p| p.layer == Layer::Backdrop));
    }

    #[test]
    fn window_masks_a_layer_on_main_only() {
        let mut state = PpuState::new();
        state.main_screen = LayerMask::BG1;
        state.sub_screen = LayerMask::BG1;
        state.main_window = LayerMask::BG1;
        state.window1 = crate::ppu::registers::WindowRange { left: 0, right: 3 };
        state.window_masks[0].w1_enabled = true;
        let mut windows = WindowLuts::new();
        windows.prepare(&state, LineSpan { origin: 0, width: 8 });

        let mut row = LayerRow::new();
        row.clear(8);
        for col in 0..8 {
            row.set(
                col,
                LayerPixel {
                    color: 7,
                    priority: 0,
                    opaque: true,
                    math: true,
                },
            );
        }
        let table = PriorityTable::for_mode(1, false, false);
        let mut main = PixelPriorityBuffer::new();
        let mut sub = PixelPriorityBuffer::new();
        main.reset(8, 0);
        sub.reset(8, 0);
        merge_layer(Bg1, &row, &state, &table, &windows, &mut main, &mut sub);
        assert_eq!(main.get(3).layer, Layer::Backdrop);
        assert_eq!(main.get(4).layer, Bg1);
        assert_eq!(sub.get(3).layer, Bg1);
    }

    #[test]
    fn add_then_subtract_round_trips() {
        let main = rgb(10, 20, 3);
        let operand = rgb(5, 7, 2);
        let added = blend(main, operand, MathOp::Add, false);
        assert_eq!(added, rgb(15, 27, 5));
        assert_eq!(blend(added, operand, MathOp::Subtract, false), main);

        // Clamped channels lose information at the boundary only.
        let bright = rgb(30, 0, 16);
        let added = blend(bright, rgb(4, 0, 4), MathOp::Add, false);
        assert_eq!(added, rgb(31, 0, 20));
        let back = blend(added, rgb(4, 0, 4), MathOp::Subtract, false);
        assert_eq!(back, rgb(27, 0, 16));
    }

    #[test]
    fn subtract_clamps_at_zero_and_half_divides() {
        assert_eq!(blend(rgb(3, 3, 3), rgb(5, 1, 3), MathOp::Subtract, false), rgb(0, 2, 0));
        assert_eq!(blend(rgb(31, 31, 31), rgb(31, 31, 31), MathOp::Add, true), rgb(31, 31, 31));
        assert_eq!(blend(rgb(10, 4, 0), rgb(2, 2, 0), MathOp::Add, true), rgb(6, 3, 0));
    }

    #[test]
    fn brightness_scales_linearly() {
        assert_eq!(apply_brightness(0x7FFF, 15), 0xFFFF_FFFF);
        assert_eq!(apply_brightness(0x7FFF, 0), 0xFF00_0000);
        assert_eq!(apply_brightness(0x001F, 5), 0xFF00_0000 | (85 << 16));
    }

    #[test]
    fn composite_applies_fixed_color_math_and_clip() {
        let mut state = PpuState::new();
        state.color_math.layers = LayerMask::BACKDROP;
        state.color_math.fixed_color = rgb(1, 2, 3);
        let windows = WindowLuts::new();
        let mut main = PixelPriorityBuffer::new();
        let sub = {
            let mut s = PixelPriorityBuffer::new();
            s.reset(2, 0);
            s
        };
        main.reset(2, rgb(4, 4, 4));
        let mut out = [0u32; 2];
        let mut metrics = RenderMetrics::default();
        composite_line(&state, &main, &sub, &windows, &mut out, &mut metrics);
        assert_eq!(out[0], apply_brightness(rgb(5, 6, 7), 15));
        assert_eq!(metrics.math_add, 2);

        // Clip everywhere, then add: result is the fixed color alone.
        state.color_math.force_black = WindowRegion::Everywhere;
        composite_line(&state, &main, &sub, &windows, &mut out, &mut metrics);
        assert_eq!(out[1], apply_brightness(rgb(1, 2, 3), 15));
    }

    #[test]
    fn subscreen_backdrop_uses_fixed_color_without_halving() {
        let mut state = PpuState::new();
        state.color_math.layers = LayerMask::BG1;
        state.color_math.add_subscreen = true;
        state.color_math.half = true;
        state.color_math.fixed_color = rgb(2, 2, 2);
        let windows = WindowLuts::new();
        let mut main = PixelPriorityBuffer::new();
        let mut sub = PixelPriorityBuffer::new();
        main.reset(2, 0);
        sub.reset(2, rgb(2, 2, 2));
        let top = PriorityPixel {
            color: rgb(10, 10, 10),
            z: 3,
            layer: Bg1,
            math: true,
        };
        main.offer(0, top);
        main.offer(1, top);
        sub.offer(
            1,
            PriorityPixel {
                color: rgb(20, 20, 20),
                z: 1,
                layer: Bg2,
                math: true,
            },
        );
        let mut out = [0u32; 2];
        composite_line(&state, &main, &sub, &windows, &mut out, &mut RenderMetrics::default());
        assert_eq!(out[0], apply_brightness(rgb(12, 12, 12), 15));
        assert_eq!(out[1], apply_brightness(rgb(15, 15, 15), 15));
    }

    #[test]
    fn clipped_main_pixel_is_not_halved() {
        let mut state = PpuState::new();
        state.color_math.layers = LayerMask::BG1;
        state.color_math.half = true;
        state.color_math.force_black = WindowRegion::Everywhere;
        state.color_math.fixed_color = rgb(20, 20, 20);
        let windows = WindowLuts::new();
        let mut main = PixelPriorityBuffer::new();
        let mut sub = PixelPriorityBuffer::new();
        main.reset(1, 0);
        sub.reset(1, 0);
        main.offer(
            0,
            PriorityPixel {
                color: 0x7FFF,
                z: 3,
                layer: Bg1,
                math: true,
            },
        );
        let mut out = [0u32; 1];
        let mut metrics = RenderMetrics::default();
        composite_line(&state, &main, &sub, &windows, &mut out, &mut metrics);
        assert_eq!(out[0], apply_brightness(rgb(20, 20, 20), 15));
        assert_eq!(metrics.math_half, 0);
        assert_eq!(metrics.clipped_black, 1);
    }

    #[test]
    fn color_window_regions_gate_clip_and_math() {
        let mut state = PpuState::new();
        state.window1 = crate::ppu::registers::WindowRange { left: 2, right: 3 };
        state.window_masks[COLOR_WINDOW].w1_enabled = true;
        state.color_math.layers = LayerMask::BACKDROP;
        state.color_math.fixed_color = rgb(1, 1, 1);
        state.color_math.force_black = WindowRegion::Inside;
        state.color_math.math_region = WindowRegion::Outside;
        let mut windows = WindowLuts::new();
        windows.prepare(&state, LineSpan { origin: 0, width: 6 });
        let mut main = PixelPriorityBuffer::new();
        let mut sub = PixelPriorityBuffer::new();
        main.reset(6, rgb(10, 10, 10));
        sub.reset(6, 0);

        let mut out = [0u32; 6];
        composite_line(&state, &main, &sub, &windows, &mut out, &mut RenderMetrics::default());
        // Outside the window: not clipped, math adds the fixed color.
        assert_eq!(out[0], apply_brightness(rgb(11, 11, 11), 15));
        assert_eq!(out[5], apply_brightness(rgb(11, 11, 11), 15));
        // Inside: clipped to black and math is prevented.
        assert_eq!(out[2], 0xFF00_0000);
        assert_eq!(out[3], 0xFF00_0000);

        // Swap the regions: clip outside, math only inside.
        state.color_math.force_black = WindowRegion::Outside;
        state.color_math.math_region = WindowRegion::Inside;
        composite_line(&state, &main, &sub, &windows, &mut out, &mut RenderMetrics::default());
        assert_eq!(out[1], 0xFF00_0000);
        assert_eq!(out[2], apply_brightness(rgb(11, 11, 11), 15));
    }

    #[test]
    fn mode0_and_mode2_to_6_orders() {
        let t = PriorityTable::for_mode(0, false, false);
        let order = [
            (Obj, 3), (Bg1, 1), (Bg2, 1), (Obj, 2), (Bg1, 0), (Bg2, 0),
            (Obj, 1), (Bg3, 1), (Bg4, 1), (Obj, 0), (Bg3, 0), (Bg4, 0),
        ];
        for pair in order.windows(2) {
            assert!(t.z(pair[0].0, pair[0].1) > t.z(pair[1].0, pair[1].1), "mode 0 {:?}", pair);
        }

        let order = [
            (Obj, 3), (Bg1, 1), (Obj, 2), (Bg2, 1), (Obj, 1), (Bg1, 0), (Obj, 0), (Bg2, 0),
        ];
        for mode in 2..=5 {
            let t = PriorityTable::for_mode(mode, false, false);
            for pair in order.windows(2) {
                assert!(t.z(pair[0].0, pair[0].1) > t.z(pair[1].0, pair[1].1), "mode {} {:?}", mode, pair);
            }
            assert_eq!(t.z(Bg3, 1), 0);
        }

        let t = PriorityTable::for_mode(6, false, false);
        let order = [(Obj, 3), (Bg1, 1), (Obj, 2), (Obj, 1), (Bg1, 0), (Obj, 0)];
        for pair in order.windows(2) {
            assert!(t.z(pair[0].0, pair[0].1) > t.z(pair[1].0, pair[1].1), "mode 6 {:?}", pair);
        }
        assert_eq!(t.z(Bg2, 0), 0);
    }

    #[test]
    fn low_obj_palettes_skip_color_math() {
        let mut state = PpuState::new();
        state.color_math.layers = LayerMask::OBJ;
        state.color_math.fixed_color = rgb(5, 5, 5);
        let windows = WindowLuts::new();
        let mut main = PixelPriorityBuffer::new();
        let mut sub = PixelPriorityBuffer::new();
        main.reset(1, 0);
        sub.reset(1, 0);
        main.offer(
            0,
            PriorityPixel {
                color: rgb(1, 1, 1),
                z: 9,
                layer: Obj,
                math: false,
            },
        );
        let mut out = [0u32; 1];
        composite_line(&state, &main, &sub, &windows, &mut out, &mut RenderMetrics::default());
        assert_eq!(out[0], apply_brightness(rgb(1, 1, 1), 15));
    }
}
