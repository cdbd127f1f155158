//! Register/state surface.
//!
//! `PpuState` is the decoded register file that every render stage reads.
//! It is mutated three ways: directly through `Ppu::state_mut`, through raw
//! `$21xx` byte writes (`PpuState::write_io`), or through `RegisterWrite`
//! values scheduled against a scanline. Scheduled writes carry a
//! `CommitPoint` that decides which scanline first observes them.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::memory::{OamEntry, VideoMemory};

bitflags! {
    /// One bit per screen source, in `$212C`/`$2131` bit order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LayerMask: u8 {
        const BG1 = 0b0000_0001;
        const BG2 = 0b0000_0010;
        const BG3 = 0b0000_0100;
        const BG4 = 0b0000_1000;
        const OBJ = 0b0001_0000;
        const BACKDROP = 0b0010_0000;
    }
}

impl LayerMask {
    pub fn bg(layer: usize) -> Self {
        Self::from_bits_truncate(1 << (layer & 3))
    }
}

/// Tilemap dimensions in 32x32-entry screens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenSize {
    #[default]
    Map32x32,
    Map64x32,
    Map32x64,
    Map64x64,
}

impl ScreenSize {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => ScreenSize::Map32x32,
            1 => ScreenSize::Map64x32,
            2 => ScreenSize::Map32x64,
            _ => ScreenSize::Map64x64,
        }
    }

    pub fn wide(self) -> bool {
        matches!(self, ScreenSize::Map64x32 | ScreenSize::Map64x64)
    }

    pub fn tall(self) -> bool {
        matches!(self, ScreenSize::Map32x64 | ScreenSize::Map64x64)
    }
}

/// Configuration of one tiled background.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgLayer {
    /// VRAM word address of the first tilemap screen.
    pub tilemap_base: u16,
    /// VRAM word address of the character data.
    pub chr_base: u16,
    pub screen_size: ScreenSize,
    pub large_tiles: bool,
    /// 10-bit scroll; upper bits are ignored when sampling.
    pub hscroll: u16,
    pub vscroll: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowLogic {
    #[default]
    Or,
    And,
    Xor,
    Xnor,
}

impl WindowLogic {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => WindowLogic::Or,
            1 => WindowLogic::And,
            2 => WindowLogic::Xor,
            _ => WindowLogic::Xnor,
        }
    }

    #[inline]
    pub fn combine(self, a: bool, b: bool) -> bool {
        match self {
            WindowLogic::Or => a | b,
            WindowLogic::And => a & b,
            WindowLogic::Xor => a ^ b,
            WindowLogic::Xnor => !(a ^ b),
        }
    }
}

/// Horizontal window range; empty when `left > right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRange {
    pub left: u8,
    pub right: u8,
}

impl Default for WindowRange {
    fn default() -> Self {
        // Power-on values leave the window empty.
        Self { left: 1, right: 0 }
    }
}

impl WindowRange {
    #[inline]
    pub fn contains(&self, x: i32) -> bool {
        x >= self.left as i32 && x <= self.right as i32
    }
}

/// Which windows a source uses and how they combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMask {
    pub w1_enabled: bool,
    pub w1_invert: bool,
    pub w2_enabled: bool,
    pub w2_invert: bool,
    pub logic: WindowLogic,
}

impl WindowMask {
    /// Decode one `$2123-$2125` nibble, keeping the current logic.
    pub fn set_select(&mut self, nibble: u8) {
        self.w1_invert = nibble & 0x01 != 0;
        self.w1_enabled = nibble & 0x02 != 0;
        self.w2_invert = nibble & 0x04 != 0;
        self.w2_enabled = nibble & 0x08 != 0;
    }

    pub fn is_active(&self) -> bool {
        self.w1_enabled || self.w2_enabled
    }

    /// Resolve the combined window state for a pixel given raw hits.
    #[inline]
    pub fn resolve(&self, in_w1: bool, in_w2: bool) -> bool {
        let w1 = in_w1 != self.w1_invert;
        let w2 = in_w2 != self.w2_invert;
        match (self.w1_enabled, self.w2_enabled) {
            (false, false) => false,
            (true, false) => w1,
            (false, true) => w2,
            (true, true) => self.logic.combine(w1, w2),
        }
    }
}

/// Region of the color window where an effect applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowRegion {
    #[default]
    Nowhere,
    Outside,
    Inside,
    Everywhere,
}

impl WindowRegion {
    #[inline]
    pub fn applies(self, inside: bool) -> bool {
        match self {
            WindowRegion::Nowhere => false,
            WindowRegion::Outside => !inside,
            WindowRegion::Inside => inside,
            WindowRegion::Everywhere => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathOp {
    #[default]
    Add,
    Subtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMathState {
    pub op: MathOp,
    pub half: bool,
    /// Main-screen sources that blend.
    pub layers: LayerMask,
    /// Blend with the sub screen instead of the fixed color.
    pub add_subscreen: bool,
    pub direct_color: bool,
    /// Where the main screen is forced to black before math.
    pub force_black: WindowRegion,
    /// Where math is allowed at all.
    pub math_region: WindowRegion,
    pub fixed_color: u16,
}

impl Default for ColorMathState {
    fn default() -> Self {
        Self {
            op: MathOp::Add,
            half: false,
            layers: LayerMask::empty(),
            add_subscreen: false,
            direct_color: false,
            force_black: WindowRegion::Nowhere,
            math_region: WindowRegion::Everywhere,
            fixed_color: 0,
        }
    }
}

impl ColorMathState {
    /// `$2130` CGWSEL.
    pub fn set_cgwsel(&mut self, value: u8) {
        self.force_black = match value >> 6 {
            0 => WindowRegion::Nowhere,
            1 => WindowRegion::Outside,
            2 => WindowRegion::Inside,
            _ => WindowRegion::Everywhere,
        };
        self.math_region = match (value >> 4) & 3 {
            0 => WindowRegion::Everywhere,
            1 => WindowRegion::Inside,
            2 => WindowRegion::Outside,
            _ => WindowRegion::Nowhere,
        };
        self.add_subscreen = value & 0x02 != 0;
        self.direct_color = value & 0x01 != 0;
    }

    /// `$2131` CGADSUB.
    pub fn set_cgadsub(&mut self, value: u8) {
        self.op = if value & 0x80 != 0 {
            MathOp::Subtract
        } else {
            MathOp::Add
        };
        self.half = value & 0x40 != 0;
        self.layers = LayerMask::from_bits_truncate(value & 0x3F);
    }

    /// `$2132` COLDATA: bits 5-7 pick the channels written with the low 5 bits.
    pub fn set_coldata(&mut self, value: u8) {
        let intensity = (value & 0x1F) as u16;
        if value & 0x20 != 0 {
            self.fixed_color = (self.fixed_color & !0x001F) | intensity;
        }
        if value & 0x40 != 0 {
            self.fixed_color = (self.fixed_color & !0x03E0) | (intensity << 5);
        }
        if value & 0x80 != 0 {
            self.fixed_color = (self.fixed_color & !0x7C00) | (intensity << 10);
        }
    }
}

/// Behaviour outside the 1024x1024 Mode 7 playfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode7Repeat {
    #[default]
    Wrap,
    Transparent,
    Tile0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode7State {
    /// 8.8 fixed-point matrix.
    pub a: i16,
    pub b: i16,
    pub c: i16,
    pub d: i16,
    /// 13-bit signed center and scroll.
    pub center_x: i16,
    pub center_y: i16,
    pub hscroll: i16,
    pub vscroll: i16,
    pub repeat: Mode7Repeat,
    pub flip_x: bool,
    pub flip_y: bool,
    /// EXTBG: BG2 shows the 7-bit playfield with per-pixel priority.
    pub extbg: bool,
}

impl Default for Mode7State {
    fn default() -> Self {
        Self {
            a: 0x0100,
            b: 0,
            c: 0,
            d: 0x0100,
            center_x: 0,
            center_y: 0,
            hscroll: 0,
            vscroll: 0,
            repeat: Mode7Repeat::Wrap,
            flip_x: false,
            flip_y: false,
            extbg: false,
        }
    }
}

impl Mode7State {
    /// `$211A` M7SEL.
    pub fn set_m7sel(&mut self, value: u8) {
        self.repeat = match value >> 6 {
            0 | 1 => Mode7Repeat::Wrap,
            2 => Mode7Repeat::Transparent,
            _ => Mode7Repeat::Tile0,
        };
        self.flip_x = value & 0x01 != 0;
        self.flip_y = value & 0x02 != 0;
    }
}

/// Sign-extend a 13-bit Mode 7 scroll/center value.
#[inline]
pub fn sign_extend_13(value: i16) -> i32 {
    ((value as i32) << 19) >> 19
}

/// Write-twice latches behind the byte-wide register ports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoLatches {
    pub bg_scroll_prev: u8,
    pub bg_hscroll_prev: u8,
    pub mode7_prev: u8,
    pub vram_addr: u16,
    pub vram_increment: u16,
    pub vram_increment_on_high: bool,
    pub cgram_addr: u8,
    pub cgram_low: Option<u8>,
    pub oam_addr: u16,
    pub oam_latch: u8,
}

/// Decoded PPU register file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpuState {
    pub forced_blank: bool,
    /// 0-15; 15 is full intensity.
    pub brightness: u8,
    /// 0-7.
    pub bg_mode: u8,
    /// Mode 1 BG3 high-priority tiles go in front of everything.
    pub bg3_priority: bool,
    pub layers: [BgLayer; 4],
    /// 1-16.
    pub mosaic_size: u8,
    pub mosaic_layers: LayerMask,
    pub main_screen: LayerMask,
    pub sub_screen: LayerMask,
    pub main_window: LayerMask,
    pub sub_window: LayerMask,
    pub window1: WindowRange,
    pub window2: WindowRange,
    /// BG1-BG4, OBJ, color window.
    pub window_masks: [WindowMask; 6],
    pub color_math: ColorMathState,
    pub mode7: Mode7State,
    /// `$2101` size preset, 0-7.
    pub obj_size: u8,
    pub obj_name_base: u16,
    pub obj_name_gap: u16,
    pub oam_priority_rotation: bool,
    pub oam_first_sprite: u8,
    pub io: IoLatches,
    #[serde(skip)]
    pub(crate) mosaic_restart: bool,
}

impl Default for PpuState {
    fn default() -> Self {
        Self {
            forced_blank: false,
            brightness: 15,
            bg_mode: 0,
            bg3_priority: false,
            layers: [BgLayer::default(); 4],
            mosaic_size: 1,
            mosaic_layers: LayerMask::empty(),
            main_screen: LayerMask::empty(),
            sub_screen: LayerMask::empty(),
            main_window: LayerMask::empty(),
            sub_window: LayerMask::empty(),
            window1: WindowRange::default(),
            window2: WindowRange::default(),
            window_masks: [WindowMask::default(); 6],
            color_math: ColorMathState::default(),
            mode7: Mode7State::default(),
            obj_size: 0,
            obj_name_base: 0,
            obj_name_gap: 0x1000,
            oam_priority_rotation: false,
            oam_first_sprite: 0,
            io: IoLatches {
                vram_increment: 1,
                ..IoLatches::default()
            },
            mosaic_restart: false,
        }
    }
}

/// Index of the color window in `PpuState::window_masks`.
pub const COLOR_WINDOW: usize = 5;
/// Index of the OBJ window in `PpuState::window_masks`.
pub const OBJ_WINDOW: usize = 4;

/// When a scheduled write becomes visible to rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPoint {
    /// Applied before the tagged scanline renders.
    Immediate,
    /// Applied before the scanline after the tagged one.
    NextScanline,
}

/// A typed register or memory write, scheduled with `Ppu::schedule`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterWrite {
    /// Raw byte to `$2100-$2133`; only the low byte of the address is used.
    Io { addr: u16, value: u8 },
    BgScroll { layer: usize, h: u16, v: u16 },
    BgMode { mode: u8, bg3_priority: bool },
    Brightness { level: u8, forced_blank: bool },
    MainScreen(LayerMask),
    SubScreen(LayerMask),
    Window1 { left: u8, right: u8 },
    Window2 { left: u8, right: u8 },
    ColorMath { op: MathOp, half: bool, layers: LayerMask },
    FixedColor(u16),
    Mosaic { size: u8, layers: LayerMask },
    Mode7Matrix { a: i16, b: i16, c: i16, d: i16 },
    Mode7Center { x: i16, y: i16 },
    Mode7Scroll { h: i16, v: i16 },
    Cgram { index: u8, color: u16 },
    VramWord { addr: u16, value: u16 },
    /// Whole sprite record; takes effect with the next sprite evaluation.
    OamEntry { index: usize, entry: OamEntry },
}

impl RegisterWrite {
    pub fn commit_point(&self) -> CommitPoint {
        match self {
            RegisterWrite::Cgram { .. }
            | RegisterWrite::VramWord { .. }
            | RegisterWrite::Window1 { .. }
            | RegisterWrite::Window2 { .. } => CommitPoint::Immediate,
            // CGADD/CGDATA, window positions and VMADD/VMDATA
            RegisterWrite::Io { addr, .. } => match addr & 0xFF {
                0x15..=0x19 | 0x21 | 0x22 | 0x26..=0x29 => CommitPoint::Immediate,
                _ => CommitPoint::NextScanline,
            },
            _ => CommitPoint::NextScanline,
        }
    }
}

impl PpuState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn take_mosaic_restart(&mut self) -> bool {
        std::mem::take(&mut self.mosaic_restart)
    }

    /// Apply a typed write. Validation (layer index, VRAM address, sprite
    /// record) happens when the write is scheduled.
    pub(crate) fn apply(&mut self, write: &RegisterWrite, mem: &mut VideoMemory) {
        match *write {
            RegisterWrite::Io { addr, value } => self.write_io(mem, addr, value),
            RegisterWrite::BgScroll { layer, h, v } => {
                let bg = &mut self.layers[layer & 3];
                bg.hscroll = h & 0x3FF;
                bg.vscroll = v & 0x3FF;
            }
            RegisterWrite::BgMode { mode, bg3_priority } => {
                self.bg_mode = mode & 7;
                self.bg3_priority = bg3_priority;
            }
            RegisterWrite::Brightness {
                level,
                forced_blank,
            } => {
                self.brightness = level.min(15);
                self.forced_blank = forced_blank;
            }
            RegisterWrite::MainScreen(mask) => self.main_screen = mask,
            RegisterWrite::SubScreen(mask) => self.sub_screen = mask,
            RegisterWrite::Window1 { left, right } => self.window1 = WindowRange { left, right },
            RegisterWrite::Window2 { left, right } => self.window2 = WindowRange { left, right },
            RegisterWrite::ColorMath { op, half, layers } => {
                self.color_math.op = op;
                self.color_math.half = half;
                self.color_math.layers = layers;
            }
            RegisterWrite::FixedColor(color) => self.color_math.fixed_color = color & 0x7FFF,
            RegisterWrite::Mosaic { size, layers } => {
                self.mosaic_size = size.clamp(1, 16);
                self.mosaic_layers = layers & (LayerMask::BG1 | LayerMask::BG2 | LayerMask::BG3 | LayerMask::BG4);
                self.mosaic_restart = true;
            }
            RegisterWrite::Mode7Matrix { a, b, c, d } => {
                self.mode7.a = a;
                self.mode7.b = b;
                self.mode7.c = c;
                self.mode7.d = d;
            }
            RegisterWrite::Mode7Center { x, y } => {
                self.mode7.center_x = x;
                self.mode7.center_y = y;
            }
            RegisterWrite::Mode7Scroll { h, v } => {
                self.mode7.hscroll = h;
                self.mode7.vscroll = v;
            }
            RegisterWrite::Cgram { index, color } => mem.cgram.set(index, color),
            RegisterWrite::VramWord { addr, value } => mem.vram.set_word(addr, value),
            RegisterWrite::OamEntry { index, ref entry } => mem.oam.store_entry(index, entry),
        }
    }

    /// Raw write to `$21xx`. Unmapped and read-only ports are ignored.
    pub fn write_io(&mut self, mem: &mut VideoMemory, addr: u16, value: u8) {
        let reg = (addr & 0xFF) as u8;
        if crate::debug_flags::ppu_write() {
            log::trace!("PPU write $21{:02X} = {:#04X}", reg, value);
        }
        match reg {
            0x00 => {
                self.forced_blank = value & 0x80 != 0;
                self.brightness = value & 0x0F;
            }
            0x01 => {
                self.obj_size = value >> 5;
                self.obj_name_base = ((value & 0x07) as u16) << 13;
                self.obj_name_gap = ((((value >> 3) & 0x03) as u16) + 1) << 12;
            }
            0x02 => {
                self.io.oam_addr = (self.io.oam_addr & 0x0200) | ((value as u16) << 1);
                self.reload_oam_rotation();
            }
            0x03 => {
                self.io.oam_addr = (self.io.oam_addr & 0x01FE) | (((value & 1) as u16) << 9);
                self.oam_priority_rotation = value & 0x80 != 0;
                self.reload_oam_rotation();
            }
            0x04 => self.write_oam_data(mem, value),
            0x05 => {
                self.bg_mode = value & 0x07;
                self.bg3_priority = value & 0x08 != 0;
                for (i, bg) in self.layers.iter_mut().enumerate() {
                    bg.large_tiles = value & (0x10 << i) != 0;
                }
            }
            0x06 => {
                self.mosaic_size = (value >> 4) + 1;
                self.mosaic_layers = LayerMask::from_bits_truncate(value & 0x0F);
                self.mosaic_restart = true;
            }
            0x07..=0x0A => {
                let bg = &mut self.layers[(reg - 0x07) as usize];
                bg.tilemap_base = ((value & 0xFC) as u16) << 8;
                bg.screen_size = ScreenSize::from_bits(value);
            }
            0x0B => {
                self.layers[0].chr_base = ((value & 0x0F) as u16) << 12;
                self.layers[1].chr_base = ((value >> 4) as u16) << 12;
            }
            0x0C => {
                self.layers[2].chr_base = ((value & 0x0F) as u16) << 12;
                self.layers[3].chr_base = ((value >> 4) as u16) << 12;
            }
            0x0D..=0x14 => self.write_scroll(reg, value),
            0x15 => {
                self.io.vram_increment_on_high = value & 0x80 != 0;
                self.io.vram_increment = match value & 0x03 {
                    0 => 1,
                    1 => 32,
                    _ => 128,
                };
            }
            0x16 => self.io.vram_addr = (self.io.vram_addr & 0xFF00) | value as u16,
            0x17 => self.io.vram_addr = (self.io.vram_addr & 0x00FF) | ((value as u16) << 8),
            0x18 => {
                mem.vram.set_byte(((self.io.vram_addr & 0x7FFF) as usize) << 1, value);
                if !self.io.vram_increment_on_high {
                    self.io.vram_addr = self.io.vram_addr.wrapping_add(self.io.vram_increment);
                }
            }
            0x19 => {
                mem.vram
                    .set_byte((((self.io.vram_addr & 0x7FFF) as usize) << 1) | 1, value);
                if self.io.vram_increment_on_high {
                    self.io.vram_addr = self.io.vram_addr.wrapping_add(self.io.vram_increment);
                }
            }
            0x1A => self.mode7.set_m7sel(value),
            0x1B..=0x1E => {
                let word = ((value as u16) << 8 | self.io.mode7_prev as u16) as i16;
                self.io.mode7_prev = value;
                match reg {
                    0x1B => self.mode7.a = word,
                    0x1C => self.mode7.b = word,
                    0x1D => self.mode7.c = word,
                    _ => self.mode7.d = word,
                }
            }
            0x1F | 0x20 => {
                let word = ((value as u16) << 8 | self.io.mode7_prev as u16) as i16;
                self.io.mode7_prev = value;
                let word = sign_extend_13(word) as i16;
                if reg == 0x1F {
                    self.mode7.center_x = word;
                } else {
                    self.mode7.center_y = word;
                }
            }
            0x21 => {
                self.io.cgram_addr = value;
                self.io.cgram_low = None;
            }
            0x22 => match self.io.cgram_low.take() {
                None => self.io.cgram_low = Some(value),
                Some(low) => {
                    let color = ((value as u16 & 0x7F) << 8) | low as u16;
                    mem.cgram.set(self.io.cgram_addr, color);
                    self.io.cgram_addr = self.io.cgram_addr.wrapping_add(1);
                }
            },
            0x23 => {
                self.window_masks[0].set_select(value & 0x0F);
                self.window_masks[1].set_select(value >> 4);
            }
            0x24 => {
                self.window_masks[2].set_select(value & 0x0F);
                self.window_masks[3].set_select(value >> 4);
            }
            0x25 => {
                self.window_masks[OBJ_WINDOW].set_select(value & 0x0F);
                self.window_masks[COLOR_WINDOW].set_select(value >> 4);
            }
            0x26 => self.window1.left = value,
            0x27 => self.window1.right = value,
            0x28 => self.window2.left = value,
            0x29 => self.window2.right = value,
            0x2A => {
                for (i, mask) in self.window_masks[..4].iter_mut().enumerate() {
                    mask.logic = WindowLogic::from_bits(value >> (i * 2));
                }
            }
            0x2B => {
                self.window_masks[OBJ_WINDOW].logic = WindowLogic::from_bits(value);
                self.window_masks[COLOR_WINDOW].logic = WindowLogic::from_bits(value >> 2);
            }
            0x2C => self.main_screen = LayerMask::from_bits_truncate(value & 0x1F),
            0x2D => self.sub_screen = LayerMask::from_bits_truncate(value & 0x1F),
            0x2E => self.main_window = LayerMask::from_bits_truncate(value & 0x1F),
            0x2F => self.sub_window = LayerMask::from_bits_truncate(value & 0x1F),
            0x30 => self.color_math.set_cgwsel(value),
            0x31 => self.color_math.set_cgadsub(value),
            0x32 => self.color_math.set_coldata(value),
            0x33 => self.mode7.extbg = value & 0x40 != 0,
            _ => {}
        }
    }

    fn reload_oam_rotation(&mut self) {
        self.oam_first_sprite = ((self.io.oam_addr >> 2) & 0x7F) as u8;
    }

    // Low-table bytes commit in pairs on the odd write; high-table bytes go straight in.
    fn write_oam_data(&mut self, mem: &mut VideoMemory, value: u8) {
        let addr = self.io.oam_addr as usize;
        if addr >= 0x200 {
            mem.oam.set_byte(0x200 + (addr & 0x1F), value);
        } else if addr & 1 == 0 {
            self.io.oam_latch = value;
        } else {
            mem.oam.set_byte(addr - 1, self.io.oam_latch);
            mem.oam.set_byte(addr, value);
        }
        self.io.oam_addr = ((addr + 1) % 0x220) as u16;
    }

    fn write_scroll(&mut self, reg: u8, value: u8) {
        let prev = self.io.bg_scroll_prev;
        if reg == 0x0D || reg == 0x0E {
            let word = ((value as u16) << 8 | self.io.mode7_prev as u16) as i16;
            self.io.mode7_prev = value;
            if reg == 0x0D {
                self.mode7.hscroll = sign_extend_13(word) as i16;
            } else {
                self.mode7.vscroll = sign_extend_13(word) as i16;
            }
        }
        let layer = ((reg - 0x0D) / 2) as usize;
        let bg = &mut self.layers[layer];
        if (reg - 0x0D) % 2 == 0 {
            bg.hscroll = (((value as u16) << 8)
                | (prev as u16 & !7)
                | (self.io.bg_hscroll_prev as u16 & 7))
                & 0x3FF;
            self.io.bg_hscroll_prev = value;
        } else {
            bg.vscroll = (((value as u16) << 8) | prev as u16) & 0x3FF;
        }
        self.io.bg_scroll_prev = value;
    }
}
