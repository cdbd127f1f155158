//! Scanline-driven SNES picture processing unit.
//!
//! A frame is produced by calling [`Ppu::render_scanline`] for every visible
//! line in order (or [`Ppu::render_frame`] to do all of them). Between lines
//! the caller may mutate memory and registers; writes scheduled with
//! [`Ppu::schedule`] are committed at the scanline their [`CommitPoint`]
//! names. Rendering never allocates: every scratch buffer and the frame
//! buffer are sized for the widest configuration at construction.

pub mod background;
pub mod memory;
pub mod mode7;
pub mod registers;
pub mod renderer;
pub mod sprites;
pub mod window;


use crate::error::PpuError;
use crate::savestate::PpuSnapshot;

use memory::{VideoMemory, OAM_SPRITES, VRAM_WORDS};
use registers::{CommitPoint, LayerMask, PpuState, RegisterWrite};
use renderer::{Layer, LayerRow, PixelPriorityBuffer, PriorityTable, RenderMetrics};
use sprites::{SpriteEvaluator, SpriteLineStatus};
use window::WindowLuts;

pub const SCREEN_WIDTH: usize = 256;
pub const VISIBLE_LINES: u16 = 224;
pub const EXTENDED_LINES: u16 = 240;
/// Widest widescreen padding on either side.
pub const MAX_EXTRA_SIDE: u16 = 96;
pub const MAX_LINE_WIDTH: usize = SCREEN_WIDTH + 2 * MAX_EXTRA_SIDE as usize;
/// Frame buffer row stride in pixels, fixed for every configuration.
pub const FRAME_PITCH: usize = MAX_LINE_WIDTH;

/// Horizontal extent of a rendered line in screen coordinates.
/// Column 0 of every row buffer is screen x = `origin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub origin: i32,
    pub width: usize,
}

impl LineSpan {
    #[inline]
    pub fn end(&self) -> i32 {
        self.origin + self.width as i32
    }
}

/// Widescreen presets; padding is split evenly left and right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AspectRatio {
    #[default]
    Original,
    Wide16x9,
    Wide16x10,
    Standard4x3,
}

impl AspectRatio {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "original" | "" => Some(AspectRatio::Original),
            "16:9" => Some(AspectRatio::Wide16x9),
            "16:10" => Some(AspectRatio::Wide16x10),
            "4:3" => Some(AspectRatio::Standard4x3),
            _ => None,
        }
    }

    /// Extra pixels on each side for a frame `height` lines tall.
    pub fn extra_side(self, height: u16) -> u16 {
        let (num, den) = match self {
            AspectRatio::Original => return 0,
            AspectRatio::Wide16x9 => (16u32, 9u32),
            AspectRatio::Wide16x10 => (16, 10),
            AspectRatio::Standard4x3 => (4, 3),
        };
        let width = height as u32 * num / den;
        let extra = width.saturating_sub(SCREEN_WIDTH as u32) / 2;
        extra.min(MAX_EXTRA_SIDE as u32) as u16
    }
}

/// Render options chosen by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuConfig {
    pub extra_left: u16,
    pub extra_right: u16,
    /// 240 visible lines instead of 224.
    pub extend_y: bool,
    /// Lift the 32-sprite and 34-tile per-line limits.
    pub no_sprite_limits: bool,
}

impl PpuConfig {
    /// Build from `PPU_*` environment switches. An aspect preset wins over
    /// explicit padding; out-of-range values are clamped.
    pub fn from_env() -> Self {
        let extend_y = crate::debug_flags::extend_y();
        let mut config = Self {
            extra_left: crate::debug_flags::extra_left().min(MAX_EXTRA_SIDE),
            extra_right: crate::debug_flags::extra_right().min(MAX_EXTRA_SIDE),
            extend_y,
            no_sprite_limits: crate::debug_flags::no_sprite_limits(),
        };
        if let Some(name) = crate::debug_flags::aspect() {
            match AspectRatio::parse(name) {
                Some(aspect) => config = config.with_aspect(aspect),
                None => log::warn!("Ignoring unknown PPU_ASPECT value {:?}", name),
            }
        }
        config
    }

    pub fn with_aspect(mut self, aspect: AspectRatio) -> Self {
        let extra = aspect.extra_side(self.height());
        self.extra_left = extra;
        self.extra_right = extra;
        self
    }

    pub fn validate(&self) -> Result<(), PpuError> {
        if self.extra_left > MAX_EXTRA_SIDE || self.extra_right > MAX_EXTRA_SIDE {
            return Err(PpuError::InvalidConfig(format!(
                "widescreen padding {}+{} exceeds {} per side",
                self.extra_left, self.extra_right, MAX_EXTRA_SIDE
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        SCREEN_WIDTH + self.extra_left as usize + self.extra_right as usize
    }

    pub fn height(&self) -> u16 {
        if self.extend_y {
            EXTENDED_LINES
        } else {
            VISIBLE_LINES
        }
    }

    pub fn span(&self) -> LineSpan {
        LineSpan {
            origin: -(self.extra_left as i32),
            width: self.width(),
        }
    }
}

/// Where the PPU is in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    /// Line `n` has been rendered and `n + 1` is next.
    ScanlineInProgress(u16),
    FrameComplete,
}

/// Borrowed view of the frame buffer. Copy it out before the next frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    /// 0xAARRGGBB, row-major, `pitch` pixels per row.
    pub pixels: &'a [u32],
    pub width: usize,
    pub height: usize,
    pub pitch: usize,
}

impl<'a> FrameView<'a> {
    pub fn row(&self, y: usize) -> &'a [u32] {
        let start = y * self.pitch;
        &self.pixels[start..start + self.width]
    }

    pub fn pitch_bytes(&self) -> usize {
        self.pitch * 4
    }

    /// Tightly packed RGBA8 copy.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height * 4);
        for y in 0..self.height {
            for &px in self.row(y) {
                out.extend_from_slice(&[(px >> 16) as u8, (px >> 8) as u8, px as u8, (px >> 24) as u8]);
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct ScheduledWrite {
    line: u16,
    write: RegisterWrite,
}

/// Per-line working set, reused for every scanline.
struct Scratch {
    main: PixelPriorityBuffer,
    sub: PixelPriorityBuffer,
    layers: [LayerRow; 4],
    objects: LayerRow,
    windows: WindowLuts,
    sprites: SpriteEvaluator,
}

impl Scratch {
    fn new() -> Self {
        Self {
            main: PixelPriorityBuffer::new(),
            sub: PixelPriorityBuffer::new(),
            layers: [LayerRow::new(), LayerRow::new(), LayerRow::new(), LayerRow::new()],
            objects: LayerRow::new(),
            windows: WindowLuts::new(),
            sprites: SpriteEvaluator::new(),
        }
    }
}

pub struct Ppu {
    state: PpuState,
    memory: VideoMemory,
    config: PpuConfig,
    phase: FramePhase,
    pending: Vec<ScheduledWrite>,
    frame_count: u64,
    mosaic_start_line: u16,
    line_status: SpriteLineStatus,
    frame_sprite_flags: u8,
    scratch: Box<Scratch>,
    framebuffer: Vec<u32>,
    metrics: RenderMetrics,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            state: PpuState::new(),
            memory: VideoMemory::new(),
            config: PpuConfig::default(),
            phase: FramePhase::Idle,
            pending: Vec::with_capacity(256),
            frame_count: 0,
            mosaic_start_line: 0,
            line_status: SpriteLineStatus::default(),
            frame_sprite_flags: 0,
            scratch: Box::new(Scratch::new()),
            framebuffer: vec![0xFF00_0000; FRAME_PITCH * EXTENDED_LINES as usize],
            metrics: RenderMetrics::default(),
        }
    }

    pub fn with_config(config: PpuConfig) -> Result<Self, PpuError> {
        let mut ppu = Self::new();
        ppu.set_config(config)?;
        Ok(ppu)
    }

    pub fn config(&self) -> &PpuConfig {
        &self.config
    }

    /// Change render options. Only allowed between frames.
    pub fn set_config(&mut self, config: PpuConfig) -> Result<(), PpuError> {
        config.validate()?;
        if let FramePhase::ScanlineInProgress(line) = self.phase {
            return Err(PpuError::FrameInProgress(line));
        }
        self.config = config;
        self.framebuffer.fill(0xFF00_0000);
        Ok(())
    }

    pub fn state(&self) -> &PpuState {
        &self.state
    }

    /// Direct register access; changes are visible to the next rendered line.
    pub fn state_mut(&mut self) -> &mut PpuState {
        &mut self.state
    }

    pub fn memory(&self) -> &VideoMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut VideoMemory {
        &mut self.memory
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Raw `$21xx` write, applied now.
    pub fn write_io(&mut self, addr: u16, value: u8) {
        self.state.write_io(&mut self.memory, addr, value);
    }

    /// Queue `write` against scanline `line` of the current (or next) frame.
    pub fn schedule(&mut self, line: u16, write: RegisterWrite) -> Result<(), PpuError> {
        let height = self.config.height();
        if line >= height {
            return Err(PpuError::ScanlineOutOfRange { line, height });
        }
        let rejected = match write {
            RegisterWrite::BgScroll { layer, .. } if layer > 3 => Some(PpuError::LayerOutOfRange(layer)),
            RegisterWrite::VramWord { addr, .. } if addr as usize >= VRAM_WORDS => {
                Some(PpuError::VramOutOfRange {
                    offset: addr as usize,
                    len: 1,
                })
            }
            RegisterWrite::OamEntry { index, .. } if index >= OAM_SPRITES => {
                Some(PpuError::OamIndexOutOfRange(index))
            }
            RegisterWrite::OamEntry { ref entry, .. } => entry.validate().err(),
            _ => None,
        };
        if let Some(err) = rejected {
            log::warn!("Rejected write for scanline {}: {}", line, err);
            return Err(err);
        }
        let effective = match write.commit_point() {
            CommitPoint::Immediate => line,
            CommitPoint::NextScanline => line + 1,
        };
        self.pending.push(ScheduledWrite {
            line: effective,
            write,
        });
        Ok(())
    }

    /// Status of the most recent line's sprite evaluation.
    pub fn sprite_line_status(&self) -> SpriteLineStatus {
        self.line_status
    }

    /// `$213E` bits 6/7, sticky for the current frame.
    pub fn sprite_status(&self) -> u8 {
        self.frame_sprite_flags
    }

    /// Render the next scanline and return its pixels.
    pub fn render_scanline(&mut self, line: u16) -> Result<&[u32], PpuError> {
        let height = self.config.height();
        if line >= height {
            return Err(PpuError::ScanlineOutOfRange { line, height });
        }
        self.advance_phase(line)?;
        self.commit_pending(line);
        if self.state.take_mosaic_restart() {
            self.mosaic_start_line = line;
        }
        self.draw_line(line);
        if line + 1 == height {
            self.finish_frame();
        }

        let start = line as usize * FRAME_PITCH;
        Ok(&self.framebuffer[start..start + self.config.width()])
    }

    /// Render every visible line of a new frame.
    pub fn render_frame(&mut self) -> Result<FrameView<'_>, PpuError> {
        if let FramePhase::ScanlineInProgress(line) = self.phase {
            if cfg!(debug_assertions) {
                return Err(PpuError::FrameInProgress(line));
            }
            log::warn!("render_frame restarting a frame interrupted after line {}", line);
            self.phase = FramePhase::Idle;
        }
        for line in 0..self.config.height() {
            self.render_scanline(line)?;
        }
        Ok(self.frame())
    }

    /// Diagnostic access to the last rendered frame.
    pub fn frame(&self) -> FrameView<'_> {
        FrameView {
            pixels: &self.framebuffer,
            width: self.config.width(),
            height: self.config.height() as usize,
            pitch: FRAME_PITCH,
        }
    }

    pub fn take_render_metrics_summary(&mut self) -> String {
        if !crate::debug_flags::render_metrics() {
            return "RENDER_METRICS: off".to_string();
        }
        std::mem::take(&mut self.metrics).summary()
    }

    pub fn metrics(&self) -> &RenderMetrics {
        &self.metrics
    }

    pub fn snapshot(&self) -> PpuSnapshot {
        PpuSnapshot {
            version: PpuSnapshot::CURRENT_VERSION,
            frame_count: self.frame_count,
            state: self.state.clone(),
            vram: self.memory.vram.words().to_vec(),
            cgram: self.memory.cgram.colors().to_vec(),
            oam: self.memory.oam.bytes().to_vec(),
        }
    }

    /// Restore a snapshot taken between frames. Pending writes are dropped.
    pub fn restore(&mut self, snapshot: &PpuSnapshot) -> Result<(), PpuError> {
        snapshot.check_version()?;
        let mut memory = VideoMemory::new();
        memory.vram.load_words(&snapshot.vram)?;
        memory.cgram.load(&snapshot.cgram)?;
        memory.oam.load(&snapshot.oam)?;
        self.memory = memory;
        self.state = snapshot.state.clone();
        self.frame_count = snapshot.frame_count;
        self.pending.clear();
        self.phase = FramePhase::Idle;
        Ok(())
    }

    fn advance_phase(&mut self, line: u16) -> Result<(), PpuError> {
        let expected = match self.phase {
            FramePhase::Idle | FramePhase::FrameComplete => 0,
            FramePhase::ScanlineInProgress(last) => last + 1,
        };
        if line != expected {
            if cfg!(debug_assertions) {
                return Err(PpuError::ScanlineOutOfOrder {
                    expected,
                    got: line,
                });
            }
            log::warn!("Scanline {} rendered out of order (expected {})", line, expected);
        }
        if line == 0 {
            self.begin_frame();
        }
        self.phase = FramePhase::ScanlineInProgress(line);
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.mosaic_start_line = 0;
        self.frame_sprite_flags = 0;
        if crate::debug_flags::trace_scanline() {
            log::debug!("PPU frame {} begin", self.frame_count);
        }
    }

    fn finish_frame(&mut self) {
        // Writes aimed past the last line still land before the next frame.
        for pending in self.pending.drain(..) {
            self.state.apply(&pending.write, &mut self.memory);
        }
        self.phase = FramePhase::FrameComplete;
        self.frame_count += 1;
        if crate::debug_flags::trace_scanline() {
            log::debug!("PPU frame {} complete", self.frame_count);
        }
        if crate::debug_flags::render_metrics() && !crate::debug_flags::quiet() {
            log::info!("{}", self.metrics.summary());
        }
    }

    fn commit_pending(&mut self, line: u16) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].line <= line {
                let pending = self.pending.remove(i);
                self.state.apply(&pending.write, &mut self.memory);
            } else {
                i += 1;
            }
        }
    }

    fn mosaic_line(&self, line: u16) -> u16 {
        let size = self.state.mosaic_size.max(1) as u16;
        let start = self.mosaic_start_line.min(line);
        line - (line - start) % size
    }

    fn draw_line(&mut self, line: u16) {
        let mosaic_line = self.mosaic_line(line);
        let span = self.config.span();
        let unlimited = self.config.no_sprite_limits;
        let Ppu {
            state,
            memory,
            scratch,
            framebuffer,
            metrics,
            line_status,
            frame_sprite_flags,
            ..
        } = self;
        let Scratch {
            main,
            sub,
            layers,
            objects,
            windows,
            sprites,
        } = &mut **scratch;

        let start = line as usize * FRAME_PITCH;
        let out = &mut framebuffer[start..start + span.width];
        metrics.lines += 1;

        if crate::debug_flags::trace_scanline() {
            log::trace!("PPU scanline {} mode {}", line, state.bg_mode);
        }

        // Sprite evaluation runs during forced blank too; only the output is suppressed.
        *line_status = sprites.evaluate(line, state, memory, span, unlimited, objects);
        *frame_sprite_flags |= line_status.status_bits();
        if line_status.range_over {
            metrics.obj_range_over_lines += 1;
        }
        if line_status.time_over {
            metrics.obj_time_over_lines += 1;
        }

        if state.forced_blank {
            out.fill(0xFF00_0000);
            metrics.forced_blank_lines += 1;
            return;
        }

        main.reset(span.width, memory.cgram.color(0));
        sub.reset(span.width, state.color_math.fixed_color);
        windows.prepare(state, span);
        let table = PriorityTable::for_mode(state.bg_mode, state.bg3_priority, state.mode7.extbg);
        let shown = state.main_screen | state.sub_screen;

        if state.bg_mode & 7 == 7 {
            let (bg1, rest) = layers.split_at_mut(1);
            let bg2 = if state.mode7.extbg && shown.contains(LayerMask::BG2) {
                Some(&mut rest[0])
            } else {
                None
            };
            let with_bg2 = bg2.is_some();
            mode7::render_line(line, mosaic_line, state, memory, span, &mut bg1[0], bg2);
            renderer::merge_layer(Layer::Bg1, &layers[0], state, &table, windows, main, sub);
            if with_bg2 {
                renderer::merge_layer(Layer::Bg2, &layers[1], state, &table, windows, main, sub);
            }
        } else {
            for layer in Layer::BACKGROUNDS.iter().rev() {
                let index = layer.index();
                if background::bit_depth(state.bg_mode, index).is_none()
                    || !shown.contains(layer.mask())
                {
                    continue;
                }
                background::render_line(index, line, mosaic_line, state, memory, span, &mut layers[index]);
                renderer::merge_layer(*layer, &layers[index], state, &table, windows, main, sub);
            }
        }

        renderer::merge_layer(Layer::Obj, objects, state, &table, windows, main, sub);
        renderer::composite_line(state, main, sub, windows, out, metrics);
    }
}
