//! Scanline-accurate SNES PPU: backgrounds, Mode 7, sprites, windows and
//! color math composited into 32-bit ARGB frames.

pub mod debug_flags;
pub mod error;
pub mod ppu;
pub mod savestate;

pub use error::PpuError;
pub use ppu::memory::{OamEntry, VideoMemory};
pub use ppu::registers::{LayerMask, PpuState, RegisterWrite};
pub use ppu::{AspectRatio, FramePhase, FrameView, LineSpan, Ppu, PpuConfig};
pub use savestate::PpuSnapshot;
