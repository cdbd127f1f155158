//! VRAM, CGRAM and OAM storage.
//!
//! Every write is range-checked here so the render path can index with
//! masked addresses and never re-validate per pixel.

use serde::{Deserialize, Serialize};

use crate::error::PpuError;

pub const VRAM_WORDS: usize = 0x8000;
pub const VRAM_BYTES: usize = VRAM_WORDS * 2;
pub const CGRAM_ENTRIES: usize = 256;
pub const OAM_SPRITES: usize = 128;
pub const OAM_LOW_BYTES: usize = 0x200;
pub const OAM_HIGH_BYTES: usize = 0x20;
pub const OAM_BYTES: usize = OAM_LOW_BYTES + OAM_HIGH_BYTES;

/// 32K words of tile and tilemap storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vram {
    words: Vec<u16>,
}

impl Default for Vram {
    fn default() -> Self {
        Self::new()
    }
}

impl Vram {
    pub fn new() -> Self {
        Self {
            words: vec![0; VRAM_WORDS],
        }
    }

    /// Render-path read. The address is a hardware word address and wraps at
    /// 15 bits exactly like the PPU address bus.
    #[inline]
    pub fn word(&self, addr: u16) -> u16 {
        self.words[(addr & 0x7FFF) as usize]
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn write_word(&mut self, offset: usize, value: u16) -> Result<(), PpuError> {
        self.write_block(offset, &[value])
    }

    /// Bulk copy of `data` starting at word `offset`, as a DMA would do it.
    pub fn write_block(&mut self, offset: usize, data: &[u16]) -> Result<(), PpuError> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= VRAM_WORDS)
            .ok_or(PpuError::VramOutOfRange {
                offset,
                len: data.len(),
            })?;
        self.words[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Bulk copy of little-endian bytes starting at byte `offset`.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<(), PpuError> {
        if offset
            .checked_add(data.len())
            .map_or(true, |end| end > VRAM_BYTES)
        {
            return Err(PpuError::VramOutOfRange {
                offset: offset / 2,
                len: data.len().div_ceil(2),
            });
        }
        for (i, &byte) in data.iter().enumerate() {
            let pos = offset + i;
            self.set_byte(pos, byte);
        }
        Ok(())
    }

    /// Word store with the address wrapped to 15 bits.
    #[inline]
    pub(crate) fn set_word(&mut self, addr: u16, value: u16) {
        self.words[(addr & 0x7FFF) as usize] = value;
    }

    #[inline]
    pub(crate) fn set_byte(&mut self, pos: usize, byte: u8) {
        let word = &mut self.words[(pos >> 1) & (VRAM_WORDS - 1)];
        *word = if pos & 1 == 0 {
            (*word & 0xFF00) | byte as u16
        } else {
            (*word & 0x00FF) | ((byte as u16) << 8)
        };
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    pub(crate) fn load_words(&mut self, words: &[u16]) -> Result<(), PpuError> {
        if words.len() != VRAM_WORDS {
            return Err(PpuError::SnapshotLength {
                field: "vram",
                len: words.len(),
                expected: VRAM_WORDS,
            });
        }
        self.words.copy_from_slice(words);
        Ok(())
    }
}

/// 256 BGR555 palette entries. Red sits in bits 0-4, blue in bits 10-14.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cgram {
    colors: Vec<u16>,
}

impl Default for Cgram {
    fn default() -> Self {
        Self::new()
    }
}

impl Cgram {
    pub fn new() -> Self {
        Self {
            colors: vec![0; CGRAM_ENTRIES],
        }
    }

    #[inline]
    pub fn color(&self, index: u8) -> u16 {
        self.colors[index as usize]
    }

    pub fn colors(&self) -> &[u16] {
        &self.colors
    }

    #[inline]
    pub(crate) fn set(&mut self, index: u8, color: u16) {
        self.colors[index as usize] = color & 0x7FFF;
    }

    /// Bit 15 is not stored by the hardware and is dropped here.
    pub fn write(&mut self, index: usize, color: u16) -> Result<(), PpuError> {
        self.write_block(index, &[color])
    }

    pub fn write_block(&mut self, index: usize, colors: &[u16]) -> Result<(), PpuError> {
        let end = index
            .checked_add(colors.len())
            .filter(|&end| end <= CGRAM_ENTRIES)
            .ok_or(PpuError::CgramOutOfRange {
                index,
                len: colors.len(),
            })?;
        for (slot, &color) in self.colors[index..end].iter_mut().zip(colors) {
            *slot = color & 0x7FFF;
        }
        Ok(())
    }

    pub(crate) fn load(&mut self, colors: &[u16]) -> Result<(), PpuError> {
        if colors.len() != CGRAM_ENTRIES {
            return Err(PpuError::SnapshotLength {
                field: "cgram",
                len: colors.len(),
                expected: CGRAM_ENTRIES,
            });
        }
        for (slot, &color) in self.colors.iter_mut().zip(colors) {
            *slot = color & 0x7FFF;
        }
        Ok(())
    }
}

/// Decoded view of one sprite: low-table bytes plus its two high-table bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OamEntry {
    /// 9-bit signed position, -256..=255.
    pub x: i16,
    pub y: u8,
    /// Bit 8 selects the second name table.
    pub tile: u16,
    pub palette: u8,
    pub priority: u8,
    pub flip_x: bool,
    pub flip_y: bool,
    pub large: bool,
}

impl OamEntry {
    pub(crate) fn validate(&self) -> Result<(), PpuError> {
        let bad = |field, value: i32| Err(PpuError::InvalidSpriteField { field, value });
        if !(-256..=255).contains(&self.x) {
            return bad("x", self.x as i32);
        }
        if self.tile > 0x1FF {
            return bad("tile", self.tile as i32);
        }
        if self.palette > 7 {
            return bad("palette", self.palette as i32);
        }
        if self.priority > 3 {
            return bad("priority", self.priority as i32);
        }
        Ok(())
    }
}

/// Raw 544-byte object attribute memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oam {
    bytes: Vec<u8>,
}

impl Default for Oam {
    fn default() -> Self {
        Self::new()
    }
}

impl Oam {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; OAM_BYTES],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode sprite `index & 0x7F`.
    #[inline]
    pub fn entry(&self, index: usize) -> OamEntry {
        let index = index & (OAM_SPRITES - 1);
        let base = index * 4;
        let attr = self.bytes[base + 3];
        let high = self.bytes[OAM_LOW_BYTES + index / 4] >> ((index % 4) * 2);
        let raw_x = self.bytes[base] as u16 | (((high & 1) as u16) << 8);
        OamEntry {
            x: if raw_x >= 0x100 {
                raw_x as i16 - 0x200
            } else {
                raw_x as i16
            },
            y: self.bytes[base + 1],
            tile: self.bytes[base + 2] as u16 | (((attr & 1) as u16) << 8),
            palette: (attr >> 1) & 7,
            priority: (attr >> 4) & 3,
            flip_x: attr & 0x40 != 0,
            flip_y: attr & 0x80 != 0,
            large: high & 2 != 0,
        }
    }

    pub fn write_entry(&mut self, index: usize, entry: &OamEntry) -> Result<(), PpuError> {
        if index >= OAM_SPRITES {
            return Err(PpuError::OamIndexOutOfRange(index));
        }
        entry.validate()?;
        self.store_entry(index, entry);
        Ok(())
    }

    /// Pack `entry` into sprite slot `index & 0x7F`. Out-of-range fields are
    /// truncated to their bit widths.
    pub(crate) fn store_entry(&mut self, index: usize, entry: &OamEntry) {
        let index = index & (OAM_SPRITES - 1);
        let raw_x = (entry.x as i32 & 0x1FF) as u16;
        let base = index * 4;
        self.bytes[base] = raw_x as u8;
        self.bytes[base + 1] = entry.y;
        self.bytes[base + 2] = entry.tile as u8;
        self.bytes[base + 3] = ((entry.tile >> 8) as u8 & 1)
            | ((entry.palette & 7) << 1)
            | ((entry.priority & 3) << 4)
            | if entry.flip_x { 0x40 } else { 0 }
            | if entry.flip_y { 0x80 } else { 0 };

        let shift = (index % 4) * 2;
        let bits = ((raw_x >> 8) as u8 & 1) | if entry.large { 2 } else { 0 };
        let slot = &mut self.bytes[OAM_LOW_BYTES + index / 4];
        *slot = (*slot & !(3 << shift)) | (bits << shift);
    }

    /// Bulk copy into the raw table (low table at 0x000, high table at 0x200).
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<(), PpuError> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= OAM_BYTES)
            .ok_or(PpuError::OamBytesOutOfRange {
                offset,
                len: data.len(),
            })?;
        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    pub(crate) fn set_byte(&mut self, offset: usize, value: u8) {
        self.bytes[offset % OAM_BYTES] = value;
    }

    pub(crate) fn load(&mut self, bytes: &[u8]) -> Result<(), PpuError> {
        if bytes.len() != OAM_BYTES {
            return Err(PpuError::SnapshotLength {
                field: "oam",
                len: bytes.len(),
                expected: OAM_BYTES,
            });
        }
        self.bytes.copy_from_slice(bytes);
        Ok(())
    }
}

/// The complete memory store owned by the PPU.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMemory {
    pub vram: Vram,
    pub cgram: Cgram,
    pub oam: Oam,
}

impl VideoMemory {
    pub fn new() -> Self {
        Self::default()
    }
}
