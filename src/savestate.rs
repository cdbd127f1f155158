use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};

use crate::error::PpuError;
use crate::ppu::memory::{CGRAM_ENTRIES, OAM_BYTES, VRAM_WORDS};
use crate::ppu::registers::PpuState;

/// Complete PPU state between frames: registers plus the three memories.
///
/// Encoded with bincode. Restoring a snapshot and rendering the same writes
/// reproduces the same frames bit for bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpuSnapshot {
    pub version: u32,
    pub frame_count: u64,
    pub state: PpuState,
    pub vram: Vec<u16>,
    pub cgram: Vec<u16>,
    pub oam: Vec<u8>,
}

impl PpuSnapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn check_version(&self) -> Result<(), PpuError> {
        if self.version != Self::CURRENT_VERSION {
            return Err(PpuError::SnapshotVersion {
                found: self.version,
                expected: Self::CURRENT_VERSION,
            });
        }
        check_len("vram", self.vram.len(), VRAM_WORDS)?;
        check_len("cgram", self.cgram.len(), CGRAM_ENTRIES)?;
        check_len("oam", self.oam.len(), OAM_BYTES)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PpuError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PpuError> {
        let snapshot: PpuSnapshot = bincode::deserialize(data)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn save_to_file(&self, filename: &str) -> Result<(), PpuError> {
        let data = self.to_bytes()?;
        let mut file = File::create(filename)?;
        file.write_all(&data)?;
        log::info!("Saved PPU snapshot ({} bytes) to {}", data.len(), filename);
        Ok(())
    }

    pub fn load_from_file(filename: &str) -> Result<Self, PpuError> {
        let mut file = File::open(filename)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            version: self.version,
            frame_count: self.frame_count,
            bg_mode: self.state.bg_mode,
        }
    }
}

fn check_len(field: &'static str, len: usize, expected: usize) -> Result<(), PpuError> {
    if len != expected {
        return Err(PpuError::SnapshotLength {
            field,
            len,
            expected,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub version: u32,
    pub frame_count: u64,
    pub bg_mode: u8,
}
