use thiserror::Error;

/// Contract violations reported at the mutation boundary.
///
/// Rendering itself never fails on data; only writes that would land outside
/// the memory store, malformed OAM fields, and misuse of the frame sequencing
/// surface here.
#[derive(Error, Debug)]
pub enum PpuError {
    #[error("VRAM write of {len} words at word offset {offset:#06x} exceeds 32K words")]
    VramOutOfRange { offset: usize, len: usize },

    #[error("CGRAM write of {len} entries at index {index} exceeds 256 entries")]
    CgramOutOfRange { index: usize, len: usize },

    #[error("OAM sprite index {0} out of range (0-127)")]
    OamIndexOutOfRange(usize),

    #[error("OAM byte write of {len} bytes at offset {offset:#05x} exceeds 544 bytes")]
    OamBytesOutOfRange { offset: usize, len: usize },

    #[error("invalid OAM field {field}: {value}")]
    InvalidSpriteField { field: &'static str, value: i32 },

    #[error("background layer {0} out of range (0-3)")]
    LayerOutOfRange(usize),

    #[error("scanline {got} requested out of order (expected {expected})")]
    ScanlineOutOfOrder { expected: u16, got: u16 },

    #[error("scanline {line} beyond visible height {height}")]
    ScanlineOutOfRange { line: u16, height: u16 },

    #[error("frame in progress (last rendered scanline {0})")]
    FrameInProgress(u16),

    #[error("invalid render configuration: {0}")]
    InvalidConfig(String),

    #[error("snapshot version {found} unsupported (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },

    #[error("snapshot field {field} has length {len}, expected {expected}")]
    SnapshotLength {
        field: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("snapshot file I/O failed: {0}")]
    SnapshotIo(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    SnapshotCodec(#[from] bincode::Error),
}
