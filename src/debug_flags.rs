use std::sync::OnceLock;

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// Per-write register trace (very chatty)
pub fn ppu_write() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("DEBUG_PPU_WRITE", false))
}

pub fn render_metrics() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("DEBUG_RENDER_METRICS", false))
}

// Frame/scanline lifecycle chatter
pub fn trace_scanline() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("TRACE_PPU_SCANLINE", false))
}

pub fn quiet() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("QUIET", false))
}

pub fn extra_left() -> u16 {
    static VAL: OnceLock<u16> = OnceLock::new();
    *VAL.get_or_init(|| env_u16("PPU_EXTRA_LEFT", 0))
}

pub fn extra_right() -> u16 {
    static VAL: OnceLock<u16> = OnceLock::new();
    *VAL.get_or_init(|| env_u16("PPU_EXTRA_RIGHT", 0))
}

/// Aspect ratio name ("4:3", "16:9", "16:10"); overrides the explicit
/// extra-pixel counts when set.
pub fn aspect() -> Option<&'static str> {
    static VAL: OnceLock<Option<String>> = OnceLock::new();
    VAL.get_or_init(|| env_string("PPU_ASPECT")).as_deref()
}

pub fn extend_y() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("PPU_EXTEND_Y", false))
}

pub fn no_sprite_limits() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("PPU_NO_SPRITE_LIMITS", false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_flag_accepts_common_truthy_spellings() {
        std::env::set_var("SNES_PPU_TEST_FLAG_A", "on");
        std::env::set_var("SNES_PPU_TEST_FLAG_B", "0");
        assert!(env_flag("SNES_PPU_TEST_FLAG_A", false));
        assert!(!env_flag("SNES_PPU_TEST_FLAG_B", true));
        assert!(env_flag("SNES_PPU_TEST_FLAG_UNSET", true));
    }

    #[test]
    fn env_u16_falls_back_on_garbage() {
        std::env::set_var("SNES_PPU_TEST_U16", "not-a-number");
        assert_eq!(env_u16("SNES_PPU_TEST_U16", 7), 7);
        std::env::set_var("SNES_PPU_TEST_U16_OK", "64");
        assert_eq!(env_u16("SNES_PPU_TEST_U16_OK", 7), 64);
    }
}
