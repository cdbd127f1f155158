use snes_ppu::ppu::background::BitDepth;
use snes_ppu::ppu::registers::{MathOp, RegisterWrite};
use snes_ppu::{LayerMask, OamEntry, Ppu, PpuConfig};
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

// Renders a synthetic scene without a window and prints one checksum per frame.
// Usage:
//   cargo run --release --bin headless_render -- --frames 60 --scene mode7 --ppm out.ppm
// HEADLESS_FRAMES works as a fallback for --frames. PPU_* variables pick the geometry.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scene {
    Layers,
    Mode7,
}

struct Args {
    frames: u64,
    scene: Scene,
    ppm: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = env::args().skip(1);
    let mut frames: Option<u64> = None;
    let mut scene = Scene::Layers;
    let mut ppm = None;

    while let Some(a) = args.next() {
        match a.as_str() {
            "--frames" => frames = args.next().and_then(|v| v.parse().ok()),
            "--scene" => {
                if let Some(v) = args.next() {
                    scene = if v == "mode7" { Scene::Mode7 } else { Scene::Layers };
                }
            }
            "--ppm" => ppm = args.next().map(PathBuf::from),
            other => log::warn!("ignoring argument {}", other),
        }
    }

    let frames = frames
        .or_else(|| env::var("HEADLESS_FRAMES").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(60);
    Args { frames, scene, ppm }
}

/// Write a planar 4bpp or 2bpp tile whose pixels follow `pixel(x, y)`.
fn write_tile(ppu: &mut Ppu, base: usize, depth: BitDepth, pixel: impl Fn(usize, usize) -> u8) -> Result<(), Box<dyn Error>> {
    let planes = depth.bits() as usize;
    for y in 0..8 {
        for pair in 0..planes / 2 {
            let mut lo = 0u16;
            let mut hi = 0u16;
            for x in 0..8 {
                let p = pixel(x, y);
                lo |= (((p >> (pair * 2)) & 1) as u16) << (7 - x);
                hi |= (((p >> (pair * 2 + 1)) & 1) as u16) << (7 - x);
            }
            ppu.memory_mut().vram.write_word(base + pair * 8 + y, lo | (hi << 8))?;
        }
    }
    Ok(())
}

fn build_layers(ppu: &mut Ppu) -> Result<(), Box<dyn Error>> {
    ppu.write_io(0x2105, 0x01);
    ppu.write_io(0x2107, 0x40); // BG1 map $4000
    ppu.write_io(0x2108, 0x48); // BG2 map $4800
    ppu.write_io(0x210B, 0x00);
    ppu.write_io(0x212C, 0x13);
    ppu.write_io(0x212D, 0x02);

    write_tile(ppu, 16, BitDepth::Bpp4, |x, y| ((x ^ y) & 7) as u8 + 1)?;
    write_tile(ppu, 32, BitDepth::Bpp4, |x, y| if (x + y) % 4 == 0 { 9 } else { 0 })?;
    for cell in 0..1024usize {
        let palette = ((cell / 32) % 4) as u16;
        ppu.memory_mut().vram.write_word(0x4000 + cell, 1 | (palette << 10))?;
        ppu.memory_mut().vram.write_word(0x4800 + cell, 2 | 0x2000)?;
    }
    for i in 0..64u16 {
        ppu.memory_mut().cgram.write(i as usize, i.wrapping_mul(0x0863) & 0x7FFF)?;
    }
    ppu.memory_mut().cgram.write(128 + 9, 0x7FFF)?;

    for i in 0..48 {
        let entry = OamEntry {
            x: (i as i16 * 23) % 260 - 12,
            y: ((i * 37) % 200) as u8,
            tile: 2,
            palette: (i % 8) as u8,
            priority: (i % 4) as u8,
            flip_x: i % 3 == 0,
            ..OamEntry::default()
        };
        ppu.memory_mut().oam.write_entry(i, &entry)?;
    }

    ppu.schedule(
        0,
        RegisterWrite::ColorMath {
            op: MathOp::Add,
            half: true,
            layers: LayerMask::BG1 | LayerMask::OBJ,
        },
    )?;
    ppu.write_io(0x2130, 0x02);
    Ok(())
}

fn build_mode7(ppu: &mut Ppu) -> Result<(), Box<dyn Error>> {
    ppu.write_io(0x2105, 0x07);
    ppu.write_io(0x212C, 0x01);
    for word in 0..0x4000usize {
        let (x, y) = (word % 128, word / 128);
        let map = ((x / 2 + y / 2) % 4) as u16;
        let tile = word / 64;
        let chr = if tile < 4 {
            let (px, py) = (word % 8, (word / 8) % 8);
            (tile as u16 * 4 + ((px + py) % 4) as u16) + 1
        } else {
            0
        };
        ppu.memory_mut().vram.write_word(word, map | (chr << 8))?;
    }
    for i in 1..17u16 {
        ppu.memory_mut().cgram.write(i as usize, (i * 0x0C63) & 0x7FFF)?;
    }
    Ok(())
}

/// Per-frame register animation, committed between lines like a game's NMI handler.
fn animate(ppu: &mut Ppu, scene: Scene, frame: u64) -> Result<(), Box<dyn Error>> {
    match scene {
        Scene::Layers => {
            let h = (frame * 2) as u16;
            ppu.schedule(0, RegisterWrite::BgScroll { layer: 0, h, v: (frame / 2) as u16 })?;
            ppu.schedule(100, RegisterWrite::BgScroll { layer: 1, h: h / 3, v: 0 })?;
        }
        Scene::Mode7 => {
            let angle = frame as f64 * 0.05;
            let scale = 1.0 + (frame as f64 * 0.02).sin() * 0.5;
            let cos = (angle.cos() * 256.0 / scale) as i16;
            let sin = (angle.sin() * 256.0 / scale) as i16;
            ppu.schedule(0, RegisterWrite::Mode7Matrix { a: cos, b: sin, c: -sin, d: cos })?;
            ppu.schedule(0, RegisterWrite::Mode7Center { x: 128, y: 112 })?;
        }
    }
    Ok(())
}

fn checksum(pixels: &[u32]) -> u64 {
    // FNV-1a over the pixel words
    pixels.iter().fold(0xcbf2_9ce4_8422_2325u64, |h, &px| {
        (h ^ px as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn write_ppm(path: &PathBuf, ppu: &Ppu) -> Result<(), Box<dyn Error>> {
    let frame = ppu.frame();
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{} {}\n255\n", frame.width, frame.height)?;
    for y in 0..frame.height {
        for &px in frame.row(y) {
            out.write_all(&[(px >> 16) as u8, (px >> 8) as u8, px as u8])?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = parse_args();

    let mut ppu = Ppu::with_config(PpuConfig::from_env())?;
    match args.scene {
        Scene::Layers => build_layers(&mut ppu)?,
        Scene::Mode7 => build_mode7(&mut ppu)?,
    }
    log::info!(
        "Rendering {} frames at {}x{}",
        args.frames,
        ppu.config().width(),
        ppu.config().height()
    );

    for frame in 0..args.frames {
        animate(&mut ppu, args.scene, frame)?;
        let view = ppu.render_frame()?;
        let sum = checksum(view.pixels);
        if !snes_ppu::debug_flags::quiet() {
            println!("frame {:4} checksum {:016x}", frame, sum);
        }
    }
    if snes_ppu::debug_flags::render_metrics() {
        println!("{}", ppu.take_render_metrics_summary());
    }

    if let Some(path) = args.ppm.as_ref() {
        write_ppm(path, &ppu)?;
        log::info!("Wrote {}", path.display());
    }
    Ok(())
}
