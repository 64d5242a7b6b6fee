// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod hex;
pub mod uf2;

pub use hex::{parse_intel_hex, parse_intel_hex_with_summary, HexSummary};
pub use uf2::parse_uf2;

use anyhow::{bail, Context, Result};
use avrlab_core::memory::FirmwareImage;
use avrlab_core::{BoardDescriptor, Target};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareFormat {
    IntelHex,
    Uf2,
}

impl FirmwareFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "hex" | "ihex" | "ihx" => Some(Self::IntelHex),
            "uf2" => Some(Self::Uf2),
            _ => None,
        }
    }

    /// Guesses the container from its first bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if uf2::is_uf2(bytes) {
            return Some(Self::Uf2);
        }
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace())?;
        (*first == b':').then_some(Self::IntelHex)
    }
}

fn hex_image(path: &Path, bytes: &[u8], flash_size: usize) -> Result<FirmwareImage> {
    let text = std::str::from_utf8(bytes)
        .with_context(|| format!("HEX file {:?} is not valid text", path))?;
    let (image, summary) = parse_intel_hex_with_summary(text, flash_size);
    info!(
        "Loaded {:?}: {} bytes in {} records",
        path, summary.bytes_written, summary.records
    );
    if summary.bytes_dropped > 0 {
        warn!(
            "{} bytes fell outside {} bytes of flash and were dropped",
            summary.bytes_dropped, flash_size
        );
    }
    Ok(image)
}

fn uf2_image(path: &Path, bytes: &[u8], flash_base: u64, flash_size: usize) -> Result<FirmwareImage> {
    let image = parse_uf2(bytes, flash_base, flash_size)
        .with_context(|| format!("Invalid UF2 image {:?}", path))?;
    info!("Loaded {:?}: {} blocks", path, bytes.len() / uf2::BLOCK_SIZE);
    Ok(image)
}

/// Loads firmware for `board`, picking the container by extension or content.
pub fn load_firmware(path: &Path, board: &BoardDescriptor) -> Result<FirmwareImage> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read firmware file: {:?}", path))?;
    parse_firmware(path, &bytes, board)
}

/// Builds a flash image from firmware bytes already read from `path`.
///
/// `path` only selects the container by extension and labels log lines; when
/// the extension is unknown the content is sniffed.
pub fn parse_firmware(path: &Path, bytes: &[u8], board: &BoardDescriptor) -> Result<FirmwareImage> {
    let flash_size = board.flash_size()?;
    let Some(format) = FirmwareFormat::from_path(path).or_else(|| FirmwareFormat::sniff(bytes))
    else {
        bail!("Unrecognised firmware format: {:?}", path);
    };

    match (format, board.target) {
        (FirmwareFormat::IntelHex, Target::Atmega328p) | (FirmwareFormat::Uf2, Target::Rp2040) => {}
        (format, target) => warn!("{:?} firmware is unusual for target {}", format, target),
    }
    match format {
        FirmwareFormat::IntelHex => hex_image(path, bytes, flash_size),
        FirmwareFormat::Uf2 => uf2_image(path, bytes, board.flash.base, flash_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            FirmwareFormat::from_path(Path::new("blink.HEX")),
            Some(FirmwareFormat::IntelHex)
        );
        assert_eq!(
            FirmwareFormat::from_path(Path::new("pico/blink.uf2")),
            Some(FirmwareFormat::Uf2)
        );
        assert_eq!(FirmwareFormat::from_path(Path::new("blink.elf")), None);
    }

    #[test]
    fn test_sniff() {
        assert_eq!(
            FirmwareFormat::sniff(b"\n:00000001FF\n"),
            Some(FirmwareFormat::IntelHex)
        );
        assert_eq!(FirmwareFormat::sniff(b"\x7fELF"), None);
        assert_eq!(FirmwareFormat::sniff(b""), None);
    }

    #[test]
    fn test_parse_firmware_sniffs_unknown_extension() {
        let board = BoardDescriptor::arduino_uno();
        let image = parse_firmware(Path::new("blink.bin"), b":02000000ABCD86\n", &board).unwrap();
        assert_eq!(&image.as_bytes()[..2], &[0xAB, 0xCD]);
        assert_eq!(image.len(), 32 * 1024);

        let err = parse_firmware(Path::new("blink.bin"), b"\x7fELF", &board).unwrap_err();
        assert!(err.to_string().contains("Unrecognised firmware format"));
    }

    #[test]
    fn test_parse_firmware_rejects_binary_hex() {
        let board = BoardDescriptor::arduino_uno();
        assert!(parse_firmware(Path::new("blink.hex"), &[b':', 0xFF, 0xFE], &board).is_err());
    }
}
