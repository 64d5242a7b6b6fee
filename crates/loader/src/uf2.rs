// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! UF2 block container, as produced for RP2040 boards.

use anyhow::{anyhow, bail, Result};
use avrlab_core::memory::FirmwareImage;
use tracing::debug;

pub const BLOCK_SIZE: usize = 512;
pub const MAX_PAYLOAD: usize = 476;
pub const MAGIC_START0: u32 = 0x0A32_4655;
pub const MAGIC_START1: u32 = 0x9E5D_5157;
pub const MAGIC_END: u32 = 0x0AB1_6F30;

const FLAG_NOT_MAIN_FLASH: u32 = 0x0000_0001;
const DATA_OFFSET: usize = 32;

fn word(block: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        block[offset],
        block[offset + 1],
        block[offset + 2],
        block[offset + 3],
    ])
}

pub fn is_uf2(bytes: &[u8]) -> bool {
    bytes.len() >= BLOCK_SIZE && word(bytes, 0) == MAGIC_START0 && word(bytes, 4) == MAGIC_START1
}

/// Reassembles the main-flash payload of a UF2 file into a flash image.
///
/// Unlike the HEX loader this is strict: any bad magic number, oversize
/// payload or write outside `flash_base..flash_base + flash_size` is an error.
pub fn parse_uf2(bytes: &[u8], flash_base: u64, flash_size: usize) -> Result<FirmwareImage> {
    if bytes.is_empty() || bytes.len() % BLOCK_SIZE != 0 {
        bail!(
            "UF2 length {} is not a multiple of {} bytes",
            bytes.len(),
            BLOCK_SIZE
        );
    }

    let mut image = FirmwareImage::new(flash_size);
    let mut written = 0usize;
    let mut skipped = 0usize;

    for (index, block) in bytes.chunks_exact(BLOCK_SIZE).enumerate() {
        if word(block, 0) != MAGIC_START0 || word(block, 4) != MAGIC_START1 {
            bail!("UF2 block {} has a bad start magic", index);
        }
        if word(block, BLOCK_SIZE - 4) != MAGIC_END {
            bail!("UF2 block {} has a bad end magic", index);
        }

        let flags = word(block, 8);
        if flags & FLAG_NOT_MAIN_FLASH != 0 {
            skipped += 1;
            continue;
        }

        let target = word(block, 12) as u64;
        let payload = word(block, 16) as usize;
        if payload > MAX_PAYLOAD {
            bail!(
                "UF2 block {} declares {} payload bytes (max {})",
                index,
                payload,
                MAX_PAYLOAD
            );
        }

        let offset = target
            .checked_sub(flash_base)
            .ok_or_else(|| anyhow!("UF2 block {} targets {:#x} below flash", index, target))?
            as usize;
        if offset + payload > flash_size {
            bail!(
                "UF2 block {} writes {:#x}..{:#x}, past the end of flash",
                index,
                target,
                target + payload as u64
            );
        }

        written += image.write_slice(offset, &block[DATA_OFFSET..DATA_OFFSET + payload]);
    }

    debug!(
        "UF2 parsed: {} bytes written, {} blocks skipped",
        written, skipped
    );
    Ok(image)
}
