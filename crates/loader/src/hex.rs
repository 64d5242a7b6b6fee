// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use avrlab_core::memory::FirmwareImage;
use tracing::debug;

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;
const RECORD_EXT_LINEAR: u8 = 0x04;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HexSummary {
    pub records: usize,
    pub bytes_written: usize,
    pub bytes_dropped: usize,
    pub skipped_lines: usize,
    pub saw_eof: bool,
}

struct Record {
    kind: u8,
    addr: u16,
    data: Vec<u8>,
}

/// Two hex digits at `at`. Signs are rejected, unlike `from_str_radix`.
fn hex_byte(s: &str, at: usize) -> Option<u8> {
    s.get(at..at + 2)
        .filter(|pair| pair.bytes().all(|b| b.is_ascii_hexdigit()))
        .and_then(|pair| u8::from_str_radix(pair, 16).ok())
}

/// Parses `:LLAAAATT[DD...]` ignoring the checksum byte.
fn parse_record(line: &str) -> Option<Record> {
    let body = line.strip_prefix(':')?;
    let len = hex_byte(body, 0)? as usize;
    let addr = ((hex_byte(body, 2)? as u16) << 8) | hex_byte(body, 4)? as u16;
    let kind = hex_byte(body, 6)?;
    let data = (0..len)
        .map(|i| hex_byte(body, 8 + i * 2))
        .collect::<Option<Vec<u8>>>()?;
    Some(Record { kind, addr, data })
}

/// Builds a flash image from Intel HEX text.
///
/// The parser is permissive: checksums are not verified, malformed or
/// truncated lines are skipped and bytes outside flash are dropped. Parsing
/// ends at the first end-of-file record.
pub fn parse_intel_hex(text: &str, flash_size: usize) -> FirmwareImage {
    parse_intel_hex_with_summary(text, flash_size).0
}

pub fn parse_intel_hex_with_summary(text: &str, flash_size: usize) -> (FirmwareImage, HexSummary) {
    let mut image = FirmwareImage::new(flash_size);
    let mut summary = HexSummary::default();
    let mut upper: u32 = 0;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if !line.starts_with(':') {
            continue;
        }
        let Some(record) = parse_record(line) else {
            debug!("HEX line {} skipped: malformed record", lineno + 1);
            summary.skipped_lines += 1;
            continue;
        };
        summary.records += 1;

        match record.kind {
            RECORD_DATA => {
                let base = upper | record.addr as u32;
                for (i, byte) in record.data.iter().enumerate() {
                    if image.write(base as usize + i, *byte) {
                        summary.bytes_written += 1;
                    } else {
                        summary.bytes_dropped += 1;
                    }
                }
            }
            RECORD_EOF => {
                summary.saw_eof = true;
                break;
            }
            RECORD_EXT_LINEAR => {
                if record.data.len() < 2 {
                    debug!("HEX line {} skipped: short extended address", lineno + 1);
                    summary.skipped_lines += 1;
                    continue;
                }
                upper = ((record.data[0] as u32) << 24) | ((record.data[1] as u32) << 16);
            }
            other => {
                debug!("HEX line {}: record type {:#04x} ignored", lineno + 1, other);
            }
        }
    }

    debug!(
        "HEX parsed: {} records, {} bytes written, {} dropped, {} lines skipped",
        summary.records, summary.bytes_written, summary.bytes_dropped, summary.skipped_lines
    );
    (image, summary)
}
