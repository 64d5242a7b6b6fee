// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Flat image of the device's program memory.
///
/// The buffer has a fixed length equal to the flash size and starts zeroed.
/// Writes outside the buffer are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    pub fn new(flash_size: usize) -> Self {
        Self {
            data: vec![0; flash_size],
        }
    }

    /// Copies `bytes` to offset 0, dropping anything past `flash_size`.
    pub fn from_bytes(bytes: &[u8], flash_size: usize) -> Self {
        let mut image = Self::new(flash_size);
        image.write_slice(0, bytes);
        image
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns `false` when `addr` is outside flash and the byte was dropped.
    pub fn write(&mut self, addr: usize, value: u8) -> bool {
        match self.data.get_mut(addr) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Writes as much of `bytes` as fits; returns the number of bytes stored.
    pub fn write_slice(&mut self, addr: usize, bytes: &[u8]) -> usize {
        if addr >= self.data.len() {
            return 0;
        }
        let n = bytes.len().min(self.data.len() - addr);
        self.data[addr..addr + n].copy_from_slice(&bytes[..n]);
        n
    }

    /// Shrinks the image to `flash_size`; never grows it.
    pub fn truncate(&mut self, flash_size: usize) {
        self.data.truncate(flash_size);
    }
}

/// Reinterprets bytes as little-endian 16-bit words. A trailing odd byte is dropped.
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| pair[0] as u16 | ((pair[1] as u16) << 8))
        .collect()
}

/// Word-addressed, read-only instruction memory.
#[derive(Debug, Clone, Default)]
pub struct ProgramWords {
    words: Vec<u16>,
}

impl ProgramWords {
    pub fn from_image(image: &FirmwareImage) -> Self {
        Self {
            words: bytes_to_words(image.as_bytes()),
        }
    }

    pub fn from_words(words: Vec<u16>) -> Self {
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.words
    }

    /// Word at `pc`, or 0 (NOP) past the end of flash.
    pub fn fetch(&self, pc: u32) -> u16 {
        self.words.get(pc as usize).copied().unwrap_or(0)
    }

    /// Byte view used by LPM: even addresses are the low half of a word.
    pub fn read_byte(&self, addr: u32) -> u8 {
        let word = self.fetch(addr >> 1);
        if addr & 1 == 0 {
            (word & 0xFF) as u8
        } else {
            (word >> 8) as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_drops_out_of_range_writes() {
        let mut image = FirmwareImage::new(4);
        assert!(image.write(3, 0xAA));
        assert!(!image.write(4, 0xBB));
        assert_eq!(image.as_bytes(), &[0, 0, 0, 0xAA]);

        assert_eq!(image.write_slice(2, &[1, 2, 3, 4]), 2);
        assert_eq!(image.as_bytes(), &[0, 0, 1, 2]);
        assert_eq!(image.write_slice(9, &[1]), 0);
        assert_eq!(image.len(), 4);
    }

    #[test]
    fn test_bytes_to_words_little_endian() {
        assert_eq!(bytes_to_words(&[0x12, 0x34, 0xFF, 0x00]), vec![0x3412, 0x00FF]);
    }

    #[test]
    fn test_bytes_to_words_drops_trailing_byte() {
        assert_eq!(bytes_to_words(&[0x01, 0x02, 0x03]), vec![0x0201]);
        assert!(bytes_to_words(&[0x01]).is_empty());
    }

    #[test]
    fn test_program_fetch_and_lpm_bytes() {
        let image = FirmwareImage::from_bytes(&[0x0C, 0x94, 0x5C, 0x00], 8);
        let program = ProgramWords::from_image(&image);
        assert_eq!(program.len(), 4);
        assert_eq!(program.fetch(0), 0x940C);
        assert_eq!(program.fetch(1), 0x005C);
        assert_eq!(program.fetch(100), 0);
        assert_eq!(program.read_byte(0), 0x0C);
        assert_eq!(program.read_byte(1), 0x94);
        assert_eq!(program.read_byte(2), 0x5C);
    }
}
