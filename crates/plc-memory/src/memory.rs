//! The memory space: a typed, section-partitioned register file.
//!
//! ```text
//! MemorySpace
//! ├── bits      Mutex<Vec<u8>>              packed, LSB-first, ceil(blen/8) bytes
//! ├── words16   Mutex<Vec<u64>>              one native slot per element
//! ├── words32   Mutex<Vec<u64>>
//! ├── words64   Mutex<Vec<u64>>
//! └── transforms Mutex<HashMap<(Section,addr), Transform>>
//! ```
//!
//! Every accessor takes its section's lock for the duration of a single
//! call, so a multi-element read or write is atomic with respect to other
//! calls on that section. There is no cross-call atomicity: nothing stops
//! a write landing between another client's read and its next read.
//!
//! Word sections are all backed by `Vec<u64>` regardless of their nominal
//! width; the width only governs truncation on write and waveform scaling
//! in the I/O simulator. This keeps the three word sections structurally
//! identical and avoids duplicating section-dispatch logic three times per
//! accessor.

use plc_common::error::{PlcError, PlcResult};
use plc_common::section::Section;
use std::collections::HashMap;
use std::sync::Mutex;

/// Section lengths used to construct a [`MemorySpace`].
///
/// `blen` is rounded up to the next multiple of 8 for backing storage, but
/// the section's addressable length (what bounds checks use) stays exactly
/// `blen`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemSpaceConfig {
    /// Number of bits in the `bits` section.
    pub blen: u32,
    /// Number of 16-bit words in the `words16` section.
    pub w16len: u32,
    /// Number of 32-bit words in the `words32` section.
    pub w32len: u32,
    /// Number of 64-bit words in the `words64` section.
    pub w64len: u32,
}

impl From<plc_common::config::MemSpaceSizeConfig> for MemSpaceConfig {
    fn from(c: plc_common::config::MemSpaceSizeConfig) -> Self {
        Self {
            blen: c.blen,
            w16len: c.w16len,
            w32len: c.w32len,
            w64len: c.w64len,
        }
    }
}

/// A read-time substitution rule: if the stored value at the installed
/// address falls within `[input_low, input_high]` inclusive, reads return
/// `output` instead. The stored cell itself is never modified by a
/// transform; only the returned view is substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform {
    /// Inclusive lower bound of the input range that triggers substitution.
    pub input_low: u64,
    /// Inclusive upper bound of the input range that triggers substitution.
    pub input_high: u64,
    /// Value substituted in the returned view when the stored value is in range.
    pub output: u64,
}

/// A concurrency-safe, typed register file partitioned into four sections.
#[derive(Debug)]
pub struct MemorySpace {
    bits: Mutex<Vec<u8>>,
    bits_len: u32,
    words16: Mutex<Vec<u64>>,
    words32: Mutex<Vec<u64>>,
    words64: Mutex<Vec<u64>>,
    transforms: Mutex<HashMap<(Section, u32), Transform>>,
}

fn truncate(value: u64, width: u32) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

impl MemorySpace {
    /// Construct a memory space with the given section lengths. Section
    /// lengths are fixed for the lifetime of the returned value.
    #[must_use]
    pub fn new(config: MemSpaceConfig) -> Self {
        let byte_len = config.blen.div_ceil(8) as usize;
        Self {
            bits: Mutex::new(vec![0u8; byte_len]),
            bits_len: config.blen,
            words16: Mutex::new(vec![0u64; config.w16len as usize]),
            words32: Mutex::new(vec![0u64; config.w32len as usize]),
            words64: Mutex::new(vec![0u64; config.w64len as usize]),
            transforms: Mutex::new(HashMap::new()),
        }
    }

    /// Addressable length of `section`.
    #[must_use]
    pub fn section_len(&self, section: Section) -> u32 {
        match section {
            Section::Bits => self.bits_len,
            Section::Words16 => self.words16.lock().unwrap().len() as u32,
            Section::Words32 => self.words32.lock().unwrap().len() as u32,
            Section::Words64 => self.words64.lock().unwrap().len() as u32,
        }
    }

    fn words_store(&self, section: Section) -> &Mutex<Vec<u64>> {
        match section {
            Section::Words16 => &self.words16,
            Section::Words32 => &self.words32,
            Section::Words64 => &self.words64,
            Section::Bits => panic!("word accessor used on bit section"),
        }
    }

    fn check_bounds(&self, section: Section, addr: u32, n: u32) -> PlcResult<()> {
        let len = self.section_len(section);
        let in_bounds = addr.checked_add(n).is_some_and(|end| end <= len);
        if in_bounds {
            Ok(())
        } else {
            Err(PlcError::OutOfBounds {
                section,
                address: addr,
                length: n,
            })
        }
    }

    fn apply_transform(&self, section: Section, addr: u32, raw: u64) -> u64 {
        let transforms = self.transforms.lock().unwrap();
        match transforms.get(&(section, addr)) {
            Some(t) if raw >= t.input_low && raw <= t.input_high => t.output,
            _ => raw,
        }
    }

    /// Read `n` bits starting at `addr`, each `0` or `1`.
    ///
    /// # Errors
    ///
    /// Returns [`PlcError::OutOfBounds`] if `addr + n` exceeds the bit
    /// section's length.
    pub fn get_bits(&self, addr: u32, n: u32) -> PlcResult<Vec<u8>> {
        self.check_bounds(Section::Bits, addr, n)?;
        let bytes = self.bits.lock().unwrap();
        let mut out = Vec::with_capacity(n as usize);
        for i in 0..n {
            let bit = addr + i;
            let byte = bytes[(bit >> 3) as usize];
            let raw = u64::from((byte >> (bit & 7)) & 1);
            out.push(self.apply_transform(Section::Bits, bit, raw) as u8);
        }
        Ok(out)
    }

    /// Write bits starting at `addr`. Each value is truncated to its
    /// low bit (any nonzero value is stored as `1`).
    ///
    /// # Errors
    ///
    /// Returns [`PlcError::OutOfBounds`] if `addr + values.len()` exceeds
    /// the bit section's length.
    pub fn set_bits(&self, addr: u32, values: &[u8]) -> PlcResult<()> {
        let n = values.len() as u32;
        self.check_bounds(Section::Bits, addr, n)?;
        let mut bytes = self.bits.lock().unwrap();
        for (i, &v) in values.iter().enumerate() {
            let bit = addr + i as u32;
            let byte_idx = (bit >> 3) as usize;
            let mask = 1u8 << (bit & 7);
            if v & 1 == 1 {
                bytes[byte_idx] |= mask;
            } else {
                bytes[byte_idx] &= !mask;
            }
        }
        Ok(())
    }

    /// Read `n` elements from `section` starting at `addr`, post-transform.
    ///
    /// # Errors
    ///
    /// Returns [`PlcError::OutOfBounds`] if `addr + n` exceeds the
    /// section's length.
    ///
    /// # Panics
    ///
    /// Panics if `section` is [`Section::Bits`] — use [`MemorySpace::get_bits`]
    /// for the bit section. Calling a word accessor on the bit section is a
    /// programmer error, not a runtime condition a client request can
    /// trigger.
    pub fn get_words(&self, section: Section, addr: u32, n: u32) -> PlcResult<Vec<u64>> {
        self.check_bounds(section, addr, n)?;
        let store = self.words_store(section).lock().unwrap();
        let raw: Vec<u64> = store[addr as usize..(addr + n) as usize].to_vec();
        drop(store);
        Ok(raw
            .into_iter()
            .enumerate()
            .map(|(i, v)| self.apply_transform(section, addr + i as u32, v))
            .collect())
    }

    /// Write `values` into `section` starting at `addr`, truncating each
    /// value modulo 2^width for the section's element width.
    ///
    /// # Errors
    ///
    /// Returns [`PlcError::OutOfBounds`] if `addr + values.len()` exceeds
    /// the section's length.
    ///
    /// # Panics
    ///
    /// Panics if `section` is [`Section::Bits`]; see [`MemorySpace::get_words`].
    pub fn set_words(&self, section: Section, addr: u32, values: &[u64]) -> PlcResult<()> {
        let n = values.len() as u32;
        self.check_bounds(section, addr, n)?;
        let width = section.width();
        let mut store = self.words_store(section).lock().unwrap();
        for (i, &v) in values.iter().enumerate() {
            store[addr as usize + i] = truncate(v, width);
        }
        Ok(())
    }

    /// Install a read-time transform at `section`/`addr`. A transform
    /// already installed at that address is replaced (last-installed-wins).
    pub fn install_transform(&self, section: Section, addr: u32, transform: Transform) {
        self.transforms.lock().unwrap().insert((section, addr), transform);
    }

    /// Take a post-transform snapshot of `n` elements at `section`/`addr`,
    /// suitable for wire emission. Equivalent to `get_bits`/`get_words` but
    /// dispatches on `section` for callers that don't know it statically.
    ///
    /// # Errors
    ///
    /// Returns [`PlcError::OutOfBounds`] if the range is invalid.
    pub fn snapshot(&self, section: Section, addr: u32, n: u32) -> PlcResult<Vec<u64>> {
        if section == Section::Bits {
            Ok(self.get_bits(addr, n)?.into_iter().map(u64::from).collect())
        } else {
            self.get_words(section, addr, n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> MemorySpace {
        MemorySpace::new(MemSpaceConfig {
            blen: 64,
            w16len: 16,
            w32len: 4,
            w64len: 2,
        })
    }

    #[test]
    fn bits_round_trip() {
        let mem = space();
        mem.set_bits(3, &[1]).unwrap();
        assert_eq!(mem.get_bits(3, 1).unwrap(), vec![1]);
        mem.set_bits(3, &[0]).unwrap();
        assert_eq!(mem.get_bits(3, 1).unwrap(), vec![0]);
    }

    #[test]
    fn bit_packing_is_lsb_first_within_byte() {
        // Setting bit 3 should produce byte value 0x08, matching the
        // Modbus coil-read wire format (lowest-addressed coil = bit 0).
        let mem = space();
        mem.set_bits(3, &[1]).unwrap();
        let raw = mem.get_bits(0, 8).unwrap();
        assert_eq!(raw, vec![0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn words_round_trip() {
        let mem = space();
        mem.set_words(Section::Words16, 0, &[1, 2, 3]).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn write_truncates_modulo_width() {
        let mem = space();
        mem.set_words(Section::Words16, 0, &[0x1_FFFF]).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 1).unwrap(), vec![0xFFFF]);

        mem.set_bits(0, &[0xFE]).unwrap();
        assert_eq!(mem.get_bits(0, 1).unwrap(), vec![0]);
    }

    #[test]
    fn out_of_bounds_is_rejected_without_mutation() {
        let mem = space();
        let before = mem.get_words(Section::Words16, 0, 16).unwrap();
        let err = mem.set_words(Section::Words16, 15, &[1, 2]).unwrap_err();
        assert!(matches!(err, PlcError::OutOfBounds { .. }));
        let after = mem.get_words(Section::Words16, 0, 16).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn zero_length_access_is_valid() {
        let mem = space();
        assert_eq!(mem.get_words(Section::Words16, 0, 0).unwrap(), Vec::<u64>::new());
        assert_eq!(mem.get_bits(0, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn transform_substitutes_only_in_view() {
        let mem = space();
        mem.install_transform(
            Section::Words16,
            2,
            Transform {
                input_low: 10,
                input_high: 20,
                output: 999,
            },
        );
        mem.set_words(Section::Words16, 2, &[15]).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 2, 1).unwrap(), vec![999]);

        mem.set_words(Section::Words16, 2, &[30]).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 2, 1).unwrap(), vec![30]);
    }

    #[test]
    fn last_installed_transform_wins() {
        let mem = space();
        mem.install_transform(
            Section::Words16,
            0,
            Transform {
                input_low: 0,
                input_high: 100,
                output: 1,
            },
        );
        mem.install_transform(
            Section::Words16,
            0,
            Transform {
                input_low: 0,
                input_high: 100,
                output: 2,
            },
        );
        mem.set_words(Section::Words16, 0, &[5]).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 1).unwrap(), vec![2]);
    }

    #[test]
    fn blen_rounds_up_to_byte_boundary_but_addressable_length_is_exact() {
        let mem = MemorySpace::new(MemSpaceConfig {
            blen: 3,
            ..Default::default()
        });
        assert_eq!(mem.section_len(Section::Bits), 3);
        assert!(mem.get_bits(0, 4).is_err());
        assert!(mem.get_bits(0, 3).is_ok());
    }
}
