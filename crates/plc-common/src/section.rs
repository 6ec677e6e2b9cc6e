//! The four typed memory regions a [`MemorySpace`] is partitioned into.
//!
//! [`MemorySpace`]: https://docs.rs/plc-memory

use serde::{Deserialize, Serialize};

/// Identifies one of the four fixed-width regions of a memory space.
///
/// Element width is fixed per section: `Bits` addresses single bits
/// (packed 8 to a byte), the `Words*` variants address one native integer
/// slot per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Single-bit elements, backing Modbus coils and discrete inputs.
    Bits,
    /// 16-bit elements, backing Modbus holding and input registers.
    Words16,
    /// 32-bit elements. No Modbus mapping; addressable by the I/O simulator only.
    Words32,
    /// 64-bit elements. No Modbus mapping; addressable by the I/O simulator only.
    Words64,
}

impl Section {
    /// Element width in bits.
    #[must_use]
    pub fn width(self) -> u32 {
        match self {
            Section::Bits => 1,
            Section::Words16 => 16,
            Section::Words32 => 32,
            Section::Words64 => 64,
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Bits => write!(f, "bits"),
            Section::Words16 => write!(f, "words16"),
            Section::Words32 => write!(f, "words32"),
            Section::Words64 => write!(f, "words64"),
        }
    }
}
