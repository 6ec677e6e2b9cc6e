//! Configuration schema for the PLC simulator.
//!
//! Supports TOML deserialization of the four top-level documents: the
//! listener, the fieldbus module manager, the memory space layout, and the
//! I/O simulation list. Unknown top-level keys (including `logging`, which
//! this crate treats as opaque) are ignored rather than rejected.

use crate::section::Section;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RootConfig {
    /// TCP listener defaults (host, port, backlog).
    pub listener: ListenerConfig,
    /// Fieldbus modules to bind and the registry class each uses.
    pub fieldbus_manager: FieldbusManagerConfig,
    /// Memory space section lengths.
    pub memory_manager: MemoryManagerConfig,
    /// Periodic simulation tasks to run against the memory space.
    pub io_manager: IoManagerConfig,
    /// Passed through verbatim to the log subsystem; not interpreted here.
    #[serde(default)]
    pub logging: toml::value::Table,
}

/// TCP listener configuration shared by fieldbus modules that don't
/// override `port` individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface/address to bind.
    pub host: String,
    /// Default TCP port.
    pub port: u16,
    /// Listen backlog passed to the OS.
    pub backlog: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 502,
            backlog: 16,
        }
    }
}

/// Fieldbus module manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FieldbusManagerConfig {
    /// One entry per TCP listener to bind.
    pub modules: Vec<ModuleConfig>,
}

/// A single fieldbus module binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Opaque operator-assigned identifier, used only in logs.
    pub module: String,
    /// Registry key selecting the module implementation (e.g. `"modbus_tcp"`).
    pub class: String,
    /// Opaque identifier distinct from `module`, also log-only.
    pub id: String,
    /// Port this module listens on; overrides `listener.port`.
    pub port: u16,
    /// Module-specific configuration, passed to the module constructor.
    #[serde(default)]
    pub conf: toml::value::Table,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            module: String::new(),
            class: "modbus_tcp".to_string(),
            id: String::new(),
            port: 502,
            conf: toml::value::Table::new(),
        }
    }
}

/// Memory space layout configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MemoryManagerConfig {
    /// Section lengths for the memory space to construct.
    pub memspace: MemSpaceSizeConfig,
}

/// Section lengths. `blen` is rounded up to a multiple of 8 on construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MemSpaceSizeConfig {
    /// Number of bits in the `bits` section.
    pub blen: u32,
    /// Number of 16-bit words in the `words16` section.
    pub w16len: u32,
    /// Number of 32-bit words in the `words32` section.
    pub w32len: u32,
    /// Number of 64-bit words in the `words64` section.
    pub w64len: u32,
}

impl Default for MemSpaceSizeConfig {
    fn default() -> Self {
        Self {
            blen: 0,
            w16len: 0,
            w32len: 0,
            w64len: 0,
        }
    }
}

/// I/O simulation manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IoManagerConfig {
    /// Simulation tasks to launch at startup.
    pub simulations: Vec<SimulationConfig>,
}

/// A reference to a memory space slice: a section, a starting address, and
/// a length. The TOML field is named `nbits` for the bits section and
/// `nwords` for everything else; both are accepted and `len()` picks
/// whichever is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemspaceRefConfig {
    /// Target section.
    pub section: Section,
    /// Zero-based starting address within the section.
    pub addr: u32,
    /// Element count, spelled `nwords` for word sections.
    #[serde(default)]
    pub nwords: Option<u32>,
    /// Element count, spelled `nbits` for the bit section.
    #[serde(default)]
    pub nbits: Option<u32>,
}

impl MemspaceRefConfig {
    /// Resolve the configured element count, defaulting to 1 if neither
    /// `nwords` nor `nbits` was given.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.nbits.or(self.nwords).unwrap_or(1)
    }
}

/// One simulation task's static configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Human-readable id; synthesized from the index if absent.
    pub id: Option<String>,
    /// Target slice the task writes into.
    pub memspace: Option<MemspaceRefConfig>,
    /// Source slice for `copy`, if this task is a copy.
    pub source: Option<MemspaceRefConfig>,
    /// Operands for `operation` tasks.
    pub operands: Option<Vec<OperandConfig>>,
    /// The function this task runs each tick.
    pub function: FunctionConfig,
    /// Seconds between ticks.
    pub pause: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            id: None,
            memspace: None,
            source: None,
            operands: None,
            function: FunctionConfig::Static { value: 0 },
            pause: 1.0,
        }
    }
}

/// An operand for an `operation` simulation: either a literal value or a
/// reference to the first cell of another memory space slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperandConfig {
    /// A literal integer operand.
    Value(i64),
    /// A memory space slice; its first cell is read each tick.
    Memspace(MemspaceRefConfig),
}

/// Read-time substitution rule: `[low, high]` inclusive maps to `out`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Inclusive input range that triggers the substitution.
    #[serde(rename = "in")]
    pub input_range: [u64; 2],
    /// Value substituted in the returned view.
    pub out: u64,
}

/// The closed set of simulation function kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FunctionConfig {
    /// Write a fixed value to every target cell each tick.
    Static {
        /// Value written every tick.
        value: u64,
    },
    /// Toggle each target cell between 0 and 1 each tick.
    Binary {},
    /// Monotonic counter with optional range/step.
    Counter {
        /// `[stop]`, `[start, stop]`, or `[start, stop, step]`.
        #[serde(default)]
        range: Option<Vec<i64>>,
    },
    /// Sine waveform scaled to the target cell width.
    Sine {},
    /// Cosine waveform scaled to the target cell width.
    Cosine {},
    /// Sawtooth waveform scaled to the target cell width.
    Sawtooth {},
    /// Square waveform alternating between the low and high halves of the
    /// target cell width.
    Square {},
    /// Uniform integer sample in `[lo, hi)`.
    Randrange {
        /// `[lo, hi)` sampling bounds.
        range: [i64; 2],
    },
    /// Log-normal(0, 1) sample, clamped to the target cell width.
    Lognormal {},
    /// Uniform integer sample across the full target cell width.
    Uniform {},
    /// Copy a source slice into the target slice element-wise each tick.
    Copy {},
    /// Install a read-time transform on the target address.
    Transform {
        /// The substitution rule to install.
        transform: TransformConfig,
    },
    /// Reduce `operands` left-to-right with a named binary operator and
    /// write the (width-truncated) result to the target.
    Operation {
        /// Binary operator name: add, sub, mul, floordiv, mod, and, or,
        /// xor, lshift, rshift.
        operator: String,
    },
}

impl RootConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}
