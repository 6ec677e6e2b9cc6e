//! Converts the config schema's simulation entries into validated,
//! ready-to-run task descriptions.

use crate::operator::Operator;
use plc_common::config::{FunctionConfig, MemspaceRefConfig, OperandConfig, SimulationConfig};
use plc_common::error::PlcError;
use plc_common::section::Section;
use std::time::Duration;

/// A resolved reference to a memory space slice.
#[derive(Debug, Clone, Copy)]
pub struct MemspaceRef {
    /// Target section.
    pub section: Section,
    /// Starting address.
    pub addr: u32,
    /// Element count.
    pub len: u32,
}

impl From<MemspaceRefConfig> for MemspaceRef {
    fn from(c: MemspaceRefConfig) -> Self {
        let len = c.len();
        Self {
            section: c.section,
            addr: c.addr,
            len,
        }
    }
}

/// A resolved operand: a literal value or a memory space reference.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    /// A literal integer operand.
    Value(i64),
    /// The first cell of a memory space slice, read each tick.
    Memspace(MemspaceRef),
}

impl From<OperandConfig> for Operand {
    fn from(c: OperandConfig) -> Self {
        match c {
            OperandConfig::Value(v) => Operand::Value(v),
            OperandConfig::Memspace(m) => Operand::Memspace(m.into()),
        }
    }
}

/// A normalized counter range: emit `start`, advance by `step`, wrap back
/// to `start` once the running value reaches or crosses `stop`.
#[derive(Debug, Clone, Copy)]
pub struct CounterRange {
    /// First value emitted, and the value wrapped back to on exhaustion.
    pub start: i64,
    /// Exclusive boundary in the direction of `step`.
    pub stop: i64,
    /// Signed increment applied each tick.
    pub step: i64,
}

fn parse_counter_range(range: &Option<Vec<i64>>) -> Result<Option<CounterRange>, PlcError> {
    let Some(values) = range else {
        return Ok(None);
    };
    match values.as_slice() {
        [stop] => Ok(Some(CounterRange {
            start: 0,
            stop: *stop,
            step: 1,
        })),
        [start, stop] => {
            let step = if start < stop { 1 } else { -1 };
            Ok(Some(CounterRange {
                start: *start,
                stop: *stop,
                step,
            }))
        }
        [start, stop, step] => {
            if *step == 0 {
                return Err(PlcError::Config("counter step cannot be zero".to_string()));
            }
            Ok(Some(CounterRange {
                start: *start,
                stop: *stop,
                step: *step,
            }))
        }
        other => Err(PlcError::Config(format!(
            "counter range must have 1 to 3 elements, got {}",
            other.len()
        ))),
    }
}

/// The closed set of simulation functions, with configuration already
/// validated (operator names resolved, counter ranges normalized).
#[derive(Debug, Clone)]
pub enum SimFunction {
    /// Write a fixed value to every target cell each tick.
    Static {
        /// Value written every tick.
        value: u64,
    },
    /// Toggle each target cell between 0 and 1 each tick.
    Binary,
    /// Monotonic counter, optionally bounded and wrapping.
    Counter {
        /// `None` for an unbounded monotonic counter.
        range: Option<CounterRange>,
    },
    /// Sine waveform.
    Sine,
    /// Cosine waveform.
    Cosine,
    /// Sawtooth waveform.
    Sawtooth,
    /// Square waveform.
    Square,
    /// Uniform integer sample in `[lo, hi)`.
    Randrange {
        /// Inclusive lower bound.
        lo: i64,
        /// Exclusive upper bound.
        hi: i64,
    },
    /// Log-normal(0, 1) sample, clamped to the target cell width.
    Lognormal,
    /// Uniform integer sample across the full target cell width.
    Uniform,
    /// Copy a source slice into the target slice element-wise each tick.
    Copy,
    /// Install a read-time transform on the target address.
    Transform {
        /// Inclusive lower bound of the substituted input range.
        input_low: u64,
        /// Inclusive upper bound of the substituted input range.
        input_high: u64,
        /// Value substituted when the stored value is in range.
        output: u64,
    },
    /// Reduce the task's operand list left-to-right with `operator`.
    Operation {
        /// The resolved binary operator.
        operator: Operator,
    },
}

impl SimFunction {
    fn from_config(c: FunctionConfig) -> Result<Self, PlcError> {
        Ok(match c {
            FunctionConfig::Static { value } => SimFunction::Static { value },
            FunctionConfig::Binary {} => SimFunction::Binary,
            FunctionConfig::Counter { range } => SimFunction::Counter {
                range: parse_counter_range(&range)?,
            },
            FunctionConfig::Sine {} => SimFunction::Sine,
            FunctionConfig::Cosine {} => SimFunction::Cosine,
            FunctionConfig::Sawtooth {} => SimFunction::Sawtooth,
            FunctionConfig::Square {} => SimFunction::Square,
            FunctionConfig::Randrange { range } => {
                if range[0] >= range[1] {
                    return Err(PlcError::Config(
                        "randrange requires lo < hi".to_string(),
                    ));
                }
                SimFunction::Randrange {
                    lo: range[0],
                    hi: range[1],
                }
            }
            FunctionConfig::Lognormal {} => SimFunction::Lognormal,
            FunctionConfig::Uniform {} => SimFunction::Uniform,
            FunctionConfig::Copy {} => SimFunction::Copy,
            FunctionConfig::Transform { transform } => SimFunction::Transform {
                input_low: transform.input_range[0],
                input_high: transform.input_range[1],
                output: transform.out,
            },
            FunctionConfig::Operation { operator } => SimFunction::Operation {
                operator: Operator::parse(&operator)?,
            },
        })
    }
}

/// A fully validated simulation task, ready to hand to [`crate::IoSimulator`].
#[derive(Debug, Clone)]
pub struct SimulationTaskConfig {
    /// Human id; synthesized from the task's index if the config omitted it.
    pub id: String,
    /// The slice this task writes into.
    pub target: MemspaceRef,
    /// The slice a `copy` task reads from.
    pub source: Option<MemspaceRef>,
    /// Operands for an `operation` task.
    pub operands: Vec<Operand>,
    /// The function this task runs each tick.
    pub function: SimFunction,
    /// Wall-clock time between ticks.
    pub pause: Duration,
}

impl SimulationTaskConfig {
    /// Validate and normalize one configured simulation entry.
    ///
    /// # Errors
    ///
    /// Returns [`PlcError::Config`] if the entry is missing its target
    /// slice, names an unknown operator, gives a malformed counter range,
    /// or specifies a negative/non-finite pause.
    pub fn from_config(index: usize, c: SimulationConfig) -> Result<Self, PlcError> {
        let id = c.id.unwrap_or_else(|| format!("sim-{index}"));
        let target = c
            .memspace
            .ok_or_else(|| PlcError::Config(format!("simulation {id} is missing its memspace target")))?
            .into();
        let source = c.source.map(Into::into);
        let operands = c.operands.unwrap_or_default().into_iter().map(Into::into).collect();
        let function = SimFunction::from_config(c.function)?;
        if !c.pause.is_finite() || c.pause < 0.0 {
            return Err(PlcError::Config(format!(
                "simulation {id} has invalid pause {}",
                c.pause
            )));
        }
        Ok(Self {
            id,
            target,
            source,
            operands,
            function,
            pause: Duration::from_secs_f64(c.pause),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SimulationConfig {
        SimulationConfig {
            id: None,
            memspace: Some(MemspaceRefConfig {
                section: Section::Words16,
                addr: 0,
                nwords: Some(1),
                nbits: None,
            }),
            source: None,
            operands: None,
            function: FunctionConfig::Static { value: 7 },
            pause: 1.0,
        }
    }

    #[test]
    fn synthesizes_id_when_absent() {
        let task = SimulationTaskConfig::from_config(3, base_config()).unwrap();
        assert_eq!(task.id, "sim-3");
    }

    #[test]
    fn rejects_missing_target() {
        let mut cfg = base_config();
        cfg.memspace = None;
        assert!(SimulationTaskConfig::from_config(0, cfg).is_err());
    }

    #[test]
    fn counter_range_forms_normalize() {
        let mut cfg = base_config();
        cfg.function = FunctionConfig::Counter {
            range: Some(vec![10]),
        };
        let task = SimulationTaskConfig::from_config(0, cfg).unwrap();
        match task.function {
            SimFunction::Counter { range: Some(r) } => {
                assert_eq!((r.start, r.stop, r.step), (0, 10, 1));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut cfg = base_config();
        cfg.function = FunctionConfig::Counter {
            range: Some(vec![10, 1]),
        };
        let task = SimulationTaskConfig::from_config(0, cfg).unwrap();
        match task.function {
            SimFunction::Counter { range: Some(r) } => {
                assert_eq!((r.start, r.stop, r.step), (10, 1, -1));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_operator() {
        let mut cfg = base_config();
        cfg.function = FunctionConfig::Operation {
            operator: "nope".to_string(),
        };
        assert!(SimulationTaskConfig::from_config(0, cfg).is_err());
    }

    #[test]
    fn rejects_negative_pause() {
        let mut cfg = base_config();
        cfg.pause = -1.0;
        assert!(SimulationTaskConfig::from_config(0, cfg).is_err());
    }
}
