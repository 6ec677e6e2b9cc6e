//! Per-tick semantics for each [`crate::task::SimFunction`] variant.

use crate::task::{MemspaceRef, Operand, SimFunction, SimulationTaskConfig};
use plc_common::error::{PlcError, PlcResult};
use plc_common::section::Section;
use plc_memory::{MemorySpace, Transform};
use rand::Rng;
use rand_distr::{Distribution, LogNormal};

/// Phase advanced each tick for waveform functions, independent of pause
/// duration: one full period every 20 ticks.
const PHASE_STEP: f64 = std::f64::consts::TAU / 20.0;

/// Per-task state carried between ticks: the running counter value and
/// waveform phase. Each task owns exactly one of these.
#[derive(Debug, Default)]
pub struct TaskState {
    counter: i128,
    counter_initialized: bool,
    phase: f64,
}

fn max_for_width(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn read_view(memory: &MemorySpace, r: MemspaceRef) -> PlcResult<Vec<u64>> {
    memory.snapshot(r.section, r.addr, r.len)
}

fn write_view(memory: &MemorySpace, r: MemspaceRef, values: &[u64]) -> PlcResult<()> {
    if r.section == Section::Bits {
        let bits: Vec<u8> = values.iter().map(|&v| (v & 1) as u8).collect();
        memory.set_bits(r.addr, &bits)
    } else {
        memory.set_words(r.section, r.addr, values)
    }
}

fn write_all(memory: &MemorySpace, r: MemspaceRef, value: u64) -> PlcResult<()> {
    write_view(memory, r, &vec![value; r.len as usize])
}

fn write_cell(memory: &MemorySpace, r: MemspaceRef, offset: u32, value: u64) -> PlcResult<()> {
    if r.section == Section::Bits {
        memory.set_bits(r.addr + offset, &[(value & 1) as u8])
    } else {
        memory.set_words(r.section, r.addr + offset, &[value])
    }
}

fn read_first(memory: &MemorySpace, r: MemspaceRef) -> PlcResult<u64> {
    Ok(read_view(memory, r)?.into_iter().next().unwrap_or(0))
}

fn resolve_operand(memory: &MemorySpace, operand: &Operand) -> PlcResult<i128> {
    match operand {
        Operand::Value(v) => Ok(i128::from(*v)),
        Operand::Memspace(r) => Ok(i128::from(read_first(memory, *r)?)),
    }
}

/// Run one tick of `cfg`'s function against `memory`, mutating `state`.
///
/// # Errors
///
/// Returns [`PlcError::OutOfBounds`] if the task's target, source, or any
/// memspace operand falls outside its section, and [`PlcError::Config`]
/// if a `copy` task has no source or an `operation` task has no operands.
pub fn tick(cfg: &SimulationTaskConfig, state: &mut TaskState, memory: &MemorySpace) -> PlcResult<()> {
    let target = cfg.target;
    let width = target.section.width();
    let max_val = max_for_width(width);

    match &cfg.function {
        SimFunction::Static { value } => write_all(memory, target, *value)?,

        SimFunction::Binary => {
            let current = read_first(memory, target)?;
            write_all(memory, target, u64::from(current == 0))?;
        }

        SimFunction::Counter { range } => {
            if !state.counter_initialized {
                state.counter = range.map_or(0, |r| i128::from(r.start));
                state.counter_initialized = true;
            }
            write_cell(memory, target, 0, state.counter as u64)?;
            match range {
                None => state.counter = state.counter.wrapping_add(1),
                Some(r) => {
                    state.counter += i128::from(r.step);
                    let exhausted = if r.step > 0 {
                        state.counter >= i128::from(r.stop)
                    } else {
                        state.counter <= i128::from(r.stop)
                    };
                    if exhausted {
                        state.counter = i128::from(r.start);
                    }
                }
            }
        }

        SimFunction::Sine => {
            write_all(memory, target, scale_unit(state.phase.sin(), max_val))?;
            state.phase += PHASE_STEP;
        }
        SimFunction::Cosine => {
            write_all(memory, target, scale_unit(state.phase.cos(), max_val))?;
            state.phase += PHASE_STEP;
        }
        SimFunction::Sawtooth => {
            let frac = (state.phase / std::f64::consts::TAU).rem_euclid(1.0);
            write_all(memory, target, (frac * max_val as f64).round() as u64)?;
            state.phase += PHASE_STEP;
        }
        SimFunction::Square => {
            let sample = if state.phase.sin() >= 0.0 { max_val } else { 0 };
            write_all(memory, target, sample)?;
            state.phase += PHASE_STEP;
        }

        SimFunction::Randrange { lo, hi } => {
            let sample = rand::thread_rng().gen_range(*lo..*hi);
            write_all(memory, target, sample.max(0) as u64)?;
        }
        SimFunction::Lognormal => {
            let dist = LogNormal::new(0.0, 1.0).expect("fixed lognormal parameters are valid");
            let sample = dist.sample(&mut rand::thread_rng()).max(0.0);
            write_all(memory, target, sample.min(max_val as f64) as u64)?;
        }
        SimFunction::Uniform => {
            let sample = if width >= 64 {
                rand::thread_rng().gen::<u64>()
            } else {
                rand::thread_rng().gen_range(0..=max_val)
            };
            write_all(memory, target, sample)?;
        }

        SimFunction::Copy => {
            let source = cfg.source.ok_or_else(|| {
                PlcError::Config(format!("simulation {} is a copy task without a source", cfg.id))
            })?;
            let values = read_view(memory, source)?;
            write_view(memory, target, &values)?;
        }

        SimFunction::Transform {
            input_low,
            input_high,
            output,
        } => {
            memory.install_transform(
                target.section,
                target.addr,
                Transform {
                    input_low: *input_low,
                    input_high: *input_high,
                    output: *output,
                },
            );
        }

        SimFunction::Operation { operator } => {
            let mut operands = cfg.operands.iter();
            let first = operands.next().ok_or_else(|| {
                PlcError::Config(format!("simulation {} is an operation task without operands", cfg.id))
            })?;
            let seed = resolve_operand(memory, first)?;
            let result = operands.try_fold(seed, |acc, op| -> PlcResult<i128> {
                Ok(operator.apply(acc, resolve_operand(memory, op)?))
            })?;
            write_all(memory, target, result as i64 as u64)?;
        }
    }
    Ok(())
}

fn scale_unit(sample: f64, max_val: u64) -> u64 {
    (((sample + 1.0) / 2.0) * max_val as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;
    use plc_memory::MemSpaceConfig;
    use std::time::Duration;

    fn space() -> MemorySpace {
        MemorySpace::new(MemSpaceConfig {
            blen: 8,
            w16len: 8,
            w32len: 4,
            w64len: 2,
        })
    }

    fn task(target: MemspaceRef, function: SimFunction) -> SimulationTaskConfig {
        SimulationTaskConfig {
            id: "t".to_string(),
            target,
            source: None,
            operands: Vec::new(),
            function,
            pause: Duration::from_secs(1),
        }
    }

    #[test]
    fn static_writes_fixed_value_to_every_cell() {
        let mem = space();
        let target = MemspaceRef {
            section: Section::Words16,
            addr: 0,
            len: 3,
        };
        let cfg = task(target, SimFunction::Static { value: 42 });
        let mut state = TaskState::default();
        tick(&cfg, &mut state, &mem).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 3).unwrap(), vec![42, 42, 42]);
    }

    #[test]
    fn binary_toggles_each_tick() {
        let mem = space();
        let target = MemspaceRef {
            section: Section::Words16,
            addr: 0,
            len: 1,
        };
        let cfg = task(target, SimFunction::Binary);
        let mut state = TaskState::default();
        tick(&cfg, &mut state, &mem).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 1).unwrap(), vec![1]);
        tick(&cfg, &mut state, &mem).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 1).unwrap(), vec![0]);
    }

    #[test]
    fn counter_wraps_at_range_boundary() {
        let mem = space();
        let target = MemspaceRef {
            section: Section::Words16,
            addr: 0,
            len: 1,
        };
        let cfg = task(
            target,
            SimFunction::Counter {
                range: Some(crate::task::CounterRange {
                    start: 0,
                    stop: 2,
                    step: 1,
                }),
            },
        );
        let mut state = TaskState::default();
        tick(&cfg, &mut state, &mem).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 1).unwrap(), vec![0]);
        tick(&cfg, &mut state, &mem).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 1).unwrap(), vec![1]);
        tick(&cfg, &mut state, &mem).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 1).unwrap(), vec![0]);
    }

    #[test]
    fn copy_moves_slice_values() {
        let mem = space();
        mem.set_words(Section::Words16, 4, &[7, 8]).unwrap();
        let source = MemspaceRef {
            section: Section::Words16,
            addr: 4,
            len: 2,
        };
        let target = MemspaceRef {
            section: Section::Words16,
            addr: 0,
            len: 2,
        };
        let mut cfg = task(target, SimFunction::Copy);
        cfg.source = Some(source);
        let mut state = TaskState::default();
        tick(&cfg, &mut state, &mem).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 2).unwrap(), vec![7, 8]);
    }

    #[test]
    fn copy_without_source_is_a_config_error() {
        let mem = space();
        let target = MemspaceRef {
            section: Section::Words16,
            addr: 0,
            len: 1,
        };
        let cfg = task(target, SimFunction::Copy);
        let mut state = TaskState::default();
        assert!(matches!(tick(&cfg, &mut state, &mem), Err(PlcError::Config(_))));
    }

    #[test]
    fn operation_reduces_operands_left_to_right() {
        let mem = space();
        let target = MemspaceRef {
            section: Section::Words16,
            addr: 0,
            len: 1,
        };
        let mut cfg = task(target, SimFunction::Operation { operator: Operator::Sub });
        cfg.operands = vec![Operand::Value(10), Operand::Value(3), Operand::Value(2)];
        let mut state = TaskState::default();
        tick(&cfg, &mut state, &mem).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 1).unwrap(), vec![5]);
    }

    #[test]
    fn transform_installs_without_touching_stored_value() {
        let mem = space();
        let target = MemspaceRef {
            section: Section::Words16,
            addr: 0,
            len: 1,
        };
        let cfg = task(
            target,
            SimFunction::Transform {
                input_low: 0,
                input_high: 100,
                output: 999,
            },
        );
        let mut state = TaskState::default();
        mem.set_words(Section::Words16, 0, &[5]).unwrap();
        tick(&cfg, &mut state, &mem).unwrap();
        assert_eq!(mem.get_words(Section::Words16, 0, 1).unwrap(), vec![999]);
    }

    #[test]
    fn out_of_bounds_target_propagates() {
        let mem = space();
        let target = MemspaceRef {
            section: Section::Words16,
            addr: 100,
            len: 1,
        };
        let cfg = task(target, SimFunction::Static { value: 1 });
        let mut state = TaskState::default();
        assert!(matches!(
            tick(&cfg, &mut state, &mem),
            Err(PlcError::OutOfBounds { .. })
        ));
    }
}
