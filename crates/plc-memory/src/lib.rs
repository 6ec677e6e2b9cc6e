#![doc = "Typed, section-partitioned register file for the virtual PLC simulator."]

pub mod memory;

pub use memory::*;
