//! Fieldbus plane: binds TCP listeners for configured modules and serves
//! protocol sessions against a shared [`plc_memory::MemorySpace`].
//!
//! - [`FieldbusModule`] is the small capability trait a protocol engine
//!   implements: given an accepted socket and the memory space, serve
//!   requests on it until the peer disconnects.
//! - [`registry`] is the explicit, statically-populated map from a
//!   configured module's `class` string to a constructor for the engine
//!   that implements it. The only class shipped here is `"modbus_tcp"`
//!   ([`modbus::ModbusTcpModule`]); this is the seam another fieldbus
//!   protocol would plug into.
//! - [`dispatcher`] owns the accept loops: one TCP listener per
//!   configured module, one thread per accepted connection.

pub mod dispatcher;
pub mod modbus;

pub use dispatcher::FieldbusDispatcher;

use plc_common::diagnostics::Counters;
use plc_common::error::PlcResult;
use plc_memory::MemorySpace;
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::Arc;

/// A fieldbus protocol engine bindable to a TCP listener.
pub trait FieldbusModule: Send + Sync {
    /// Serve requests on an already-accepted connection until the peer
    /// disconnects or an I/O error occurs. Protocol-level errors the peer
    /// caused (bad function code, out-of-bounds address) are handled
    /// internally as wire-level responses, never returned here, but are
    /// still reflected in `counters`.
    ///
    /// # Errors
    ///
    /// Returns an error only for a genuine transport failure.
    fn serve(&self, socket: TcpStream, memory: Arc<MemorySpace>, counters: &Counters) -> PlcResult<()>;
}

/// Construct the registry mapping a module's configured `class` name to
/// the engine that implements it.
#[must_use]
pub fn registry() -> HashMap<&'static str, fn() -> Box<dyn FieldbusModule>> {
    let mut modules: HashMap<&'static str, fn() -> Box<dyn FieldbusModule>> = HashMap::new();
    modules.insert("modbus_tcp", || Box::new(modbus::ModbusTcpModule));
    modules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_modbus_tcp() {
        let reg = registry();
        assert!(reg.contains_key("modbus_tcp"));
    }
}
