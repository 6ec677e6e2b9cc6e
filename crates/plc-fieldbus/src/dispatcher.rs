//! Binds a TCP listener per configured fieldbus module and serves
//! accepted connections against a shared memory space.

use crate::{registry, FieldbusModule};
use plc_common::config::{ListenerConfig, ModuleConfig};
use plc_common::diagnostics::Counters;
use plc_common::error::{PlcError, PlcResult};
use plc_memory::MemorySpace;
use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Owns one bound TCP listener and accept loop per configured fieldbus
/// module.
pub struct FieldbusDispatcher {
    shutdown: Arc<AtomicBool>,
    listener_threads: Vec<JoinHandle<()>>,
}

impl FieldbusDispatcher {
    /// Bind a listener for each configured module and start its accept
    /// loop. Each accepted connection is served on its own detached
    /// thread; the dispatcher does not wait for in-flight connections to
    /// finish when stopped.
    ///
    /// # Errors
    ///
    /// Returns [`PlcError::Config`] if two modules share a port or a
    /// module names a `class` absent from [`registry`], and
    /// [`PlcError::Transport`] if a listener fails to bind.
    pub fn start(
        modules: &[ModuleConfig],
        listener_defaults: &ListenerConfig,
        memory: Arc<MemorySpace>,
        counters: Arc<Counters>,
    ) -> PlcResult<Self> {
        let mut seen_ports = HashSet::new();
        for module in modules {
            if !seen_ports.insert(module.port) {
                return Err(PlcError::Config(format!(
                    "port {} is bound by more than one fieldbus module",
                    module.port
                )));
            }
        }

        let registry = registry();
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut listener_threads = Vec::with_capacity(modules.len());

        for module in modules {
            let factory = *registry.get(module.class.as_str()).ok_or_else(|| {
                PlcError::Config(format!(
                    "fieldbus module {} names unknown class {}",
                    module.module, module.class
                ))
            })?;

            let addr = format!("{}:{}", listener_defaults.host, module.port);
            let listener = TcpListener::bind(&addr)
                .map_err(|e| PlcError::Transport(format!("failed to bind {addr}: {e}")))?;
            listener
                .set_nonblocking(true)
                .map_err(|e| PlcError::Transport(e.to_string()))?;

            info!(module = %module.module, class = %module.class, %addr, "fieldbus module listening");

            let mem = Arc::clone(&memory);
            let sd = Arc::clone(&shutdown);
            let ctr = Arc::clone(&counters);
            let module_name = module.module.clone();
            let thread = thread::Builder::new()
                .name(format!("fieldbus-{module_name}"))
                .spawn(move || accept_loop(&listener, factory, &mem, &ctr, &sd, &module_name))
                .expect("failed to spawn fieldbus accept thread");
            listener_threads.push(thread);
        }

        Ok(Self {
            shutdown,
            listener_threads,
        })
    }

    /// Signal every accept loop to stop and join them.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for thread in self.listener_threads {
            let _ = thread.join();
        }
    }
}

fn accept_loop(
    listener: &TcpListener,
    module_factory: fn() -> Box<dyn FieldbusModule>,
    memory: &Arc<MemorySpace>,
    counters: &Arc<Counters>,
    shutdown: &AtomicBool,
    module_name: &str,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        match listener.accept() {
            Ok((socket, peer)) => {
                let engine = module_factory();
                let mem = Arc::clone(memory);
                let ctr = Arc::clone(counters);
                let name = module_name.to_string();
                ctr.record_connection();
                thread::spawn(move || {
                    if let Err(error) = engine.serve(socket, mem, &ctr) {
                        warn!(module = %name, %peer, %error, "fieldbus session ended with error");
                    }
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                warn!(module = %module_name, error = %e, "fieldbus accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plc_memory::MemSpaceConfig;

    fn module_config(name: &str, port: u16) -> ModuleConfig {
        ModuleConfig {
            module: name.to_string(),
            class: "modbus_tcp".to_string(),
            id: name.to_string(),
            port,
            ..ModuleConfig::default()
        }
    }

    #[test]
    fn rejects_duplicate_ports() {
        let memory = Arc::new(MemorySpace::new(MemSpaceConfig::default()));
        let modules = vec![module_config("a", 15020), module_config("b", 15020)];
        let err = FieldbusDispatcher::start(
            &modules,
            &ListenerConfig::default(),
            memory,
            Arc::new(Counters::new()),
        )
        .unwrap_err();
        assert!(matches!(err, PlcError::Config(_)));
    }

    #[test]
    fn rejects_unknown_class() {
        let memory = Arc::new(MemorySpace::new(MemSpaceConfig::default()));
        let mut module = module_config("a", 15021);
        module.class = "ethercat".to_string();
        let err = FieldbusDispatcher::start(
            &[module],
            &ListenerConfig::default(),
            memory,
            Arc::new(Counters::new()),
        )
        .unwrap_err();
        assert!(matches!(err, PlcError::Config(_)));
    }

    #[test]
    fn binds_and_stops_cleanly() {
        let memory = Arc::new(MemorySpace::new(MemSpaceConfig::default()));
        let modules = vec![module_config("a", 15022)];
        let dispatcher = FieldbusDispatcher::start(
            &modules,
            &ListenerConfig::default(),
            memory,
            Arc::new(Counters::new()),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        dispatcher.stop();
    }
}
