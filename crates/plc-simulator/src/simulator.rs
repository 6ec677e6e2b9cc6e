//! Spawns and shuts down the per-task simulation threads.

use crate::function::{tick, TaskState};
use crate::task::SimulationTaskConfig;
use plc_memory::MemorySpace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

struct TaskHandle {
    id: String,
    alive: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Owns and drives the periodic simulation tasks configured for a memory
/// space. Each task runs on its own thread and terminates independently
/// on a bounds or configuration error; the others keep running.
pub struct IoSimulator {
    handles: Vec<TaskHandle>,
    shutdown: Arc<AtomicBool>,
}

impl IoSimulator {
    /// Spawn one thread per configured task.
    #[must_use]
    pub fn start(configs: Vec<SimulationTaskConfig>, memory: Arc<MemorySpace>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handles = configs
            .into_iter()
            .map(|cfg| {
                let id = cfg.id.clone();
                let alive = Arc::new(AtomicBool::new(true));
                let mem = Arc::clone(&memory);
                let sd = Arc::clone(&shutdown);
                let task_alive = Arc::clone(&alive);
                let thread = thread::Builder::new()
                    .name(format!("sim-{id}"))
                    .spawn(move || run_task(&cfg, &mem, &sd, &task_alive))
                    .expect("failed to spawn simulation thread");
                TaskHandle { id, alive, thread }
            })
            .collect::<Vec<_>>();
        info!(count = handles.len(), "io simulator started");
        Self { handles, shutdown }
    }

    /// Signal every task to stop and block until each has exited at its
    /// next pause boundary.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles {
            let _ = handle.thread.join();
        }
    }

    /// Number of tasks that have not terminated from a tick error.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.handles.iter().filter(|h| h.alive.load(Ordering::Relaxed)).count()
    }

    /// Ids of tasks that have terminated from a tick error.
    #[must_use]
    pub fn failed_ids(&self) -> Vec<String> {
        self.handles
            .iter()
            .filter(|h| !h.alive.load(Ordering::Relaxed))
            .map(|h| h.id.clone())
            .collect()
    }
}

fn run_task(cfg: &SimulationTaskConfig, memory: &MemorySpace, shutdown: &AtomicBool, alive: &AtomicBool) {
    let mut state = TaskState::default();
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        if let Err(error) = tick(cfg, &mut state, memory) {
            warn!(task = %cfg.id, %error, "simulation task terminating");
            alive.store(false, Ordering::Relaxed);
            break;
        }
        thread::sleep(cfg.pause);
    }
}
