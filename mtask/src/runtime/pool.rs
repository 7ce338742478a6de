use crate::runtime::context;
use crate::runtime::scheduler::Handle;
use crate::utils::thread::{next_thread_name, pin_current_thread};
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::thread;
use tracing::warn;

/// Worker threads of a runtime.
#[derive(Debug)]
pub(crate) struct ThreadPool {
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawns one thread per worker. If any spawn fails the threads already
    /// started are stopped and joined before returning the error.
    pub(crate) fn spawn(handle: &Handle) -> Result<Self> {
        let pool = Self {
            handles: Mutex::new(Vec::with_capacity(handle.num_workers())),
        };

        let cores = thread::available_parallelism().map_or(1, |n| n.get());

        for index in 0..handle.num_workers() {
            match spawn_worker_thread(handle.clone(), index, cores) {
                Ok(join) => pool.handles.lock().push(join),
                Err(e) => {
                    handle.shutdown();
                    let _ = pool.join_all();
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    pub(crate) fn join_all(&self) -> Result<()> {
        let mut handles = self.handles.lock();

        let errors = handles
            .drain(..)
            .filter_map(|handle| {
                let name = handle.thread().name().map(str::to_string);
                handle.join().err().map(|_| name)
            })
            .collect::<Vec<_>>();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} worker thread(s) panicked: {:?}", errors.len(), errors))
        }
    }
}

fn spawn_worker_thread(
    handle: Handle,
    index: usize,
    cores: usize,
) -> Result<thread::JoinHandle<()>> {
    let cfg = handle.cfg();
    let mut builder = thread::Builder::new().name(next_thread_name(&cfg.thread_name));

    if let Some(stack_size) = cfg.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }

    let pin = cfg.pin_workers;

    builder
        .spawn(move || {
            if pin && let Err(e) = pin_current_thread(index % cores) {
                warn!(worker = index, error = %e, "failed to pin worker thread");
            }

            let _guard = context::enter_worker(handle.clone(), index);
            handle.worker(index).event_loop(&handle);
        })
        .map_err(|e| anyhow!("failed to spawn worker thread {index}: {e}"))
}
