//! Process-wide shutdown task registry.
//!
//! Tasks run once, in registration order, on normal process termination
//! via `atexit(3)`; a forced kill skips them. Tasks must be idempotent:
//! the terminal removes itself on the normal close path and may still be
//! fired during exit.

use std::sync::{Arc, Mutex, OnceLock};

type Task = Arc<dyn Fn() + Send + Sync>;

/// Handle for one registered task; pass back to [`remove`].
#[derive(Debug)]
pub struct ShutdownHook {
    id: u64,
}

struct Registry {
    tasks: Vec<(u64, Task)>,
    next_id: u64,
    installed: bool,
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        Mutex::new(Registry {
            tasks: Vec::new(),
            next_id: 1,
            installed: false,
        })
    })
}

/// Register `task` to run at process exit.
pub fn add<F>(task: F) -> ShutdownHook
where
    F: Fn() + Send + Sync + 'static,
{
    let mut registry = registry().lock().unwrap();
    if !registry.installed {
        unsafe {
            libc::atexit(run_tasks);
        }
        registry.installed = true;
    }
    let id = registry.next_id;
    registry.next_id += 1;
    registry.tasks.push((id, Arc::new(task)));
    ShutdownHook { id }
}

/// Deregister a task. Removing an already-fired or unknown hook is a no-op.
pub fn remove(hook: ShutdownHook) {
    if let Ok(mut registry) = registry().lock() {
        registry.tasks.retain(|(id, _)| *id != hook.id);
    }
}

extern "C" fn run_tasks() {
    fire();
}

fn fire() {
    let tasks: Vec<Task> = match registry().lock() {
        Ok(registry) => registry.tasks.iter().map(|(_, t)| t.clone()).collect(),
        Err(_) => Vec::new(),
    };
    for task in tasks {
        task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_tasks_fire_in_order_and_removed_tasks_do_not() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        static FIRST_SEEN: AtomicUsize = AtomicUsize::new(0);

        let first = add(|| {
            FIRST_SEEN.store(CALLS.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
        });
        let second = add(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        });
        remove(second);
        fire();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(FIRST_SEEN.load(Ordering::SeqCst), 1);
        remove(first);
        fire();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
