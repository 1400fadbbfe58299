//! Bounded multi-producer/multi-consumer task executor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use derivative::Derivative;
use parking_lot::{Condvar, Mutex};

use crate::task::{InferTaskSptr, TaskOutcome};

type ErrorSink = Box<dyn Fn(&str) + Send + Sync + 'static>;

/// Backlog state guarded by the pool mutex.
#[derive(Debug)]
struct PoolState {
    task_q: VecDeque<InferTaskSptr>,
    running: bool,
    /// Backlog cap, `2 *` the worker count.
    max_tasks: usize,
}

/// State shared between the pool handle and its workers.
#[derive(Derivative)]
#[derivative(Debug)]
struct PoolShared {
    state: Mutex<PoolState>,
    /// Signalled when backlog space frees up.
    push_cond: Condvar,
    /// Signalled when a task arrives.
    pop_cond: Condvar,
    #[derivative(Debug = "ignore")]
    error_sink: Mutex<Option<ErrorSink>>,
    executed: AtomicUsize,
}

/// Executor for pipeline tasks.
///
/// Workers pop in FIFO order; producers block while the backlog is at
/// capacity. Shutdown lets in-flight tasks finish and discards the rest.
#[derive(Debug)]
pub struct InferThreadPool {
    shared: Arc<PoolShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for InferThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl InferThreadPool {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    task_q: VecDeque::new(),
                    running: false,
                    max_tasks: 0,
                }),
                push_cond: Condvar::new(),
                pop_cond: Condvar::new(),
                error_sink: Mutex::new(None),
                executed: AtomicUsize::new(0),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Starts `thread_num` workers and sets the backlog cap to
    /// `2 * thread_num`.
    pub fn init(&self, thread_num: usize) {
        {
            let mut state = self.shared.state.lock();
            state.running = true;
            state.max_tasks = 2 * thread_num;
        }
        let mut threads = self.threads.lock();
        for _ in 0..thread_num {
            let shared = Arc::clone(&self.shared);
            threads.push(thread::spawn(move || Self::task_loop(shared)));
        }
        log::info!("inference thread pool started with {} workers", thread_num);
    }

    /// Submits one task, blocking while the backlog is full. The task is
    /// dropped silently when the pool is not running.
    pub fn submit(&self, task: InferTaskSptr) {
        let mut state = self.shared.state.lock();
        while state.running && state.task_q.len() >= state.max_tasks {
            self.shared.push_cond.wait(&mut state);
        }
        if !state.running {
            return;
        }
        debug_assert!(state.task_q.len() < state.max_tasks);
        state.task_q.push_back(task);
        drop(state);
        self.shared.pop_cond.notify_one();
    }

    /// Submits tasks in iteration order, so FIFO execution holds with
    /// respect to this caller.
    pub fn submit_all(&self, tasks: impl IntoIterator<Item = InferTaskSptr>) {
        for task in tasks {
            self.submit(task);
        }
    }

    /// Registers the sink that receives panic text from worker threads.
    pub fn set_error_handler(&self, sink: impl Fn(&str) + Send + Sync + 'static) {
        *self.shared.error_sink.lock() = Some(Box::new(sink));
    }

    /// Stops the pool: wakes blocked producers and workers, joins every
    /// worker, then drains the backlog. In-flight tasks run to
    /// completion; queued tasks are discarded. Calling this twice is the
    /// same as calling it once.
    pub fn destroy(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.running && self.threads.lock().is_empty() {
                return;
            }
            state.running = false;
        }
        self.shared.push_cond.notify_all();
        self.shared.pop_cond.notify_all();

        let threads = std::mem::replace(&mut *self.threads.lock(), Vec::new());
        for th in threads {
            let _ = th.join();
        }
        self.shared.state.lock().task_q.clear();
        log::info!("inference thread pool stopped");
    }

    /// Number of tasks that have finished executing since the pool
    /// started.
    pub fn executed_task_count(&self) -> usize {
        self.shared.executed.load(Ordering::Acquire)
    }

    /// Current backlog length.
    pub fn backlog_len(&self) -> usize {
        self.shared.state.lock().task_q.len()
    }

    /// Pops the next task, blocking while the backlog is empty. Returns
    /// `None` once the pool stops.
    fn pop_task(shared: &PoolShared) -> Option<InferTaskSptr> {
        let mut state = shared.state.lock();
        while state.running && state.task_q.is_empty() {
            shared.pop_cond.wait(&mut state);
        }
        if !state.running {
            return None;
        }
        let task = state.task_q.pop_front();
        drop(state);
        shared.push_cond.notify_one();
        task
    }

    fn task_loop(shared: Arc<PoolShared>) {
        while let Some(task) = Self::pop_task(&shared) {
            task.wait_front_tasks();
            match task.run() {
                TaskOutcome::Completed => {}
                TaskOutcome::Failed(err) => {
                    log::error!(
                        "inference task execute failed: {}. task message: {}",
                        err,
                        task.task_msg()
                    );
                }
                TaskOutcome::Panicked(text) => match &*shared.error_sink.lock() {
                    Some(sink) => sink(&text),
                    None => log::error!("not handled error: {}", text),
                },
            }
            shared.executed.fetch_add(1, Ordering::Release);
        }
    }
}

impl Drop for InferThreadPool {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::InferTask;
    use std::time::Duration;

    #[test]
    fn check_pool_traits() {
        static_assertions::assert_impl_all!(InferThreadPool: Send, Sync);
    }

    #[test]
    fn executes_in_submission_order_with_one_worker() {
        let pool = InferThreadPool::new();
        pool.init(1);

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut last = None;
        for i in 0..5 {
            let log = Arc::clone(&log);
            let task = Arc::new(InferTask::new(move || {
                log.lock().push(i);
                Ok(())
            }));
            pool.submit(Arc::clone(&task));
            last = Some(task);
        }
        last.unwrap().wait_for_complete();
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        pool.destroy();
    }

    #[test]
    fn destroy_twice_is_destroy_once() {
        let pool = InferThreadPool::new();
        pool.init(2);
        pool.submit(Arc::new(InferTask::new(|| Ok(()))));
        pool.destroy();
        pool.destroy();
        assert_eq!(pool.backlog_len(), 0);
    }

    #[test]
    fn submit_after_destroy_is_dropped() {
        let pool = InferThreadPool::new();
        pool.init(1);
        pool.destroy();
        pool.submit(Arc::new(InferTask::new(|| Ok(()))));
        assert_eq!(pool.backlog_len(), 0);
        assert_eq!(pool.executed_task_count(), 0);
    }

    #[test]
    fn submit_blocks_at_capacity() {
        let pool = Arc::new(InferThreadPool::new());
        pool.init(2); // backlog cap 4

        // park both workers
        let (gate_tx, gate_rx) = crossbeam::bounded::<()>(4);
        for _ in 0..2 {
            let gate_rx = gate_rx.clone();
            pool.submit(Arc::new(InferTask::new(move || {
                let _ = gate_rx.recv();
                Ok(())
            })));
        }
        // fill the backlog
        for _ in 0..4 {
            pool.submit(Arc::new(InferTask::new(|| Ok(()))));
        }

        let (probe_tx, probe_rx) = crossbeam::bounded(1);
        let producer = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                pool.submit(Arc::new(InferTask::new(|| Ok(()))));
                let _ = probe_tx.send(());
            })
        };
        // the extra submit stays blocked while the backlog is at capacity
        assert!(probe_rx.recv_timeout(Duration::from_millis(100)).is_err());

        for _ in 0..2 {
            let _ = gate_tx.send(());
        }
        assert!(probe_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        producer.join().unwrap();
        pool.destroy();
    }

    #[test]
    fn panic_reaches_the_sink_once_and_worker_survives() {
        let pool = InferThreadPool::new();
        pool.init(1);

        let (err_tx, err_rx) = crossbeam::unbounded::<String>();
        pool.set_error_handler(move |msg| {
            let _ = err_tx.send(msg.to_owned());
        });

        pool.submit(Arc::new(InferTask::new(|| panic!("exploded"))));
        let after = Arc::new(InferTask::new(|| Ok(())));
        pool.submit(Arc::clone(&after));
        after.wait_for_complete();

        assert_eq!(err_rx.try_recv().unwrap(), "exploded");
        assert!(err_rx.try_recv().is_err());
        pool.destroy();
    }
}
