//! Background buffer refills for streamed instances.
//!
//! A single worker thread services every instance whose audio is too large to be
//! resident. Instances are visited round-robin from a shared queue so that none of
//! them monopolizes the worker, and all decoding I/O stays off the frame thread.

use crate::backend::AudioBackend;
use crate::config::StreamingDesc;
use crate::error::{PetalSonicError, Result};
use crate::playback::InstanceId;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Result of servicing a task once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Still needs streaming; stays in the queue
    Pending,
    /// No longer needs streaming; removed from the queue
    Finished,
}

/// Work item serviced by the streaming worker.
pub trait StreamingTask: Send + Sync {
    fn task_id(&self) -> InstanceId;

    /// Performs one refill step. May block on decoding.
    fn service(&self, backend: &dyn AudioBackend) -> StreamStatus;
}

/// Shared queue of tasks needing streaming, plus the worker's wake signal.
pub struct StreamingQueue {
    tasks: Mutex<Vec<Arc<dyn StreamingTask>>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl StreamingQueue {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            tasks: Mutex::new(Vec::new()),
            wake_tx,
            wake_rx,
        }
    }

    /// Adds a task unless one with the same id is already queued.
    ///
    /// Returns `true` if the task was added.
    pub fn enqueue(&self, task: Arc<dyn StreamingTask>) -> bool {
        let id = task.task_id();
        {
            let mut tasks = self.lock();
            if tasks.iter().any(|t| t.task_id() == id) {
                return false;
            }
            tasks.push(task);
        }
        self.wake();
        true
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.lock().iter().any(|t| t.task_id() == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn wake(&self) {
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::warn!("Streaming wake channel disconnected");
            }
        }
    }

    /// Blocks until woken or until `timeout` elapses.
    fn wait(&self, timeout: Duration) {
        let _ = self.wake_rx.recv_timeout(timeout);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn StreamingTask>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StreamingQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one [`RoundRobin::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Queue was empty
    Idle,
    /// One task was serviced; `pass_complete` is set when the cursor wrapped
    Serviced { pass_complete: bool },
}

/// Round-robin cursor over a [`StreamingQueue`].
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Services the task under the cursor and advances it.
    ///
    /// The queue lock is not held while the task runs, so the frame thread can keep
    /// enqueuing during slow decodes.
    pub fn step(&mut self, queue: &StreamingQueue, backend: &dyn AudioBackend) -> Step {
        let task = {
            let tasks = queue.lock();
            if tasks.is_empty() {
                self.cursor = 0;
                return Step::Idle;
            }
            if self.cursor >= tasks.len() {
                self.cursor = 0;
            }
            tasks[self.cursor].clone()
        };

        let status = task.service(backend);

        let mut tasks = queue.lock();
        match status {
            StreamStatus::Pending => self.cursor += 1,
            StreamStatus::Finished => {
                let id = task.task_id();
                if let Some(index) = tasks.iter().position(|t| t.task_id() == id) {
                    tasks.remove(index);
                    if index < self.cursor {
                        self.cursor -= 1;
                    }
                }
                log::trace!("Streaming finished for {}", id);
            }
        }

        let pass_complete = self.cursor >= tasks.len();
        if pass_complete {
            self.cursor = 0;
        }
        Step::Serviced { pass_complete }
    }
}

/// Dedicated thread draining a [`StreamingQueue`].
pub struct StreamingWorker {
    queue: Arc<StreamingQueue>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    exited: Receiver<()>,
    shutdown_grace: Duration,
}

impl StreamingWorker {
    /// Starts the worker thread.
    pub fn spawn(
        backend: Arc<dyn AudioBackend>,
        queue: Arc<StreamingQueue>,
        desc: &StreamingDesc,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        // The worker holds the only sender; it disconnects when the thread ends
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);

        let handle = {
            let queue = queue.clone();
            let stop = stop.clone();
            let desc = desc.clone();
            thread::Builder::new()
                .name("petalsonic-streaming".into())
                .spawn(move || {
                    let _exit_guard = exit_tx;
                    run(&*backend, &queue, &stop, &desc);
                })
                .map_err(|e| {
                    PetalSonicError::Worker(format!("Failed to spawn streaming thread: {}", e))
                })?
        };

        log::info!("Streaming worker started");
        Ok(Self {
            queue,
            stop,
            handle: Some(handle),
            exited,
            shutdown_grace: desc.shutdown_grace,
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the worker to stop and waits up to the shutdown grace period.
    ///
    /// Returns `true` if the thread exited and was joined. A thread still busy after
    /// the grace period is detached and left to finish on its own.
    pub fn shutdown(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        self.stop.store(true, Ordering::Release);
        self.queue.wake();

        match self.exited.recv_timeout(self.shutdown_grace) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Streaming worker did not stop within {:?}, detaching it",
                    self.shutdown_grace
                );
                drop(handle);
                false
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    log::error!("Streaming worker panicked");
                } else {
                    log::info!("Streaming worker stopped");
                }
                true
            }
        }
    }
}

impl Drop for StreamingWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    backend: &dyn AudioBackend,
    queue: &StreamingQueue,
    stop: &AtomicBool,
    desc: &StreamingDesc,
) {
    let mut round_robin = RoundRobin::new();
    let mut pass_start = Instant::now();

    while !stop.load(Ordering::Acquire) {
        match round_robin.step(queue, backend) {
            Step::Idle => {
                queue.wait(desc.idle_wait);
                pass_start = Instant::now();
            }
            Step::Serviced {
                pass_complete: true,
            } => {
                // Nothing needed refilling this pass
                if pass_start.elapsed() < desc.min_pass_duration {
                    thread::sleep(desc.pass_backoff);
                }
                pass_start = Instant::now();
            }
            Step::Serviced {
                pass_complete: false,
            } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBackend;
    use std::sync::atomic::AtomicUsize;

    struct CountingTask {
        id: InstanceId,
        serviced: AtomicUsize,
        finish_after: usize,
        delay: Duration,
    }

    impl CountingTask {
        fn new(finish_after: usize) -> Arc<Self> {
            Arc::new(Self {
                id: InstanceId::generate(),
                serviced: AtomicUsize::new(0),
                finish_after,
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                id: InstanceId::generate(),
                serviced: AtomicUsize::new(0),
                finish_after: usize::MAX,
                delay,
            })
        }

        fn count(&self) -> usize {
            self.serviced.load(Ordering::SeqCst)
        }
    }

    impl StreamingTask for CountingTask {
        fn task_id(&self) -> InstanceId {
            self.id
        }

        fn service(&self, _backend: &dyn AudioBackend) -> StreamStatus {
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            let n = self.serviced.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.finish_after {
                StreamStatus::Finished
            } else {
                StreamStatus::Pending
            }
        }
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let queue = StreamingQueue::new();
        let task = CountingTask::new(usize::MAX);
        assert!(queue.enqueue(task.clone()));
        assert!(!queue.enqueue(task.clone()));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(task.id));
    }

    #[test]
    fn test_round_robin_services_every_task_once_per_pass() {
        let backend = FakeBackend::with_voices(0);
        let queue = StreamingQueue::new();
        let tasks: Vec<_> = (0..3).map(|_| CountingTask::new(usize::MAX)).collect();
        for task in &tasks {
            queue.enqueue(task.clone());
        }

        let mut round_robin = RoundRobin::new();
        let mut completed_passes = 0;
        for _ in 0..tasks.len() {
            if let Step::Serviced {
                pass_complete: true,
            } = round_robin.step(&queue, &backend)
            {
                completed_passes += 1;
            }
        }
        assert!(tasks.iter().all(|t| t.count() == 1));
        assert_eq!(completed_passes, 1);

        for _ in 0..tasks.len() * 2 {
            round_robin.step(&queue, &backend);
        }
        assert!(tasks.iter().all(|t| t.count() == 3));
    }

    #[test]
    fn test_finished_task_is_removed_and_cursor_moves_on() {
        let backend = FakeBackend::with_voices(0);
        let queue = StreamingQueue::new();
        let done = CountingTask::new(1);
        let a = CountingTask::new(usize::MAX);
        let b = CountingTask::new(usize::MAX);
        queue.enqueue(a.clone());
        queue.enqueue(done.clone());
        queue.enqueue(b.clone());

        let mut round_robin = RoundRobin::new();
        round_robin.step(&queue, &backend);
        round_robin.step(&queue, &backend);
        assert_eq!(queue.len(), 2);
        assert!(!queue.contains(done.id));

        round_robin.step(&queue, &backend);
        assert_eq!(b.count(), 1);
        assert_eq!(a.count(), 1);
        assert_eq!(done.count(), 1);
    }

    #[test]
    fn test_empty_queue_is_idle() {
        let backend = FakeBackend::with_voices(0);
        let queue = StreamingQueue::new();
        let mut round_robin = RoundRobin::new();
        assert_eq!(round_robin.step(&queue, &backend), Step::Idle);
    }

    #[test]
    fn test_worker_drains_queue_and_stops() {
        let backend: Arc<dyn AudioBackend> = Arc::new(FakeBackend::with_voices(0));
        let queue = Arc::new(StreamingQueue::new());
        let mut worker =
            StreamingWorker::spawn(backend, queue.clone(), &StreamingDesc::default()).unwrap();
        assert!(worker.is_running());

        let task = CountingTask::new(5);
        queue.enqueue(task.clone());
        assert!(wait_until(Duration::from_secs(2), || queue.is_empty()));
        assert_eq!(task.count(), 5);

        assert!(worker.shutdown());
        assert!(!worker.is_running());
        // Second shutdown is a no-op
        assert!(worker.shutdown());
    }

    #[test]
    fn test_stuck_worker_is_detached_after_grace() {
        let backend: Arc<dyn AudioBackend> = Arc::new(FakeBackend::with_voices(0));
        let queue = Arc::new(StreamingQueue::new());
        let desc = StreamingDesc {
            shutdown_grace: Duration::from_millis(20),
            ..Default::default()
        };
        let mut worker = StreamingWorker::spawn(backend, queue.clone(), &desc).unwrap();

        let task = CountingTask::slow(Duration::from_millis(500));
        queue.enqueue(task.clone());
        // Let the worker pick the task up and block inside it
        thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        assert!(!worker.shutdown());
        assert!(start.elapsed() < Duration::from_millis(400));
    }
}
