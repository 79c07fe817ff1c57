//! Single threaded timer queue for the simulated stack
//!
//! All work on a simulated device happens in tasks run by the [`EventLoop`]. The loop keeps its
//! own clock, so the same loop can be driven in real time by [`EventLoop::run`], or stepped
//! through virtual time with [`EventLoop::advance`] in tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::stack::Task;
use crate::Error;

/// What to do when a task returns an error
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop processing and return the error to the caller
    #[default]
    Abort,
    /// Log the error and keep going
    Log,
}

/// Why [`EventLoop::run`] returned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunExit {
    /// The shutdown future resolved
    Shutdown,
    /// The queue is empty, so nothing can ever run again
    Idle,
}

/// A queue of one-shot timed tasks
#[derive(Default)]
pub struct EventLoop {
    now: Cell<Duration>,
    seq: Cell<u64>,
    queue: RefCell<BTreeMap<(Duration, u64), Task>>,
    policy: Cell<ErrorPolicy>,
}

impl core::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventLoop")
            .field("now", &self.now.get())
            .field("pending", &self.pending())
            .field("policy", &self.policy.get())
            .finish()
    }
}

impl EventLoop {
    /// Create an empty loop with its clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how task errors are handled
    pub fn set_error_policy(&self, policy: ErrorPolicy) {
        self.policy.set(policy);
    }

    /// Time elapsed on the loop's clock
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Queue `task` to run once `delay` has elapsed
    ///
    /// Tasks with the same deadline run in submission order.
    pub fn submit_wait(&self, delay: Duration, task: Task) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.queue
            .borrow_mut()
            .insert((self.now.get() + delay, seq), task);
    }

    /// The deadline of the next task to run
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.borrow().keys().next().map(|(deadline, _)| *deadline)
    }

    /// The number of queued tasks
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    fn pop_due(&self, until: Duration) -> Option<(Duration, Task)> {
        let mut queue = self.queue.borrow_mut();
        let (&(deadline, _), _) = queue.first_key_value()?;
        if deadline > until {
            return None;
        }
        queue.pop_first().map(|((deadline, _), task)| (deadline, task))
    }

    fn run_task(&self, deadline: Duration, task: Task) -> Result<(), Error> {
        self.now.set(deadline);
        match task() {
            Ok(()) => Ok(()),
            Err(e) => match self.policy.get() {
                ErrorPolicy::Abort => Err(e),
                ErrorPolicy::Log => {
                    log::error!("Task at {deadline:?} failed: {e}");
                    Ok(())
                }
            },
        }
    }

    fn run_until(&self, until: Duration) -> Result<usize, Error> {
        let mut count = 0;
        while let Some((deadline, task)) = self.pop_due(until) {
            self.run_task(deadline, task)?;
            count += 1;
        }
        Ok(count)
    }

    /// Move the clock forward by `duration`, running every task which comes due
    ///
    /// Tasks run in deadline order, with the clock set to each task's deadline while it runs.
    /// Tasks submitted along the way also run if they come due inside the window. Returns the
    /// number of tasks run.
    pub fn advance(&self, duration: Duration) -> Result<usize, Error> {
        let until = self.now.get() + duration;
        let count = self.run_until(until)?;
        self.now.set(until);
        Ok(count)
    }

    /// Run every queued task immediately, including any they submit, until the queue is empty
    ///
    /// Anything which re-arms itself unconditionally must be stopped first, or this never returns.
    pub fn drain(&self) -> Result<usize, Error> {
        let mut count = 0;
        while let Some(deadline) = self.next_deadline() {
            count += self.run_until(deadline)?;
        }
        Ok(count)
    }

    /// Run tasks in real time until `shutdown` resolves, or the queue becomes empty
    ///
    /// The loop's clock continues from its current value.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<RunExit, Error> {
        let start = tokio::time::Instant::now();
        let offset = self.now.get();
        tokio::pin!(shutdown);

        loop {
            let Some(deadline) = self.next_deadline() else {
                return Ok(RunExit::Idle);
            };
            let wake = start + deadline.saturating_sub(offset);
            tokio::select! {
                _ = &mut shutdown => {
                    let elapsed = tokio::time::Instant::now().duration_since(start);
                    self.now.set(offset + elapsed);
                    return Ok(RunExit::Shutdown);
                }
                _ = tokio::time::sleep_until(wake) => {
                    self.run_until(deadline)?;
                }
            }
        }
    }
}
