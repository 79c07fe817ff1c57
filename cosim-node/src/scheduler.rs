//! A periodic timer driven by one-shot waits on the stack's event loop

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::stack::CanOpenStack;
use crate::Error;

/// Callback run on each timer period
pub type TickHook = Rc<dyn Fn() -> Result<(), Error>>;

/// The state of a [`PeriodicTimer`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    /// No wait is outstanding
    Idle,
    /// A wait has been submitted and has not fired yet
    Armed,
}

/// A repeating timer with at most one outstanding wait
///
/// The timer does nothing until the first [`configure`](Self::configure). Each firing runs the
/// tick hook, then submits the next wait using the period in effect at that moment. After
/// [`shutdown`](Self::shutdown), a wait which is already outstanding still fires once, but no new
/// wait is submitted.
pub struct PeriodicTimer {
    stack: Rc<dyn CanOpenStack>,
    period: Cell<Option<Duration>>,
    state: Cell<TimerState>,
    shut_down: Cell<bool>,
    tick: RefCell<Option<TickHook>>,
    me: Weak<PeriodicTimer>,
}

impl core::fmt::Debug for PeriodicTimer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PeriodicTimer")
            .field("period", &self.period.get())
            .field("state", &self.state.get())
            .field("shut_down", &self.shut_down.get())
            .finish_non_exhaustive()
    }
}

impl PeriodicTimer {
    /// Create an idle timer which schedules its waits on `stack`
    pub fn new(stack: Rc<dyn CanOpenStack>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            stack,
            period: Cell::new(None),
            state: Cell::new(TimerState::Idle),
            shut_down: Cell::new(false),
            tick: RefCell::new(None),
            me: me.clone(),
        })
    }

    /// Set the callback run on every firing
    pub fn set_tick_hook(&self, hook: TickHook) {
        *self.tick.borrow_mut() = Some(hook);
    }

    /// Set the timer period, starting the timer if it is idle
    ///
    /// When a wait is already outstanding it is left alone, and the new period is used from the
    /// next firing on.
    pub fn configure(&self, period: Duration) {
        self.period.set(Some(period));
        if self.state.get() == TimerState::Idle && !self.shut_down.get() {
            self.arm(period);
        }
    }

    fn arm(&self, period: Duration) {
        let me = self.me.clone();
        self.state.set(TimerState::Armed);
        self.stack.submit_wait(
            period,
            Box::new(move || match me.upgrade() {
                Some(timer) => timer.fire(),
                None => Ok(()),
            }),
        );
    }

    /// Handle expiry of the outstanding wait
    ///
    /// Runs the tick hook, then re-arms unless shut down. If the hook fails the error is returned
    /// and the timer stays idle.
    pub fn fire(&self) -> Result<(), Error> {
        self.state.set(TimerState::Idle);
        let hook = self.tick.borrow().clone();
        if let Some(hook) = hook {
            hook()?;
        }
        // The hook may have armed the timer itself, through configure
        if !self.shut_down.get() && self.state.get() == TimerState::Idle {
            if let Some(period) = self.period.get() {
                self.arm(period);
            }
        }
        Ok(())
    }

    /// Stop re-arming
    pub fn shutdown(&self) {
        log::debug!("Periodic timer shut down in state {:?}", self.state.get());
        self.shut_down.set(true);
    }

    /// Check whether the timer has been shut down
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }

    /// The most recently configured period
    pub fn period(&self) -> Option<Duration> {
        self.period.get()
    }

    /// The current state
    pub fn state(&self) -> TimerState {
        self.state.get()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Weak;

    use cosim_common::{objects::SubInfo, AbortCode, ObjectId};

    use crate::error::InvalidArgumentSnafu;
    use crate::stack::{StackListener, Task};

    use super::*;

    /// A stack which only queues waits, to be fired by hand
    #[derive(Default)]
    struct WaitQueue {
        waits: RefCell<Vec<(Duration, Task)>>,
    }

    impl WaitQueue {
        fn fire_next(&self) -> Result<Duration, Error> {
            let (delay, task) = self.waits.borrow_mut().remove(0);
            task()?;
            Ok(delay)
        }

        fn pending(&self) -> usize {
            self.waits.borrow().len()
        }
    }

    impl CanOpenStack for WaitQueue {
        fn sub_info(&self, _id: ObjectId) -> Result<SubInfo, AbortCode> {
            Err(AbortCode::NoSuchObject)
        }
        fn read(&self, _id: ObjectId, _buf: &mut [u8]) -> Result<(), AbortCode> {
            Err(AbortCode::NoSuchObject)
        }
        fn write(&self, id: ObjectId, _data: &[u8]) -> Result<(), Error> {
            crate::error::StackAccessSnafu {
                id,
                abort_code: AbortCode::NoSuchObject,
            }
            .fail()
        }
        fn write_config(&self, _id: ObjectId, _data: &[u8]) -> Result<(), AbortCode> {
            Err(AbortCode::NoSuchObject)
        }
        fn report_error(&self, _code: u16, _register: u8, _vendor_data: &[u8]) {}
        fn submit_wait(&self, delay: Duration, task: Task) {
            self.waits.borrow_mut().push((delay, task));
        }
        fn set_listener(&self, _listener: Weak<dyn StackListener>) {}
    }

    fn setup() -> (Rc<WaitQueue>, Rc<PeriodicTimer>, Rc<Cell<u32>>) {
        let queue = Rc::new(WaitQueue::default());
        let timer = PeriodicTimer::new(queue.clone());
        let ticks = Rc::new(Cell::new(0));
        let captured = ticks.clone();
        timer.set_tick_hook(Rc::new(move || {
            captured.set(captured.get() + 1);
            Ok(())
        }));
        (queue, timer, ticks)
    }

    #[test]
    fn test_idle_until_configured() {
        let (queue, timer, _ticks) = setup();
        assert_eq!(TimerState::Idle, timer.state());
        assert_eq!(None, timer.period());
        assert_eq!(0, queue.pending());
    }

    #[test]
    fn test_rearms_each_period() {
        let (queue, timer, ticks) = setup();
        timer.configure(Duration::from_millis(100));
        assert_eq!(TimerState::Armed, timer.state());
        for i in 1..=3 {
            assert_eq!(1, queue.pending());
            assert_eq!(Duration::from_millis(100), queue.fire_next().unwrap());
            assert_eq!(i, ticks.get());
        }
        assert_eq!(1, queue.pending());
    }

    #[test]
    fn test_reconfigure_while_armed() {
        let (queue, timer, ticks) = setup();
        timer.configure(Duration::from_millis(100));
        timer.configure(Duration::from_millis(50));
        // Only one wait outstanding, with the original period
        assert_eq!(1, queue.pending());
        assert_eq!(Duration::from_millis(100), queue.fire_next().unwrap());
        assert_eq!(Duration::from_millis(50), queue.fire_next().unwrap());
        assert_eq!(2, ticks.get());
    }

    #[test]
    fn test_shutdown_drains_once() {
        let (queue, timer, ticks) = setup();
        timer.configure(Duration::from_millis(10));
        timer.shutdown();
        assert!(timer.is_shut_down());
        queue.fire_next().unwrap();
        assert_eq!(1, ticks.get());
        assert_eq!(0, queue.pending());
        assert_eq!(TimerState::Idle, timer.state());

        // Configuring after shutdown never arms
        timer.configure(Duration::from_millis(10));
        assert_eq!(0, queue.pending());
    }

    #[test]
    fn test_failed_tick_stops_timer() {
        let (queue, timer, _ticks) = setup();
        timer.set_tick_hook(Rc::new(|| InvalidArgumentSnafu { message: "tick" }.fail()));
        timer.configure(Duration::from_millis(10));
        assert!(queue.fire_next().is_err());
        assert_eq!(0, queue.pending());
        assert_eq!(TimerState::Idle, timer.state());

        // It can be restarted
        timer.configure(Duration::from_millis(10));
        assert_eq!(1, queue.pending());
    }

    #[test]
    fn test_configure_from_tick_keeps_single_wait() {
        let (queue, timer, _ticks) = setup();
        let weak = Rc::downgrade(&timer);
        timer.set_tick_hook(Rc::new(move || {
            weak.upgrade().unwrap().configure(Duration::from_millis(20));
            Ok(())
        }));
        timer.configure(Duration::from_millis(10));
        queue.fire_next().unwrap();
        assert_eq!(1, queue.pending());
        assert_eq!(Duration::from_millis(20), queue.fire_next().unwrap());
    }
}
