//! The interface to the CANopen protocol stack which hosts the simulated device
//!
//! The bridge never implements any protocol itself. It relies on a stack to store the object
//! dictionary, deliver lifecycle events, and schedule timers on its event loop.
//! [`SimStack`](crate::sim::SimStack) is the in-process implementation used by the `cosim` binary
//! and the tests.

use std::rc::Weak;
use std::time::Duration;

use cosim_common::{objects::SubInfo, AbortCode, ObjectId};

use crate::Error;

/// A unit of work scheduled on the stack's event loop
pub type Task = Box<dyn FnOnce() -> Result<(), Error>>;

/// Receives the events emitted by a stack
///
/// All methods are called synchronously on the stack's execution context. Errors are returned to
/// whatever caused the event: the local write call, or the event loop.
pub trait StackListener {
    /// The stack finished initialization and is about to become operational
    fn on_init(&self) -> Result<(), Error>;

    /// A SYNC message was received
    fn on_sync(&self, count: u8, timestamp: Duration) -> Result<(), Error>;

    /// A value was committed to a sub object, either locally or by the network
    fn on_write(&self, id: ObjectId) -> Result<(), Error>;
}

/// Services consumed from the CANopen stack
pub trait CanOpenStack {
    /// Get the type and access of a sub object
    ///
    /// Fails with [`AbortCode::NoSuchObject`] or [`AbortCode::NoSuchSubIndex`] if the sub object
    /// does not exist.
    fn sub_info(&self, id: ObjectId) -> Result<SubInfo, AbortCode>;

    /// Read the raw little endian value of a sub object
    ///
    /// `buf` must be exactly the size of the sub object.
    fn read(&self, id: ObjectId, buf: &mut [u8]) -> Result<(), AbortCode>;

    /// Store a value to a sub object, then emit a write event
    ///
    /// The write event is delivered to the listener before this returns, and any error raised by
    /// the listener is returned from here.
    fn write(&self, id: ObjectId, data: &[u8]) -> Result<(), Error>;

    /// Store a value to one of the stack's own configuration objects without emitting an event
    fn write_config(&self, id: ObjectId, data: &[u8]) -> Result<(), AbortCode>;

    /// Send an emergency message
    fn report_error(&self, code: u16, register: u8, vendor_data: &[u8]);

    /// Run `task` once on the event loop after `delay` has elapsed
    ///
    /// Returns immediately. A submitted wait cannot be cancelled.
    fn submit_wait(&self, delay: Duration, task: Task);

    /// Install the receiver for stack events, replacing any previous one
    fn set_listener(&self, listener: Weak<dyn StackListener>);
}
