//! In-process CANopen stack for running device scripts without a bus
//!
//! [`SimStack`] owns the object dictionary described by a [`DeviceConfig`], an [`EventLoop`] to run
//! timers on, and the bookkeeping a test needs to observe the device from the outside: emergencies
//! sent, heartbeats produced, and NMT state. The network side of the device is modelled by
//! [`SimStack::external_write`], [`SimStack::external_read`] and [`SimStack::sync`].

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use cosim_common::{
    constants::object_ids,
    device_config::{DeviceConfig, LoadError},
    objects::SubInfo,
    AbortCode, NodeId, ObjectId,
};

use crate::error::StackAccessSnafu;
use crate::event_loop::EventLoop;
use crate::object_dict::{build_object_dict, find_object, ODEntry, ObjectAccess};
use crate::stack::{CanOpenStack, StackListener, Task};
use crate::Error;

/// SYNC counter values wrap after this value
pub const MAX_SYNC_COUNTER: u8 = 240;

/// An emergency reported by the device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Emergency {
    /// The emergency error code
    pub code: u16,
    /// Value of the error register at the time of the emergency
    pub register: u8,
    /// Manufacturer specific data
    pub vendor_data: Vec<u8>,
    /// Time on the stack's event loop when the emergency was sent
    pub timestamp: Duration,
}

/// The NMT state of a simulated device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NmtState {
    /// Created but not yet initialized
    Bootup,
    /// Initialized and running
    Operational,
    /// Stopped; no timers are rearmed, and no events are emitted
    Stopped,
}

/// A CANopen stack which hosts one simulated device
pub struct SimStack {
    node_id: NodeId,
    device_name: String,
    od: Vec<ODEntry>,
    event_loop: Rc<EventLoop>,
    listener: RefCell<Option<Weak<dyn StackListener>>>,
    emergencies: RefCell<Vec<Emergency>>,
    nmt_state: Cell<NmtState>,
    heartbeat_count: Cell<u32>,
    heartbeat_armed: Cell<bool>,
    sync_counter: Cell<u8>,
    me: Weak<SimStack>,
}

impl core::fmt::Debug for SimStack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimStack")
            .field("node_id", &self.node_id)
            .field("device_name", &self.device_name)
            .field("nmt_state", &self.nmt_state.get())
            .field("event_loop", &self.event_loop)
            .finish_non_exhaustive()
    }
}

impl SimStack {
    /// Create a stack with the objects defined in `config`
    pub fn new(config: &DeviceConfig, node_id: NodeId) -> Result<Rc<Self>, LoadError> {
        let od = build_object_dict(&config.cells()?)?;
        log::info!(
            "Created device '{}' with node ID {} ({} objects)",
            config.device_name,
            node_id,
            od.len()
        );
        Ok(Rc::new_cyclic(|me| Self {
            node_id,
            device_name: config.device_name.clone(),
            od,
            event_loop: Rc::new(EventLoop::new()),
            listener: RefCell::new(None),
            emergencies: RefCell::new(Vec::new()),
            nmt_state: Cell::new(NmtState::Bootup),
            heartbeat_count: Cell::new(0),
            heartbeat_armed: Cell::new(false),
            sync_counter: Cell::new(0),
            me: me.clone(),
        }))
    }

    /// The node ID of the device
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The device name from the config
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The event loop which runs all timers on this stack
    pub fn event_loop(&self) -> &Rc<EventLoop> {
        &self.event_loop
    }

    /// The current NMT state
    pub fn nmt_state(&self) -> NmtState {
        self.nmt_state.get()
    }

    fn listener(&self) -> Option<Rc<dyn StackListener>> {
        if self.nmt_state.get() == NmtState::Stopped {
            return None;
        }
        self.listener.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn object(&self, index: u16) -> Result<&dyn ObjectAccess, AbortCode> {
        find_object(&self.od, index).ok_or(AbortCode::NoSuchObject)
    }

    /// Initialize the device
    ///
    /// Emits the init event, then goes operational and starts producing heartbeats. Calling this
    /// again has no effect.
    pub fn init(&self) -> Result<(), Error> {
        if self.nmt_state.get() != NmtState::Bootup {
            return Ok(());
        }
        log::info!("Initializing node {}", self.node_id);
        if let Some(listener) = self.listener() {
            listener.on_init()?;
        }
        self.nmt_state.set(NmtState::Operational);
        self.schedule_heartbeat();
        Ok(())
    }

    /// Deliver a SYNC message with the given counter value
    pub fn sync(&self, count: u8) -> Result<(), Error> {
        match self.listener() {
            Some(listener) => listener.on_sync(count, self.event_loop.now()),
            None => Ok(()),
        }
    }

    /// Produce SYNC messages with a rolling counter every `period`
    pub fn start_sync_producer(&self, period: Duration) {
        log::info!("Producing SYNC every {period:?}");
        self.submit_sync(period);
    }

    fn submit_sync(&self, period: Duration) {
        let me = self.me.clone();
        self.event_loop.submit_wait(
            period,
            Box::new(move || {
                let Some(stack) = me.upgrade() else {
                    return Ok(());
                };
                if stack.nmt_state.get() == NmtState::Stopped {
                    return Ok(());
                }
                let count = stack.sync_counter.get() % MAX_SYNC_COUNTER + 1;
                stack.sync_counter.set(count);
                stack.submit_sync(period);
                stack.sync(count)
            }),
        );
    }

    /// Stop the device
    ///
    /// No further events are delivered, and heartbeat and SYNC production stop at their next
    /// period.
    pub fn stop(&self) {
        log::info!("Stopping node {}", self.node_id);
        self.nmt_state.set(NmtState::Stopped);
    }

    /// Write to an object as a network master would, via SDO or RPDO
    ///
    /// Fails if the object is read-only or const.
    pub fn external_write(&self, id: ObjectId, data: &[u8]) -> Result<(), Error> {
        let info = self
            .sub_info(id)
            .map_err(|abort_code| StackAccessSnafu { id, abort_code }.build())?;
        if !info.access_type.is_writable() {
            return StackAccessSnafu {
                id,
                abort_code: AbortCode::ReadOnly,
            }
            .fail();
        }
        self.store_and_notify(id, data)
    }

    /// Read an object as a network master would, via SDO
    pub fn external_read(&self, id: ObjectId) -> Result<Vec<u8>, AbortCode> {
        let info = self.sub_info(id)?;
        let mut buf = vec![0; info.size()];
        self.read(id, &mut buf)?;
        Ok(buf)
    }

    /// All emergencies reported so far, oldest first
    pub fn emergencies(&self) -> Vec<Emergency> {
        self.emergencies.borrow().clone()
    }

    /// The number of heartbeats produced so far
    pub fn heartbeat_count(&self) -> u32 {
        self.heartbeat_count.get()
    }

    fn store(&self, id: ObjectId, data: &[u8]) -> Result<(), AbortCode> {
        self.object(id.index)?.write(id.sub, data)?;
        if id == ObjectId::new(object_ids::HEARTBEAT_PRODUCER_TIME, 0) {
            self.schedule_heartbeat();
        }
        Ok(())
    }

    fn store_and_notify(&self, id: ObjectId, data: &[u8]) -> Result<(), Error> {
        self.store(id, data)
            .map_err(|abort_code| StackAccessSnafu { id, abort_code }.build())?;
        match self.listener() {
            Some(listener) => listener.on_write(id),
            None => Ok(()),
        }
    }

    fn heartbeat_period(&self) -> Option<Duration> {
        let ms = self
            .object(object_ids::HEARTBEAT_PRODUCER_TIME)
            .and_then(|obj| obj.read_u16(0))
            .ok()?;
        (ms != 0).then(|| Duration::from_millis(ms as u64))
    }

    fn schedule_heartbeat(&self) {
        if self.heartbeat_armed.get()
            || self.nmt_state.get() != NmtState::Operational
            || !self.node_id.is_configured()
        {
            return;
        }
        let Some(period) = self.heartbeat_period() else {
            return;
        };
        self.heartbeat_armed.set(true);
        let me = self.me.clone();
        self.event_loop.submit_wait(
            period,
            Box::new(move || {
                if let Some(stack) = me.upgrade() {
                    stack.heartbeat_armed.set(false);
                    if stack.nmt_state.get() == NmtState::Operational
                        && stack.heartbeat_period().is_some()
                    {
                        stack.heartbeat_count.set(stack.heartbeat_count.get() + 1);
                        log::trace!("Heartbeat from node {}", stack.node_id);
                        stack.schedule_heartbeat();
                    }
                }
                Ok(())
            }),
        );
    }
}

impl CanOpenStack for SimStack {
    fn sub_info(&self, id: ObjectId) -> Result<SubInfo, AbortCode> {
        self.object(id.index)?.sub_info(id.sub)
    }

    fn read(&self, id: ObjectId, buf: &mut [u8]) -> Result<(), AbortCode> {
        self.object(id.index)?.read(id.sub, buf)?;
        Ok(())
    }

    fn write(&self, id: ObjectId, data: &[u8]) -> Result<(), Error> {
        let info = self
            .sub_info(id)
            .map_err(|abort_code| StackAccessSnafu { id, abort_code }.build())?;
        if !info.access_type.is_locally_writable() {
            return StackAccessSnafu {
                id,
                abort_code: AbortCode::ReadOnly,
            }
            .fail();
        }
        self.store_and_notify(id, data)
    }

    fn write_config(&self, id: ObjectId, data: &[u8]) -> Result<(), AbortCode> {
        self.store(id, data)
    }

    fn report_error(&self, code: u16, register: u8, vendor_data: &[u8]) {
        if let Err(abort_code) = self.store(ObjectId::new(object_ids::ERROR_REGISTER, 0), &[register]) {
            log::error!("Failed to update error register: {abort_code}");
        }
        if !self.node_id.is_configured() {
            log::warn!("Dropping EMCY code=0x{code:04X}, node ID is unconfigured");
            return;
        }
        log::warn!(
            "EMCY from node {}: code=0x{code:04X} register=0x{register:02X} data={vendor_data:02X?}",
            self.node_id
        );
        self.emergencies.borrow_mut().push(Emergency {
            code,
            register,
            vendor_data: vendor_data.to_vec(),
            timestamp: self.event_loop.now(),
        });
    }

    fn submit_wait(&self, delay: Duration, task: Task) {
        self.event_loop.submit_wait(delay, task);
    }

    fn set_listener(&self, listener: Weak<dyn StackListener>) {
        *self.listener.borrow_mut() = Some(listener);
    }
}
