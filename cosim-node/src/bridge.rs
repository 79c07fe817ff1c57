//! Connects a device script to the stack hosting it
//!
//! The [`Bridge`] is the device context shared by every native function exposed to the script. It
//! owns the name registry, the write dispatcher and the periodic timer, and it is the listener for
//! the stack's events, which it turns into calls to the script's hooks.
//!
//! Everything runs on the stack's event loop thread. A hook or callback may call back into the
//! bridge (for instance writing an object from inside a write callback); this is ordinary
//! recursion, since no borrow is held across a call into script code.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use cosim_common::{constants::object_ids, ObjectId, ObjectType, ObjectValue};

use crate::dispatcher::{WriteCallback, WriteDispatcher};
use crate::error::{InvalidArgumentSnafu, UnsupportedObjectTypeSnafu};
use crate::od_access::OdAccess;
use crate::registry::{AccessorRegistry, DynValue};
use crate::scheduler::PeriodicTimer;
use crate::stack::{CanOpenStack, StackListener};
use crate::Error;

/// How write events are delivered to the script
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WritePolicy {
    /// Writes run the callback registered for the written object with `ObjectCallback`
    #[default]
    PerObject,
    /// Every write calls the script's `OnWrite(index, sub)` hook
    CatchAll,
}

/// The script functions called on stack events
///
/// Implementations decide what an undefined hook means; the Lua implementation treats it as a
/// no-op.
pub trait ScriptHooks {
    /// Called once, when the stack initializes
    fn on_init(&self) -> Result<(), Error>;
    /// Called on each SYNC
    fn on_sync(&self, count: u8) -> Result<(), Error>;
    /// Called on every object write, under [`WritePolicy::CatchAll`]
    fn on_write(&self, id: ObjectId) -> Result<(), Error>;
    /// Called on every period of the timer set up by [`Bridge::configure_timer`]
    fn on_tick(&self) -> Result<(), Error>;
}

/// The device context for one script
pub struct Bridge {
    stack: Rc<dyn CanOpenStack>,
    od: OdAccess,
    registry: AccessorRegistry,
    dispatcher: WriteDispatcher,
    timer: Rc<PeriodicTimer>,
    policy: WritePolicy,
    hooks: RefCell<Option<Rc<dyn ScriptHooks>>>,
    initialized: Cell<bool>,
    shut_down: Cell<bool>,
}

impl core::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bridge")
            .field("registry", &self.registry)
            .field("dispatcher", &self.dispatcher)
            .field("timer", &self.timer)
            .field("policy", &self.policy)
            .field("shut_down", &self.shut_down.get())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Create a bridge and install it as the listener for `stack`'s events
    pub fn new(stack: Rc<dyn CanOpenStack>, policy: WritePolicy) -> Rc<Self> {
        let bridge = Rc::new_cyclic(|me: &Weak<Bridge>| {
            let timer = PeriodicTimer::new(stack.clone());
            let me = me.clone();
            timer.set_tick_hook(Rc::new(move || match me.upgrade() {
                Some(bridge) => bridge.tick(),
                None => Ok(()),
            }));
            let od = OdAccess::new(stack.clone());
            Self {
                registry: AccessorRegistry::new(od.clone()),
                od,
                dispatcher: WriteDispatcher::new(),
                timer,
                stack,
                policy,
                hooks: RefCell::new(None),
                initialized: Cell::new(false),
                shut_down: Cell::new(false),
            }
        });
        let listener = Rc::downgrade(&bridge) as Weak<dyn StackListener>;
        bridge.stack.set_listener(listener);
        bridge
    }

    /// Set the receiver of script hook calls
    pub fn set_hooks(&self, hooks: Rc<dyn ScriptHooks>) {
        *self.hooks.borrow_mut() = Some(hooks);
    }

    fn hooks(&self) -> Option<Rc<dyn ScriptHooks>> {
        self.hooks.borrow().clone()
    }

    /// The stack hosting the device
    pub fn stack(&self) -> &Rc<dyn CanOpenStack> {
        &self.stack
    }

    /// The name registry
    pub fn registry(&self) -> &AccessorRegistry {
        &self.registry
    }

    /// The per-object write callbacks
    pub fn dispatcher(&self) -> &WriteDispatcher {
        &self.dispatcher
    }

    /// The timer driving `OnTick`
    pub fn timer(&self) -> &Rc<PeriodicTimer> {
        &self.timer
    }

    /// The write policy chosen at creation
    pub fn write_policy(&self) -> WritePolicy {
        self.policy
    }

    /// Check whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }

    /// Bind `name` to the object at `index`/`sub`
    ///
    /// `type_code` is one of the CANopen data type codes in [`ObjectType`].
    pub fn register(&self, name: &str, index: u16, sub: u8, type_code: u16) -> Result<(), Error> {
        let object_type = ObjectType::try_from(type_code).map_err(|_| {
            UnsupportedObjectTypeSnafu {
                object_type: format!("0x{type_code:02X}"),
            }
            .build()
        })?;
        self.registry
            .register(name, ObjectId::new(index, sub), object_type);
        Ok(())
    }

    /// Read a named object
    pub fn read(&self, name: &str) -> Result<ObjectValue, Error> {
        self.registry.read(name)
    }

    /// Write a named object
    ///
    /// Write callbacks for the object run before this returns.
    pub fn write(&self, name: &str, value: &DynValue) -> Result<(), Error> {
        self.registry.write(name, value)
    }

    /// Install the callback run when the object at `index`/`sub` is written
    pub fn object_callback(&self, index: u16, sub: u8, callback: WriteCallback) {
        if self.policy == WritePolicy::CatchAll {
            log::warn!(
                "Callback installed for {} will never run: writes go to OnWrite",
                ObjectId::new(index, sub)
            );
        }
        self.dispatcher.on_write(ObjectId::new(index, sub), callback);
    }

    /// Send an emergency message, with no manufacturer data
    pub fn emcy(&self, code: u16, register: u8) {
        self.stack.report_error(code, register, &[]);
    }

    /// Start the `OnTick` timer, or change its period
    pub fn configure_timer(&self, period_ms: u32) -> Result<(), Error> {
        if period_ms == 0 {
            return InvalidArgumentSnafu {
                message: "timer period must be at least 1 ms",
            }
            .fail();
        }
        self.timer
            .configure(Duration::from_millis(period_ms as u64));
        Ok(())
    }

    /// Set the heartbeat producer time
    ///
    /// This writes the stack's own configuration object, so no write event is emitted.
    pub fn configure_heartbeat(&self, period_ms: u16) -> Result<(), Error> {
        self.od
            .set_config::<u16>(ObjectId::new(object_ids::HEARTBEAT_PRODUCER_TIME, 0), period_ms)
    }

    /// Stop delivering events to the script
    ///
    /// The timer is not rearmed, but a wait which is already outstanding still fires once more.
    pub fn shutdown(&self) {
        log::info!("Shutting down script bridge");
        self.shut_down.set(true);
        self.timer.shutdown();
    }

    fn tick(&self) -> Result<(), Error> {
        match self.hooks() {
            Some(hooks) => hooks.on_tick(),
            None => Ok(()),
        }
    }
}

impl StackListener for Bridge {
    fn on_init(&self) -> Result<(), Error> {
        if self.shut_down.get() || self.initialized.replace(true) {
            return Ok(());
        }
        match self.hooks() {
            Some(hooks) => hooks.on_init(),
            None => Ok(()),
        }
    }

    fn on_sync(&self, count: u8, _timestamp: Duration) -> Result<(), Error> {
        if self.shut_down.get() {
            return Ok(());
        }
        match self.hooks() {
            Some(hooks) => hooks.on_sync(count),
            None => Ok(()),
        }
    }

    fn on_write(&self, id: ObjectId) -> Result<(), Error> {
        if self.shut_down.get() {
            return Ok(());
        }
        match self.policy {
            WritePolicy::PerObject => self.dispatcher.notify(id),
            WritePolicy::CatchAll => match self.hooks() {
                Some(hooks) => hooks.on_write(id),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use cosim_common::{device_config::DeviceConfig, NodeId};

    use crate::sim::SimStack;

    use super::*;

    const CONFIG: &str = r#"
        device_name = "bridge-test"

        [[objects]]
        index = 0x2000
        parameter_name = "Drive"
        object_type = "record"
        [[objects.subs]]
        sub_index = 1
        parameter_name = "Speed"
        data_type = "uint32"
        access_type = "rw"
        [[objects.subs]]
        sub_index = 2
        parameter_name = "Torque"
        data_type = "int16"
        access_type = "rw"
    "#;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl ScriptHooks for Recorder {
        fn on_init(&self) -> Result<(), Error> {
            self.calls.borrow_mut().push("init".into());
            Ok(())
        }
        fn on_sync(&self, count: u8) -> Result<(), Error> {
            self.calls.borrow_mut().push(format!("sync {count}"));
            Ok(())
        }
        fn on_write(&self, id: ObjectId) -> Result<(), Error> {
            self.calls.borrow_mut().push(format!("write {id}"));
            Ok(())
        }
        fn on_tick(&self) -> Result<(), Error> {
            self.calls.borrow_mut().push("tick".into());
            Ok(())
        }
    }

    fn setup(policy: WritePolicy) -> (Rc<SimStack>, Rc<Bridge>, Rc<Recorder>) {
        let config = DeviceConfig::load_from_str(CONFIG).unwrap();
        let stack = SimStack::new(&config, NodeId::new(1).unwrap()).unwrap();
        let bridge = Bridge::new(stack.clone(), policy);
        let recorder = Rc::new(Recorder::default());
        bridge.set_hooks(recorder.clone());
        (stack, bridge, recorder)
    }

    #[test]
    fn test_register_read_write() {
        let (_stack, bridge, _rec) = setup(WritePolicy::PerObject);
        bridge
            .register("Speed", 0x2000, 1, ObjectType::UInt32 as u16)
            .unwrap();
        bridge.write("Speed", &DynValue::Integer(1500)).unwrap();
        assert_eq!(ObjectValue::U32(1500), bridge.read("Speed").unwrap());

        assert!(matches!(
            bridge.read("Missing"),
            Err(Error::NameNotFound { name }) if name == "Missing"
        ));
        assert!(matches!(
            bridge.register("Bad", 0x2000, 1, 0x08),
            Err(Error::UnsupportedObjectType { .. })
        ));
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let (_stack, bridge, _rec) = setup(WritePolicy::PerObject);
        // 0x2000:2 is an INT16
        bridge
            .register("Torque", 0x2000, 2, ObjectType::UInt32 as u16)
            .unwrap();
        assert!(matches!(
            bridge.read("Torque"),
            Err(Error::StackAccess { abort_code: cosim_common::AbortCode::DataTypeMismatch, .. })
        ));
        bridge
            .register("Torque", 0x2000, 2, ObjectType::Int16 as u16)
            .unwrap();
        bridge.write("Torque", &DynValue::Integer(-300)).unwrap();
        assert_eq!(ObjectValue::I16(-300), bridge.read("Torque").unwrap());
        assert!(matches!(
            bridge.write("Torque", &DynValue::Integer(40000)),
            Err(Error::TypeConversion { .. })
        ));
    }

    #[test]
    fn test_catch_all_policy() {
        let (stack, bridge, rec) = setup(WritePolicy::CatchAll);
        let called = Rc::new(Cell::new(false));
        let c = called.clone();
        bridge.object_callback(
            0x2000,
            1,
            Rc::new(move || {
                c.set(true);
                Ok(())
            }),
        );
        stack
            .external_write(ObjectId::new(0x2000, 1), &42u32.to_le_bytes())
            .unwrap();
        assert!(!called.get());
        assert_eq!(vec!["write 0x2000sub1".to_string()], *rec.calls.borrow());
    }

    #[test]
    fn test_lifecycle_hooks() {
        let (stack, bridge, rec) = setup(WritePolicy::PerObject);
        stack.init().unwrap();
        stack.sync(7).unwrap();
        bridge.configure_timer(50).unwrap();
        stack.event_loop().advance(Duration::from_millis(100)).unwrap();
        assert_eq!(vec!["init", "sync 7", "tick", "tick"], *rec.calls.borrow());

        bridge.shutdown();
        stack.sync(8).unwrap();
        stack.event_loop().drain().unwrap();
        // The outstanding timer wait drains, nothing else is delivered
        assert_eq!(vec!["init", "sync 7", "tick", "tick", "tick"], *rec.calls.borrow());
    }

    #[test]
    fn test_configure_heartbeat_emits_no_event() {
        let (stack, bridge, _rec) = setup(WritePolicy::PerObject);
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        bridge.object_callback(
            object_ids::HEARTBEAT_PRODUCER_TIME,
            0,
            Rc::new(move || {
                c.set(c.get() + 1);
                Ok(())
            }),
        );
        bridge.configure_heartbeat(250).unwrap();
        assert_eq!(0, count.get());
        assert_eq!(
            250u16.to_le_bytes().to_vec(),
            stack.external_read(ObjectId::new(0x1017, 0)).unwrap()
        );
    }

    #[test]
    fn test_configure_timer_rejects_zero() {
        let (_stack, bridge, _rec) = setup(WritePolicy::PerObject);
        assert!(matches!(
            bridge.configure_timer(0),
            Err(Error::InvalidArgument { .. })
        ));
        assert_eq!(None, bridge.timer().period());
    }

    #[test]
    fn test_emcy() {
        let (stack, bridge, _rec) = setup(WritePolicy::PerObject);
        bridge.emcy(0x1000, 0x01);
        let emcys = stack.emergencies();
        assert_eq!(1, emcys.len());
        assert_eq!(0x1000, emcys[0].code);
        assert_eq!(0x01, emcys[0].register);
        assert!(emcys[0].vendor_data.is_empty());
    }
}
