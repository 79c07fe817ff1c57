//! A simulated device with a script attached, for driving from tests
use std::rc::Rc;
use std::time::Duration;

use cosim_common::{device_config::DeviceConfig, NodeId, ObjectId};
use cosim_node::{Bridge, Error, ScriptConfig, ScriptEngine, SimStack, WritePolicy};

/// Device config used by most tests
///
/// 0x2000 is a record of writable values, 0x2001 a read-only status byte, and 0x2002 a
/// write-only command word.
pub const DEVICE_CONFIG: &str = r#"
device_name = "test-drive"
device_type = 0x00020192

[identity]
vendor_id = 0xCAFE
product_code = 1032
revision_number = 2

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
parameter_name = "Position"
data_type = "int32"
access_type = "rw"
[[objects.subs]]
sub_index = 3
parameter_name = "Torque"
data_type = "int16"
access_type = "rw"

[[objects]]
index = 0x2001
parameter_name = "Status"
object_type = "var"
data_type = "uint8"
access_type = "ro"

[[objects]]
index = 0x2002
parameter_name = "Command"
object_type = "var"
data_type = "uint16"
access_type = "wo"

[[objects]]
index = 0x2100
parameter_name = "Scalars"
object_type = "record"
[[objects.subs]]
sub_index = 1
data_type = "int8"
access_type = "rw"
[[objects.subs]]
sub_index = 2
data_type = "int16"
access_type = "rw"
[[objects.subs]]
sub_index = 3
data_type = "int32"
access_type = "rw"
[[objects.subs]]
sub_index = 4
data_type = "int64"
access_type = "rw"
[[objects.subs]]
sub_index = 5
data_type = "uint8"
access_type = "rw"
[[objects.subs]]
sub_index = 6
data_type = "uint16"
access_type = "rw"
[[objects.subs]]
sub_index = 7
data_type = "uint32"
access_type = "rw"
[[objects.subs]]
sub_index = 8
data_type = "uint64"
access_type = "rw"
"#;

/// The node ID of every simulated test device
pub const NODE_ID: u8 = 5;

/// A stack, bridge and script engine wired together
pub struct SimDevice {
    pub stack: Rc<SimStack>,
    pub bridge: Rc<Bridge>,
    pub engine: ScriptEngine,
}

impl SimDevice {
    /// Create a device running `script`, with per-object write callbacks
    pub fn new(script: &str) -> Self {
        Self::with_policy(script, WritePolicy::PerObject)
    }

    /// Create a device running `script`, panicking if the script fails to load
    pub fn with_policy(script: &str, policy: WritePolicy) -> Self {
        Self::try_new(script, policy, &ScriptConfig::default()).expect("Failed to load device script")
    }

    /// Create a device running `script`
    pub fn try_new(script: &str, policy: WritePolicy, config: &ScriptConfig) -> Result<Self, Error> {
        let device_config = DeviceConfig::load_from_str(DEVICE_CONFIG).unwrap();
        let stack = SimStack::new(&device_config, NodeId::new(NODE_ID).unwrap()).unwrap();
        let bridge = Bridge::new(stack.clone(), policy);
        let engine = ScriptEngine::new(bridge.clone(), config)?;
        engine.load_str("device", script)?;
        Ok(Self {
            stack,
            bridge,
            engine,
        })
    }

    /// Initialize the stack, running the script's OnInit
    pub fn init(&self) -> Result<(), Error> {
        self.stack.init()
    }

    /// Let `ms` milliseconds pass on the stack's event loop
    pub fn advance_ms(&self, ms: u64) -> Result<usize, Error> {
        self.stack.event_loop().advance(Duration::from_millis(ms))
    }

    /// Write to an object from the network side
    pub fn external_write(&self, index: u16, sub: u8, data: &[u8]) -> Result<(), Error> {
        self.stack.external_write(ObjectId::new(index, sub), data)
    }

    /// Read an object from the network side
    pub fn external_read(&self, index: u16, sub: u8) -> Vec<u8> {
        self.stack.external_read(ObjectId::new(index, sub)).unwrap()
    }

    /// Read an object as a u32, from the network side
    pub fn external_read_u32(&self, index: u16, sub: u8) -> u32 {
        let data = self.external_read(index, sub);
        u32::from_le_bytes([data[0], data[1], data[2], data[3]])
    }

    /// Get the value of a global variable in the script
    pub fn global<T: mlua::FromLua>(&self, name: &str) -> T {
        self.engine.lua().globals().get::<T>(name).unwrap()
    }

    /// Run a snippet of Lua in the device's interpreter
    pub fn exec(&self, source: &str) -> Result<(), Error> {
        self.engine.load_str("snippet", source)
    }
}
