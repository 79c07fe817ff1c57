//! Lua binding for device scripts
//!
//! A [`ScriptEngine`] hosts one device script. The script sees the following globals:
//!
//! - `Register(name, index, sub, type)`: bind a name to an object. `type` is a value from the
//!   `ObjectType` table (or its name, e.g. `"UINT32"`).
//! - `objects[name]`, `objects[name] = value`: read and write registered objects
//! - `ObjectCallback(index, sub, fn)`: run `fn()` whenever the object is written
//! - `Emcy(code, register)`: send an emergency
//! - `ConfigureTimer(ms)`: call `OnTick()` every `ms` milliseconds
//! - `ConfigureHeartbeat(ms)`: set the heartbeat producer time
//! - `ObjectType`: table of supported type codes
//!
//! and the engine calls the following functions, if the script defines them: `OnInit()`,
//! `OnSync(count)`, `OnWrite(index, sub)` and `OnTick()`.
//!
//! ```lua
//! Register("Speed", 0x2000, 1, ObjectType.UINT32)
//!
//! function OnInit()
//!     ConfigureTimer(100)
//! end
//!
//! function OnTick()
//!     objects.Speed = objects.Speed + 1
//! end
//! ```

use std::path::Path;
use std::rc::Rc;

use cosim_common::{ObjectId, ObjectType, ObjectValue};
use mlua::{Function, Lua, LuaOptions, MetaMethod, StdLib, Table, UserData, UserDataMethods, Value};
use snafu::ResultExt as _;

use crate::bridge::{Bridge, ScriptHooks};
use crate::error::{InvalidArgumentSnafu, ScriptIoSnafu, UnsupportedObjectTypeSnafu};
use crate::registry::DynValue;
use crate::Error;

/// Environment variable holding extra Lua module search paths
pub const LIB_PATH_ENV: &str = "COSIM_LIB_PATH";

/// Settings for a [`ScriptEngine`]
#[derive(Clone, Debug, Default)]
pub struct ScriptConfig {
    /// Appended to `package.path`, so scripts can `require` shared modules
    ///
    /// This uses the Lua search path syntax, e.g. `/opt/cosim/lib/?.lua`.
    pub lib_path: Option<String>,
}

impl ScriptConfig {
    /// Read the settings from the environment
    pub fn from_env() -> Self {
        Self {
            lib_path: std::env::var(LIB_PATH_ENV).ok(),
        }
    }
}

/// A Lua interpreter bound to one simulated device
pub struct ScriptEngine {
    lua: Lua,
    bridge: Rc<Bridge>,
}

impl core::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

impl ScriptEngine {
    /// Create an interpreter with the device functions installed, and connect it to `bridge`
    pub fn new(bridge: Rc<Bridge>, config: &ScriptConfig) -> Result<Self, Error> {
        let lua = Lua::new_with(
            StdLib::STRING | StdLib::MATH | StdLib::OS | StdLib::TABLE | StdLib::PACKAGE,
            LuaOptions::default(),
        )?;

        if let Some(lib_path) = &config.lib_path {
            append_package_path(&lua, lib_path)?;
        }
        install_object_types(&lua)?;
        install_functions(&lua, &bridge)?;
        lua.globals()
            .set("objects", DeviceObjects(bridge.clone()))?;

        bridge.set_hooks(Rc::new(LuaHooks {
            globals: lua.globals(),
        }));

        Ok(Self { lua, bridge })
    }

    /// Run the script in the file at `path`
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).context(ScriptIoSnafu { path })?;
        log::info!("Loading script {}", path.display());
        self.load_str(&format!("@{}", path.display()), &source)
    }

    /// Run a script chunk, using `name` to identify it in error messages
    pub fn load_str(&self, name: &str, source: &str) -> Result<(), Error> {
        self.lua.load(source).set_name(name).exec()?;
        Ok(())
    }

    /// The interpreter
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// The device the script is bound to
    pub fn bridge(&self) -> &Rc<Bridge> {
        &self.bridge
    }
}

fn append_package_path(lua: &Lua, lib_path: &str) -> Result<(), Error> {
    let package: Table = lua.globals().get("package")?;
    let current: String = package.get("path")?;
    let path = if current.is_empty() {
        lib_path.to_string()
    } else {
        format!("{current};{lib_path}")
    };
    log::debug!("Lua package.path = {path}");
    package.set("path", path)?;
    Ok(())
}

fn install_object_types(lua: &Lua) -> Result<(), Error> {
    let table = lua.create_table()?;
    for object_type in ObjectType::ALL {
        table.set(object_type.name(), object_type as u16)?;
    }
    lua.globals().set("ObjectType", table)?;
    Ok(())
}

/// Narrow an integer argument, failing with a message naming the argument
fn int_arg<T: TryFrom<i64>>(function: &str, arg: &str, value: i64) -> Result<T, Error> {
    T::try_from(value).map_err(|_| {
        InvalidArgumentSnafu {
            message: format!("{function}: {arg} {value} is out of range"),
        }
        .build()
    })
}

fn type_code(value: &Value) -> Result<u16, Error> {
    let object_type = match value {
        Value::Integer(code) => u16::try_from(*code)
            .ok()
            .and_then(|code| ObjectType::try_from(code).ok()),
        Value::String(name) => ObjectType::from_name(&name.to_string_lossy()),
        _ => None,
    };
    match object_type {
        Some(t) => Ok(t as u16),
        None => UnsupportedObjectTypeSnafu {
            object_type: describe(value),
        }
        .fail(),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Integer(i) => format!("0x{i:02X}"),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", s.to_string_lossy()),
        other => other.type_name().to_string(),
    }
}

fn install_functions(lua: &Lua, bridge: &Rc<Bridge>) -> Result<(), Error> {
    let globals = lua.globals();

    let device = bridge.clone();
    let register = lua.create_function(
        move |_, (name, index, sub, object_type): (String, i64, i64, Value)| {
            device.register(
                &name,
                int_arg("Register", "index", index)?,
                int_arg("Register", "subindex", sub)?,
                type_code(&object_type)?,
            )?;
            Ok(())
        },
    )?;
    globals.set("Register", register)?;

    let device = bridge.clone();
    let object_callback =
        lua.create_function(move |_, (index, sub, callback): (i64, i64, Function)| {
            device.object_callback(
                int_arg("ObjectCallback", "index", index)?,
                int_arg("ObjectCallback", "subindex", sub)?,
                Rc::new(move || Ok(callback.call::<()>(())?)),
            );
            Ok(())
        })?;
    globals.set("ObjectCallback", object_callback)?;

    let device = bridge.clone();
    let emcy = lua.create_function(move |_, (code, register): (i64, i64)| {
        device.emcy(
            int_arg("Emcy", "code", code)?,
            int_arg("Emcy", "register", register)?,
        );
        Ok(())
    })?;
    globals.set("Emcy", emcy)?;

    let device = bridge.clone();
    let configure_timer = lua.create_function(move |_, period: i64| {
        device.configure_timer(int_arg("ConfigureTimer", "period", period)?)?;
        Ok(())
    })?;
    globals.set("ConfigureTimer", configure_timer)?;

    let device = bridge.clone();
    let configure_heartbeat = lua.create_function(move |_, period: i64| {
        device.configure_heartbeat(int_arg("ConfigureHeartbeat", "period", period)?)?;
        Ok(())
    })?;
    globals.set("ConfigureHeartbeat", configure_heartbeat)?;

    Ok(())
}

fn to_lua(value: ObjectValue) -> Value {
    // UINT64 values above i64::MAX wrap negative, as Lua's own unsigned integers do
    Value::Integer(value.to_bits())
}

fn from_lua(value: &Value) -> DynValue {
    match value {
        Value::Integer(i) => DynValue::Integer(*i),
        Value::Number(n) => DynValue::Number(*n),
        Value::String(s) => DynValue::Text(s.to_string_lossy().to_string()),
        other => DynValue::Other(other.type_name().to_string()),
    }
}

/// The `objects` global
struct DeviceObjects(Rc<Bridge>);

impl UserData for DeviceObjects {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |_, this, name: String| {
            Ok(to_lua(this.0.read(&name)?))
        });
        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (name, value): (String, Value)| {
                this.0.write(&name, &from_lua(&value))?;
                Ok(())
            },
        );
    }
}

/// Calls the hook functions defined by the script
///
/// Hooks are looked up on every call, so a script may define or replace them at any time.
struct LuaHooks {
    globals: Table,
}

impl LuaHooks {
    fn hook(&self, name: &str) -> Result<Option<Function>, Error> {
        match self.globals.get::<Value>(name)? {
            Value::Nil => Ok(None),
            Value::Function(f) => Ok(Some(f)),
            other => Err(mlua::Error::RuntimeError(format!(
                "{name} must be a function, not {}",
                other.type_name()
            ))
            .into()),
        }
    }
}

impl ScriptHooks for LuaHooks {
    fn on_init(&self) -> Result<(), Error> {
        if let Some(f) = self.hook("OnInit")? {
            f.call::<()>(())?;
        }
        Ok(())
    }

    fn on_sync(&self, count: u8) -> Result<(), Error> {
        if let Some(f) = self.hook("OnSync")? {
            f.call::<()>(count)?;
        }
        Ok(())
    }

    fn on_write(&self, id: ObjectId) -> Result<(), Error> {
        if let Some(f) = self.hook("OnWrite")? {
            f.call::<()>((id.index, id.sub))?;
        }
        Ok(())
    }

    fn on_tick(&self) -> Result<(), Error> {
        if let Some(f) = self.hook("OnTick")? {
            f.call::<()>(())?;
        }
        Ok(())
    }
}
