//! Name based access to object dictionary cells
//!
//! Scripts address objects by a name chosen at registration time. Each registration builds a
//! getter and setter pair specialized for the object's type, so that later reads and writes
//! marshal with exactly the width and signedness of the underlying cell.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use cosim_common::{ObjectId, ObjectType, ObjectValue};
use snafu::OptionExt as _;

use crate::error::{NameNotFoundSnafu, TypeConversionSnafu};
use crate::od_access::{OdAccess, OdScalar};
use crate::Error;

/// A value received from a script, before conversion to an object type
#[derive(Clone, Debug, PartialEq)]
pub enum DynValue {
    /// An integer
    Integer(i64),
    /// A floating point number
    Number(f64),
    /// A string
    Text(String),
    /// Any other value, described by its type name
    Other(String),
}

impl fmt::Display for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynValue::Integer(i) => write!(f, "{i}"),
            DynValue::Number(n) => write!(f, "{n}"),
            DynValue::Text(s) => write!(f, "\"{s}\""),
            DynValue::Other(type_name) => write!(f, "a value of type {type_name}"),
        }
    }
}

impl From<i64> for DynValue {
    fn from(value: i64) -> Self {
        DynValue::Integer(value)
    }
}

impl From<f64> for DynValue {
    fn from(value: f64) -> Self {
        DynValue::Number(value)
    }
}

impl From<&str> for DynValue {
    fn from(value: &str) -> Self {
        DynValue::Text(value.to_string())
    }
}

fn number_to_int(n: f64) -> Option<i128> {
    // i128 covers the range of every supported type, so anything outside it is out of range anyway
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e38 {
        Some(n as i128)
    } else {
        None
    }
}

fn parse_int(text: &str) -> Option<i128> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    // At most one sign
    if !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        i128::from_str_radix(hex, 16).ok()?
    } else if let Ok(value) = digits.parse::<i128>() {
        value
    } else {
        number_to_int(digits.parse::<f64>().ok()?)?
    };
    Some(if negative { -magnitude } else { magnitude })
}

impl DynValue {
    /// Convert to the integer type `T`
    ///
    /// Fails with [`Error::TypeConversion`] unless the value is an integer in range of `T`, a
    /// float with an integral value in range, or a string which parses as one of those.
    ///
    /// For UINT64 a negative integer is taken as the two's complement pattern of a value above
    /// `i64::MAX`, matching how Lua 5.4 holds unsigned 64-bit integers.
    pub fn coerce<T: OdScalar>(&self) -> Result<T, Error> {
        let wide = match self {
            DynValue::Integer(i) if T::OBJECT_TYPE == ObjectType::UInt64 => Some(*i as u64 as i128),
            DynValue::Integer(i) => Some(*i as i128),
            DynValue::Number(n) => number_to_int(*n),
            DynValue::Text(s) => parse_int(s),
            DynValue::Other(_) => None,
        };
        wide.and_then(|v| T::try_from(v).ok())
            .with_context(|| TypeConversionSnafu {
                value: self.to_string(),
                target: T::OBJECT_TYPE,
            })
    }
}

/// Reads a bound object
pub type Getter = Rc<dyn Fn(&OdAccess) -> Result<ObjectValue, Error>>;
/// Converts and writes a value to a bound object
pub type Setter = Rc<dyn Fn(&OdAccess, &DynValue) -> Result<(), Error>>;

fn make_getter<T: OdScalar + 'static>(id: ObjectId) -> Getter {
    Rc::new(move |od: &OdAccess| od.get::<T>(id).map(Into::into))
}

fn make_setter<T: OdScalar + 'static>(id: ObjectId) -> Setter {
    Rc::new(move |od: &OdAccess, value: &DynValue| od.set::<T>(id, value.coerce::<T>()?))
}

/// A name bound to an object, with accessors specialized for its type
#[derive(Clone)]
pub struct NamedObject {
    /// The bound object
    pub id: ObjectId,
    /// The type of the bound object
    pub object_type: ObjectType,
    getter: Getter,
    setter: Setter,
}

impl fmt::Debug for NamedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedObject")
            .field("id", &self.id)
            .field("object_type", &self.object_type)
            .finish_non_exhaustive()
    }
}

impl NamedObject {
    /// Create a binding to the object at `id` holding `object_type`
    pub fn new(id: ObjectId, object_type: ObjectType) -> Self {
        let (getter, setter) = match object_type {
            ObjectType::Int8 => (make_getter::<i8>(id), make_setter::<i8>(id)),
            ObjectType::Int16 => (make_getter::<i16>(id), make_setter::<i16>(id)),
            ObjectType::Int32 => (make_getter::<i32>(id), make_setter::<i32>(id)),
            ObjectType::Int64 => (make_getter::<i64>(id), make_setter::<i64>(id)),
            ObjectType::UInt8 => (make_getter::<u8>(id), make_setter::<u8>(id)),
            ObjectType::UInt16 => (make_getter::<u16>(id), make_setter::<u16>(id)),
            ObjectType::UInt32 => (make_getter::<u32>(id), make_setter::<u32>(id)),
            ObjectType::UInt64 => (make_getter::<u64>(id), make_setter::<u64>(id)),
        };
        Self {
            id,
            object_type,
            getter,
            setter,
        }
    }
}

/// Maps script visible names to objects
#[derive(Debug)]
pub struct AccessorRegistry {
    od: OdAccess,
    objects: RefCell<HashMap<String, NamedObject>>,
}

impl AccessorRegistry {
    /// Create an empty registry accessing objects through `od`
    pub fn new(od: OdAccess) -> Self {
        Self {
            od,
            objects: RefCell::new(HashMap::new()),
        }
    }

    /// Bind `name` to the object at `id`, replacing any previous binding of the name
    ///
    /// The object is not accessed until the name is first read or written.
    pub fn register(&self, name: &str, id: ObjectId, object_type: ObjectType) {
        let previous = self
            .objects
            .borrow_mut()
            .insert(name.to_string(), NamedObject::new(id, object_type));
        match previous {
            Some(prev) => log::debug!(
                "Rebinding '{name}' from {} ({}) to {id} ({object_type})",
                prev.id,
                prev.object_type
            ),
            None => log::debug!("Registered '{name}' at {id} ({object_type})"),
        }
    }

    fn lookup(&self, name: &str) -> Result<NamedObject, Error> {
        // Clone the binding out, so that no borrow is held while the stack runs write callbacks
        self.objects
            .borrow()
            .get(name)
            .cloned()
            .context(NameNotFoundSnafu { name })
    }

    /// Read the current value of a named object
    pub fn read(&self, name: &str) -> Result<ObjectValue, Error> {
        let obj = self.lookup(name)?;
        (obj.getter)(&self.od)
    }

    /// Convert `value` to the type of a named object and write it
    pub fn write(&self, name: &str, value: &DynValue) -> Result<(), Error> {
        let obj = self.lookup(name)?;
        (obj.setter)(&self.od, value)
    }

    /// Check whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.objects.borrow().contains_key(name)
    }

    /// Get the object and type a name is bound to
    pub fn binding(&self, name: &str) -> Option<(ObjectId, ObjectType)> {
        self.objects
            .borrow()
            .get(name)
            .map(|obj| (obj.id, obj.object_type))
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}
