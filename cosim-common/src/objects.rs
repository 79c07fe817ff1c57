//! Object Definitions
//!

use core::cmp::Ordering;
use core::fmt;

/// A container for the address of a subobject
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId {
    /// Object index
    pub index: u16,
    /// Sub index
    pub sub: u8,
}

impl ObjectId {
    /// Create a new object address
    pub const fn new(index: u16, sub: u8) -> Self {
        Self { index, sub }
    }

    /// The combined key for this address: index in the high bits, sub index in the low bits
    pub const fn key(&self) -> u32 {
        ((self.index as u32) << 16) | self.sub as u32
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}sub{}", self.index, self.sub)
    }
}

impl From<(u16, u8)> for ObjectId {
    fn from((index, sub): (u16, u8)) -> Self {
        Self::new(index, sub)
    }
}

/// The integer types which may be stored in a simulated object
///
/// The discriminant of each variant is the CANopen data type code for that type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum ObjectType {
    Int8 = 0x02,
    Int16 = 0x03,
    Int32 = 0x04,
    UInt8 = 0x05,
    UInt16 = 0x06,
    UInt32 = 0x07,
    Int64 = 0x15,
    UInt64 = 0x1B,
}

impl ObjectType {
    /// All supported types, in the order they are exposed to scripts
    pub const ALL: [ObjectType; 8] = [
        ObjectType::Int8,
        ObjectType::Int16,
        ObjectType::Int32,
        ObjectType::Int64,
        ObjectType::UInt8,
        ObjectType::UInt16,
        ObjectType::UInt32,
        ObjectType::UInt64,
    ];

    /// Storage size in bytes
    pub const fn size(&self) -> usize {
        match self {
            ObjectType::Int8 | ObjectType::UInt8 => 1,
            ObjectType::Int16 | ObjectType::UInt16 => 2,
            ObjectType::Int32 | ObjectType::UInt32 => 4,
            ObjectType::Int64 | ObjectType::UInt64 => 8,
        }
    }

    /// The upper case name used for this type in scripts, e.g. "UINT32"
    pub const fn name(&self) -> &'static str {
        match self {
            ObjectType::Int8 => "INT8",
            ObjectType::Int16 => "INT16",
            ObjectType::Int32 => "INT32",
            ObjectType::Int64 => "INT64",
            ObjectType::UInt8 => "UINT8",
            ObjectType::UInt16 => "UINT16",
            ObjectType::UInt32 => "UINT32",
            ObjectType::UInt64 => "UINT64",
        }
    }

    /// Look up a type by its case-insensitive name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl TryFrom<u16> for ObjectType {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|t| *t as u16 == value)
            .ok_or(())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access type enum
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AccessType {
    /// Read-only
    #[default]
    Ro,
    /// Write-only
    Wo,
    /// Read-write
    Rw,
    /// Read-only, and also will never be changed, even internally by the device
    Const,
}

impl AccessType {
    /// Returns true if an object with this access type can be read
    pub fn is_readable(&self) -> bool {
        matches!(self, AccessType::Ro | AccessType::Rw | AccessType::Const)
    }

    /// Returns true if an object with this access type can be written over the network
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessType::Rw | AccessType::Wo)
    }

    /// Returns true if the device itself may change the value
    ///
    /// Read-only objects are still updated by the application; only const objects are fixed.
    pub fn is_locally_writable(&self) -> bool {
        !matches!(self, AccessType::Const)
    }
}

/// Information about a sub object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubInfo {
    /// The type of data stored in this sub object
    pub object_type: ObjectType,
    /// Indicates what accesses (i.e. read/write) are allowed on this sub object
    pub access_type: AccessType,
}

impl SubInfo {
    /// Convenience function for creating a new read-only sub-info by type
    pub const fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            access_type: AccessType::Ro,
        }
    }

    /// The size of this sub object, in bytes
    pub const fn size(&self) -> usize {
        self.object_type.size()
    }

    /// Convenience function to set the access_type to read-write
    pub const fn rw_access(mut self) -> Self {
        self.access_type = AccessType::Rw;
        self
    }

    /// Convenience function to set the access_type to const
    pub const fn const_access(mut self) -> Self {
        self.access_type = AccessType::Const;
        self
    }

    /// Convenience function to set the access_type to write-only
    pub const fn wo_access(mut self) -> Self {
        self.access_type = AccessType::Wo;
        self
    }
}

/// A value read from, or destined for, an integer object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ObjectValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

impl ObjectValue {
    /// The type of object this value belongs to
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectValue::I8(_) => ObjectType::Int8,
            ObjectValue::I16(_) => ObjectType::Int16,
            ObjectValue::I32(_) => ObjectType::Int32,
            ObjectValue::I64(_) => ObjectType::Int64,
            ObjectValue::U8(_) => ObjectType::UInt8,
            ObjectValue::U16(_) => ObjectType::UInt16,
            ObjectValue::U32(_) => ObjectType::UInt32,
            ObjectValue::U64(_) => ObjectType::UInt64,
        }
    }

    /// Return the value as an i64, if it fits
    ///
    /// Only a `U64` above `i64::MAX` does not fit.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ObjectValue::I8(v) => Some(v.into()),
            ObjectValue::I16(v) => Some(v.into()),
            ObjectValue::I32(v) => Some(v.into()),
            ObjectValue::I64(v) => Some(v),
            ObjectValue::U8(v) => Some(v.into()),
            ObjectValue::U16(v) => Some(v.into()),
            ObjectValue::U32(v) => Some(v.into()),
            ObjectValue::U64(v) => i64::try_from(v).ok(),
        }
    }

    /// Return the 64-bit two's complement pattern of the value
    ///
    /// Every variant except `U64` is sign extended. A `U64` above `i64::MAX` comes out negative,
    /// which is how Lua 5.4 stores unsigned 64-bit integers.
    pub fn to_bits(&self) -> i64 {
        match *self {
            ObjectValue::U64(v) => v as i64,
            _ => self.as_i64().unwrap_or_default(),
        }
    }

    /// Return the value as an i128, which can hold every variant losslessly
    pub fn as_i128(&self) -> i128 {
        match *self {
            ObjectValue::U64(v) => v.into(),
            // All other variants fit in i64
            _ => self.as_i64().unwrap_or_default().into(),
        }
    }
}

impl fmt::Display for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i128())
    }
}

macro_rules! impl_value_from {
    ($rust_type: ty, $variant: ident) => {
        impl From<$rust_type> for ObjectValue {
            fn from(value: $rust_type) -> Self {
                ObjectValue::$variant(value)
            }
        }
    };
}

impl_value_from!(i8, I8);
impl_value_from!(i16, I16);
impl_value_from!(i32, I32);
impl_value_from!(i64, I64);
impl_value_from!(u8, U8);
impl_value_from!(u16, U16);
impl_value_from!(u32, U32);
impl_value_from!(u64, U64);
