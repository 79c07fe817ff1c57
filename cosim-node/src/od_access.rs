//! Typed access to single object dictionary cells

use std::rc::Rc;

use cosim_common::{AbortCode, ObjectId, ObjectType, ObjectValue};

use crate::error::StackAccessSnafu;
use crate::stack::CanOpenStack;
use crate::Error;

mod private {
    pub trait Sealed {}
}

/// An integer type which can be stored in an object
///
/// Implemented for the eight fixed width integers; each maps to exactly one [`ObjectType`].
pub trait OdScalar: private::Sealed + Copy + Into<ObjectValue> + TryFrom<i128> {
    /// The object type which stores this rust type
    const OBJECT_TYPE: ObjectType;

    /// Decode from little endian bytes. Returns None if `data` is the wrong length.
    fn from_le_slice(data: &[u8]) -> Option<Self>;

    /// Encode to little endian bytes, writing the first `size_of::<Self>()` bytes of the result
    fn write_le(self, buf: &mut [u8; 8]);
}

macro_rules! impl_od_scalar {
    ($rust_type: ty, $object_type: expr) => {
        impl private::Sealed for $rust_type {}
        impl OdScalar for $rust_type {
            const OBJECT_TYPE: ObjectType = $object_type;

            fn from_le_slice(data: &[u8]) -> Option<Self> {
                data.try_into().ok().map(<$rust_type>::from_le_bytes)
            }

            fn write_le(self, buf: &mut [u8; 8]) {
                let bytes = self.to_le_bytes();
                buf[..bytes.len()].copy_from_slice(&bytes);
            }
        }
    };
}

impl_od_scalar!(i8, ObjectType::Int8);
impl_od_scalar!(i16, ObjectType::Int16);
impl_od_scalar!(i32, ObjectType::Int32);
impl_od_scalar!(i64, ObjectType::Int64);
impl_od_scalar!(u8, ObjectType::UInt8);
impl_od_scalar!(u16, ObjectType::UInt16);
impl_od_scalar!(u32, ObjectType::UInt32);
impl_od_scalar!(u64, ObjectType::UInt64);

/// Typed get/set of object dictionary cells on a stack
///
/// The type of every access is checked against the type stored by the stack; a mismatch is a
/// [`Error::StackAccess`] with [`AbortCode::DataTypeMismatch`], never a truncation.
#[derive(Clone)]
pub struct OdAccess {
    stack: Rc<dyn CanOpenStack>,
}

impl core::fmt::Debug for OdAccess {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OdAccess").finish_non_exhaustive()
    }
}

impl OdAccess {
    /// Create a new accessor for objects on `stack`
    pub fn new(stack: Rc<dyn CanOpenStack>) -> Self {
        Self { stack }
    }

    /// The stack this accessor operates on
    pub fn stack(&self) -> &Rc<dyn CanOpenStack> {
        &self.stack
    }

    fn check_type<T: OdScalar>(&self, id: ObjectId) -> Result<(), Error> {
        let info = self
            .stack
            .sub_info(id)
            .map_err(|abort_code| StackAccessSnafu { id, abort_code }.build())?;
        if info.object_type != T::OBJECT_TYPE {
            return StackAccessSnafu {
                id,
                abort_code: AbortCode::DataTypeMismatch,
            }
            .fail();
        }
        Ok(())
    }

    /// Read the value of a sub object
    pub fn get<T: OdScalar>(&self, id: ObjectId) -> Result<T, Error> {
        self.check_type::<T>(id)?;
        let mut buf = [0u8; 8];
        let buf = &mut buf[..T::OBJECT_TYPE.size()];
        self.stack
            .read(id, buf)
            .map_err(|abort_code| StackAccessSnafu { id, abort_code }.build())?;
        T::from_le_slice(buf).ok_or_else(|| {
            StackAccessSnafu {
                id,
                abort_code: AbortCode::DataTypeMismatch,
            }
            .build()
        })
    }

    /// Write the value of a sub object
    ///
    /// The stack emits a write event for the object before this returns, so write callbacks run
    /// (and may themselves read or write objects) in the middle of this call.
    pub fn set<T: OdScalar>(&self, id: ObjectId, value: T) -> Result<(), Error> {
        self.check_type::<T>(id)?;
        let mut buf = [0u8; 8];
        value.write_le(&mut buf);
        self.stack.write(id, &buf[..T::OBJECT_TYPE.size()])
    }

    /// Write a stack configuration object, without emitting a write event
    pub fn set_config<T: OdScalar>(&self, id: ObjectId, value: T) -> Result<(), Error> {
        self.check_type::<T>(id)?;
        let mut buf = [0u8; 8];
        value.write_le(&mut buf);
        self.stack
            .write_config(id, &buf[..T::OBJECT_TYPE.size()])
            .map_err(|abort_code| StackAccessSnafu { id, abort_code }.build())
    }
}
