//! Generic fields which implement a sub-object

use core::cell::Cell;

use cosim_common::{AbortCode, ObjectType};

/// Allow transparent byte level access to a sub object
pub trait SubObjectAccess {
    /// Read the full value of the sub object into `buf`
    ///
    /// # Errors
    ///
    /// - [`AbortCode::DataTypeMismatchLengthHigh`] if `buf` is longer than the object
    /// - [`AbortCode::DataTypeMismatchLengthLow`] if `buf` is shorter than the object
    fn read(&self, buf: &mut [u8]) -> Result<usize, AbortCode>;

    /// Return the amount of data which can be read
    fn read_size(&self) -> usize;

    /// Write data to the sub object
    ///
    /// The length of data must match the size of the object exactly.
    ///
    /// # Errors
    ///
    /// - [`AbortCode::DataTypeMismatchLengthHigh`] if `data.len()` exceeds the object size
    /// - [`AbortCode::DataTypeMismatchLengthLow`] if `data.len()` is smaller than the object size
    fn write(&self, data: &[u8]) -> Result<(), AbortCode>;
}

fn length_error(actual: usize, expected: usize) -> AbortCode {
    if actual < expected {
        AbortCode::DataTypeMismatchLengthLow
    } else {
        AbortCode::DataTypeMismatchLengthHigh
    }
}

/// A sub object which contains a single scalar value of type T, which is a standard rust type
#[derive(Debug, Default)]
pub struct ScalarField<T: Copy> {
    value: Cell<T>,
}

impl<T: Copy> ScalarField<T> {
    /// Create a new ScalarField with the given value
    pub const fn new(value: T) -> Self {
        Self {
            value: Cell::new(value),
        }
    }

    /// Read the value of the field
    pub fn load(&self) -> T {
        self.value.get()
    }

    /// Store a new value into the field
    pub fn store(&self, value: T) {
        self.value.set(value);
    }
}

macro_rules! impl_scalar_field {
    ($rust_type: ty) => {
        impl SubObjectAccess for ScalarField<$rust_type> {
            fn read(&self, buf: &mut [u8]) -> Result<usize, AbortCode> {
                let bytes = self.value.get().to_le_bytes();
                if buf.len() != bytes.len() {
                    return Err(length_error(buf.len(), bytes.len()));
                }
                buf.copy_from_slice(&bytes);
                Ok(bytes.len())
            }

            fn read_size(&self) -> usize {
                core::mem::size_of::<$rust_type>()
            }

            fn write(&self, data: &[u8]) -> Result<(), AbortCode> {
                let value = <$rust_type>::from_le_bytes(
                    data.try_into()
                        .map_err(|_| length_error(data.len(), core::mem::size_of::<$rust_type>()))?,
                );
                self.value.set(value);
                Ok(())
            }
        }
    };
}

impl_scalar_field!(u8);
impl_scalar_field!(u16);
impl_scalar_field!(u32);
impl_scalar_field!(u64);
impl_scalar_field!(i8);
impl_scalar_field!(i16);
impl_scalar_field!(i32);
impl_scalar_field!(i64);

/// Create storage for a sub object of the given type, holding `initial`
///
/// Returns None if `initial` does not fit in the type.
pub fn new_scalar_field(object_type: ObjectType, initial: i64) -> Option<Box<dyn SubObjectAccess>> {
    fn boxed<T>(initial: i64) -> Option<Box<dyn SubObjectAccess>>
    where
        T: Copy + TryFrom<i64> + 'static,
        ScalarField<T>: SubObjectAccess,
    {
        let value = T::try_from(initial).ok()?;
        Some(Box::new(ScalarField::new(value)))
    }

    match object_type {
        ObjectType::Int8 => boxed::<i8>(initial),
        ObjectType::Int16 => boxed::<i16>(initial),
        ObjectType::Int32 => boxed::<i32>(initial),
        ObjectType::Int64 => boxed::<i64>(initial),
        ObjectType::UInt8 => boxed::<u8>(initial),
        ObjectType::UInt16 => boxed::<u16>(initial),
        ObjectType::UInt32 => boxed::<u32>(initial),
        ObjectType::UInt64 => boxed::<u64>(initial),
    }
}
