//! Traits and types for implementing objects in the OD

use std::collections::BTreeMap;

use cosim_common::{
    device_config::{CellDefinition, LoadError},
    objects::SubInfo,
    AbortCode,
};

use super::{new_scalar_field, SubObjectAccess};

/// A trait for accessing objects
///
/// Any struct which implements an object in the object dictionary must implement this trait
pub trait ObjectAccess {
    /// Read the raw bytes of a sub object
    ///
    /// Fails with [`AbortCode::WriteOnly`] if the sub object cannot be read, and
    /// [`AbortCode::NoSuchSubIndex`] if it does not exist.
    fn read(&self, sub: u8, buf: &mut [u8]) -> Result<usize, AbortCode>;

    /// Write raw bytes to a sub object
    ///
    /// The length of `data` must match the size of the object, or else it will fail with either
    /// [`AbortCode::DataTypeMismatchLengthLow`] or [`AbortCode::DataTypeMismatchLengthHigh`].
    ///
    /// Access permissions are not checked here, because they depend on who is writing: the owner
    /// of the dictionary decides whether a write is allowed before calling this.
    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode>;

    /// Get metadata about a sub object
    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode>;

    /// Get the highest sub index available in this object
    fn max_sub_number(&self) -> u8;

    /// Read a sub object as a u16
    fn read_u16(&self, sub: u8) -> Result<u16, AbortCode> {
        let mut buf = [0; 2];
        self.read(sub, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Read a sub object as a u8
    fn read_u8(&self, sub: u8) -> Result<u8, AbortCode> {
        let mut buf = [0; 1];
        self.read(sub, &mut buf)?;
        Ok(buf[0])
    }
}

/// A trait for structs which represent Objects to implement
///
/// Implementing this type allows a type whose sub objects implement [`SubObjectAccess`] to
/// implement [`ObjectAccess`] simply by providing a sub object for each sub index.
pub trait ProvidesSubObjects {
    /// Get a sub object
    ///
    /// It should return None if the sub object does not exist, and when it does exist it returns a
    /// tuple containing a [`SubInfo`] with metadata about the sub object, and [`dyn
    /// SubObjectAccess`] which provides read/write access to the sub object data.
    fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)>;

    /// The highest sub index which exists on this object
    fn max_sub_number(&self) -> u8;
}

// Implement ObjectAccess for any type that implements ProvidesSubObjects
impl<T: ProvidesSubObjects> ObjectAccess for T {
    fn read(&self, sub: u8, buf: &mut [u8]) -> Result<usize, AbortCode> {
        if let Some((info, access)) = self.get_sub_object(sub) {
            if info.access_type.is_readable() {
                access.read(buf)
            } else {
                Err(AbortCode::WriteOnly)
            }
        } else {
            Err(AbortCode::NoSuchSubIndex)
        }
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        if let Some((_info, access)) = self.get_sub_object(sub) {
            access.write(data)
        } else {
            Err(AbortCode::NoSuchSubIndex)
        }
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        if let Some((info, _access)) = self.get_sub_object(sub) {
            Ok(info)
        } else {
            Err(AbortCode::NoSuchSubIndex)
        }
    }

    fn max_sub_number(&self) -> u8 {
        ProvidesSubObjects::max_sub_number(self)
    }
}

/// An object whose sub objects are allocated at run-time from a device config
#[derive(Default)]
#[allow(missing_debug_implementations)]
pub struct DynamicObject {
    subs: BTreeMap<u8, (SubInfo, Box<dyn SubObjectAccess>)>,
}

impl DynamicObject {
    /// Add (or replace) a sub object
    pub fn insert(&mut self, sub: u8, info: SubInfo, field: Box<dyn SubObjectAccess>) {
        self.subs.insert(sub, (info, field));
    }
}

impl ProvidesSubObjects for DynamicObject {
    fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
        self.subs
            .get(&sub)
            .map(|(info, field)| (*info, field.as_ref()))
    }

    fn max_sub_number(&self) -> u8 {
        self.subs.keys().next_back().copied().unwrap_or(0)
    }
}

/// Represents one item in the in-memory table of objects
#[allow(missing_debug_implementations)]
pub struct ODEntry {
    /// The object index
    pub index: u16,
    /// The object implementation
    pub data: Box<dyn ObjectAccess>,
}

/// Lookup an object from the Object dictionary table
///
/// Note: `table` must be sorted by index
pub fn find_object(table: &[ODEntry], index: u16) -> Option<&dyn ObjectAccess> {
    table
        .binary_search_by_key(&index, |e| e.index)
        .ok()
        .map(|i| table[i].data.as_ref())
}

/// Allocate an object dictionary table holding the given cells
///
/// The returned table is sorted by index, ready for use with [`find_object`].
pub fn build_object_dict(cells: &[CellDefinition]) -> Result<Vec<ODEntry>, LoadError> {
    let mut objects: BTreeMap<u16, DynamicObject> = BTreeMap::new();
    for cell in cells {
        let field = new_scalar_field(cell.info.object_type, cell.default_value).ok_or(
            LoadError::DefaultValueOutOfRange {
                id: cell.id,
                object_type: cell.info.object_type,
                value: cell.default_value,
            },
        )?;
        objects
            .entry(cell.id.index)
            .or_default()
            .insert(cell.id.sub, cell.info, field);
    }

    Ok(objects
        .into_iter()
        .map(|(index, obj)| ODEntry {
            index,
            data: Box::new(obj),
        })
        .collect())
}
