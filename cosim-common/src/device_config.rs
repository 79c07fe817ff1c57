//! Device config file
//!
//! A DeviceConfig is created from a TOML file, and describes the object dictionary of the
//! simulated device: a handful of standard communication objects, plus the application specific
//! objects which the device script will register and manipulate.
//!
//! # An example TOML file
//!
//! ```toml
//! device_name = "motor-controller"
//! heartbeat_period = 1000
//!
//! [identity]
//! vendor_id = 0xCAFE
//! product_code = 1032
//! revision_number = 1
//!
//! # A single value, stored at sub index 0
//! [[objects]]
//! index = 0x4000
//! parameter_name = "Counter"
//! object_type = "var"
//! data_type = "uint32"
//! access_type = "rw"
//!
//! # A record with heterogenous sub objects. Sub index 0 is created automatically and holds the
//! # highest sub index.
//! [[objects]]
//! index = 0x2000
//! parameter_name = "Drive"
//! object_type = "record"
//! [[objects.subs]]
//! sub_index = 1
//! parameter_name = "Speed"
//! data_type = "uint32"
//! access_type = "rw"
//! [[objects.subs]]
//! sub_index = 2
//! parameter_name = "Torque"
//! data_type = "int16"
//! access_type = "rw"
//! default_value = -5
//! ```
//!
//! Only the integer types INT8 through UINT64 are supported.
//!
//! # Standard Objects
//!
//! ## 0x1000 - Device Type
//!
//! A const U32 VAR, set by [DeviceConfig::device_type].
//!
//! ## 0x1001 - Error Register
//!
//! A read-only U8 VAR. The simulated stack stores the register of the most recent emergency here.
//!
//! ## 0x1017 - Heartbeat Producer Time
//!
//! A read-write U16 VAR storing the heartbeat period in milliseconds. Initialized from
//! [DeviceConfig::heartbeat_period], and changed at run-time by the `ConfigureHeartbeat` script
//! function.
//!
//! ## 0x1018 - Identity
//!
//! | Sub Object | Type | Description |
//! | ---------- | ---- | ----------- |
//! | 0          | u8   | Max sub index - always 4 |
//! | 1          | u32  | Vendor ID    |
//! | 2          | u32  | Product Code |
//! | 3          | u32  | Revision |
//! | 4          | u32  | Serial |
//!
use std::collections::HashMap;

use crate::constants::{object_ids, APPLICATION_OBJECTS};
use crate::objects::{AccessType, ObjectId, ObjectType, SubInfo};
use serde::{de::Error, Deserialize};

use snafu::ResultExt as _;
use snafu::Snafu;

/// Error returned when loading a device config fails
#[derive(Debug, Snafu)]
pub enum LoadError {
    /// An IO error occured while reading the file
    #[snafu(display("IO error: {source}"))]
    Io {
        /// The underlying IO error
        source: std::io::Error,
    },
    /// An error occured in the TOML parser
    #[snafu(display("Toml parse error: {source}"))]
    TomlParsing {
        /// The toml error which led to this error
        source: toml::de::Error,
    },
    /// Multiple objects defined with same index
    #[snafu(display("Multiple definitions for object with index 0x{id:x}"))]
    DuplicateObjectIds {
        /// index which was defined multiple times
        id: u16,
    },
    /// Duplicate sub objects defined on a record
    #[snafu(display("Multiple definitions of sub index {sub} on object 0x{index:x}"))]
    DuplicateSubObjects {
        /// Index of the record object containing duplicate subs
        index: u16,
        /// Duplicated sub index
        sub: u8,
    },
    /// A default value does not fit in the data type of its object
    #[snafu(display("Default value {value} does not fit {object_type} on object {id}"))]
    DefaultValueOutOfRange {
        /// The sub object with the bad default
        id: ObjectId,
        /// The declared type
        object_type: ObjectType,
        /// The rejected default
        value: i64,
    },
}

/// The device identity is a unique 128-bit number used for addressing the device on the bus
///
/// The serial number is always 0 on a simulated device.
#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// The 32-bit vendor ID for this device
    pub vendor_id: u32,
    /// The 32-bit product code for this device
    pub product_code: u32,
    /// The 32-bit revision number for this device
    pub revision_number: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
/// Device configuration structure
pub struct DeviceConfig {
    /// The name describing the type of device (e.g. a model)
    pub device_name: String,

    /// The value of the device type object
    #[serde(default)]
    pub device_type: u32,

    /// The initial period at which to transmit heartbeat messages in milliseconds
    #[serde(default)]
    pub heartbeat_period: u16,

    /// Configures the identity object on the device
    #[serde(default)]
    pub identity: IdentityConfig,

    /// A list of application specific objects to define on the device
    #[serde(default)]
    pub objects: Vec<ObjectDefinition>,
}

/// Defines a sub-object in a record
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct SubDefinition {
    /// Sub index for the sub-object being defined
    pub sub_index: u8,
    /// A human readable name for the value stored in this sub-object
    #[serde(default)]
    pub parameter_name: String,
    /// The data type of the sub object
    pub data_type: DataTypeDeser,
    /// Access permissions for the sub object
    #[serde(default)]
    pub access_type: AccessTypeDeser,
    /// The default value for the sub object
    #[serde(default)]
    pub default_value: Option<i64>,
}

/// An enum representing the different types of objects which can be defined in a device config
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "object_type", rename_all = "lowercase")]
pub enum Object {
    /// A var object is just a single value
    Var(VarDefinition),
    /// A record is a collection of sub objects all with different types
    Record(RecordDefinition),
}

/// Descriptor for a var object
#[derive(Default, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct VarDefinition {
    /// Indicates the type of data stored in the object
    pub data_type: DataTypeDeser,
    /// Indicates how this object can be accessed
    #[serde(default)]
    pub access_type: AccessTypeDeser,
    /// The default value for this object
    #[serde(default)]
    pub default_value: Option<i64>,
}

/// Descriptor for a record object
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RecordDefinition {
    /// The sub object definitions for this record object
    #[serde(default)]
    pub subs: Vec<SubDefinition>,
}

/// Descriptor for an object in the object dictionary
#[derive(Deserialize, Debug, Clone)]
pub struct ObjectDefinition {
    /// The index of the object
    pub index: u16,
    /// A human readable name to describe the contents of the object
    #[serde(default)]
    pub parameter_name: String,
    /// The descriptor for the object
    #[serde(flatten)]
    pub object: Object,
}

/// A single sub object, flattened out of the object definitions
#[derive(Debug, Clone, PartialEq)]
pub struct CellDefinition {
    /// Address of the sub object
    pub id: ObjectId,
    /// Human readable name
    pub name: String,
    /// Type and access of the sub object
    pub info: SubInfo,
    /// Initial value
    pub default_value: i64,
}

fn var(index: u16, name: &str, data_type: ObjectType, access: AccessType, default: i64) -> ObjectDefinition {
    ObjectDefinition {
        index,
        parameter_name: name.to_string(),
        object: Object::Var(VarDefinition {
            data_type: DataTypeDeser(data_type),
            access_type: AccessTypeDeser(access),
            default_value: Some(default),
        }),
    }
}

fn mandatory_objects(config: &DeviceConfig) -> Vec<ObjectDefinition> {
    let identity_sub = |sub_index: u8, name: &str, value: u32| SubDefinition {
        sub_index,
        parameter_name: name.to_string(),
        data_type: DataTypeDeser(ObjectType::UInt32),
        access_type: AccessTypeDeser(AccessType::Ro),
        default_value: Some(value as i64),
    };

    vec![
        var(
            object_ids::DEVICE_TYPE,
            "Device Type",
            ObjectType::UInt32,
            AccessType::Const,
            config.device_type as i64,
        ),
        var(
            object_ids::ERROR_REGISTER,
            "Error Register",
            ObjectType::UInt8,
            AccessType::Ro,
            0,
        ),
        var(
            object_ids::HEARTBEAT_PRODUCER_TIME,
            "Heartbeat Producer Time (ms)",
            ObjectType::UInt16,
            AccessType::Rw,
            config.heartbeat_period as i64,
        ),
        ObjectDefinition {
            index: object_ids::IDENTITY,
            parameter_name: "Identity".to_string(),
            object: Object::Record(RecordDefinition {
                subs: vec![
                    identity_sub(1, "Vendor ID", config.identity.vendor_id),
                    identity_sub(2, "Product Code", config.identity.product_code),
                    identity_sub(3, "Revision Number", config.identity.revision_number),
                    identity_sub(4, "Serial Number", 0),
                ],
            }),
        },
    ]
}

fn fits(object_type: ObjectType, value: i64) -> bool {
    match object_type {
        ObjectType::Int8 => i8::try_from(value).is_ok(),
        ObjectType::Int16 => i16::try_from(value).is_ok(),
        ObjectType::Int32 => i32::try_from(value).is_ok(),
        ObjectType::Int64 => true,
        ObjectType::UInt8 => u8::try_from(value).is_ok(),
        ObjectType::UInt16 => u16::try_from(value).is_ok(),
        ObjectType::UInt32 => u32::try_from(value).is_ok(),
        ObjectType::UInt64 => value >= 0,
    }
}

impl DeviceConfig {
    /// Try to read a device config from a file
    pub fn load(config_path: impl AsRef<std::path::Path>) -> Result<Self, LoadError> {
        let config_str = std::fs::read_to_string(&config_path).context(IoSnafu)?;
        Self::load_from_str(&config_str)
    }

    /// Try to read a config from a &str
    pub fn load_from_str(config_str: &str) -> Result<Self, LoadError> {
        let mut config: DeviceConfig = toml::from_str(config_str).context(TomlParsingSnafu)?;

        for obj in &config.objects {
            if !APPLICATION_OBJECTS.contains(&obj.index) {
                log::warn!(
                    "Object 0x{:04X} ({}) is outside the manufacturer specific range",
                    obj.index,
                    obj.parameter_name
                );
            }
        }

        // Add mandatory objects to the config
        config.objects.extend(mandatory_objects(&config));

        Self::validate_unique_indices(&config.objects)?;
        // Flattening checks the default values
        config.cells()?;

        Ok(config)
    }

    /// Flatten all objects into their sub objects, sorted by address
    ///
    /// Records get an implicit const U8 sub 0 holding the highest sub index, unless the config
    /// defines sub 0 explicitly.
    pub fn cells(&self) -> Result<Vec<CellDefinition>, LoadError> {
        let mut cells = Vec::new();
        let mut push = |id: ObjectId, name: &str, data_type: ObjectType, access: AccessType, default: Option<i64>| {
            let value = default.unwrap_or(0);
            if !fits(data_type, value) {
                return DefaultValueOutOfRangeSnafu {
                    id,
                    object_type: data_type,
                    value,
                }
                .fail();
            }
            cells.push(CellDefinition {
                id,
                name: name.to_string(),
                info: SubInfo {
                    object_type: data_type,
                    access_type: access,
                },
                default_value: value,
            });
            Ok(())
        };

        for obj in &self.objects {
            match &obj.object {
                Object::Var(def) => push(
                    ObjectId::new(obj.index, 0),
                    &obj.parameter_name,
                    def.data_type.0,
                    def.access_type.0,
                    def.default_value,
                )?,
                Object::Record(def) => {
                    if !def.subs.iter().any(|s| s.sub_index == 0) {
                        let max_sub = def.subs.iter().map(|s| s.sub_index).max().unwrap_or(0);
                        push(
                            ObjectId::new(obj.index, 0),
                            "Highest sub-index supported",
                            ObjectType::UInt8,
                            AccessType::Const,
                            Some(max_sub as i64),
                        )?;
                    }
                    for sub in &def.subs {
                        push(
                            ObjectId::new(obj.index, sub.sub_index),
                            &sub.parameter_name,
                            sub.data_type.0,
                            sub.access_type.0,
                            sub.default_value,
                        )?;
                    }
                }
            }
        }

        cells.sort_by_key(|c| c.id);
        Ok(cells)
    }

    fn validate_unique_indices(objects: &[ObjectDefinition]) -> Result<(), LoadError> {
        let mut found_indices = HashMap::new();
        for obj in objects {
            if found_indices.contains_key(&obj.index) {
                return DuplicateObjectIdsSnafu { id: obj.index }.fail();
            }
            found_indices.insert(&obj.index, ());

            if let Object::Record(record) = &obj.object {
                let mut found_subs = HashMap::new();
                for sub in &record.subs {
                    if found_subs.contains_key(&sub.sub_index) {
                        return DuplicateSubObjectsSnafu {
                            index: obj.index,
                            sub: sub.sub_index,
                        }
                        .fail();
                    }
                    found_subs.insert(&sub.sub_index, ());
                }
            }
        }

        Ok(())
    }
}

/// A newtype on AccessType to implement deserialization
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessTypeDeser(pub AccessType);
impl<'de> serde::Deserialize<'de> for AccessTypeDeser {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "ro" => Ok(AccessTypeDeser(AccessType::Ro)),
            "rw" => Ok(AccessTypeDeser(AccessType::Rw)),
            "wo" => Ok(AccessTypeDeser(AccessType::Wo)),
            "const" => Ok(AccessTypeDeser(AccessType::Const)),
            _ => Err(D::Error::custom(format!(
                "Invalid access type: {} (allowed: 'ro', 'rw', 'wo', or 'const')",
                s
            ))),
        }
    }
}
impl From<AccessType> for AccessTypeDeser {
    fn from(access_type: AccessType) -> Self {
        AccessTypeDeser(access_type)
    }
}

/// A newtype on ObjectType to implement deserialization from names like "uint32"
#[derive(Clone, Copy, Debug)]
pub struct DataTypeDeser(pub ObjectType);

impl Default for DataTypeDeser {
    fn default() -> Self {
        DataTypeDeser(ObjectType::UInt8)
    }
}

impl<'de> serde::Deserialize<'de> for DataTypeDeser {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectType::from_name(&s).map(DataTypeDeser).ok_or_else(|| {
            D::Error::custom(format!(
                "Invalid data type: {} (allowed: int8-int64, uint8-uint64)",
                s
            ))
        })
    }
}
