//! Constants defining standard object and special values
//!
//!

/// Object indices for standard objects
pub mod object_ids {
    /// The device type object index
    pub const DEVICE_TYPE: u16 = 0x1000;
    /// The error register object index
    pub const ERROR_REGISTER: u16 = 0x1001;
    /// The heartbeat producer time object index
    pub const HEARTBEAT_PRODUCER_TIME: u16 = 0x1017;
    /// The identity object index
    pub const IDENTITY: u16 = 0x1018;
}

/// Range of indices reserved for application (manufacturer specific) objects
pub const APPLICATION_OBJECTS: core::ops::RangeInclusive<u16> = 0x2000..=0x5FFF;
