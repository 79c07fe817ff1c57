//! Node ID type

use core::fmt;

/// The node ID of the simulated device
///
/// Configured IDs lie in 1..=127. The special raw value 255 represents an unconfigured device,
/// which will not produce heartbeat or emergency messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    /// No ID has been assigned
    Unconfigured,
    /// A valid ID in 1..=127
    Configured(ConfiguredId),
}

/// A node ID known to be in the valid range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfiguredId(u8);

impl ConfiguredId {
    /// Validate a raw node ID
    pub fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        if value > 0 && value < 128 {
            Ok(ConfiguredId(value))
        } else {
            Err(InvalidNodeIdError { value })
        }
    }

    /// Get the raw ID
    pub fn raw(&self) -> u8 {
        self.0
    }
}

impl From<ConfiguredId> for u8 {
    fn from(value: ConfiguredId) -> Self {
        value.raw()
    }
}

impl NodeId {
    /// Create a node ID from a raw value, where 255 means unconfigured
    pub fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        if value == 255 {
            Ok(NodeId::Unconfigured)
        } else {
            ConfiguredId::new(value).map(NodeId::Configured)
        }
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u8 {
        match self {
            NodeId::Unconfigured => 255,
            NodeId::Configured(node_id_num) => node_id_num.0,
        }
    }

    /// Returns true if the node has a usable ID
    pub fn is_configured(&self) -> bool {
        matches!(self, NodeId::Configured(_))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Unconfigured => write!(f, "unconfigured"),
            NodeId::Configured(id) => write!(f, "{}", id.0),
        }
    }
}

/// Error returned when a raw node ID is out of range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidNodeIdError {
    /// The rejected value
    pub value: u8,
}

impl fmt::Display for InvalidNodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid node ID {} (allowed: 1-127, or 255)", self.value)
    }
}
impl core::error::Error for InvalidNodeIdError {}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl From<NodeId> for u8 {
    fn from(value: NodeId) -> Self {
        value.raw()
    }
}
