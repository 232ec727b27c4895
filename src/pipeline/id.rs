//! Identity types for the pipeline system.
//!
//! All IDs are newtypes over `u32` that serve as direct array indices
//! into their respective arenas, providing O(1) lookup. Slots are never
//! reused, so a stale ID can be detected rather than silently aliasing a
//! newer object.

use serde::Serialize;
use std::fmt;

/// Index into `Pipeline::nodes`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const INVALID: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "NodeId(INVALID)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into `Pipeline::data`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct DataId(pub u32);

impl DataId {
    pub const INVALID: DataId = DataId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "DataId(INVALID)")
        } else {
            write!(f, "DataId({})", self.0)
        }
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Either kind of pipeline object, used to name owners in diagnostics
/// and event notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectId {
    Node(NodeId),
    Data(DataId),
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Node(id) => fmt::Display::fmt(id, f),
            ObjectId::Data(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl From<NodeId> for ObjectId {
    fn from(id: NodeId) -> Self {
        ObjectId::Node(id)
    }
}

impl From<DataId> for ObjectId {
    fn from(id: DataId) -> Self {
        ObjectId::Data(id)
    }
}
