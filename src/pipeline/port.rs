//! Port descriptors for the node system.
//!
//! Each node declares its ports (inputs/outputs) via static `PortDescriptor`
//! arrays. The pipeline creates one output data object per output port when
//! the node is added, and checks required input ports before executing.

use crate::pipeline::extent::ExtentType;
use serde::Serialize;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Static descriptor for a node's port.
#[derive(Debug, Clone, Serialize)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    /// Extent model of the data flowing through the port.
    pub extent_type: ExtentType,
    /// Inputs only: execution is skipped while this port is unconnected.
    pub required: bool,
}

impl PortDescriptor {
    pub const fn input(name: &'static str, extent_type: ExtentType) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            extent_type,
            required: true,
        }
    }

    pub const fn optional_input(name: &'static str, extent_type: ExtentType) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            extent_type,
            required: false,
        }
    }

    pub const fn output(name: &'static str, extent_type: ExtentType) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
            extent_type,
            required: false,
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }
}

/// Number of leading required input ports.
pub fn required_inputs(ports: &[PortDescriptor]) -> usize {
    ports
        .iter()
        .filter(|p| p.is_input())
        .take_while(|p| p.required)
        .count()
}
