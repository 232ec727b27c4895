//! # VisPipe-RS: Demand-Driven Visualization Pipeline
//!
//! A dataflow pipeline core for scientific visualization. Nodes (sources and
//! filters) produce data objects; consumers pull results by asking a data
//! object to update, and only the stale part of the upstream graph executes.
//!
//! ## Architecture
//!
//! - **Object**: Modification clock, reference counts and prioritized observers
//!   shared by every pipeline entity
//! - **Pipeline**: Arena-owned graph of nodes and data objects, plus the
//!   four-phase update protocol (information, extent propagation, trigger,
//!   data)
//! - **Extent translation**: Mapping of piece requests onto structured
//!   extents for streaming and parallel splits
//! - **Bridge**: Crossbeam channels for forwarding events to other threads,
//!   and serializable topology snapshots
//!
//! ## Configuration
//!
//! Pipeline defaults and the demo scenario are read from a TOML file, see
//! [`config::PipelineConfig`].
//!
//! ## Example
//!
//! ```
//! use vispipe_rs::pipeline::{BuiltinNode, Extent, Pipeline};
//! use vispipe_rs::pipeline::nodes::{ImageSource, MeanFilter};
//!
//! let mut pipeline = Pipeline::new();
//! let source = pipeline.add_node(BuiltinNode::ImageSource(ImageSource::new(
//!     Extent::new(0, 15, 0, 15, 0, 0),
//!     2.0,
//! )));
//! let filter = pipeline.add_node(BuiltinNode::MeanFilter(MeanFilter::new(1)));
//! let image = pipeline.output(source, 0)?.expect("source output");
//! pipeline.set_input(filter, 0, Some(image))?;
//!
//! let smoothed = pipeline.output(filter, 0)?.expect("filter output");
//! pipeline.request_piece(smoothed, 0, 4, 0)?;
//! pipeline.update(smoothed)?;
//! assert_eq!(pipeline.data(smoothed)?.extent(), Extent::new(0, 7, 0, 7, 0, 0));
//! # Ok::<(), vispipe_rs::pipeline::PipelineError>(())
//! ```

pub mod config;
pub mod error;
pub mod object;
pub mod pipeline;

// Re-export commonly used types
pub use config::{DemoConfig, PipelineConfig};
pub use error::{Result, VisPipeError};
pub use object::{Clock, EventKind, EventPayload, TimeStamp};
pub use pipeline::{
    Algorithm, BuiltinNode, DataId, DataObject, Extent, ExtentType, NodeId, Pipeline,
    PipelineError,
};
