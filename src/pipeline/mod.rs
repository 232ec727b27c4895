//! Demand-driven data pipeline.
//!
//! Nodes produce [`DataObject`]s; consumers pull results by asking a data
//! object to update. The request travels upstream, and only stale nodes
//! execute.
//!
//! # Architecture
//!
//! ```text
//! [ImageSource] ──► [MeanFilter] ──► output DataObject ◄── consumer: update()
//!        ▲                ▲
//!        └── metadata ────┘  (UpdateInformation, upstream first)
//!        └── request  ────┘  (PropagateUpdateExtent, may grow by a halo)
//!        └── execute  ────┘  (UpdateData, upstream first)
//! ```
//!
//! # Design
//!
//! - **Arena ownership**: `Pipeline` owns every node and data object;
//!   `NodeId` / `DataId` index the arenas.
//! - **Enum dispatch for built-ins**: `BuiltinNode` covers the bundled
//!   nodes, `Algorithm` trait objects cover everything else.
//! - **Explicit clock**: every timestamp comes from one shared `Clock`.

pub mod bridge;
pub mod data_object;
pub mod error;
pub mod executor;
pub mod extent;
pub mod extent_translator;
pub mod field_data;
pub mod id;
pub mod node;
pub mod nodes;
pub mod port;

pub use bridge::{channel_observer, PipelineNotification, TopologySnapshot};
pub use data_object::DataObject;
pub use error::{ExecutionOutcome, PipelineError, PipelineResult, SkipReason};
pub use executor::Pipeline;
pub use extent::{Extent, ExtentType, UpdateRequest};
pub use extent_translator::{ExtentTranslator, SplitMode, TableExtentTranslator};
pub use field_data::{DataArray, FieldData};
pub use id::{DataId, NodeId, ObjectId};
pub use node::{
    AbortHandle, Algorithm, AnyNode, BuiltinNode, ExecuteContext, InformationContext, Inputs,
    PipelineNode, RequestContext,
};
pub use port::{PortDescriptor, PortDirection};
