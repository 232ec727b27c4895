//! Boundary between the pipeline and whoever presents its results.
//!
//! Two things cross it:
//! - [`PipelineNotification`]s, forwarded from object observers into a
//!   `crossbeam` channel by [`channel_observer`], so another thread can react
//!   (e.g. repaint) when a result changes;
//! - [`TopologySnapshot`]s, a serializable picture of the graph for display
//!   or debugging.

use crate::object::{Event, EventKind, EventPayload, ObserverTag};
use crate::pipeline::error::ExecutionOutcome;
use crate::pipeline::executor::Pipeline;
use crate::pipeline::extent::{Extent, ExtentType};
use crate::pipeline::id::{DataId, NodeId, ObjectId};
use crate::pipeline::port::PortDescriptor;
use crate::pipeline::PipelineResult;
use crossbeam_channel::Sender;
use serde::Serialize;

/// Event forwarded out of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineNotification {
    pub source: ObjectId,
    pub kind: EventKind,
    pub payload: EventPayload,
}

/// Build an observer callback that forwards every event it receives to
/// `sender`, tagged with `source`. Events are dropped once the receiver is
/// gone.
pub fn channel_observer(
    source: ObjectId,
    sender: Sender<PipelineNotification>,
) -> impl FnMut(&Event<'_>) + 'static {
    move |event| {
        let notification = PipelineNotification {
            source,
            kind: event.kind(),
            payload: event.payload().clone(),
        };
        if sender.send(notification).is_err() {
            tracing::trace!("Notification receiver for {} disconnected", source);
        }
    }
}

/// Forward `kind` events of `node` into `sender`.
pub fn watch_node(
    pipeline: &Pipeline,
    node: NodeId,
    kind: EventKind,
    sender: Sender<PipelineNotification>,
) -> PipelineResult<ObserverTag> {
    let base = pipeline.node(node)?.base();
    Ok(base.add_observer(kind, 0.0, channel_observer(node.into(), sender)))
}

/// Forward `kind` events of `data` into `sender`.
pub fn watch_data(
    pipeline: &Pipeline,
    data: DataId,
    kind: EventKind,
    sender: Sender<PipelineNotification>,
) -> PipelineResult<ObserverTag> {
    let base = pipeline.data(data)?.base();
    Ok(base.add_observer(kind, 0.0, channel_observer(data.into(), sender)))
}

/// Snapshot of a single pipeline node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub ports: Vec<PortDescriptor>,
    pub inputs: Vec<Option<DataId>>,
    pub outputs: Vec<Option<DataId>>,
    pub mtime: u64,
    pub reference_count: u32,
    pub execute_count: u64,
    pub last_outcome: ExecutionOutcome,
}

/// Snapshot of a single data object.
#[derive(Debug, Clone, Serialize)]
pub struct DataSnapshot {
    pub id: DataId,
    pub extent_type: ExtentType,
    pub source: Option<NodeId>,
    pub consumers: Vec<NodeId>,
    pub whole_extent: Extent,
    pub extent: Extent,
    pub update_extent: Extent,
    pub piece: i32,
    pub number_of_pieces: i32,
    pub pipeline_mtime: u64,
    pub update_time: u64,
    pub data_released: bool,
    pub reference_count: u32,
    pub memory_size: usize,
}

/// Complete topology snapshot of the pipeline graph.
#[derive(Debug, Clone, Serialize)]
pub struct TopologySnapshot {
    pub clock: u64,
    pub nodes: Vec<NodeSnapshot>,
    pub data: Vec<DataSnapshot>,
}

impl TopologySnapshot {
    pub fn capture(pipeline: &Pipeline) -> Self {
        let nodes = pipeline
            .nodes()
            .map(|(id, node)| NodeSnapshot {
                id,
                name: node.name().to_string(),
                ports: node.algorithm().ports().to_vec(),
                inputs: node.inputs().to_vec(),
                outputs: node.outputs().to_vec(),
                mtime: node.mtime().get(),
                reference_count: node.base().reference_count(),
                execute_count: node.execute_count(),
                last_outcome: node.last_outcome().clone(),
            })
            .collect();
        let data = pipeline
            .data_objects()
            .map(|(id, object)| DataSnapshot {
                id,
                extent_type: object.extent_type(),
                source: object.source(),
                consumers: object.consumers().to_vec(),
                whole_extent: object.whole_extent(),
                extent: object.extent(),
                update_extent: object.update_extent(),
                piece: object.piece(),
                number_of_pieces: object.number_of_pieces(),
                pipeline_mtime: object.pipeline_mtime().get(),
                update_time: object.update_time().get(),
                data_released: object.data_released(),
                reference_count: object.base().reference_count(),
                memory_size: object.actual_memory_size(),
            })
            .collect();
        Self {
            clock: pipeline.clock().now(),
            nodes,
            data,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
