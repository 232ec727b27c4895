//! Node abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`Algorithm` trait** for user-defined nodes. It exposes exactly the
//!   three capabilities the update protocol needs: compute output metadata,
//!   compute the input request, and execute.
//! - **`BuiltinNode` enum** for all built-in nodes. The compiler can inline
//!   match arms, so built-ins are resolved without dynamic dispatch.
//!
//! `AnyNode` wraps either variant so the pipeline can handle both uniformly.
//! [`PipelineNode`] is the arena slot holding an `AnyNode` together with its
//! input/output connections and per-node bookkeeping.

use crate::object::{EventKind, EventPayload, ObjectBase, Subject, TimeStamp};
use crate::pipeline::data_object::DataObject;
use crate::pipeline::error::{ExecutionOutcome, PipelineError, PipelineResult};
use crate::pipeline::extent::{ExtentType, UpdateRequest};
use crate::pipeline::id::{DataId, NodeId};
use crate::pipeline::port::PortDescriptor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Read-only view of a node's input connections.
///
/// A connection whose data object is currently checked out (a node reading
/// its own output in a loop) reads as `None`.
#[derive(Clone, Copy)]
pub struct Inputs<'a> {
    arena: &'a [Option<DataObject>],
    ids: &'a [Option<DataId>],
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(arena: &'a [Option<DataObject>], ids: &'a [Option<DataId>]) -> Self {
        Self { arena, ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a DataObject> {
        let id = (*self.ids.get(index)?)?;
        self.arena.get(id.index())?.as_ref()
    }

    /// Connected inputs in index order.
    pub fn iter(&self) -> impl Iterator<Item = &'a DataObject> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

/// Context for [`Algorithm::execute_information`].
pub struct InformationContext<'a> {
    node: NodeId,
    inputs: Inputs<'a>,
    outputs: &'a mut [Option<DataObject>],
}

impl<'a> InformationContext<'a> {
    pub(crate) fn new(
        node: NodeId,
        inputs: Inputs<'a>,
        outputs: &'a mut [Option<DataObject>],
    ) -> Self {
        Self {
            node,
            inputs,
            outputs,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn inputs(&self) -> Inputs<'a> {
        self.inputs
    }

    pub fn input(&self, index: usize) -> Option<&'a DataObject> {
        self.inputs.get(index)
    }

    pub fn output_mut(&mut self, index: usize) -> Option<&mut DataObject> {
        self.outputs.get_mut(index)?.as_mut()
    }

    pub fn outputs_mut(&mut self) -> impl Iterator<Item = &mut DataObject> {
        self.outputs.iter_mut().flatten()
    }

    /// Default metadata pass: outputs copy their information from the first
    /// input. Without one, pieces outputs are assumed to be generated whole.
    pub fn copy_information_from_first_input(&mut self) {
        match self.inputs.get(0) {
            Some(input) => {
                for output in self.outputs.iter_mut().flatten() {
                    output.copy_information(input);
                }
            }
            None => {
                for output in self.outputs.iter_mut().flatten() {
                    if output.extent_type() == ExtentType::Pieces {
                        output.set_maximum_number_of_pieces(1);
                    }
                }
            }
        }
    }
}

/// Context for [`Algorithm::compute_input_update_extents`].
pub struct RequestContext<'a> {
    node: NodeId,
    output_index: Option<usize>,
    request: UpdateRequest,
    arena: &'a mut [Option<DataObject>],
    ids: &'a [Option<DataId>],
}

impl<'a> RequestContext<'a> {
    pub(crate) fn new(
        node: NodeId,
        output_index: Option<usize>,
        request: UpdateRequest,
        arena: &'a mut [Option<DataObject>],
        ids: &'a [Option<DataId>],
    ) -> Self {
        Self {
            node,
            output_index,
            request,
            arena,
            ids,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Index of the output whose request is being propagated.
    pub fn output_index(&self) -> Option<usize> {
        self.output_index
    }

    /// The request placed on that output.
    pub fn request(&self) -> &UpdateRequest {
        &self.request
    }

    pub fn num_inputs(&self) -> usize {
        self.ids.len()
    }

    pub fn input(&self, index: usize) -> Option<&DataObject> {
        let id = (*self.ids.get(index)?)?;
        self.arena.get(id.index())?.as_ref()
    }

    pub fn input_mut(&mut self, index: usize) -> Option<&mut DataObject> {
        let id = (*self.ids.get(index)?)?;
        self.arena.get_mut(id.index())?.as_mut()
    }

    /// Default request: every input is asked for all of its data, exactly.
    pub fn request_whole_inputs(&mut self) {
        for index in 0..self.num_inputs() {
            if let Some(input) = self.input_mut(index) {
                input.set_request_exact_extent(true);
                input.set_update_extent_to_whole_extent();
            }
        }
    }
}

/// Context for [`Algorithm::execute`].
pub struct ExecuteContext<'a> {
    node: NodeId,
    output_index: Option<usize>,
    inputs: Inputs<'a>,
    outputs: &'a mut [Option<DataObject>],
    progress: &'a mut f64,
    abort: &'a AtomicBool,
    subject: &'a Subject,
}

impl<'a> ExecuteContext<'a> {
    pub(crate) fn new(
        node: NodeId,
        output_index: Option<usize>,
        inputs: Inputs<'a>,
        outputs: &'a mut [Option<DataObject>],
        progress: &'a mut f64,
        abort: &'a AtomicBool,
        subject: &'a Subject,
    ) -> Self {
        Self {
            node,
            output_index,
            inputs,
            outputs,
            progress,
            abort,
            subject,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Index of the output whose update triggered this execution.
    pub fn output_index(&self) -> Option<usize> {
        self.output_index
    }

    pub fn inputs(&self) -> Inputs<'a> {
        self.inputs
    }

    pub fn input(&self, index: usize) -> Option<&'a DataObject> {
        self.inputs.get(index)
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn output(&self, index: usize) -> Option<&DataObject> {
        self.outputs.get(index)?.as_ref()
    }

    pub fn output_mut(&mut self, index: usize) -> Option<&mut DataObject> {
        self.outputs.get_mut(index)?.as_mut()
    }

    /// Report progress in `[0, 1]` and fire a `Progress` event.
    pub fn update_progress(&mut self, amount: f64) {
        *self.progress = amount.clamp(0.0, 1.0);
        self.subject
            .invoke_event(EventKind::Progress, &EventPayload::Progress(*self.progress));
    }

    /// Whether someone asked this execution to stop early.
    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Build an execution error attributed to this node.
    pub fn error(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::Node {
            node_id: self.node,
            message: message.into(),
        }
    }
}

/// Trait for pluggable/user-defined nodes.
///
/// A [`Pipeline`](crate::pipeline::Pipeline) is confined to the thread that
/// built it, so plugins may hold `Rc` or `RefCell` state.
pub trait Algorithm {
    /// Human-readable name of this node.
    fn name(&self) -> &str;

    /// Port descriptors for this node.
    fn ports(&self) -> &[PortDescriptor];

    /// Compute output metadata (whole extent, piece limits) from the inputs.
    fn execute_information(&mut self, ctx: &mut InformationContext) {
        ctx.copy_information_from_first_input();
    }

    /// Decide what each input must provide to satisfy the output request.
    fn compute_input_update_extents(&mut self, ctx: &mut RequestContext) {
        ctx.request_whole_inputs();
    }

    /// Produce output data for the current request.
    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()>;
}

// Forward-declare built-in node types (defined in nodes/ submodule).
use crate::pipeline::nodes::{
    AppendFilter, ImageSource, MeanFilter, PointSource, ShiftScaleFilter,
};

/// Enum dispatch for built-in nodes.
pub enum BuiltinNode {
    ImageSource(ImageSource),
    MeanFilter(MeanFilter),
    ShiftScale(ShiftScaleFilter),
    PointSource(PointSource),
    Append(AppendFilter),
}

impl BuiltinNode {
    pub fn name(&self) -> &str {
        match self {
            BuiltinNode::ImageSource(n) => n.name(),
            BuiltinNode::MeanFilter(n) => n.name(),
            BuiltinNode::ShiftScale(n) => n.name(),
            BuiltinNode::PointSource(n) => n.name(),
            BuiltinNode::Append(n) => n.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            BuiltinNode::ImageSource(n) => n.ports(),
            BuiltinNode::MeanFilter(n) => n.ports(),
            BuiltinNode::ShiftScale(n) => n.ports(),
            BuiltinNode::PointSource(n) => n.ports(),
            BuiltinNode::Append(n) => n.ports(),
        }
    }

    pub fn execute_information(&mut self, ctx: &mut InformationContext) {
        match self {
            BuiltinNode::ImageSource(n) => n.execute_information(ctx),
            BuiltinNode::MeanFilter(_) | BuiltinNode::ShiftScale(_) | BuiltinNode::Append(_) => {
                ctx.copy_information_from_first_input()
            }
            BuiltinNode::PointSource(n) => n.execute_information(ctx),
        }
    }

    pub fn compute_input_update_extents(&mut self, ctx: &mut RequestContext) {
        match self {
            BuiltinNode::MeanFilter(n) => n.compute_input_update_extents(ctx),
            BuiltinNode::Append(n) => n.compute_input_update_extents(ctx),
            BuiltinNode::ImageSource(_)
            | BuiltinNode::ShiftScale(_)
            | BuiltinNode::PointSource(_) => ctx.request_whole_inputs(),
        }
    }

    pub fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        match self {
            BuiltinNode::ImageSource(n) => n.execute(ctx),
            BuiltinNode::MeanFilter(n) => n.execute(ctx),
            BuiltinNode::ShiftScale(n) => n.execute(ctx),
            BuiltinNode::PointSource(n) => n.execute(ctx),
            BuiltinNode::Append(n) => n.execute(ctx),
        }
    }
}

/// Wrapper that holds either a built-in node (enum dispatch) or a plugin (trait object).
pub enum AnyNode {
    Builtin(BuiltinNode),
    Plugin(Box<dyn Algorithm>),
}

impl AnyNode {
    pub fn name(&self) -> &str {
        match self {
            AnyNode::Builtin(n) => n.name(),
            AnyNode::Plugin(n) => n.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            AnyNode::Builtin(n) => n.ports(),
            AnyNode::Plugin(n) => n.ports(),
        }
    }

    pub fn execute_information(&mut self, ctx: &mut InformationContext) {
        match self {
            AnyNode::Builtin(n) => n.execute_information(ctx),
            AnyNode::Plugin(n) => n.execute_information(ctx),
        }
    }

    pub fn compute_input_update_extents(&mut self, ctx: &mut RequestContext) {
        match self {
            AnyNode::Builtin(n) => n.compute_input_update_extents(ctx),
            AnyNode::Plugin(n) => n.compute_input_update_extents(ctx),
        }
    }

    pub fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        match self {
            AnyNode::Builtin(n) => n.execute(ctx),
            AnyNode::Plugin(n) => n.execute(ctx),
        }
    }

    /// The built-in node, if this is one.
    pub fn as_builtin_mut(&mut self) -> Option<&mut BuiltinNode> {
        match self {
            AnyNode::Builtin(n) => Some(n),
            AnyNode::Plugin(_) => None,
        }
    }
}

impl From<BuiltinNode> for AnyNode {
    fn from(node: BuiltinNode) -> Self {
        AnyNode::Builtin(node)
    }
}

impl From<Box<dyn Algorithm>> for AnyNode {
    fn from(node: Box<dyn Algorithm>) -> Self {
        AnyNode::Plugin(node)
    }
}

/// Cooperative cancellation switch for one node, usable from any thread.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub(crate) fn flag(&self) -> &AtomicBool {
        &self.0
    }
}

/// Arena slot for one node.
///
/// The node owns its outputs: each output slot holds one counted reference
/// to its data object, and that object points back at the node through a
/// plain [`NodeId`].
pub struct PipelineNode {
    pub(crate) base: ObjectBase,
    pub(crate) algorithm: AnyNode,
    pub(crate) inputs: Vec<Option<DataId>>,
    pub(crate) outputs: Vec<Option<DataId>>,
    /// When output metadata was last recomputed.
    pub(crate) information_time: TimeStamp,
    pub(crate) abort: AbortHandle,
    pub(crate) progress: f64,
    pub(crate) last_outcome: ExecutionOutcome,
    pub(crate) execute_count: u64,
}

impl PipelineNode {
    pub(crate) fn new(base: ObjectBase, algorithm: AnyNode) -> Self {
        Self {
            base,
            algorithm,
            inputs: Vec::new(),
            outputs: Vec::new(),
            information_time: TimeStamp::NEVER,
            abort: AbortHandle::default(),
            progress: 0.0,
            last_outcome: ExecutionOutcome::NotRun,
            execute_count: 0,
        }
    }

    pub fn base(&self) -> &ObjectBase {
        &self.base
    }

    pub fn name(&self) -> &str {
        self.algorithm.name()
    }

    pub fn algorithm(&self) -> &AnyNode {
        &self.algorithm
    }

    pub fn mtime(&self) -> TimeStamp {
        self.base.mtime()
    }

    pub fn inputs(&self) -> &[Option<DataId>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Option<DataId>] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> Option<DataId> {
        self.outputs.get(index).copied().flatten()
    }

    /// Slot index of `data` among this node's outputs.
    pub fn output_index(&self, data: DataId) -> Option<usize> {
        self.outputs.iter().position(|&o| o == Some(data))
    }

    pub fn information_time(&self) -> TimeStamp {
        self.information_time
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn last_outcome(&self) -> &ExecutionOutcome {
        &self.last_outcome
    }

    /// How many times the execute step has run.
    pub fn execute_count(&self) -> u64 {
        self.execute_count
    }
}

impl std::fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineNode")
            .field("name", &self.name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("information_time", &self.information_time)
            .field("last_outcome", &self.last_outcome)
            .field("execute_count", &self.execute_count)
            .finish()
    }
}
