//! Pipeline executor: graph ownership and the demand-driven update protocol.
//!
//! Nodes and data objects live in two arenas indexed by [`NodeId`] and
//! [`DataId`]. Slots are never reused; a freed slot stays `None`.
//!
//! A consumer brings a data object up to date with [`Pipeline::update`],
//! which always runs four phases over the upstream graph:
//!
//! 1. **UpdateInformation**: recompute output metadata bottom-up, guarded
//!    by each node's information time.
//! 2. **PropagateUpdateExtent**: push the requested region upstream,
//!    letting each node widen it (halos) or narrow it.
//! 3. **TriggerAsynchronousUpdate**: walk the stale subtree once more.
//! 4. **UpdateData**: execute stale nodes, upstream first.
//!
//! Loops in the graph are cut by the `visiting` set: a node reached again
//! while one of its own traversals is in flight returns immediately.

use crate::config::PipelineConfig;
use crate::object::{Clock, EventKind, EventPayload, ObjectBase, Release};
use crate::pipeline::data_object::DataObject;
use crate::pipeline::error::{ExecutionOutcome, PipelineError, PipelineResult, SkipReason};
use crate::pipeline::extent::ExtentType;
use crate::pipeline::extent_translator::{ExtentTranslator, SplitMode};
use crate::pipeline::id::{DataId, NodeId, ObjectId};
use crate::pipeline::node::{
    AbortHandle, AnyNode, ExecuteContext, InformationContext, Inputs, PipelineNode,
    RequestContext,
};
use crate::pipeline::port::required_inputs;
use std::collections::HashSet;
use std::sync::Arc;

/// The pipeline graph and executor.
pub struct Pipeline {
    clock: Arc<Clock>,
    nodes: Vec<Option<PipelineNode>>,
    data: Vec<Option<DataObject>>,
    /// Nodes with a traversal currently in flight.
    visiting: HashSet<NodeId>,
    /// Release every input after use, regardless of its own flag.
    global_release_data: bool,
    /// Split mode given to newly created data objects.
    split_mode: SplitMode,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_clock(Clock::shared())
    }

    /// A pipeline drawing its timestamps from an existing clock.
    pub fn with_clock(clock: Arc<Clock>) -> Self {
        Self {
            clock,
            nodes: Vec::new(),
            data: Vec::new(),
            visiting: HashSet::new(),
            global_release_data: false,
            split_mode: SplitMode::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut pipeline = Self::new();
        pipeline.global_release_data = config.global_release_data;
        pipeline.split_mode = config.split_mode;
        pipeline
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    pub fn global_release_data(&self) -> bool {
        self.global_release_data
    }

    pub fn set_global_release_data(&mut self, release: bool) {
        self.global_release_data = release;
    }

    // ── Lookup ──

    pub fn node(&self, id: NodeId) -> PipelineResult<&PipelineNode> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(PipelineError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> PipelineResult<&mut PipelineNode> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(PipelineError::UnknownNode(id))
    }

    pub fn data(&self, id: DataId) -> PipelineResult<&DataObject> {
        self.data
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(PipelineError::UnknownData(id))
    }

    /// Mutable access to a data object, e.g. to shape its update request.
    pub fn data_mut(&mut self, id: DataId) -> PipelineResult<&mut DataObject> {
        self.data
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(PipelineError::UnknownData(id))
    }

    /// Live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &PipelineNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i as u32), n)))
    }

    /// Live data objects in id order.
    pub fn data_objects(&self) -> impl Iterator<Item = (DataId, &DataObject)> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.as_ref().map(|d| (DataId(i as u32), d)))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn data_count(&self) -> usize {
        self.data.iter().flatten().count()
    }

    // ── Graph building ──

    /// Add a node. One output data object is created per declared output
    /// port and owned by the node. The caller holds the node's initial
    /// reference.
    pub fn add_node(&mut self, algorithm: impl Into<AnyNode>) -> NodeId {
        let algorithm = algorithm.into();
        let id = NodeId(self.nodes.len() as u32);
        let output_types: Vec<ExtentType> = algorithm
            .ports()
            .iter()
            .filter(|p| p.is_output())
            .map(|p| p.extent_type)
            .collect();
        tracing::debug!("Added node {} ({})", id, algorithm.name());

        let base = ObjectBase::new("PipelineNode", self.clock.clone());
        self.nodes.push(Some(PipelineNode::new(base, algorithm)));

        for extent_type in output_types {
            // The creation reference is the node's.
            let data = self.new_data_object(extent_type);
            if let Some(object) = self.data_slot_mut(data) {
                object.set_source(Some(id));
            }
            if let Some(node) = self.node_slot_mut(id) {
                node.outputs.push(Some(data));
            }
        }
        id
    }

    /// Create a free-standing data object. The caller holds its initial
    /// reference.
    pub fn add_data(&mut self, extent_type: ExtentType) -> DataId {
        self.new_data_object(extent_type)
    }

    fn new_data_object(&mut self, extent_type: ExtentType) -> DataId {
        let id = DataId(self.data.len() as u32);
        let mut object = DataObject::new(extent_type, self.clock.clone());
        object.set_extent_translator(ExtentTranslator::Split(self.split_mode));
        self.data.push(Some(object));
        id
    }

    /// Mutable access to a node's algorithm. Counts as a modification of
    /// the node, so dependent outputs become stale.
    pub fn algorithm_mut(&mut self, id: NodeId) -> PipelineResult<&mut AnyNode> {
        let node = self.node_mut(id)?;
        node.base.modified();
        Ok(&mut node.algorithm)
    }

    /// Mark a node as modified.
    pub fn modified(&mut self, id: NodeId) -> PipelineResult<()> {
        self.node_mut(id)?.base.modified();
        Ok(())
    }

    /// Connect `data` (or nothing) to input slot `index` of `node`.
    pub fn set_input(
        &mut self,
        node: NodeId,
        index: usize,
        data: Option<DataId>,
    ) -> PipelineResult<()> {
        self.node(node)?;
        if let Some(data) = data {
            self.data(data)?;
        }
        let old = self.node(node)?.inputs.get(index).copied().flatten();
        if old == data {
            return Ok(());
        }

        if let Some(data) = data {
            self.register_data_ref(data, Some(node.into()));
            if let Some(object) = self.data_slot_mut(data) {
                object.add_consumer(node);
            }
        }

        let slot = self.node_mut(node)?;
        if slot.inputs.len() <= index {
            slot.inputs.resize(index + 1, None);
        }
        slot.inputs[index] = data;
        slot.base.modified();
        let still_connected = old.is_some_and(|o| slot.inputs.contains(&Some(o)));

        if let Some(old) = old {
            if !still_connected {
                if let Some(object) = self.data_slot_mut(old) {
                    object.remove_consumer(node);
                }
            }
            self.release_data_ref(old, Some(node.into()));
        }
        Ok(())
    }

    /// Append `data` as a new input of `node`. Returns its slot index.
    pub fn add_input(&mut self, node: NodeId, data: DataId) -> PipelineResult<usize> {
        let index = self.node(node)?.inputs.len();
        self.set_input(node, index, Some(data))?;
        Ok(index)
    }

    /// Disconnect `data` from `node`. Later inputs move down one slot.
    pub fn remove_input(&mut self, node: NodeId, data: DataId) -> PipelineResult<()> {
        let index = self
            .node(node)?
            .inputs
            .iter()
            .position(|&i| i == Some(data))
            .ok_or(PipelineError::NotAnInput { node, data })?;
        self.set_input(node, index, None)?;
        self.node_mut(node)?.inputs.remove(index);
        Ok(())
    }

    pub fn input(&self, node: NodeId, index: usize) -> PipelineResult<Option<DataId>> {
        Ok(self.node(node)?.inputs.get(index).copied().flatten())
    }

    pub fn output(&self, node: NodeId, index: usize) -> PipelineResult<Option<DataId>> {
        Ok(self.node(node)?.output(index))
    }

    /// Slot of `data` among the outputs of `node`, if it is one.
    pub fn output_index(&self, node: NodeId, data: DataId) -> PipelineResult<Option<usize>> {
        Ok(self.node(node)?.output_index(data))
    }

    /// Install `data` (or nothing) as output `index` of `node`.
    ///
    /// The object previously in that slot loses its producer; `data` is
    /// detached from whichever node produced it before. A `SetOutput` event
    /// fires once the new producer is in place.
    pub fn set_nth_output(
        &mut self,
        node: NodeId,
        index: usize,
        data: Option<DataId>,
    ) -> PipelineResult<()> {
        self.node(node)?;
        if let Some(data) = data {
            self.data(data)?;
        }
        let old = self.node(node)?.output(index);
        if old == data {
            return Ok(());
        }
        let owner = Some(ObjectId::from(node));

        // Keeps the incoming object alive while it changes hands.
        if let Some(data) = data {
            self.register_data_ref(data, owner);
        }

        if let Some(old) = old {
            if let Some(slot) = self.node_mut(node)?.outputs.get_mut(index) {
                *slot = None;
            }
            if let Some(object) = self.data_slot_mut(old) {
                object.set_source(None);
            }
            self.release_data_ref(old, owner);
        }

        if let Some(data) = data {
            if let Some(previous) = self.data_slot(data).and_then(DataObject::source) {
                self.detach_output(previous, data);
            }
            let slot = self.node_mut(node)?;
            if slot.outputs.len() <= index {
                slot.outputs.resize(index + 1, None);
            }
            slot.outputs[index] = Some(data);
            if let Some(object) = self.data_slot_mut(data) {
                object.set_source(Some(node));
            }
        }

        let slot = self.node_mut(node)?;
        slot.base.modified();
        slot.base
            .invoke_event(EventKind::SetOutput, &EventPayload::Output { index });
        Ok(())
    }

    /// Drop every output slot of `node` holding `data`.
    fn detach_output(&mut self, node: NodeId, data: DataId) {
        let Some(slot) = self.node_slot_mut(node) else {
            return;
        };
        let mut detached = 0;
        for output in slot.outputs.iter_mut().filter(|o| **o == Some(data)) {
            *output = None;
            detached += 1;
        }
        if detached > 0 {
            slot.base.modified();
        }
        if let Some(object) = self.data_slot_mut(data) {
            object.set_source(None);
        }
        for _ in 0..detached {
            self.release_data_ref(data, Some(node.into()));
        }
    }

    /// Install `data` in the first free output slot of `node`.
    pub fn add_output(&mut self, node: NodeId, data: DataId) -> PipelineResult<usize> {
        let outputs = &self.node(node)?.outputs;
        let index = outputs
            .iter()
            .position(Option::is_none)
            .unwrap_or(outputs.len());
        self.set_nth_output(node, index, Some(data))?;
        Ok(index)
    }

    pub fn remove_output(&mut self, node: NodeId, data: DataId) -> PipelineResult<()> {
        let index = self
            .output_index(node, data)?
            .ok_or(PipelineError::NotAnOutput { node, data })?;
        self.set_nth_output(node, index, None)
    }

    /// Set the release flag on every output of `node`.
    pub fn set_release_data_flag(&mut self, node: NodeId, release: bool) -> PipelineResult<()> {
        let outputs = self.node(node)?.outputs.clone();
        for output in outputs.into_iter().flatten() {
            if let Some(object) = self.data_slot_mut(output) {
                object.set_release_data_flag(release);
            }
        }
        Ok(())
    }

    pub fn abort_handle(&self, node: NodeId) -> PipelineResult<AbortHandle> {
        Ok(self.node(node)?.abort_handle())
    }

    pub fn last_outcome(&self, node: NodeId) -> PipelineResult<&ExecutionOutcome> {
        Ok(self.node(node)?.last_outcome())
    }

    // ── Reference counting ──

    pub fn register_node(&mut self, node: NodeId) -> PipelineResult<()> {
        self.node_mut(node)?.base.register(None);
        Ok(())
    }

    /// Drop one external reference to `node`. At zero the node is destroyed:
    /// its outputs lose their producer and its inputs lose a consumer.
    ///
    /// # Panics
    ///
    /// Panics if `node` was already destroyed.
    pub fn unregister_node(&mut self, node: NodeId) -> PipelineResult<Release> {
        self.check_live_node(node)?;
        Ok(self.release_node_ref(node, None))
    }

    pub fn register_data(&mut self, data: DataId) -> PipelineResult<()> {
        self.data_mut(data)?.base_mut().register(None);
        Ok(())
    }

    /// Drop one external reference to `data`.
    ///
    /// # Panics
    ///
    /// Panics if `data` was already destroyed.
    pub fn unregister_data(&mut self, data: DataId) -> PipelineResult<Release> {
        self.check_live_data(data)?;
        Ok(self.release_data_ref(data, None))
    }

    fn check_live_node(&self, node: NodeId) -> PipelineResult<()> {
        match self.nodes.get(node.index()) {
            None => Err(PipelineError::UnknownNode(node)),
            Some(None) => panic!("{} released after destruction (double release)", node),
            Some(Some(_)) => Ok(()),
        }
    }

    fn check_live_data(&self, data: DataId) -> PipelineResult<()> {
        match self.data.get(data.index()) {
            None => Err(PipelineError::UnknownData(data)),
            Some(None) => panic!("{} released after destruction (double release)", data),
            Some(Some(_)) => Ok(()),
        }
    }

    fn register_data_ref(&mut self, data: DataId, owner: Option<ObjectId>) {
        if let Some(object) = self.data_slot_mut(data) {
            object.base_mut().register(owner);
        }
    }

    fn release_data_ref(&mut self, data: DataId, owner: Option<ObjectId>) -> Release {
        let Some(object) = self.data_slot_mut(data) else {
            panic!("{} released after destruction (double release)", data);
        };
        let release = object.base_mut().unregister(owner);
        if release == Release::Destroyed {
            tracing::debug!("Destroyed data object {}", data);
            self.data[data.index()] = None;
        }
        release
    }

    fn release_node_ref(&mut self, node: NodeId, owner: Option<ObjectId>) -> Release {
        let Some(slot) = self.node_slot_mut(node) else {
            panic!("{} released after destruction (double release)", node);
        };
        let release = slot.base.unregister(owner);
        if release == Release::Destroyed {
            self.destroy_node(node);
        }
        release
    }

    fn destroy_node(&mut self, node: NodeId) {
        let Some(slot) = self.nodes.get_mut(node.index()).and_then(Option::take) else {
            return;
        };
        tracing::debug!("Destroyed node {} ({})", node, slot.name());
        let owner = Some(ObjectId::from(node));
        for output in slot.outputs.iter().flatten() {
            if let Some(object) = self.data_slot_mut(*output) {
                object.set_source(None);
            }
            self.release_data_ref(*output, owner);
        }
        for input in slot.inputs.iter().flatten() {
            if let Some(object) = self.data_slot_mut(*input) {
                object.remove_consumer(node);
            }
            self.release_data_ref(*input, owner);
        }
    }

    // ── Update protocol: public entry points ──

    /// Bring `data` up to date for its current request.
    ///
    /// Per-node failures do not surface here; they are recorded on each node
    /// and read back with [`last_outcome`](Self::last_outcome). An invalid
    /// request leaves the committed state untouched; check
    /// [`DataObject::update_extent_valid`] afterwards.
    pub fn update(&mut self, data: DataId) -> PipelineResult<()> {
        self.data(data)?;
        self.data_update_information(data);
        self.data_propagate_update_extent(data);
        self.data_trigger_asynchronous_update(data);
        self.data_update_data(data);
        Ok(())
    }

    pub fn update_information(&mut self, data: DataId) -> PipelineResult<()> {
        self.data(data)?;
        self.data_update_information(data);
        Ok(())
    }

    pub fn propagate_update_extent(&mut self, data: DataId) -> PipelineResult<()> {
        self.data(data)?;
        self.data_propagate_update_extent(data);
        Ok(())
    }

    pub fn trigger_asynchronous_update(&mut self, data: DataId) -> PipelineResult<()> {
        self.data(data)?;
        self.data_trigger_asynchronous_update(data);
        Ok(())
    }

    pub fn update_data(&mut self, data: DataId) -> PipelineResult<()> {
        self.data(data)?;
        self.data_update_data(data);
        Ok(())
    }

    /// Update the first output of `node`.
    pub fn update_node(&mut self, node: NodeId) -> PipelineResult<()> {
        match self.node(node)?.output(0) {
            Some(output) => self.update(output),
            None => Ok(()),
        }
    }

    /// Reset the first output's request to everything, then update it.
    pub fn update_whole_extent(&mut self, node: NodeId) -> PipelineResult<()> {
        self.node(node)?;
        self.node_update_information(node);
        let Some(output) = self.node(node)?.output(0) else {
            return Ok(());
        };
        self.data_mut(output)?.set_update_extent_to_whole_extent();
        self.update(output)
    }

    /// Shape the request of `data` as piece `piece` of `number_of_pieces`.
    ///
    /// Metadata is refreshed first so that structured data can translate the
    /// piece into an update extent of its current whole extent.
    pub fn request_piece(
        &mut self,
        data: DataId,
        piece: i32,
        number_of_pieces: i32,
        ghost_level: i32,
    ) -> PipelineResult<()> {
        self.update_information(data)?;
        let object = self.data_mut(data)?;
        object.set_update_piece(piece);
        object.set_update_number_of_pieces(number_of_pieces);
        object.set_update_ghost_level(ghost_level);
        if object.extent_type() == ExtentType::Structured {
            let extent = object.extent_translator().piece_to_update_extent(
                piece,
                number_of_pieces,
                ghost_level,
                &object.whole_extent(),
            );
            object.set_update_extent(extent);
        }
        Ok(())
    }

    // ── Phase 1: UpdateInformation ──

    fn data_update_information(&mut self, id: DataId) {
        let Some(source) = self.data_slot(id).map(DataObject::source) else {
            return;
        };
        match source {
            Some(node) => self.node_update_information(node),
            None => {
                // A data object without a producer is its own whole extent
                // and is as new as its own last modification.
                if let Some(object) = self.data_slot_mut(id) {
                    object.set_whole_extent(object.extent());
                    object.set_pipeline_mtime(object.mtime());
                }
            }
        }
        if let Some(object) = self.data_slot_mut(id) {
            if !object.update_extent_initialized() {
                object.set_update_extent_to_whole_extent();
            }
            object.set_last_update_extent_was_outside(false);
        }
    }

    fn node_update_information(&mut self, id: NodeId) {
        if self.visiting.contains(&id) {
            // Loop: make sure the pipeline executes again next time.
            let Some(node) = self.node_slot_mut(id) else {
                return;
            };
            node.base.modified();
            let mtime = node.base.mtime();
            let outputs = node.outputs.clone();
            tracing::debug!("Loop detected at node {}, forcing re-execution", id);
            for output in outputs.into_iter().flatten() {
                if let Some(object) = self.data_slot_mut(output) {
                    object.set_pipeline_mtime(mtime);
                }
            }
            return;
        }

        let Some(node) = self.node_slot(id) else {
            return;
        };
        let mut pipeline_mtime = node.base.mtime();
        let inputs = node.inputs.clone();
        let mut max_locality = 0.0_f64;

        self.visiting.insert(id);
        for input in inputs.into_iter().flatten() {
            self.data_update_information(input);
            if let Some(object) = self.data_slot(input) {
                max_locality = max_locality.max(object.locality());
                pipeline_mtime = pipeline_mtime.max(object.pipeline_mtime());
            }
        }
        self.visiting.remove(&id);

        let Some(node) = self.node_slot(id) else {
            return;
        };
        if pipeline_mtime <= node.information_time {
            return;
        }
        let output_ids = node.outputs.clone();
        for output in output_ids.iter().flatten() {
            if let Some(object) = self.data_slot_mut(*output) {
                object.set_pipeline_mtime(pipeline_mtime);
                object.set_locality(max_locality * 0.5);
            }
        }

        let mut outputs = self.checkout(&output_ids);
        if let Some(node) = self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
            tracing::trace!("ExecuteInformation on {} ({})", id, node.name());
            node.base
                .invoke_event(EventKind::ExecuteInformation, &EventPayload::None);
            let inputs = Inputs::new(&self.data, &node.inputs);
            let mut ctx = InformationContext::new(id, inputs, &mut outputs);
            node.algorithm.execute_information(&mut ctx);
            node.information_time.modified(&self.clock);
        }
        self.checkin(&output_ids, outputs);
    }

    // ── Phase 2: PropagateUpdateExtent ──

    fn data_propagate_update_extent(&mut self, id: DataId) {
        let Some(object) = self.data_slot(id) else {
            return;
        };
        if object.needs_regeneration() {
            if let Some(source) = object.source() {
                self.node_propagate_update_extent(source, id);
            }
        }
        if let Some(object) = self.data_slot_mut(id) {
            object.verify_update_extent();
        }
    }

    fn node_propagate_update_extent(&mut self, id: NodeId, output: DataId) {
        if self.visiting.contains(&id) {
            return;
        }
        let Some(request) = self.data_slot(output).map(DataObject::update_request) else {
            return;
        };
        let Some(node) = self.nodes.get_mut(id.index()).and_then(Option::as_mut) else {
            return;
        };
        if node.inputs.is_empty() {
            return;
        }

        // A shared input must not inherit another consumer's exactness.
        for input in node.inputs.iter().flatten() {
            if let Some(object) = self.data.get_mut(input.index()).and_then(Option::as_mut) {
                object.set_request_exact_extent(false);
            }
        }

        let output_index = node.output_index(output);
        let mut ctx =
            RequestContext::new(id, output_index, request, &mut self.data, &node.inputs);
        node.algorithm.compute_input_update_extents(&mut ctx);
        let inputs = node.inputs.clone();

        self.visiting.insert(id);
        for input in inputs.into_iter().flatten() {
            self.data_propagate_update_extent(input);
        }
        self.visiting.remove(&id);
    }

    // ── Phase 3: TriggerAsynchronousUpdate ──

    fn data_trigger_asynchronous_update(&mut self, id: DataId) {
        let Some(object) = self.data_slot(id) else {
            return;
        };
        if object.requested_piece_unavailable() {
            return;
        }
        if object.needs_regeneration() || object.last_update_extent_was_outside() {
            if let Some(source) = object.source() {
                self.node_trigger_asynchronous_update(source);
            }
        }
        if let Some(object) = self.data_slot_mut(id) {
            let outside = object.update_extent_is_outside_extent();
            object.set_last_update_extent_was_outside(outside);
        }
    }

    fn node_trigger_asynchronous_update(&mut self, id: NodeId) {
        if self.visiting.contains(&id) {
            return;
        }
        let Some(inputs) = self.node_slot(id).map(|n| n.inputs.clone()) else {
            return;
        };
        self.visiting.insert(id);
        for input in inputs.into_iter().flatten() {
            self.data_trigger_asynchronous_update(input);
        }
        self.visiting.remove(&id);
    }

    // ── Phase 4: UpdateData ──

    fn data_update_data(&mut self, id: DataId) {
        let Some(object) = self.data_slot_mut(id) else {
            return;
        };

        // A piece the producer cannot generate is empty by definition.
        if object.requested_piece_unavailable() {
            tracing::debug!(
                "Piece {} of {} is beyond the {} pieces available; returning empty",
                object.update_piece(),
                object.update_number_of_pieces(),
                object.maximum_number_of_pieces()
            );
            object.initialize();
            object.commit_requested_piece();
            return;
        }

        if object.needs_regeneration() {
            if let Some(source) = object.source() {
                if !object.update_extent_valid() {
                    tracing::warn!(
                        "Skipping execution of node {}: update request of {} is invalid",
                        source,
                        id
                    );
                    self.record_outcome(
                        source,
                        ExecutionOutcome::Skipped(SkipReason::InvalidRequest),
                    );
                    return;
                }
                self.node_update_data(source, id);
            }
        }

        if let Some(object) = self.data_slot_mut(id) {
            if object.request_exact_extent() {
                object.crop();
            }
        }
    }

    fn node_update_data(&mut self, id: NodeId, output: DataId) {
        if self.visiting.contains(&id) {
            return;
        }
        let Some(node) = self.node_slot(id) else {
            return;
        };
        let inputs = node.inputs.clone();
        let required = required_inputs(node.algorithm.ports());

        self.visiting.insert(id);
        if inputs.len() == 1 {
            if let Some(input) = inputs[0] {
                self.data_update_data(input);
            }
        } else {
            // Several inputs may lead back to the same object, so each one
            // is re-propagated right before its update.
            for input in self.inputs_by_locality(&inputs) {
                self.data_propagate_update_extent(input);
                self.data_update_data(input);
            }
        }

        let outcome = match missing_required_input(&inputs, required) {
            Some(message) => {
                tracing::error!("Node {}: {}. Skipping execution.", id, message);
                ExecutionOutcome::Failed(message)
            }
            None => {
                let outcome = self.execute_node(id, output, &inputs);
                self.release_inputs(&inputs);
                outcome
            }
        };
        self.record_outcome(id, outcome);
        self.visiting.remove(&id);
    }

    /// Connected inputs sorted by ascending locality; ties keep input order.
    fn inputs_by_locality(&self, inputs: &[Option<DataId>]) -> Vec<DataId> {
        let mut sorted: Vec<(DataId, f64)> = inputs
            .iter()
            .flatten()
            .map(|&input| {
                let locality = self.data_slot(input).map_or(0.0, DataObject::locality);
                (input, locality)
            })
            .collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
        sorted.into_iter().map(|(input, _)| input).collect()
    }

    /// Regenerate the outputs of `id` for the request on `output`.
    fn execute_node(
        &mut self,
        id: NodeId,
        output: DataId,
        inputs: &[Option<DataId>],
    ) -> ExecutionOutcome {
        let Some(output_ids) = self.node_slot(id).map(|n| n.outputs.clone()) else {
            return ExecutionOutcome::NotRun;
        };

        let mut outputs = self.checkout(&output_ids);
        let backups: Vec<Option<DataObject>> = outputs
            .iter()
            .map(|o| {
                o.as_ref().map(|o| {
                    let mut backup = DataObject::new(o.extent_type(), self.clock.clone());
                    backup.shallow_copy(o);
                    backup
                })
            })
            .collect();
        for object in outputs.iter_mut().flatten() {
            object.prepare_for_new_data();
        }

        let skip = outputs
            .iter()
            .zip(&output_ids)
            .find(|(_, o)| **o == Some(output))
            .and_then(|(object, _)| object.as_ref())
            .and_then(|object| {
                if object.requested_piece_unavailable() {
                    Some(SkipReason::PieceUnavailable)
                } else if object.update_extent_is_empty() {
                    Some(SkipReason::EmptyRequest)
                } else {
                    None
                }
            });

        let Some(node) = self.nodes.get_mut(id.index()).and_then(Option::as_mut) else {
            self.checkin(&output_ids, outputs);
            return ExecutionOutcome::NotRun;
        };
        node.base.invoke_event(EventKind::Start, &EventPayload::None);
        node.abort.reset();
        node.progress = 0.0;

        let mut outcome = match skip {
            Some(reason) => {
                tracing::debug!("Node {} skips execution: {:?}", id, reason);
                ExecutionOutcome::Skipped(reason)
            }
            None => {
                let input_view = Inputs::new(&self.data, inputs);
                if let Some(first) = input_view.get(0) {
                    for object in outputs.iter_mut().flatten() {
                        object.field_data_mut().pass_data(first.field_data());
                    }
                }
                let output_index = output_ids.iter().position(|o| *o == Some(output));
                let mut ctx = ExecuteContext::new(
                    id,
                    output_index,
                    input_view,
                    &mut outputs,
                    &mut node.progress,
                    node.abort.flag(),
                    node.base.subject(),
                );
                node.execute_count += 1;
                tracing::debug!("Executing node {} ({})", id, node.algorithm.name());
                match node.algorithm.execute(&mut ctx) {
                    Ok(()) => ExecutionOutcome::Success,
                    Err(e) => {
                        tracing::error!("Node {} ({}) failed: {}", id, node.algorithm.name(), e);
                        node.base
                            .invoke_event(EventKind::Error, &EventPayload::Message(e.to_string()));
                        ExecutionOutcome::Failed(e.to_string())
                    }
                }
            }
        };

        let aborted = node.abort.is_aborted();
        if aborted && outcome.is_success() {
            tracing::debug!("Node {} aborted", id);
            outcome = ExecutionOutcome::Skipped(SkipReason::Aborted);
        }
        if !aborted {
            node.progress = 1.0;
            node.base
                .invoke_event(EventKind::Progress, &EventPayload::Progress(1.0));
        }
        node.base.invoke_event(EventKind::End, &EventPayload::None);

        let generated =
            !outcome.is_failed() && outcome != ExecutionOutcome::Skipped(SkipReason::Aborted);
        for (object, backup) in outputs.iter_mut().zip(&backups) {
            let Some(object) = object else { continue };
            if generated {
                object.data_has_been_generated();
            } else if let Some(backup) = backup {
                object.shallow_copy(backup);
            }
        }
        self.checkin(&output_ids, outputs);
        outcome
    }

    fn release_inputs(&mut self, inputs: &[Option<DataId>]) {
        let global = self.global_release_data;
        for input in inputs.iter().flatten() {
            if let Some(object) = self.data_slot_mut(*input) {
                if object.should_release_data(global) {
                    tracing::trace!("Releasing data of {}", input);
                    object.release_data();
                }
            }
        }
    }

    fn record_outcome(&mut self, id: NodeId, outcome: ExecutionOutcome) {
        if let Some(node) = self.node_slot_mut(id) {
            node.last_outcome = outcome;
        }
    }

    // ── Arena helpers ──

    fn node_slot(&self, id: NodeId) -> Option<&PipelineNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    fn node_slot_mut(&mut self, id: NodeId) -> Option<&mut PipelineNode> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn data_slot(&self, id: DataId) -> Option<&DataObject> {
        self.data.get(id.index()).and_then(Option::as_ref)
    }

    fn data_slot_mut(&mut self, id: DataId) -> Option<&mut DataObject> {
        self.data.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Move a node's outputs out of the arena so they can be written while
    /// its inputs are read.
    fn checkout(&mut self, ids: &[Option<DataId>]) -> Vec<Option<DataObject>> {
        ids.iter()
            .map(|id| id.and_then(|id| self.data.get_mut(id.index()).and_then(Option::take)))
            .collect()
    }

    fn checkin(&mut self, ids: &[Option<DataId>], objects: Vec<Option<DataObject>>) {
        for (id, object) in ids.iter().zip(objects) {
            if let (Some(id), Some(object)) = (id, object) {
                self.data[id.index()] = Some(object);
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_required_input(inputs: &[Option<DataId>], required: usize) -> Option<String> {
    if inputs.len() < required {
        return Some(format!(
            "At least {} inputs are required but only {} are specified",
            required,
            inputs.len()
        ));
    }
    inputs[..required]
        .iter()
        .position(Option::is_none)
        .map(|index| format!("Required input {} is not assigned", index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::TimeStamp;
    use crate::pipeline::extent::Extent;
    use crate::pipeline::node::BuiltinNode;
    use crate::pipeline::node::{Algorithm, ExecuteContext};
    use crate::pipeline::nodes::{ImageSource, MeanFilter, ShiftScaleFilter};
    use crate::pipeline::port::PortDescriptor;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn image_source(p: &mut Pipeline) -> NodeId {
        p.add_node(BuiltinNode::ImageSource(ImageSource::new(
            Extent::new(0, 9, 0, 9, 0, 0),
            1.0,
        )))
    }

    static COUNTER_PORTS: &[PortDescriptor] =
        &[PortDescriptor::output("out", ExtentType::Pieces)];

    /// Plugin keeping its run count in thread-local shared state.
    struct RcCounter(Rc<std::cell::Cell<usize>>);

    impl Algorithm for RcCounter {
        fn name(&self) -> &str {
            "rc-counter"
        }

        fn ports(&self) -> &[PortDescriptor] {
            COUNTER_PORTS
        }

        fn execute(&mut self, _ctx: &mut ExecuteContext) -> PipelineResult<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_plugin_with_rc_state() {
        let mut p = Pipeline::new();
        let runs = Rc::new(std::cell::Cell::new(0));
        let boxed: Box<dyn Algorithm> = Box::new(RcCounter(runs.clone()));
        let node = p.add_node(boxed);
        let out = p.output(node, 0).unwrap().unwrap();

        p.update(out).unwrap();
        p.update(out).unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_add_node_creates_declared_outputs() {
        let mut p = Pipeline::new();
        let source = image_source(&mut p);
        let out = p.output(source, 0).unwrap().unwrap();
        assert_eq!(p.data(out).unwrap().source(), Some(source));
        assert_eq!(p.data(out).unwrap().base().reference_count(), 1);
        assert_eq!(p.output_index(source, out).unwrap(), Some(0));
    }

    #[test]
    fn test_set_nth_output_moves_between_producers() {
        let mut p = Pipeline::new();
        let a = image_source(&mut p);
        let b = image_source(&mut p);
        let a_out = p.output(a, 0).unwrap().unwrap();
        let b_out = p.output(b, 0).unwrap().unwrap();
        p.register_data(b_out).unwrap();

        p.set_nth_output(b, 0, Some(a_out)).unwrap();
        assert_eq!(p.data(a_out).unwrap().source(), Some(b));
        assert_eq!(p.output(a, 0).unwrap(), None);
        assert_eq!(p.output(b, 0).unwrap(), Some(a_out));
        // The displaced object survives through the extra reference.
        assert_eq!(p.data(b_out).unwrap().source(), None);
        assert_eq!(p.data(a_out).unwrap().base().reference_count(), 1);
    }

    #[test]
    fn test_set_output_event_fires() {
        let mut p = Pipeline::new();
        let a = image_source(&mut p);
        let fired = Rc::new(RefCell::new(Vec::new()));
        let sink = fired.clone();
        p.node(a).unwrap().base().add_observer(EventKind::SetOutput, 0.0, move |e| {
            sink.borrow_mut().push(e.payload().clone());
        });
        let extra = p.add_data(ExtentType::Structured);
        assert_eq!(p.add_output(a, extra).unwrap(), 1);
        assert_eq!(*fired.borrow(), vec![EventPayload::Output { index: 1 }]);
    }

    #[test]
    fn test_destroying_node_keeps_user_held_output() {
        let mut p = Pipeline::new();
        let a = image_source(&mut p);
        let out = p.output(a, 0).unwrap().unwrap();
        p.register_data(out).unwrap();
        assert_eq!(p.unregister_node(a).unwrap(), Release::Destroyed);
        assert!(p.node(a).is_err());
        let object = p.data(out).unwrap();
        assert_eq!(object.source(), None);
        assert_eq!(object.base().reference_count(), 1);
        assert_eq!(p.unregister_data(out).unwrap(), Release::Destroyed);
        assert_eq!(p.data_count(), 0);
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn test_double_release_panics() {
        let mut p = Pipeline::new();
        let d = p.add_data(ExtentType::Structured);
        p.unregister_data(d).unwrap();
        let _ = p.unregister_data(d);
    }

    #[test]
    fn test_inputs_hold_references() {
        let mut p = Pipeline::new();
        let a = image_source(&mut p);
        let f = p.add_node(BuiltinNode::ShiftScale(ShiftScaleFilter::default()));
        let a_out = p.output(a, 0).unwrap().unwrap();
        p.set_input(f, 0, Some(a_out)).unwrap();
        assert_eq!(p.data(a_out).unwrap().base().reference_count(), 2);
        assert!(p.data(a_out).unwrap().is_consumer(f));

        p.remove_input(f, a_out).unwrap();
        assert!(p.node(f).unwrap().inputs().is_empty());
        assert!(!p.data(a_out).unwrap().is_consumer(f));
        assert_eq!(p.data(a_out).unwrap().base().reference_count(), 1);

        assert_eq!(
            p.remove_input(f, a_out),
            Err(PipelineError::NotAnInput { node: f, data: a_out })
        );
    }

    #[test]
    fn test_missing_required_input_fails_without_touching_outputs() {
        let mut p = Pipeline::new();
        let f = p.add_node(BuiltinNode::MeanFilter(MeanFilter::new(1)));
        p.update_node(f).unwrap();
        assert!(p.last_outcome(f).unwrap().is_failed());
        assert_eq!(p.node(f).unwrap().execute_count(), 0);
        let out = p.output(f, 0).unwrap().unwrap();
        assert_eq!(p.data(out).unwrap().update_time(), TimeStamp::NEVER);
    }

    #[test]
    fn test_algorithm_mut_marks_node_modified() {
        let mut p = Pipeline::new();
        let a = image_source(&mut p);
        p.update_node(a).unwrap();
        let before = p.node(a).unwrap().mtime();
        if let Some(BuiltinNode::ImageSource(s)) = p.algorithm_mut(a).unwrap().as_builtin_mut() {
            s.set_fill_value(3.0);
        }
        assert!(p.node(a).unwrap().mtime() > before);
        p.update_node(a).unwrap();
        assert_eq!(p.node(a).unwrap().execute_count(), 2);
        let out = p.output(a, 0).unwrap().unwrap();
        assert_eq!(p.data(out).unwrap().scalar_at(0, 0, 0), Some(3.0));
    }

    #[test]
    fn test_missing_required_input_message() {
        assert_eq!(
            missing_required_input(&[None], 1).as_deref(),
            Some("Required input 0 is not assigned")
        );
        assert!(missing_required_input(&[], 0).is_none());
        assert!(missing_required_input(&[], 1).is_some());
    }
}
