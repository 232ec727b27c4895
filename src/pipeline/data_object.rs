//! The payload a pipeline node produces.
//!
//! A [`DataObject`] carries two kinds of state:
//!
//! - **request state**: what a consumer wants (`update_extent` or
//!   `update_piece` / `update_number_of_pieces`, `update_ghost_level`);
//! - **committed state**: what it currently holds (`extent` or `piece` /
//!   `number_of_pieces`, `ghost_level`) plus the payload itself.
//!
//! Staleness is decided from `update_time` (last regeneration) against
//! `pipeline_mtime` (newest upstream modification), the released flag, and
//! whether the committed state covers the request.

use crate::object::{ObjectBase, TimeStamp};
use crate::object::Clock;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::extent::{Extent, ExtentType, UpdateRequest};
use crate::pipeline::extent_translator::ExtentTranslator;
use crate::pipeline::field_data::{DataArray, FieldData};
use crate::pipeline::id::NodeId;
use std::sync::Arc;

pub struct DataObject {
    base: ObjectBase,
    extent_type: ExtentType,
    /// Producing node. Non-owning: the node owns this object, not the
    /// other way around.
    source: Option<NodeId>,
    consumers: Vec<NodeId>,

    whole_extent: Extent,
    extent: Extent,
    update_extent: Extent,

    piece: i32,
    number_of_pieces: i32,
    maximum_number_of_pieces: i32,
    update_piece: i32,
    update_number_of_pieces: i32,
    ghost_level: i32,
    update_ghost_level: i32,

    update_extent_initialized: bool,
    update_extent_valid: bool,
    request_exact_extent: bool,
    last_update_extent_was_outside: bool,

    pipeline_mtime: TimeStamp,
    update_time: TimeStamp,
    data_released: bool,
    release_data_flag: bool,
    locality: f64,
    extent_translator: ExtentTranslator,

    field_data: FieldData,
    scalars: Option<DataArray>,
}

impl DataObject {
    pub(crate) fn new(extent_type: ExtentType, clock: Arc<Clock>) -> Self {
        Self {
            base: ObjectBase::new("DataObject", clock),
            extent_type,
            source: None,
            consumers: Vec::new(),
            whole_extent: Extent::EMPTY,
            extent: Extent::EMPTY,
            update_extent: Extent::new(0, 0, 0, 0, 0, 0),
            // A user-built object is assumed to be piece 0 of 1.
            piece: -1,
            number_of_pieces: 1,
            maximum_number_of_pieces: -1,
            update_piece: 0,
            update_number_of_pieces: 1,
            ghost_level: 0,
            update_ghost_level: 0,
            update_extent_initialized: false,
            update_extent_valid: true,
            request_exact_extent: false,
            last_update_extent_was_outside: false,
            pipeline_mtime: TimeStamp::NEVER,
            update_time: TimeStamp::NEVER,
            // Data built by hand is assumed to be filled in by its creator.
            data_released: false,
            release_data_flag: false,
            locality: 0.0,
            extent_translator: ExtentTranslator::default(),
            field_data: FieldData::new(),
            scalars: None,
        }
    }

    // ── Object base ──

    pub fn base(&self) -> &ObjectBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    pub fn mtime(&self) -> TimeStamp {
        self.base.mtime()
    }

    pub fn modified(&mut self) {
        self.base.modified();
    }

    pub fn extent_type(&self) -> ExtentType {
        self.extent_type
    }

    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    pub(crate) fn set_source(&mut self, source: Option<NodeId>) {
        if self.source != source {
            tracing::trace!("DataObject source set to {:?}", source);
            self.source = source;
            self.modified();
        }
    }

    // ── Consumers ──

    pub fn consumers(&self) -> &[NodeId] {
        &self.consumers
    }

    pub fn is_consumer(&self, node: NodeId) -> bool {
        self.consumers.contains(&node)
    }

    pub(crate) fn add_consumer(&mut self, node: NodeId) {
        if !self.is_consumer(node) {
            self.consumers.push(node);
        }
    }

    pub(crate) fn remove_consumer(&mut self, node: NodeId) {
        self.consumers.retain(|&c| c != node);
    }

    // ── Committed state ──

    pub fn whole_extent(&self) -> Extent {
        self.whole_extent
    }

    pub fn set_whole_extent(&mut self, extent: Extent) {
        self.whole_extent = extent;
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Set the held extent. For a data object without a producer this is
    /// also its whole extent.
    pub fn set_extent(&mut self, extent: Extent) {
        self.extent = extent;
        self.modified();
    }

    pub fn piece(&self) -> i32 {
        self.piece
    }

    pub fn number_of_pieces(&self) -> i32 {
        self.number_of_pieces
    }

    pub fn ghost_level(&self) -> i32 {
        self.ghost_level
    }

    pub fn maximum_number_of_pieces(&self) -> i32 {
        self.maximum_number_of_pieces
    }

    /// Cap the number of pieces the producer can generate. Negative means
    /// "no limit".
    pub fn set_maximum_number_of_pieces(&mut self, max: i32) {
        self.maximum_number_of_pieces = max;
    }

    pub fn pipeline_mtime(&self) -> TimeStamp {
        self.pipeline_mtime
    }

    pub fn set_pipeline_mtime(&mut self, time: TimeStamp) {
        self.pipeline_mtime = time;
    }

    pub fn update_time(&self) -> TimeStamp {
        self.update_time
    }

    pub fn data_released(&self) -> bool {
        self.data_released
    }

    pub fn locality(&self) -> f64 {
        self.locality
    }

    pub fn set_locality(&mut self, locality: f64) {
        self.locality = locality;
    }

    pub fn extent_translator(&self) -> &ExtentTranslator {
        &self.extent_translator
    }

    pub fn set_extent_translator(&mut self, translator: ExtentTranslator) {
        if self.extent_translator != translator {
            self.extent_translator = translator;
            self.modified();
        }
    }

    // ── Payload ──

    pub fn field_data(&self) -> &FieldData {
        &self.field_data
    }

    pub fn field_data_mut(&mut self) -> &mut FieldData {
        self.modified();
        &mut self.field_data
    }

    pub fn scalars(&self) -> Option<&DataArray> {
        self.scalars.as_ref()
    }

    /// Attach point scalars. Structured data needs one value per point of
    /// the held extent.
    pub fn set_scalars(&mut self, scalars: DataArray) -> PipelineResult<()> {
        if self.extent_type == ExtentType::Structured {
            let expected = self.extent.num_points();
            if scalars.len() != expected {
                return Err(PipelineError::SizeMismatch {
                    expected,
                    actual: scalars.len(),
                });
            }
        }
        self.scalars = Some(scalars);
        self.modified();
        Ok(())
    }

    /// Scalar at structured point `(i, j, k)`, if held.
    pub fn scalar_at(&self, i: i32, j: i32, k: i32) -> Option<f64> {
        let offset = self.extent.point_offset(i, j, k)?;
        self.scalars.as_ref()?.values().get(offset).copied()
    }

    /// Reset to "holds nothing".
    pub fn initialize(&mut self) {
        self.field_data.clear();
        self.scalars = None;
        self.extent = Extent::EMPTY;
        self.piece = -1;
        self.number_of_pieces = 0;
        self.ghost_level = 0;
        self.modified();
    }

    pub(crate) fn prepare_for_new_data(&mut self) {
        self.initialize();
    }

    // ── Request state ──

    pub fn update_extent(&self) -> Extent {
        self.update_extent
    }

    pub fn set_update_extent(&mut self, extent: Extent) {
        self.update_extent = extent;
        self.update_extent_initialized = true;
    }

    pub fn update_piece(&self) -> i32 {
        self.update_piece
    }

    pub fn set_update_piece(&mut self, piece: i32) {
        self.update_piece = piece;
        self.update_extent_initialized = true;
    }

    pub fn update_number_of_pieces(&self) -> i32 {
        self.update_number_of_pieces
    }

    pub fn set_update_number_of_pieces(&mut self, pieces: i32) {
        self.update_number_of_pieces = pieces;
        self.update_extent_initialized = true;
    }

    pub fn update_ghost_level(&self) -> i32 {
        self.update_ghost_level
    }

    pub fn set_update_ghost_level(&mut self, level: i32) {
        self.update_ghost_level = level;
    }

    pub fn update_extent_initialized(&self) -> bool {
        self.update_extent_initialized
    }

    /// Result of the last [`verify_update_extent`](Self::verify_update_extent).
    pub fn update_extent_valid(&self) -> bool {
        self.update_extent_valid
    }

    /// Request everything. The request stays "uninitialized" so it keeps
    /// following the whole extent if that changes later.
    pub fn set_update_extent_to_whole_extent(&mut self) {
        self.update_extent_initialized = false;
        match self.extent_type {
            ExtentType::Pieces => {
                self.update_number_of_pieces = 1;
                self.update_piece = 0;
            }
            ExtentType::Structured => {
                self.update_extent = self.whole_extent;
            }
        }
    }

    pub fn request_exact_extent(&self) -> bool {
        self.request_exact_extent
    }

    pub fn set_request_exact_extent(&mut self, exact: bool) {
        self.request_exact_extent = exact;
    }

    pub fn update_request(&self) -> UpdateRequest {
        UpdateRequest {
            extent_type: self.extent_type,
            whole_extent: self.whole_extent,
            update_extent: self.update_extent,
            piece: self.update_piece,
            number_of_pieces: self.update_number_of_pieces,
            ghost_level: self.update_ghost_level,
        }
    }

    /// Check the request against the whole extent and record the result.
    ///
    /// An invalid request is never enlarged or silently fixed up; the next
    /// data pass leaves this object's committed state untouched.
    pub fn verify_update_extent(&mut self) -> bool {
        let valid = match self.extent_type {
            ExtentType::Pieces => {
                let pieces_ok = self.update_number_of_pieces >= 0
                    && self.update_piece >= 0
                    && (self.update_number_of_pieces == 0
                        || self.update_piece < self.update_number_of_pieces);
                if !pieces_ok {
                    tracing::error!(
                        "Update piece {} of {} is not a valid piece request",
                        self.update_piece,
                        self.update_number_of_pieces
                    );
                }
                pieces_ok && self.update_ghost_level >= 0
            }
            ExtentType::Structured => {
                // Asking for nothing is always satisfiable.
                if self.whole_extent.contains(&self.update_extent) {
                    true
                } else {
                    tracing::error!(
                        "Update extent does not lie within whole extent. Update extent is: {}, whole extent is: {}",
                        self.update_extent,
                        self.whole_extent
                    );
                    false
                }
            }
        };
        self.update_extent_valid = valid;
        valid
    }

    /// Whether the committed state fails to cover the current request.
    pub fn update_extent_is_outside_extent(&self) -> bool {
        match self.extent_type {
            ExtentType::Pieces => {
                self.update_piece != self.piece
                    || self.update_number_of_pieces != self.number_of_pieces
                    || self.update_ghost_level != self.ghost_level
            }
            ExtentType::Structured => !self.extent.contains(&self.update_extent),
        }
    }

    /// Zero-volume extent or zero piece count: the canonical way of asking
    /// a producer for nothing.
    pub fn update_extent_is_empty(&self) -> bool {
        match self.extent_type {
            ExtentType::Pieces => self.update_number_of_pieces == 0,
            ExtentType::Structured => self.update_extent.is_empty(),
        }
    }

    /// The requested piece cannot be produced and is defined to be empty.
    pub fn requested_piece_unavailable(&self) -> bool {
        self.maximum_number_of_pieces > 0 && self.update_piece >= self.maximum_number_of_pieces
    }

    /// The data has to be regenerated before the current request is met.
    pub fn needs_regeneration(&self) -> bool {
        self.update_time < self.pipeline_mtime
            || self.data_released
            || self.update_extent_is_outside_extent()
    }

    pub(crate) fn last_update_extent_was_outside(&self) -> bool {
        self.last_update_extent_was_outside
    }

    pub(crate) fn set_last_update_extent_was_outside(&mut self, outside: bool) {
        self.last_update_extent_was_outside = outside;
    }

    /// Copy the requested piece description onto the committed state.
    pub(crate) fn commit_requested_piece(&mut self) {
        self.piece = self.update_piece;
        self.number_of_pieces = self.update_number_of_pieces;
        self.ghost_level = self.update_ghost_level;
    }

    /// Mark the payload as freshly generated for the current request.
    pub fn data_has_been_generated(&mut self) {
        self.data_released = false;
        self.update_time.modified(self.base.clock());
        self.commit_requested_piece();
    }

    // ── Release ──

    pub fn release_data_flag(&self) -> bool {
        self.release_data_flag
    }

    pub fn set_release_data_flag(&mut self, release: bool) {
        self.release_data_flag = release;
    }

    /// Whether consumers should free this payload once they have used it.
    pub fn should_release_data(&self, global_release_data: bool) -> bool {
        global_release_data || self.release_data_flag
    }

    /// Drop the payload but keep the metadata.
    pub fn release_data(&mut self) {
        self.initialize();
        self.data_released = true;
    }

    // ── Copies ──

    /// Take over the metadata a producer passes downstream by default.
    pub fn copy_information(&mut self, other: &DataObject) {
        if self.extent_type == ExtentType::Structured && other.extent_type == ExtentType::Structured
        {
            self.whole_extent = other.whole_extent;
        } else {
            self.maximum_number_of_pieces = other.maximum_number_of_pieces;
        }
        self.set_extent_translator(other.extent_translator.clone());
    }

    /// Copy payload and committed state, sharing array buffers.
    pub fn shallow_copy(&mut self, other: &DataObject) {
        self.internal_copy(other);
        self.field_data = other.field_data.clone();
        self.scalars = other.scalars.clone();
        self.modified();
    }

    /// Copy payload and committed state into freshly owned buffers.
    pub fn deep_copy(&mut self, other: &DataObject) {
        self.internal_copy(other);
        self.field_data = other.field_data.deep_copy();
        self.scalars = other.scalars.as_ref().map(DataArray::deep_copy);
        self.modified();
    }

    // Request state and pipeline times stay with the receiver.
    fn internal_copy(&mut self, other: &DataObject) {
        self.data_released = other.data_released;
        self.whole_extent = other.whole_extent;
        self.extent = other.extent;
        self.piece = other.piece;
        self.number_of_pieces = other.number_of_pieces;
        self.ghost_level = other.ghost_level;
        self.maximum_number_of_pieces = other.maximum_number_of_pieces;
        self.release_data_flag = other.release_data_flag;
    }

    /// Trim structured payload down to the update extent.
    pub fn crop(&mut self) {
        if self.extent_type != ExtentType::Structured {
            return;
        }
        let target = self.update_extent.clamp_to(&self.extent);
        if target == self.extent || target.is_empty() {
            return;
        }
        let cropped = self.scalars.as_ref().map(|scalars| {
            let values: Vec<f64> = target
                .points()
                .filter_map(|[i, j, k]| {
                    let offset = self.extent.point_offset(i, j, k)?;
                    scalars.values().get(offset).copied()
                })
                .collect();
            DataArray::new(scalars.name(), values)
        });
        self.scalars = cropped;
        tracing::trace!("Cropped {} down to {}", self.extent, target);
        self.extent = target;
    }

    // ── Memory ──

    /// Bytes currently held by the payload.
    pub fn actual_memory_size(&self) -> usize {
        self.field_data.memory_size() + self.scalars.as_ref().map_or(0, DataArray::memory_size)
    }

    /// Bytes one scalar per requested point would need.
    pub fn estimated_memory_size(&self) -> usize {
        match self.extent_type {
            ExtentType::Structured => self.update_extent.num_points() * std::mem::size_of::<f64>(),
            ExtentType::Pieces => 0,
        }
    }
}

impl std::fmt::Debug for DataObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataObject")
            .field("extent_type", &self.extent_type)
            .field("source", &self.source)
            .field("whole_extent", &self.whole_extent)
            .field("extent", &self.extent)
            .field("update_extent", &self.update_extent)
            .field("piece", &(self.piece, self.number_of_pieces))
            .field("update_piece", &(self.update_piece, self.update_number_of_pieces))
            .field("maximum_number_of_pieces", &self.maximum_number_of_pieces)
            .field("pipeline_mtime", &self.pipeline_mtime)
            .field("update_time", &self.update_time)
            .field("data_released", &self.data_released)
            .finish()
    }
}
