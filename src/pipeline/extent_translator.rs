//! Piece → structured extent translation.
//!
//! Independent processes of a distributed pipeline must agree on which
//! sub-extent belongs to which piece without talking to each other, so every
//! translation here is a pure function of `(piece, number_of_pieces,
//! ghost_level, whole_extent)` and the translator's own settings.

use crate::pipeline::extent::Extent;
use serde::{Deserialize, Serialize};

/// Which axis the split translator prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    XSlab,
    YSlab,
    ZSlab,
    /// Always split the axis with the most points.
    #[default]
    Block,
}

impl SplitMode {
    fn preferred_axis(self) -> Option<usize> {
        match self {
            SplitMode::XSlab => Some(0),
            SplitMode::YSlab => Some(1),
            SplitMode::ZSlab => Some(2),
            SplitMode::Block => None,
        }
    }
}

/// Strategy used by a data object to turn a piece request into an extent.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtentTranslator {
    /// Recursive bisection of the whole extent.
    Split(SplitMode),
    /// Explicit per-piece extents, typically supplied by a reader.
    Table(TableExtentTranslator),
}

impl Default for ExtentTranslator {
    fn default() -> Self {
        ExtentTranslator::Split(SplitMode::default())
    }
}

impl ExtentTranslator {
    /// Extent owned by `piece` of `number_of_pieces`, grown by `ghost_level`
    /// points along interior boundaries only.
    ///
    /// Returns `None` when the piece holds no points (more pieces than the
    /// extent can be cut into, an invalid piece index, or an unavailable
    /// table entry).
    pub fn piece_to_extent(
        &self,
        piece: i32,
        number_of_pieces: i32,
        ghost_level: i32,
        whole_extent: &Extent,
    ) -> Option<Extent> {
        let (owned, ghost_level) = match self {
            ExtentTranslator::Split(mode) => (
                split_extent(piece, number_of_pieces, whole_extent, *mode)?,
                ghost_level,
            ),
            ExtentTranslator::Table(table) => table.lookup(piece, number_of_pieces, ghost_level)?,
        };
        Some(add_ghost_levels(&owned, ghost_level, whole_extent))
    }

    /// Same as [`piece_to_extent`](Self::piece_to_extent) but maps empty
    /// pieces to [`Extent::EMPTY`], ready to be used as an update extent.
    pub fn piece_to_update_extent(
        &self,
        piece: i32,
        number_of_pieces: i32,
        ghost_level: i32,
        whole_extent: &Extent,
    ) -> Extent {
        self.piece_to_extent(piece, number_of_pieces, ghost_level, whole_extent)
            .unwrap_or(Extent::EMPTY)
    }
}

fn add_ghost_levels(owned: &Extent, ghost_level: i32, whole_extent: &Extent) -> Extent {
    if ghost_level <= 0 {
        return *owned;
    }
    // Clamping keeps the true domain boundary fixed.
    owned.grow(ghost_level).clamp_to(whole_extent)
}

/// Recursive bisection. Halves never share points, so the pieces of one
/// partition are pairwise disjoint and cover `whole` exactly.
pub fn split_extent(
    mut piece: i32,
    mut number_of_pieces: i32,
    whole: &Extent,
    mode: SplitMode,
) -> Option<Extent> {
    if number_of_pieces <= 0 || piece < 0 || piece >= number_of_pieces || whole.is_empty() {
        return None;
    }

    let mut ext = *whole;
    while number_of_pieces > 1 {
        let size = ext.dimensions();
        let axis = match mode.preferred_axis() {
            Some(a) if size[a] > 1 => Some(a),
            _ => largest_splittable_axis(size),
        };

        match axis {
            None => {
                // Nothing left to cut: the first piece takes the rest.
                if piece == 0 {
                    number_of_pieces = 1;
                } else {
                    return None;
                }
            }
            Some(a) => {
                let first_half = number_of_pieces / 2;
                let points = size[a] as i64;
                let in_first = (points * first_half as i64 / number_of_pieces as i64)
                    .clamp(1, points - 1) as i32;
                let mid = ext.min(a) + in_first - 1;
                if piece < first_half {
                    ext.set_axis(a, ext.min(a), mid);
                    number_of_pieces = first_half;
                } else {
                    ext.set_axis(a, mid + 1, ext.max(a));
                    number_of_pieces -= first_half;
                    piece -= first_half;
                }
            }
        }
    }
    Some(ext)
}

fn largest_splittable_axis(size: [usize; 3]) -> Option<usize> {
    if size[2] >= size[1] && size[2] >= size[0] && size[2] > 1 {
        Some(2)
    } else if size[1] >= size[0] && size[1] > 1 {
        Some(1)
    } else if size[0] > 1 {
        Some(0)
    } else {
        None
    }
}

/// Translator programmed with one extent per piece.
///
/// Once the table has a non-zero size it can only be reset to zero or to the
/// same size, so a pipeline can never ask it for a partition it was not
/// built for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableExtentTranslator {
    extents: Vec<Option<Extent>>,
    available: Vec<bool>,
    maximum_ghost_level: i32,
}

impl TableExtentTranslator {
    pub fn new(number_of_pieces: usize) -> Self {
        Self {
            extents: vec![None; number_of_pieces],
            available: vec![true; number_of_pieces],
            maximum_ghost_level: 0,
        }
    }

    pub fn number_of_pieces(&self) -> usize {
        self.extents.len()
    }

    /// Resize the table. Returns false (and leaves the table alone) when
    /// asked to change an already-sized table to a different non-zero size.
    pub fn set_number_of_pieces(&mut self, pieces: usize) -> bool {
        let current = self.extents.len();
        if pieces == current {
            return true;
        }
        if current != 0 && pieces != 0 {
            tracing::error!(
                "Extent table already has {} pieces, cannot resize to {}",
                current,
                pieces
            );
            return false;
        }
        *self = Self {
            maximum_ghost_level: self.maximum_ghost_level,
            ..Self::new(pieces)
        };
        true
    }

    pub fn set_extent_for_piece(&mut self, piece: usize, extent: Extent) {
        match self.extents.get_mut(piece) {
            Some(slot) => *slot = Some(extent),
            None => tracing::error!(
                "Piece {} is out of range for a table of {} pieces",
                piece,
                self.extents.len()
            ),
        }
    }

    pub fn extent_for_piece(&self, piece: usize) -> Option<Extent> {
        self.extents.get(piece).copied().flatten()
    }

    pub fn set_piece_available(&mut self, piece: usize, available: bool) {
        if let Some(slot) = self.available.get_mut(piece) {
            *slot = available;
        }
    }

    pub fn piece_available(&self, piece: usize) -> bool {
        self.available.get(piece).copied().unwrap_or(false)
    }

    pub fn maximum_ghost_level(&self) -> i32 {
        self.maximum_ghost_level
    }

    pub fn set_maximum_ghost_level(&mut self, level: i32) {
        self.maximum_ghost_level = level.max(0);
    }

    fn lookup(&self, piece: i32, number_of_pieces: i32, ghost_level: i32) -> Option<(Extent, i32)> {
        if number_of_pieces as usize != self.extents.len() {
            tracing::error!(
                "Extent table holds {} pieces, request asked for {}",
                self.extents.len(),
                number_of_pieces
            );
            return None;
        }
        let index = usize::try_from(piece).ok()?;
        if !self.piece_available(index) {
            tracing::error!("Piece {} is not available", piece);
            return None;
        }
        let extent = self.extent_for_piece(index)?;
        let ghost_level = if ghost_level > self.maximum_ghost_level {
            tracing::debug!(
                "Ghost level {} clamped to table maximum {}",
                ghost_level,
                self.maximum_ghost_level
            );
            self.maximum_ghost_level
        } else {
            ghost_level
        };
        Some((extent, ghost_level))
    }
}
