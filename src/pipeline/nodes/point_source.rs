//! PointSource node: pieces source over a fixed number of points.
//!
//! Point `i` carries the value `i`. A request for piece `p` of `n` yields the
//! contiguous range `[total*p/n, total*(p+1)/n)`, widened by the ghost level
//! on both sides.

use crate::pipeline::extent::ExtentType;
use crate::pipeline::field_data::DataArray;
use crate::pipeline::node::{ExecuteContext, InformationContext};
use crate::pipeline::port::PortDescriptor;
use crate::pipeline::PipelineResult;

static PORTS: &[PortDescriptor] = &[PortDescriptor::output("out", ExtentType::Pieces)];

pub const POINT_SCALARS: &str = "PointIds";

pub struct PointSource {
    number_of_points: usize,
    /// Largest piece count this source can serve; negative means unlimited.
    maximum_number_of_pieces: i32,
}

impl PointSource {
    pub fn new(number_of_points: usize) -> Self {
        Self {
            number_of_points,
            maximum_number_of_pieces: -1,
        }
    }

    pub fn name(&self) -> &str {
        "PointSource"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn number_of_points(&self) -> usize {
        self.number_of_points
    }

    pub fn set_number_of_points(&mut self, points: usize) {
        self.number_of_points = points;
    }

    pub fn maximum_number_of_pieces(&self) -> i32 {
        self.maximum_number_of_pieces
    }

    pub fn set_maximum_number_of_pieces(&mut self, max: i32) {
        self.maximum_number_of_pieces = max;
    }

    pub fn execute_information(&mut self, ctx: &mut InformationContext) {
        for output in ctx.outputs_mut() {
            output.set_maximum_number_of_pieces(self.maximum_number_of_pieces);
        }
    }

    /// Point index range held by `piece` of `number_of_pieces`.
    pub fn piece_range(
        &self,
        piece: i32,
        number_of_pieces: i32,
        ghost_level: i32,
    ) -> std::ops::Range<usize> {
        if number_of_pieces <= 0 || piece < 0 || piece >= number_of_pieces {
            return 0..0;
        }
        let total = self.number_of_points;
        let (p, n) = (piece as usize, number_of_pieces as usize);
        let ghost = ghost_level.max(0) as usize;
        let start = total * p / n;
        let end = total * (p + 1) / n;
        start.saturating_sub(ghost)..end.saturating_add(ghost).min(total)
    }

    pub fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let index = ctx.output_index().unwrap_or(0);
        let Some(output) = ctx.output_mut(index) else {
            return Ok(());
        };
        let range = self.piece_range(
            output.update_piece(),
            output.update_number_of_pieces(),
            output.update_ghost_level(),
        );
        let values = range.map(|i| i as f64).collect();
        output.set_scalars(DataArray::new(POINT_SCALARS, values))?;
        Ok(())
    }
}

impl Default for PointSource {
    fn default() -> Self {
        Self::new(100)
    }
}
