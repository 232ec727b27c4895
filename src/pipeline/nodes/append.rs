//! AppendFilter node: concatenates the scalars of all its inputs.
//!
//! Every input is asked for the same piece as the output. Inputs are
//! updated in ascending locality order by the executor.

use crate::pipeline::extent::ExtentType;
use crate::pipeline::field_data::DataArray;
use crate::pipeline::node::{ExecuteContext, RequestContext};
use crate::pipeline::port::PortDescriptor;
use crate::pipeline::PipelineResult;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", ExtentType::Pieces),
    PortDescriptor::output("out", ExtentType::Pieces),
];

pub const APPENDED_SCALARS: &str = "Appended";

#[derive(Default)]
pub struct AppendFilter;

impl AppendFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &str {
        "Append"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn compute_input_update_extents(&mut self, ctx: &mut RequestContext) {
        let request = *ctx.request();
        for index in 0..ctx.num_inputs() {
            if let Some(input) = ctx.input_mut(index) {
                input.set_update_piece(request.piece);
                input.set_update_number_of_pieces(request.number_of_pieces);
                input.set_update_ghost_level(request.ghost_level);
            }
        }
    }

    pub fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let values: Vec<f64> = ctx
            .inputs()
            .iter()
            .filter_map(|input| input.scalars())
            .flat_map(|s| s.values().iter().copied())
            .collect();
        let index = ctx.output_index().unwrap_or(0);
        if let Some(output) = ctx.output_mut(index) {
            output.set_scalars(DataArray::new(APPENDED_SCALARS, values))?;
        }
        Ok(())
    }
}
