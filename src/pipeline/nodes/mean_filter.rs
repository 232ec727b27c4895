//! MeanFilter node: neighbourhood mean over a structured input.
//!
//! Each output point is the mean of the input points within `radius` along
//! every axis. To produce an update extent `E` the filter needs `E` grown by
//! `radius` from its input, clamped to what the input can provide.

use crate::pipeline::extent::{Extent, ExtentType};
use crate::pipeline::field_data::DataArray;
use crate::pipeline::node::{ExecuteContext, RequestContext};
use crate::pipeline::port::PortDescriptor;
use crate::pipeline::PipelineResult;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", ExtentType::Structured),
    PortDescriptor::output("out", ExtentType::Structured),
];

pub struct MeanFilter {
    radius: i32,
}

impl MeanFilter {
    pub fn new(radius: i32) -> Self {
        Self {
            radius: radius.max(0),
        }
    }

    pub fn name(&self) -> &str {
        "MeanFilter"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: i32) {
        self.radius = radius.max(0);
    }

    pub fn compute_input_update_extents(&mut self, ctx: &mut RequestContext) {
        let requested = ctx.request().update_extent;
        let radius = self.radius;
        if let Some(input) = ctx.input_mut(0) {
            let needed = if requested.is_empty() {
                Extent::EMPTY
            } else {
                requested.grow(radius).clamp_to(&input.whole_extent())
            };
            input.set_update_extent(needed);
        }
    }

    pub fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let input = ctx
            .input(0)
            .ok_or_else(|| ctx.error("MeanFilter has no input"))?;
        let scalars = input
            .scalars()
            .ok_or_else(|| ctx.error("MeanFilter input has no scalars"))?;
        let in_extent = input.extent();
        let name = scalars.name().to_string();

        let index = ctx.output_index().unwrap_or(0);
        let Some(output) = ctx.output_mut(index) else {
            return Ok(());
        };
        let out_extent = output.update_extent().clamp_to(&in_extent);

        let mut values = Vec::with_capacity(out_extent.num_points());
        for [i, j, k] in out_extent.points() {
            let window = Extent::new(i, i, j, j, k, k)
                .grow(self.radius)
                .clamp_to(&in_extent);
            let (sum, count) = window
                .points()
                .filter_map(|[x, y, z]| input.scalar_at(x, y, z))
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            values.push(if count > 0 { sum / count as f64 } else { 0.0 });
        }

        output.set_extent(out_extent);
        output.set_scalars(DataArray::new(name, values))?;
        Ok(())
    }
}

impl Default for MeanFilter {
    fn default() -> Self {
        Self::new(1)
    }
}
