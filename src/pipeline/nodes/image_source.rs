//! ImageSource node: structured source filled with a constant value.
//!
//! Advertises a configurable whole extent and generates scalars only for
//! the extent it is asked for.

use crate::pipeline::extent::{Extent, ExtentType};
use crate::pipeline::field_data::DataArray;
use crate::pipeline::node::{ExecuteContext, InformationContext};
use crate::pipeline::port::PortDescriptor;
use crate::pipeline::PipelineResult;

static PORTS: &[PortDescriptor] = &[PortDescriptor::output("out", ExtentType::Structured)];

/// Name of the scalar array produced by [`ImageSource`].
pub const IMAGE_SCALARS: &str = "ImageScalars";

pub struct ImageSource {
    whole_extent: Extent,
    fill_value: f64,
}

impl ImageSource {
    pub fn new(whole_extent: Extent, fill_value: f64) -> Self {
        Self {
            whole_extent,
            fill_value,
        }
    }

    pub fn name(&self) -> &str {
        "ImageSource"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn whole_extent(&self) -> Extent {
        self.whole_extent
    }

    pub fn set_whole_extent(&mut self, extent: Extent) {
        self.whole_extent = extent;
    }

    pub fn fill_value(&self) -> f64 {
        self.fill_value
    }

    pub fn set_fill_value(&mut self, value: f64) {
        self.fill_value = value;
    }

    pub fn execute_information(&mut self, ctx: &mut InformationContext) {
        for output in ctx.outputs_mut() {
            output.set_whole_extent(self.whole_extent);
        }
    }

    pub fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let index = ctx.output_index().unwrap_or(0);
        let Some(output) = ctx.output_mut(index) else {
            return Ok(());
        };
        let extent = output.update_extent();
        output.set_extent(extent);
        output.set_scalars(DataArray::filled(
            IMAGE_SCALARS,
            extent.num_points(),
            self.fill_value,
        ))?;
        tracing::trace!("ImageSource generated {}", extent);
        Ok(())
    }
}

impl Default for ImageSource {
    fn default() -> Self {
        Self::new(Extent::new(0, 9, 0, 9, 0, 0), 0.0)
    }
}
