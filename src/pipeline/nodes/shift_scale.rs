//! ShiftScale node: point-wise `(x + shift) * scale`.

use crate::pipeline::extent::ExtentType;
use crate::pipeline::field_data::DataArray;
use crate::pipeline::node::ExecuteContext;
use crate::pipeline::port::PortDescriptor;
use crate::pipeline::PipelineResult;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", ExtentType::Structured),
    PortDescriptor::output("out", ExtentType::Structured),
];

pub struct ShiftScaleFilter {
    shift: f64,
    scale: f64,
}

impl ShiftScaleFilter {
    pub fn new(shift: f64, scale: f64) -> Self {
        Self { shift, scale }
    }

    pub fn name(&self) -> &str {
        "ShiftScale"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_shift(&mut self, shift: f64) {
        self.shift = shift;
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        let input = ctx
            .input(0)
            .ok_or_else(|| ctx.error("ShiftScale has no input"))?;
        let index = ctx.output_index().unwrap_or(0);
        let Some(output) = ctx.output_mut(index) else {
            return Ok(());
        };
        output.set_extent(input.extent());
        if let Some(scalars) = input.scalars() {
            let values = scalars
                .values()
                .iter()
                .map(|v| (v + self.shift) * self.scale)
                .collect();
            output.set_scalars(DataArray::new(scalars.name(), values))?;
        }
        Ok(())
    }
}

impl Default for ShiftScaleFilter {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}
