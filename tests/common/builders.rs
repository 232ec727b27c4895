//! Test nodes and pipeline builders

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vispipe_rs::pipeline::nodes::{ImageSource, MeanFilter};
use vispipe_rs::pipeline::{
    Algorithm, BuiltinNode, DataArray, DataId, ExecuteContext, Extent, ExtentType,
    InformationContext, NodeId, Pipeline, PipelineResult, PortDescriptor,
};

static SOURCE_PORTS: &[PortDescriptor] = &[PortDescriptor::output("out", ExtentType::Pieces)];

static FILTER_PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", ExtentType::Pieces),
    PortDescriptor::output("out", ExtentType::Pieces),
];

/// Shared record of which test nodes executed, in order.
#[derive(Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<String>>>);

impl ExecutionLog {
    pub fn push(&self, label: &str) {
        self.0.lock().unwrap().push(label.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Unstructured source producing `points_per_piece` copies of `value` for
/// whatever piece it is asked for.
pub struct CountingSource {
    label: String,
    value: f64,
    points_per_piece: usize,
    maximum_number_of_pieces: i32,
    executions: Arc<AtomicUsize>,
    log: Option<ExecutionLog>,
}

impl CountingSource {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            value: 1.0,
            points_per_piece: 4,
            maximum_number_of_pieces: -1,
            executions: Arc::new(AtomicUsize::new(0)),
            log: None,
        }
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn points_per_piece(mut self, points: usize) -> Self {
        self.points_per_piece = points;
        self
    }

    /// Declare how many pieces this source can produce.
    pub fn maximum_number_of_pieces(mut self, max: i32) -> Self {
        self.maximum_number_of_pieces = max;
        self
    }

    pub fn log(mut self, log: ExecutionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.executions.clone()
    }
}

impl Algorithm for CountingSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn ports(&self) -> &[PortDescriptor] {
        SOURCE_PORTS
    }

    fn execute_information(&mut self, ctx: &mut InformationContext) {
        for output in ctx.outputs_mut() {
            output.set_maximum_number_of_pieces(self.maximum_number_of_pieces);
        }
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.push(&self.label);
        }
        ctx.update_progress(0.5);
        if ctx.abort_requested() {
            return Ok(());
        }
        if let Some(output) = ctx.output_mut(0) {
            output.set_scalars(DataArray::filled(
                "Counting",
                self.points_per_piece,
                self.value,
            ))?;
        }
        Ok(())
    }
}

/// Unstructured filter copying its input scalars, optionally failing.
pub struct CountingFilter {
    label: String,
    fail: bool,
    executions: Arc<AtomicUsize>,
    log: Option<ExecutionLog>,
}

impl CountingFilter {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            fail: false,
            executions: Arc::new(AtomicUsize::new(0)),
            log: None,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn log(mut self, log: ExecutionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.executions.clone()
    }
}

impl Algorithm for CountingFilter {
    fn name(&self) -> &str {
        &self.label
    }

    fn ports(&self) -> &[PortDescriptor] {
        FILTER_PORTS
    }

    fn execute(&mut self, ctx: &mut ExecuteContext) -> PipelineResult<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.push(&self.label);
        }
        if self.fail {
            return Err(ctx.error(format!("{} refused to run", self.label)));
        }
        let values = ctx
            .input(0)
            .and_then(|input| input.scalars())
            .map(|s| s.values().to_vec())
            .unwrap_or_default();
        if let Some(output) = ctx.output_mut(0) {
            output.set_scalars(DataArray::new("Counting", values))?;
        }
        Ok(())
    }
}

/// Add a boxed test node to `pipeline`.
pub fn add_plugin(pipeline: &mut Pipeline, node: impl Algorithm + 'static) -> NodeId {
    let boxed: Box<dyn Algorithm> = Box::new(node);
    pipeline.add_node(boxed)
}

/// An image source feeding a mean filter.
pub struct ImageChain {
    pub source: NodeId,
    pub filter: NodeId,
    pub image: DataId,
    pub smoothed: DataId,
}

pub fn image_chain(pipeline: &mut Pipeline, whole_extent: Extent, radius: i32) -> ImageChain {
    let source = pipeline.add_node(BuiltinNode::ImageSource(ImageSource::new(
        whole_extent,
        3.0,
    )));
    let filter = pipeline.add_node(BuiltinNode::MeanFilter(MeanFilter::new(radius)));
    let image = super::first_output(pipeline, source);
    pipeline.set_input(filter, 0, Some(image)).unwrap();
    let smoothed = super::first_output(pipeline, filter);
    ImageChain {
        source,
        filter,
        image,
        smoothed,
    }
}

/// A counting source feeding a counting filter.
pub struct CountingChain {
    pub source: NodeId,
    pub filter: NodeId,
    pub source_runs: Arc<AtomicUsize>,
    pub filter_runs: Arc<AtomicUsize>,
    pub output: DataId,
}

pub fn counting_chain(pipeline: &mut Pipeline, source: CountingSource) -> CountingChain {
    let source_runs = source.counter();
    let filter = CountingFilter::new("filter");
    let filter_runs = filter.counter();
    let source = add_plugin(pipeline, source);
    let filter = add_plugin(pipeline, filter);
    let produced = super::first_output(pipeline, source);
    pipeline.set_input(filter, 0, Some(produced)).unwrap();
    let output = super::first_output(pipeline, filter);
    CountingChain {
        source,
        filter,
        source_runs,
        filter_runs,
        output,
    }
}
