//! VisPipe demo - streams an image through a mean filter piece by piece.
//!
//! Usage: `vispipe-rs [CONFIG.toml]`

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vispipe_rs::{
    config::PipelineConfig,
    pipeline::{
        nodes::{ImageSource, MeanFilter},
        BuiltinNode, Pipeline, TopologySnapshot,
    },
};

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = match &config_path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => PipelineConfig::default(),
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VisPipe demo");
    if config_path.is_none() {
        tracing::info!("No configuration given, using defaults");
    }

    let demo = &config.demo;
    let mut pipeline = Pipeline::from_config(&config);
    let source = pipeline.add_node(BuiltinNode::ImageSource(ImageSource::new(
        demo.whole_extent,
        demo.fill_value,
    )));
    let filter = pipeline.add_node(BuiltinNode::MeanFilter(MeanFilter::new(demo.halo_radius)));

    let image = pipeline
        .output(source, 0)?
        .context("Image source has no output")?;
    pipeline.set_input(filter, 0, Some(image))?;
    let smoothed = pipeline
        .output(filter, 0)?
        .context("Mean filter has no output")?;

    for piece in 0..demo.number_of_pieces {
        pipeline.request_piece(smoothed, piece, demo.number_of_pieces, demo.ghost_level)?;
        pipeline.update(smoothed)?;

        let output = pipeline.data(smoothed)?;
        let mean = output
            .scalars()
            .filter(|s| !s.is_empty())
            .map(|s| s.values().iter().sum::<f64>() / s.len() as f64);
        tracing::info!(
            "Piece {}/{}: source read {}, filter produced {} (mean {:?}, {})",
            piece + 1,
            demo.number_of_pieces,
            pipeline.data(image)?.extent(),
            output.extent(),
            mean,
            match pipeline.last_outcome(filter)? {
                outcome if outcome.is_success() => "executed".to_string(),
                outcome => format!("{:?}", outcome),
            }
        );
    }

    let snapshot = TopologySnapshot::capture(&pipeline);
    tracing::debug!("Final topology:\n{}", snapshot.to_json()?);

    tracing::info!("VisPipe demo finished");
    Ok(())
}
