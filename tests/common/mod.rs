//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use vispipe_rs::pipeline::{DataId, NodeId, Pipeline};

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// First output of `node`, which every test node has.
pub fn first_output(pipeline: &Pipeline, node: NodeId) -> DataId {
    pipeline
        .output(node, 0)
        .unwrap()
        .expect("node has no first output")
}

pub fn execute_count(pipeline: &Pipeline, node: NodeId) -> u64 {
    pipeline.node(node).unwrap().execute_count()
}
