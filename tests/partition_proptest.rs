//! Property tests for piece partitioning of structured data

mod common;

use common::first_output;
use proptest::prelude::*;
use std::collections::HashSet;
use vispipe_rs::pipeline::nodes::ImageSource;
use vispipe_rs::pipeline::{BuiltinNode, Extent, ExtentTranslator, Pipeline, SplitMode};

fn split_mode() -> impl Strategy<Value = SplitMode> {
    prop_oneof![
        Just(SplitMode::XSlab),
        Just(SplitMode::YSlab),
        Just(SplitMode::ZSlab),
        Just(SplitMode::Block),
    ]
}

fn whole_extent() -> impl Strategy<Value = Extent> {
    (-3i32..3, 1i32..12, -3i32..3, 1i32..12, 0i32..2, 1i32..5)
        .prop_map(|(x0, nx, y0, ny, z0, nz)| Extent::new(x0, x0 + nx - 1, y0, y0 + ny - 1, z0, z0 + nz - 1))
}

proptest! {
    #[test]
    fn prop_pieces_partition_whole_extent(
        whole in whole_extent(),
        exponent in 0u32..4,
        mode in split_mode(),
    ) {
        let pieces = 1i32 << exponent;
        let translator = ExtentTranslator::Split(mode);
        let mut seen = HashSet::new();

        for piece in 0..pieces {
            let extent = translator.piece_to_update_extent(piece, pieces, 0, &whole);
            prop_assert!(whole.contains(&extent));
            for point in extent.points() {
                prop_assert!(seen.insert(point), "point {:?} owned twice", point);
            }
        }
        prop_assert_eq!(seen.len(), whole.num_points());
    }

    #[test]
    fn prop_ghost_levels_stay_inside_whole_extent(
        whole in whole_extent(),
        exponent in 0u32..4,
        ghost_level in 0i32..3,
    ) {
        let pieces = 1i32 << exponent;
        let translator = ExtentTranslator::default();
        for piece in 0..pieces {
            let owned = translator.piece_to_update_extent(piece, pieces, 0, &whole);
            let ghosted = translator.piece_to_update_extent(piece, pieces, ghost_level, &whole);
            prop_assert!(whole.contains(&ghosted));
            prop_assert!(ghosted.contains(&owned));
        }
    }

    #[test]
    fn prop_streamed_pieces_cover_source(
        whole in whole_extent(),
        exponent in 0u32..4,
    ) {
        let pieces = 1i32 << exponent;
        let mut p = Pipeline::new();
        let source = p.add_node(BuiltinNode::ImageSource(ImageSource::new(whole, 1.0)));
        let output = first_output(&p, source);

        let mut generated = 0;
        for piece in 0..pieces {
            p.request_piece(output, piece, pieces, 0).unwrap();
            let requested = p.data(output).unwrap().update_extent();
            if requested.is_empty() {
                continue;
            }
            p.update(output).unwrap();
            let object = p.data(output).unwrap();
            prop_assert_eq!(object.extent(), requested);
            generated += object.scalars().map_or(0, |s| s.len());
        }
        prop_assert_eq!(generated, whole.num_points());
    }
}
