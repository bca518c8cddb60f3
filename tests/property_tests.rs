//! Property-based tests for the engine's synchronous core.
//!
//! These use proptest to pin invariants of block grouping, face-area
//! arithmetic, selection handling and sync-context muting across a wide
//! range of inputs.

use std::collections::HashSet;

use proptest::prelude::*;
use rust_decimal::Decimal;
use slabstock::config::EngineConfig;
use slabstock::entities::{OrderLine, Quant};
use slabstock::services::availability::SelectableSlab;
use slabstock::sync::SyncContext;
use slabstock::Engine;
use uuid::Uuid;

fn grid_row(
    lot_name: String,
    block: Option<String>,
    height: Option<Decimal>,
    width: Option<Decimal>,
    quantity: u32,
) -> SelectableSlab {
    SelectableSlab {
        quant_id: Uuid::new_v4(),
        lot_id: Uuid::new_v4(),
        lot_name,
        location_id: Uuid::new_v4(),
        location_name: "WH/Zone1".to_string(),
        quantity: Decimal::from(quantity),
        reserved_quantity: Decimal::ZERO,
        block,
        bundle: None,
        container: None,
        customs_entry: None,
        height,
        width,
        thickness: None,
        slab_kind: None,
        color: None,
        photo_url: None,
    }
}

// Strategies for generating test data
fn block_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![Just(None), "BLK-[A-F]".prop_map(Some)]
}

fn dimension_strategy() -> impl Strategy<Value = Option<Decimal>> {
    prop_oneof![Just(None), (1u32..400).prop_map(|v| Some(Decimal::from(v)))]
}

fn slab_strategy() -> impl Strategy<Value = SelectableSlab> {
    (
        "L-[0-9]{4}",
        block_strategy(),
        dimension_strategy(),
        dimension_strategy(),
        1u32..50,
    )
        .prop_map(|(lot_name, block, height, width, quantity)| {
            grid_row(lot_name, block, height, width, quantity)
        })
}

fn slabs_strategy() -> impl Strategy<Value = Vec<SelectableSlab>> {
    prop::collection::vec(slab_strategy(), 0..40)
}

/// Lot-id vectors drawn from a small pool, so duplicates actually occur.
fn clustered_lots_strategy() -> impl Strategy<Value = Vec<Uuid>> {
    prop::collection::vec((1u128..8).prop_map(Uuid::from_u128), 0..20)
}

fn stock_levels_strategy() -> impl Strategy<Value = (u32, u32)> {
    (0u32..10_000).prop_flat_map(|on_hand| (Just(on_hand), 0..=on_hand))
}

// Property: block grouping partitions the listing
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn grouping_partitions_the_rows(rows in slabs_strategy()) {
        let engine = Engine::in_memory(EngineConfig::default(), None);
        let total = rows.len();
        let groups = engine.group_by_block(rows);

        let grouped: usize = groups.iter().map(|group| group.slab_count).sum();
        prop_assert_eq!(grouped, total);

        let blocks: HashSet<&Option<String>> =
            groups.iter().map(|group| &group.block).collect();
        prop_assert_eq!(blocks.len(), groups.len());

        for group in &groups {
            prop_assert_eq!(group.slab_count, group.slabs.len());
            for slab in &group.slabs {
                prop_assert_eq!(&slab.block, &group.block);
            }
        }
    }

    #[test]
    fn groups_come_largest_first_with_blockless_last_on_ties(rows in slabs_strategy()) {
        let engine = Engine::in_memory(EngineConfig::default(), None);
        let groups = engine.group_by_block(rows);

        for pair in groups.windows(2) {
            prop_assert!(pair[0].slab_count >= pair[1].slab_count);
            if pair[0].slab_count == pair[1].slab_count {
                prop_assert!(!(pair[0].block.is_none() && pair[1].block.is_some()));
            }
        }
    }

    #[test]
    fn group_area_sums_member_faces(rows in slabs_strategy()) {
        let engine = Engine::in_memory(EngineConfig::default(), None);
        for group in engine.group_by_block(rows) {
            let expected: Decimal = group
                .slabs
                .iter()
                .filter_map(SelectableSlab::face_area)
                .sum();
            prop_assert_eq!(group.total_area, expected);
        }
    }
}

// Property: face area exists exactly when both dimensions do
proptest! {
    #[test]
    fn face_area_requires_both_dimensions(
        height in dimension_strategy(),
        width in dimension_strategy(),
    ) {
        let slab = grid_row("L-0001".to_string(), None, height, width, 1);
        match (height, width) {
            (Some(h), Some(w)) => prop_assert_eq!(slab.face_area(), Some(h * w)),
            _ => prop_assert_eq!(slab.face_area(), None),
        }
    }
}

// Property: a line's selection set is exactly its distinct lots
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn selection_set_contains_exactly_the_distinct_lots(lots in clustered_lots_strategy()) {
        let mut line = OrderLine::new(Uuid::new_v4(), Uuid::new_v4(), Decimal::ONE);
        line.selected_lot_ids = lots.clone();

        prop_assert_eq!(line.has_selection(), !lots.is_empty());

        let set = line.selection_set();
        prop_assert!(set.len() <= lots.len());
        for lot in &lots {
            prop_assert!(set.contains(lot));
        }
        for lot in &set {
            prop_assert!(lots.contains(lot));
        }
    }
}

// Property: sync-context muting accumulates and never unmutes
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn muting_accumulates_and_never_unmutes(
        confirming in any::<bool>(),
        steps in prop::collection::vec(any::<bool>(), 0..6),
    ) {
        let mut ctx = if confirming {
            SyncContext::confirming()
        } else {
            SyncContext::none()
        };
        for &mute_line in &steps {
            ctx = if mute_line {
                ctx.muting_line_echo()
            } else {
                ctx.muting_operation_echo()
            };
        }

        let line_muted = steps.iter().any(|&mute_line| mute_line);
        let operation_muted = steps.iter().any(|&mute_line| !mute_line);
        prop_assert_eq!(ctx.blocks_line_sync(), confirming || line_muted);
        prop_assert_eq!(ctx.blocks_operation_sync(), confirming || operation_muted);
    }
}

// Property: quant availability arithmetic never goes negative
proptest! {
    #[test]
    fn availability_tracks_reservations_within_on_hand(levels in stock_levels_strategy()) {
        let (on_hand, reserved) = levels;
        let mut quant = Quant::new(None, Uuid::new_v4(), Uuid::new_v4(), Decimal::from(on_hand));
        quant.reserved_quantity = Decimal::from(reserved);

        prop_assert!(quant.available_quantity() >= Decimal::ZERO);
        prop_assert_eq!(
            quant.available_quantity() + quant.reserved_quantity,
            quant.quantity
        );
    }
}
