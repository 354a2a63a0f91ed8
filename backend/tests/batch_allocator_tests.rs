//! Batch allocator tests
//!
//! Tests for per-batch remaining stock including:
//! - Remaining = original minus real outbound movements on the batch
//! - FIFO ordering and suggestions
//! - Rejection of over-allocation
//! - Fictitious movements never touch a batch

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::ledger::{
    available_batches, batch_remaining, check_allocation, item_stock, job_batch_availability,
    suggest_fifo, warehouse_valuation, LedgerError, NewMovement,
};
use shared::models::{InventoryItem, Movement, MovementType, PurchaseBatch};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn batch(item_id: Uuid, quantity: &str, price: &str, day: u32, seq: i64) -> PurchaseBatch {
    PurchaseBatch {
        purchase_item_id: Uuid::new_v4(),
        purchase_id: Uuid::new_v4(),
        item_id,
        reference: format!("BOLLA-{}", seq),
        purchase_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        created_at: Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
        seq,
        original_quantity: dec(quantity),
        original_pieces: None,
        coefficient: Decimal::ONE,
        unit_price: dec(price),
        job_id: None,
    }
}

fn movement(
    item_id: Uuid,
    movement_type: MovementType,
    quantity: &str,
    batch_id: Option<Uuid>,
    fictitious: bool,
) -> Movement {
    Movement {
        id: Uuid::new_v4(),
        seq: 0,
        item_id,
        movement_type,
        quantity: dec(quantity),
        pieces: None,
        coefficient: Decimal::ONE,
        reference: "DDT 1/2024".to_string(),
        notes: None,
        job_id: None,
        purchase_item_id: batch_id,
        purchase_id: None,
        delivery_note_item_id: None,
        is_fictitious: fictitious,
        created_at: Utc::now(),
        created_by: None,
    }
}

fn item(id: Uuid, price: Option<&str>) -> InventoryItem {
    InventoryItem {
        id,
        code: "ART-000001".to_string(),
        name: "Estintore CO2 5kg".to_string(),
        model: None,
        brand: None,
        item_type: None,
        supplier_code: None,
        unit: "pz".to_string(),
        coefficient: Decimal::ONE,
        min_stock: Decimal::ZERO,
        price: price.map(dec),
        description: None,
        image_url: None,
        quantity: Decimal::ZERO,
        pieces: Decimal::ZERO,
        real_quantity: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// 100 purchased at 5, exit of 30 on the batch
    #[test]
    fn test_exit_reduces_batch_and_valuation() {
        let item_id = Uuid::new_v4();
        let lot = batch(item_id, "100", "5", 1, 1);
        let movements = vec![
            movement(item_id, MovementType::Purchase, "100", Some(lot.purchase_item_id), false),
            movement(item_id, MovementType::Exit, "30", Some(lot.purchase_item_id), false),
        ];

        let availability = batch_remaining(&lot, &movements);
        assert_eq!(availability.remaining_quantity, dec("70"));

        let valuation = warehouse_valuation(&item(item_id, None), &[lot], &movements);
        assert_eq!(valuation.on_hand, dec("70"));
        assert_eq!(valuation.value, dec("350.00"));
        assert!(!valuation.incomplete);
    }

    #[test]
    fn test_over_allocation_rejected() {
        let item_id = Uuid::new_v4();
        let lot = batch(item_id, "10", "5", 1, 1);
        let availability = batch_remaining(&lot, &[]);

        let err = check_allocation(&availability, dec("15"), None).unwrap_err();
        match err {
            LedgerError::InsufficientStock { requested, available, .. } => {
                assert_eq!(requested, dec("15"));
                assert_eq!(available, dec("10"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(check_allocation(&availability, dec("10"), None).is_ok());
    }

    #[test]
    fn test_over_allocation_on_pieces_rejected() {
        let item_id = Uuid::new_v4();
        let mut lot = batch(item_id, "10", "5", 1, 1);
        lot.coefficient = dec("2");
        let availability = batch_remaining(&lot, &[]);
        assert_eq!(availability.remaining_pieces, dec("5"));
        assert!(check_allocation(&availability, dec("8"), Some(dec("6"))).is_err());
    }

    #[test]
    fn test_fictitious_exit_does_not_consume_batch() {
        let item_id = Uuid::new_v4();
        let lot = batch(item_id, "10", "5", 1, 1);
        let movements = vec![movement(item_id, MovementType::Exit, "8", Some(lot.purchase_item_id), true)];
        assert_eq!(batch_remaining(&lot, &movements).remaining_quantity, dec("10"));
    }

    #[test]
    fn test_returns_do_not_recredit_batch() {
        let item_id = Uuid::new_v4();
        let lot = batch(item_id, "10", "5", 1, 1);
        let movements = vec![
            movement(item_id, MovementType::Unload, "6", Some(lot.purchase_item_id), false),
            movement(item_id, MovementType::Load, "6", Some(lot.purchase_item_id), false),
        ];
        assert_eq!(batch_remaining(&lot, &movements).remaining_quantity, dec("4"));
    }

    #[test]
    fn test_exhausted_batches_not_offered() {
        let item_id = Uuid::new_v4();
        let spent = batch(item_id, "5", "1", 1, 1);
        let open = batch(item_id, "5", "1", 2, 2);
        let movements = vec![movement(item_id, MovementType::Sale, "5", Some(spent.purchase_item_id), false)];

        let offered = available_batches(&[spent, open.clone()], &movements);
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].batch.purchase_item_id, open.purchase_item_id);
    }

    #[test]
    fn test_fifo_takes_oldest_first() {
        let item_id = Uuid::new_v4();
        let newer = batch(item_id, "10", "6", 5, 2);
        let older = batch(item_id, "10", "4", 1, 1);
        let available = available_batches(&[newer.clone(), older.clone()], &[]);

        let suggestion = suggest_fifo(&available, dec("12"));
        assert_eq!(suggestion.allocations.len(), 2);
        assert_eq!(suggestion.allocations[0].purchase_item_id, older.purchase_item_id);
        assert_eq!(suggestion.allocations[0].quantity, dec("10"));
        assert_eq!(suggestion.allocations[1].purchase_item_id, newer.purchase_item_id);
        assert_eq!(suggestion.allocations[1].quantity, dec("2"));
        assert_eq!(suggestion.shortfall, Decimal::ZERO);
    }

    #[test]
    fn test_fifo_tie_broken_by_creation_then_sequence() {
        let item_id = Uuid::new_v4();
        let first = batch(item_id, "3", "1", 1, 7);
        let second = batch(item_id, "3", "1", 1, 8);
        let mut earlier = batch(item_id, "3", "1", 1, 9);
        earlier.created_at = first.created_at - Duration::hours(1);

        let available = available_batches(&[second.clone(), first.clone(), earlier.clone()], &[]);
        let order: Vec<Uuid> = available.iter().map(|a| a.batch.purchase_item_id).collect();
        assert_eq!(
            order,
            vec![earlier.purchase_item_id, first.purchase_item_id, second.purchase_item_id]
        );
    }

    #[test]
    fn test_fifo_reports_shortfall() {
        let item_id = Uuid::new_v4();
        let available = available_batches(&[batch(item_id, "4", "1", 1, 1)], &[]);
        let suggestion = suggest_fifo(&available, dec("10"));
        assert_eq!(suggestion.allocations.len(), 1);
        assert_eq!(suggestion.shortfall, dec("6"));
    }

    #[test]
    fn test_untracked_stock_valued_at_item_price() {
        let item_id = Uuid::new_v4();
        let movements = vec![movement(item_id, MovementType::Load, "4", None, false)];
        let valuation = warehouse_valuation(&item(item_id, Some("2.5")), &[], &movements);
        assert_eq!(valuation.value, dec("10.00"));

        let unpriced = warehouse_valuation(&item(item_id, None), &[], &movements);
        assert!(unpriced.incomplete);
        assert_eq!(unpriced.unpriced_quantity, dec("4"));
    }

    #[test]
    fn test_job_site_batches_follow_unload_and_return() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let lot = batch(item_id, "20", "3", 1, 1);
        let mut unload = movement(item_id, MovementType::Unload, "12", Some(lot.purchase_item_id), false);
        unload.job_id = Some(job_id);
        let mut back = movement(item_id, MovementType::Entry, "5", Some(lot.purchase_item_id), false);
        back.job_id = Some(job_id);

        let at_site = job_batch_availability(job_id, &[lot], &[unload, back]);
        assert_eq!(at_site.len(), 1);
        assert_eq!(at_site[0].quantity_at_site, dec("7"));
    }

    fn outbound_on_batch(item_id: Uuid, movement_type: MovementType, quantity: &str, batch_id: Uuid) -> NewMovement {
        NewMovement {
            item_id,
            movement_type,
            quantity: dec(quantity),
            pieces: None,
            coefficient: Decimal::ONE,
            reference: "DDT 7/2024".to_string(),
            notes: None,
            job_id: None,
            purchase_item_id: Some(batch_id),
            is_fictitious: false,
        }
    }

    /// Unbatched unloads emptied the warehouse; the lot still shows 100
    #[test]
    fn test_batched_exit_checks_warehouse_stock_too() {
        let item_id = Uuid::new_v4();
        let lot = batch(item_id, "100", "5", 1, 1);
        let history = vec![
            movement(item_id, MovementType::Purchase, "100", Some(lot.purchase_item_id), false),
            movement(item_id, MovementType::Unload, "100", None, false),
        ];
        let availability = batch_remaining(&lot, &history);
        assert_eq!(availability.remaining_quantity, dec("100"));
        let stock = item_stock(item_id, &history);
        assert_eq!(stock.quantity, Decimal::ZERO);

        for movement_type in [MovementType::Unload, MovementType::Exit, MovementType::Sale] {
            let request = outbound_on_batch(item_id, movement_type, "50", lot.purchase_item_id);
            let err = request.check_availability(&stock, Some(&availability)).unwrap_err();
            match err {
                LedgerError::InsufficientStock { requested, available, .. } => {
                    assert_eq!(requested, dec("50"));
                    assert_eq!(available, Decimal::ZERO);
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_batched_exit_within_both_limits_accepted() {
        let item_id = Uuid::new_v4();
        let lot = batch(item_id, "100", "5", 1, 1);
        let history = vec![
            movement(item_id, MovementType::Purchase, "100", Some(lot.purchase_item_id), false),
            movement(item_id, MovementType::Unload, "40", None, false),
        ];
        let availability = batch_remaining(&lot, &history);
        let stock = item_stock(item_id, &history);

        let fits = outbound_on_batch(item_id, MovementType::Exit, "60", lot.purchase_item_id);
        assert!(fits.check_availability(&stock, Some(&availability)).is_ok());
        let too_much = outbound_on_batch(item_id, MovementType::Exit, "61", lot.purchase_item_id);
        assert!(too_much.check_availability(&stock, Some(&availability)).is_err());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = i64> {
        1i64..500
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Remaining plus consumed always equals the original quantity
        #[test]
        fn prop_batch_conservation(
            original in 100i64..10_000,
            exits in prop::collection::vec(quantity_strategy(), 0..10)
        ) {
            let item_id = Uuid::new_v4();
            let lot = batch(item_id, &original.to_string(), "1", 1, 1);
            let movements: Vec<Movement> = exits
                .iter()
                .map(|q| movement(item_id, MovementType::Exit, &q.to_string(), Some(lot.purchase_item_id), false))
                .collect();

            let consumed: i64 = exits.iter().sum();
            let remaining = batch_remaining(&lot, &movements).remaining_quantity;
            prop_assert_eq!(remaining + Decimal::from(consumed), Decimal::from(original));
        }

        /// Fictitious movements leave every batch untouched
        #[test]
        fn prop_fictitious_isolation(
            original in 1i64..1_000,
            fictitious in prop::collection::vec(quantity_strategy(), 1..10)
        ) {
            let item_id = Uuid::new_v4();
            let lot = batch(item_id, &original.to_string(), "1", 1, 1);
            let movements: Vec<Movement> = fictitious
                .iter()
                .map(|q| movement(item_id, MovementType::Sale, &q.to_string(), Some(lot.purchase_item_id), true))
                .collect();

            prop_assert_eq!(batch_remaining(&lot, &movements).remaining_quantity, Decimal::from(original));
        }

        /// A FIFO split never exceeds any batch and accounts for the whole request
        #[test]
        fn prop_fifo_split_is_complete(
            sizes in prop::collection::vec(quantity_strategy(), 1..6),
            requested in 1i64..3_000
        ) {
            let item_id = Uuid::new_v4();
            let batches: Vec<PurchaseBatch> = sizes
                .iter()
                .enumerate()
                .map(|(i, q)| batch(item_id, &q.to_string(), "1", (i % 28) as u32 + 1, i as i64))
                .collect();
            let available = available_batches(&batches, &[]);
            let suggestion = suggest_fifo(&available, Decimal::from(requested));

            let allocated: Decimal = suggestion.allocations.iter().map(|a| a.quantity).sum();
            prop_assert_eq!(allocated + suggestion.shortfall, Decimal::from(requested));
            for allocation in &suggestion.allocations {
                let source = available
                    .iter()
                    .find(|a| a.batch.purchase_item_id == allocation.purchase_item_id)
                    .unwrap();
                prop_assert!(allocation.quantity <= source.remaining_quantity);
                prop_assert!(check_allocation(source, allocation.quantity, None).is_ok());
            }
        }

        /// Any request within the remainder is accepted, anything above is refused
        #[test]
        fn prop_allocation_boundary(
            original in 1i64..1_000,
            requested in 1i64..2_000
        ) {
            let item_id = Uuid::new_v4();
            let lot = batch(item_id, &original.to_string(), "1", 1, 1);
            let availability = batch_remaining(&lot, &[]);
            let accepted = check_allocation(&availability, Decimal::from(requested), None).is_ok();
            prop_assert_eq!(accepted, requested <= original);
        }
    }
}
