//! Delivery note composer tests
//!
//! Tests for composing and saving a DDT including:
//! - Header and line validation
//! - Batch remainder checks across lines sharing a batch
//! - Returns limited by what is at the job site
//! - Generated movements and the printable layout

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::ledger::{
    batch_remaining, printable_lines, DeliveryNoteDraft, DraftLine, ItemStock, LedgerError,
};
use shared::models::{
    format_delivery_note_number, parse_delivery_note_number, BatchAvailability, DeliveryNoteItem,
    DeliveryNoteType, InventoryItem, Job, JobBatchAvailability, MovementType, PurchaseBatch,
};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn lot(item_id: Uuid, quantity: &str) -> PurchaseBatch {
    PurchaseBatch {
        purchase_item_id: Uuid::new_v4(),
        purchase_id: Uuid::new_v4(),
        item_id,
        reference: "BOLLA-88".to_string(),
        purchase_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap(),
        seq: 1,
        original_quantity: dec(quantity),
        original_pieces: None,
        coefficient: Decimal::ONE,
        unit_price: dec("12"),
        job_id: None,
    }
}

fn availability_of(batches: &[PurchaseBatch]) -> HashMap<Uuid, BatchAvailability> {
    batches
        .iter()
        .map(|b| (b.purchase_item_id, batch_remaining(b, &[])))
        .collect()
}

/// Replayed warehouse stock holding `quantity` of one item
fn warehouse(item_id: Uuid, quantity: &str) -> HashMap<Uuid, ItemStock> {
    let mut stock = ItemStock::empty(item_id);
    stock.quantity = dec(quantity);
    stock.pieces = dec(quantity);
    HashMap::from([(item_id, stock)])
}

fn line(item_id: Uuid, quantity: &str, batch_id: Option<Uuid>) -> DraftLine {
    DraftLine {
        item_id,
        quantity: dec(quantity),
        pieces: None,
        coefficient: Decimal::ONE,
        purchase_item_id: batch_id,
        is_fictitious: false,
    }
}

fn draft(note_type: DeliveryNoteType) -> DeliveryNoteDraft {
    let mut draft = DeliveryNoteDraft::new(note_type);
    draft.header.number = Some(3);
    draft.header.date = NaiveDate::from_ymd_opt(2024, 6, 14);
    draft
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_number_and_date_required() {
        let mut note = DeliveryNoteDraft::new(DeliveryNoteType::Exit);
        note.header.date = NaiveDate::from_ymd_opt(2024, 6, 14);
        assert!(matches!(
            note.validate_header(),
            Err(LedgerError::Validation { ref field, .. }) if field == "number"
        ));

        note.header.number = Some(1);
        note.header.date = None;
        assert!(matches!(
            note.validate_header(),
            Err(LedgerError::Validation { ref field, .. }) if field == "date"
        ));
    }

    #[test]
    fn test_header_text_bounds_checked() {
        let mut note = draft(DeliveryNoteType::Exit);
        note.header.transport_time = Some("x".repeat(65));
        assert!(note.validate_header().is_err());
    }

    #[test]
    fn test_at_least_one_line() {
        let note = draft(DeliveryNoteType::Entry);
        assert!(note.validate_lines().is_err());
    }

    #[test]
    fn test_real_exit_line_needs_batch() {
        let item_id = Uuid::new_v4();
        let mut note = draft(DeliveryNoteType::Exit);
        note.add_line(line(item_id, "2", None));
        assert!(note.validate_lines().is_err());

        note.lines[0].is_fictitious = true;
        assert!(note.validate_lines().is_ok());
    }

    #[test]
    fn test_entry_line_without_batch_is_fine() {
        let mut note = draft(DeliveryNoteType::Entry);
        note.add_line(line(Uuid::new_v4(), "2", None));
        assert!(note.validate_lines().is_ok());
    }

    #[test]
    fn test_lines_sharing_a_batch_are_summed() {
        let item_id = Uuid::new_v4();
        let batch = lot(item_id, "10");
        let availability = availability_of(&[batch.clone()]);
        let stocks = warehouse(item_id, "50");

        let mut note = draft(DeliveryNoteType::Exit);
        note.add_line(line(item_id, "6", Some(batch.purchase_item_id)));
        note.add_line(line(item_id, "6", Some(batch.purchase_item_id)));

        let err = note.validate_for_save(&stocks, &availability, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));

        note.update_line(1, line(item_id, "4", Some(batch.purchase_item_id))).unwrap();
        assert!(note.validate_for_save(&stocks, &availability, &[]).is_ok());
    }

    #[test]
    fn test_lines_limited_by_warehouse_stock_per_item() {
        let item_id = Uuid::new_v4();
        let first = lot(item_id, "100");
        let second = lot(item_id, "100");
        let availability = availability_of(&[first.clone(), second.clone()]);

        // Each lot still has 100 but the warehouse only holds 10
        let mut note = draft(DeliveryNoteType::Exit);
        note.add_line(line(item_id, "6", Some(first.purchase_item_id)));
        note.add_line(line(item_id, "6", Some(second.purchase_item_id)));

        let err = note.validate_for_save(&warehouse(item_id, "10"), &availability, &[]).unwrap_err();
        match err {
            LedgerError::InsufficientStock { requested, available, .. } => {
                assert_eq!(requested, dec("12"));
                assert_eq!(available, dec("10"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(note.validate_for_save(&warehouse(item_id, "12"), &availability, &[]).is_ok());
        assert!(matches!(
            note.validate_for_save(&HashMap::new(), &availability, &[]),
            Err(LedgerError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn test_item_pieces_checked_only_when_every_line_states_them() {
        let item_id = Uuid::new_v4();
        let batch = lot(item_id, "100");
        let availability = availability_of(&[batch.clone()]);
        let mut stocks = warehouse(item_id, "20");
        if let Some(stock) = stocks.get_mut(&item_id) {
            stock.pieces = dec("3");
        }

        let mut note = draft(DeliveryNoteType::Exit);
        let mut with_pieces = line(item_id, "4", Some(batch.purchase_item_id));
        with_pieces.pieces = Some(dec("4"));
        note.add_line(with_pieces);
        assert!(note.validate_for_save(&stocks, &availability, &[]).is_err());

        note.add_line(line(item_id, "4", Some(batch.purchase_item_id)));
        let requests = note.item_requests();
        assert_eq!(requests[&item_id].quantity, dec("8"));
        assert_eq!(requests[&item_id].pieces, None);
        assert!(note.validate_for_save(&stocks, &availability, &[]).is_ok());
    }

    #[test]
    fn test_fictitious_line_skips_batch_check() {
        let item_id = Uuid::new_v4();
        let batch = lot(item_id, "1");
        let availability = availability_of(&[batch.clone()]);

        let mut note = draft(DeliveryNoteType::Sale);
        let mut fictitious = line(item_id, "50", Some(batch.purchase_item_id));
        fictitious.is_fictitious = true;
        note.add_line(fictitious);
        assert!(note.item_requests().is_empty());
        assert!(note.validate_for_save(&HashMap::new(), &availability, &[]).is_ok());
    }

    #[test]
    fn test_batch_of_other_item_rejected() {
        let batch = lot(Uuid::new_v4(), "10");
        let availability = availability_of(&[batch.clone()]);

        let mut note = draft(DeliveryNoteType::Exit);
        note.add_line(line(Uuid::new_v4(), "1", Some(batch.purchase_item_id)));
        assert!(matches!(
            note.validate_for_save(&HashMap::new(), &availability, &[]),
            Err(LedgerError::Validation { .. })
        ));
    }

    #[test]
    fn test_unknown_batch_is_not_found() {
        let mut note = draft(DeliveryNoteType::Exit);
        note.add_line(line(Uuid::new_v4(), "1", Some(Uuid::new_v4())));
        assert!(matches!(
            note.validate_for_save(&HashMap::new(), &HashMap::new(), &[]),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_return_limited_by_site_stock() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let batch = lot(item_id, "20");
        let at_site = vec![JobBatchAvailability {
            job_id,
            batch: batch.clone(),
            quantity_at_site: dec("5"),
            pieces_at_site: dec("5"),
        }];

        let mut note = draft(DeliveryNoteType::Entry);
        note.header.job_id = Some(job_id);
        note.add_line(line(item_id, "6", Some(batch.purchase_item_id)));
        assert!(matches!(
            note.validate_for_save(&HashMap::new(), &HashMap::new(), &at_site),
            Err(LedgerError::InsufficientStock { .. })
        ));

        note.update_line(0, line(item_id, "5", Some(batch.purchase_item_id))).unwrap();
        assert!(note.validate_for_save(&HashMap::new(), &HashMap::new(), &at_site).is_ok());
    }

    #[test]
    fn test_remove_line_out_of_range() {
        let mut note = draft(DeliveryNoteType::Exit);
        assert!(matches!(note.remove_line(0), Err(LedgerError::NotFound(_))));
        note.add_line(line(Uuid::new_v4(), "1", None));
        assert!(note.remove_line(0).is_ok());
        assert!(note.lines.is_empty());
    }

    #[test]
    fn test_apply_job_fills_delivery_location() {
        let job = Job {
            id: Uuid::new_v4(),
            code: "C-2024/017".to_string(),
            name: "Ospedale civile".to_string(),
            client_name: None,
            site_address: Some("Via Roma 1, Torino".to_string()),
            is_active: true,
            created_at: Utc::now(),
        };
        let mut note = draft(DeliveryNoteType::Exit);
        note.apply_job(&job);
        assert_eq!(note.header.job_id, Some(job.id));
        assert_eq!(note.header.delivery_location.as_deref(), Some("Via Roma 1, Torino"));

        note.header.delivery_location = Some("Cantiere B".to_string());
        note.apply_job(&job);
        assert_eq!(note.header.delivery_location.as_deref(), Some("Cantiere B"));
    }

    #[test]
    fn test_generated_movements_follow_note() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let batch_id = Uuid::new_v4();
        let mut note = draft(DeliveryNoteType::Sale);
        note.header.job_id = Some(job_id);
        note.add_line(line(item_id, "2", Some(batch_id)));

        let movements = note.movements("DDT 3/2024");
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::Sale);
        assert_eq!(movements[0].job_id, Some(job_id));
        assert_eq!(movements[0].purchase_item_id, Some(batch_id));
        assert_eq!(movements[0].reference, "DDT 3/2024");
    }

    #[test]
    fn test_display_number_round_trip() {
        assert_eq!(format_delivery_note_number(12, 2024), "12/2024");
        assert_eq!(parse_delivery_note_number("12/2024"), Some((12, 2024)));
        assert_eq!(parse_delivery_note_number("0/2024"), None);
        assert_eq!(parse_delivery_note_number("12-2024"), None);
    }

    #[test]
    fn test_printable_lines_grouped_by_item() {
        let extinguisher = Uuid::new_v4();
        let hose = Uuid::new_v4();
        let note_id = Uuid::new_v4();
        let persisted = |position: i32, item_id: Uuid, quantity: &str| DeliveryNoteItem {
            id: Uuid::new_v4(),
            delivery_note_id: note_id,
            position,
            item_id,
            quantity: dec(quantity),
            pieces: None,
            coefficient: dec("2"),
            purchase_item_id: None,
            is_fictitious: false,
        };
        let lines = vec![
            persisted(3, extinguisher, "4"),
            persisted(1, hose, "10"),
            persisted(2, extinguisher, "2"),
        ];
        let mut catalog = HashMap::new();
        for (id, code, name) in [(extinguisher, "ART-000001", "Estintore"), (hose, "ART-000002", "Manichetta")] {
            catalog.insert(
                id,
                InventoryItem {
                    id,
                    code: code.to_string(),
                    name: name.to_string(),
                    model: Some("UNI 45".to_string()),
                    brand: None,
                    item_type: None,
                    supplier_code: None,
                    unit: "pz".to_string(),
                    coefficient: dec("2"),
                    min_stock: Decimal::ZERO,
                    price: None,
                    description: None,
                    image_url: None,
                    quantity: Decimal::ZERO,
                    pieces: Decimal::ZERO,
                    real_quantity: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
            );
        }

        let printed = printable_lines(&lines, &catalog);
        assert_eq!(printed.len(), 2);
        assert_eq!(printed[0].item_code, "ART-000002");
        assert_eq!(printed[0].description, "Manichetta UNI 45");
        assert_eq!(printed[1].item_code, "ART-000001");
        assert_eq!(printed[1].quantity, dec("6"));
        assert_eq!(printed[1].pieces, dec("3"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A note saves exactly when its lines fit the batch remainder
        #[test]
        fn prop_save_matches_batch_remainder(
            remaining in 1i64..500,
            splits in prop::collection::vec(1i64..200, 1..6)
        ) {
            let item_id = Uuid::new_v4();
            let batch = lot(item_id, &remaining.to_string());
            let availability = availability_of(&[batch.clone()]);

            let mut note = draft(DeliveryNoteType::Exit);
            for quantity in &splits {
                note.add_line(line(item_id, &quantity.to_string(), Some(batch.purchase_item_id)));
            }

            let requested: i64 = splits.iter().sum();
            let stocks = warehouse(item_id, &remaining.to_string());
            let saved = note.validate_for_save(&stocks, &availability, &[]).is_ok();
            prop_assert_eq!(saved, requested <= remaining);
        }

        /// Every line produces exactly one movement of the note's kind
        #[test]
        fn prop_one_movement_per_line(
            quantities in prop::collection::vec(1i64..100, 1..10),
            kind in prop::sample::select(vec![
                DeliveryNoteType::Entry,
                DeliveryNoteType::Exit,
                DeliveryNoteType::Sale,
            ])
        ) {
            let mut note = draft(kind);
            for quantity in &quantities {
                note.add_line(line(Uuid::new_v4(), &quantity.to_string(), None));
            }
            let movements = note.movements("DDT 3/2024");
            prop_assert_eq!(movements.len(), quantities.len());
            prop_assert!(movements.iter().all(|m| m.movement_type == kind.movement_type()));
        }
    }
}
