//! Stock aggregation tests
//!
//! Tests for ledger replay including:
//! - Warehouse and job-site views from the same movements
//! - Fictitious stock kept apart from real stock
//! - Job-site valuation, overrides and the completeness flag
//! - Exhausted lines excluded from listings

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::ledger::{
    direction, item_stock, job_stock, warehouse_stock, Direction, Perspective, PriceBook,
    PriceSource,
};
use shared::models::{InventoryItem, Movement, MovementType};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct Ledger {
    movements: Vec<Movement>,
}

impl Ledger {
    fn new() -> Self {
        Self { movements: Vec::new() }
    }

    fn push(
        &mut self,
        item_id: Uuid,
        movement_type: MovementType,
        quantity: &str,
        job_id: Option<Uuid>,
        fictitious: bool,
    ) -> &mut Movement {
        let seq = self.movements.len() as i64 + 1;
        self.movements.push(Movement {
            id: Uuid::new_v4(),
            seq,
            item_id,
            movement_type,
            quantity: dec(quantity),
            pieces: None,
            coefficient: Decimal::ONE,
            reference: "DDT 7/2024".to_string(),
            notes: None,
            job_id,
            purchase_item_id: None,
            purchase_id: None,
            delivery_note_item_id: None,
            is_fictitious: fictitious,
            created_at: Utc::now(),
            created_by: None,
        });
        self.movements.last_mut().unwrap()
    }
}

fn catalog_of(items: &[(Uuid, &str, Option<&str>)]) -> HashMap<Uuid, InventoryItem> {
    items
        .iter()
        .map(|(id, code, price)| {
            let item = InventoryItem {
                id: *id,
                code: code.to_string(),
                name: format!("Articolo {}", code),
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
            };
            (*id, item)
        })
        .collect()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_direction_table() {
        use MovementType::*;
        let expected = [
            (Purchase, Direction::In, Direction::In),
            (Load, Direction::In, Direction::Out),
            (Unload, Direction::Out, Direction::In),
            (Entry, Direction::In, Direction::Out),
            (Exit, Direction::Out, Direction::In),
            (Sale, Direction::Out, Direction::Out),
        ];
        for (kind, warehouse, site) in expected {
            assert_eq!(direction(kind, Perspective::Warehouse), warehouse, "{:?}", kind);
            assert_eq!(direction(kind, Perspective::JobSite), site, "{:?}", kind);
        }
    }

    #[test]
    fn test_warehouse_balance_from_replay() {
        let item_id = Uuid::new_v4();
        let mut ledger = Ledger::new();
        ledger.push(item_id, MovementType::Purchase, "100", None, false);
        ledger.push(item_id, MovementType::Unload, "30", None, false);
        ledger.push(item_id, MovementType::Load, "5", None, false);
        ledger.push(item_id, MovementType::Sale, "10", None, false);

        let stock = item_stock(item_id, &ledger.movements);
        assert_eq!(stock.quantity, dec("65"));
        assert_eq!(stock.fictitious_quantity, Decimal::ZERO);
    }

    #[test]
    fn test_fictitious_kept_apart() {
        let item_id = Uuid::new_v4();
        let mut ledger = Ledger::new();
        ledger.push(item_id, MovementType::Purchase, "10", None, false);
        ledger.push(item_id, MovementType::Exit, "20", None, true);

        let stock = item_stock(item_id, &ledger.movements);
        assert_eq!(stock.quantity, dec("10"));
        assert_eq!(stock.fictitious_quantity, dec("-20"));
    }

    #[test]
    fn test_warehouse_listing_drops_exhausted_items() {
        let gone = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let mut ledger = Ledger::new();
        ledger.push(gone, MovementType::Purchase, "4", None, false);
        ledger.push(gone, MovementType::Sale, "4", None, false);
        ledger.push(kept, MovementType::Purchase, "1", None, false);

        let listing = warehouse_stock(&ledger.movements);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].item_id, kept);
    }

    /// A fictitious exit of 20 is only valued through an override
    #[test]
    fn test_fictitious_line_valued_by_override_only() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let catalog = catalog_of(&[(item_id, "ART-000010", Some("9"))]);
        let mut ledger = Ledger::new();
        ledger.push(item_id, MovementType::Exit, "20", Some(job_id), true);

        let view = job_stock(job_id, &ledger.movements, &catalog, &PriceBook::default());
        assert_eq!(view.lines.len(), 1);
        let line = &view.lines[0];
        assert!(line.is_fictitious);
        assert_eq!(line.quantity, dec("20"));
        assert_eq!(line.unit_price, None);
        assert_eq!(line.value, None);
        assert!(!line.price_missing);
        assert!(!view.incomplete);
        assert_eq!(view.total_value, Some(Decimal::ZERO));

        let mut prices = PriceBook::default();
        prices.fictitious_overrides.insert(item_id, dec("7"));
        let view = job_stock(job_id, &ledger.movements, &catalog, &prices);
        let line = &view.lines[0];
        assert_eq!(line.price_source, PriceSource::Override);
        assert_eq!(line.value, Some(dec("140.00")));
        assert_eq!(view.total_value, Some(dec("140.00")));
    }

    #[test]
    fn test_batch_price_wins_over_item_price() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let batch_id = Uuid::new_v4();
        let purchase_id = Uuid::new_v4();
        let catalog = catalog_of(&[(item_id, "ART-000011", Some("9"))]);
        let mut ledger = Ledger::new();
        let unload = ledger.push(item_id, MovementType::Unload, "3", Some(job_id), false);
        unload.purchase_item_id = Some(batch_id);
        unload.purchase_id = Some(purchase_id);

        let mut prices = PriceBook::default();
        prices.batch_prices.insert(batch_id, dec("4.5"));
        let view = job_stock(job_id, &ledger.movements, &catalog, &prices);
        assert_eq!(view.lines[0].source_key, purchase_id.to_string());
        assert_eq!(view.lines[0].price_source, PriceSource::Batch);
        assert_eq!(view.lines[0].value, Some(dec("13.50")));
    }

    #[test]
    fn test_unpriced_real_line_marks_total_incomplete() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let catalog = catalog_of(&[(item_id, "ART-000012", None)]);
        let mut ledger = Ledger::new();
        ledger.push(item_id, MovementType::Unload, "2", Some(job_id), false);

        let view = job_stock(job_id, &ledger.movements, &catalog, &PriceBook::default());
        assert!(view.lines[0].price_missing);
        assert!(view.incomplete);
    }

    /// Pricing the only offender, by item or by batch, clears the flag
    #[test]
    fn test_pricing_sole_unpriced_line_clears_incomplete() {
        let priced = Uuid::new_v4();
        let unpriced = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let batch_id = Uuid::new_v4();
        let mut ledger = Ledger::new();
        ledger.push(priced, MovementType::Unload, "4", Some(job_id), false);
        ledger.push(unpriced, MovementType::Unload, "2", Some(job_id), false).purchase_item_id = Some(batch_id);

        let catalog = catalog_of(&[(priced, "ART-000020", Some("3")), (unpriced, "ART-000021", None)]);
        let view = job_stock(job_id, &ledger.movements, &catalog, &PriceBook::default());
        assert!(view.incomplete);
        assert_eq!(view.lines.iter().filter(|l| l.price_missing).count(), 1);

        let catalog = catalog_of(&[(priced, "ART-000020", Some("3")), (unpriced, "ART-000021", Some("2.5"))]);
        let view = job_stock(job_id, &ledger.movements, &catalog, &PriceBook::default());
        assert!(!view.incomplete);
        assert_eq!(view.total_value, Some(dec("17.00")));

        let catalog = catalog_of(&[(priced, "ART-000020", Some("3")), (unpriced, "ART-000021", None)]);
        let mut prices = PriceBook::default();
        prices.batch_prices.insert(batch_id, dec("6"));
        let view = job_stock(job_id, &ledger.movements, &catalog, &prices);
        assert!(!view.incomplete);
        assert_eq!(view.total_value, Some(dec("24.00")));
    }

    #[test]
    fn test_zero_price_still_counts_as_missing() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let catalog = catalog_of(&[(item_id, "ART-000022", Some("0"))]);
        let mut ledger = Ledger::new();
        ledger.push(item_id, MovementType::Unload, "2", Some(job_id), false);

        let view = job_stock(job_id, &ledger.movements, &catalog, &PriceBook::default());
        assert!(view.incomplete);
    }

    #[test]
    fn test_returned_material_leaves_no_line() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let catalog = catalog_of(&[(item_id, "ART-000013", Some("1"))]);
        let mut ledger = Ledger::new();
        ledger.push(item_id, MovementType::Unload, "10", Some(job_id), false);
        ledger.push(item_id, MovementType::Load, "10", Some(job_id), false);

        let view = job_stock(job_id, &ledger.movements, &catalog, &PriceBook::default());
        assert!(view.lines.is_empty());
    }

    #[test]
    fn test_redacted_view_has_no_cost() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let catalog = catalog_of(&[(item_id, "ART-000014", Some("3"))]);
        let mut ledger = Ledger::new();
        ledger.push(item_id, MovementType::Unload, "2", Some(job_id), false);

        let view = job_stock(job_id, &ledger.movements, &catalog, &PriceBook::default()).redacted();
        assert_eq!(view.total_value, None);
        assert!(view.lines.iter().all(|l| l.unit_price.is_none() && l.value.is_none()));
        assert_eq!(view.lines[0].quantity, dec("2"));
    }

    #[test]
    fn test_other_jobs_ignored() {
        let item_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let catalog = catalog_of(&[(item_id, "ART-000015", Some("3"))]);
        let mut ledger = Ledger::new();
        ledger.push(item_id, MovementType::Unload, "2", Some(Uuid::new_v4()), false);

        let view = job_stock(job_id, &ledger.movements, &catalog, &PriceBook::default());
        assert!(view.lines.is_empty());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn transfer_strategy() -> impl Strategy<Value = (bool, i64)> {
        (any::<bool>(), 1i64..50)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Moving material between warehouse and site never creates or destroys it
        #[test]
        fn prop_transfers_conserve_stock(
            purchased in 100i64..1_000,
            transfers in prop::collection::vec(transfer_strategy(), 0..20)
        ) {
            let item_id = Uuid::new_v4();
            let job_id = Uuid::new_v4();
            let catalog = catalog_of(&[(item_id, "ART-000020", Some("1"))]);
            let mut ledger = Ledger::new();
            ledger.push(item_id, MovementType::Purchase, &purchased.to_string(), None, false);
            for (to_site, quantity) in &transfers {
                let kind = if *to_site { MovementType::Unload } else { MovementType::Load };
                ledger.push(item_id, kind, &quantity.to_string(), Some(job_id), false);
            }

            let warehouse = item_stock(item_id, &ledger.movements).quantity;
            let site: Decimal = job_stock(job_id, &ledger.movements, &catalog, &PriceBook::default())
                .lines
                .iter()
                .map(|l| l.quantity)
                .sum();
            prop_assert_eq!(warehouse + site, Decimal::from(purchased));
        }

        /// Adding fictitious movements never changes real stock
        #[test]
        fn prop_fictitious_never_touches_real_stock(
            real in prop::collection::vec(1i64..100, 1..10),
            fictitious in prop::collection::vec(1i64..100, 1..10)
        ) {
            let item_id = Uuid::new_v4();
            let mut ledger = Ledger::new();
            for q in &real {
                ledger.push(item_id, MovementType::Purchase, &q.to_string(), None, false);
            }
            let before = item_stock(item_id, &ledger.movements);
            for q in &fictitious {
                ledger.push(item_id, MovementType::Exit, &q.to_string(), None, true);
            }
            let after = item_stock(item_id, &ledger.movements);

            prop_assert_eq!(before.quantity, after.quantity);
            prop_assert_eq!(before.pieces, after.pieces);
            let fictitious_total: i64 = fictitious.iter().sum();
            prop_assert_eq!(after.fictitious_quantity, -Decimal::from(fictitious_total));
        }

        /// Job totals only carry fictitious value when an override exists
        #[test]
        fn prop_fictitious_value_requires_override(
            quantity in 1i64..500,
            price in prop::option::of(1i64..100)
        ) {
            let item_id = Uuid::new_v4();
            let job_id = Uuid::new_v4();
            let catalog = catalog_of(&[(item_id, "ART-000030", Some("50"))]);
            let mut ledger = Ledger::new();
            ledger.push(item_id, MovementType::Unload, &quantity.to_string(), Some(job_id), true);

            let mut prices = PriceBook::default();
            if let Some(price) = price {
                prices.fictitious_overrides.insert(item_id, Decimal::from(price));
            }
            let view = job_stock(job_id, &ledger.movements, &catalog, &prices);
            let expected = price.map(|p| Decimal::from(p * quantity)).unwrap_or(Decimal::ZERO);
            prop_assert_eq!(view.total_value, Some(expected));
            prop_assert!(!view.incomplete);
        }

        /// The total is incomplete exactly while some real line has no price
        #[test]
        fn prop_incomplete_tracks_unpriced_lines(
            prices in prop::collection::vec(prop::option::of(1i64..100), 1..8)
        ) {
            let job_id = Uuid::new_v4();
            let mut ledger = Ledger::new();
            let mut entries = Vec::new();
            for (index, price) in prices.iter().enumerate() {
                let item_id = Uuid::new_v4();
                ledger.push(item_id, MovementType::Unload, "3", Some(job_id), false);
                entries.push((item_id, format!("ART-{:06}", index + 1), price.map(|p| p.to_string())));
            }
            let items: Vec<(Uuid, &str, Option<&str>)> = entries
                .iter()
                .map(|(id, code, price)| (*id, code.as_str(), price.as_deref()))
                .collect();

            let view = job_stock(job_id, &ledger.movements, &catalog_of(&items), &PriceBook::default());
            prop_assert_eq!(view.incomplete, prices.iter().any(|p| p.is_none()));

            let all_priced: Vec<(Uuid, &str, Option<&str>)> = items
                .iter()
                .map(|(id, code, price)| (*id, *code, Some(price.unwrap_or("1"))))
                .collect();
            let view = job_stock(job_id, &ledger.movements, &catalog_of(&all_priced), &PriceBook::default());
            prop_assert!(!view.incomplete);
        }
    }
}
