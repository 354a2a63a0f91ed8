//! Reporting service: warehouse listing, dashboard and CSV export

use rust_decimal::Decimal;
use serde::Serialize;
use shared::ledger::{round2, warehouse_stock, JobStockLine};
use shared::models::Capabilities;
use sqlx::PgPool;
use uuid::Uuid;

use super::items::low_stock_items;
use super::ledger_store;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// One row of the warehouse stock listing
#[derive(Debug, Clone, Serialize)]
pub struct WarehouseStockRow {
    pub item_id: Uuid,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub pieces: Decimal,
    pub fictitious_quantity: Decimal,
    pub min_stock: Decimal,
    pub below_minimum: bool,
    /// Generic item price; omitted without cost visibility
    pub unit_price: Option<Decimal>,
}

/// Flat job stock row for CSV export
#[derive(Debug, Clone, Serialize)]
pub struct JobStockCsvRow {
    pub item_code: String,
    pub item_name: String,
    pub fictitious: bool,
    pub source: String,
    pub quantity: Decimal,
    pub pieces: Decimal,
    pub unit_price: Option<Decimal>,
    pub value: Option<Decimal>,
    pub price_missing: bool,
}

impl From<&JobStockLine> for JobStockCsvRow {
    fn from(line: &JobStockLine) -> Self {
        JobStockCsvRow {
            item_code: line.item_code.clone(),
            item_name: line.item_name.clone(),
            fictitious: line.is_fictitious,
            source: line.source_key.clone(),
            quantity: line.quantity,
            pieces: line.pieces,
            unit_price: line.unit_price,
            value: line.value,
            price_missing: line.price_missing,
        }
    }
}

/// Dashboard metrics
#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub item_count: i64,
    pub items_below_minimum: i64,
    pub active_jobs: i64,
    pub draft_purchases: i64,
    pub draft_delivery_notes: i64,
    pub purchases_with_missing_prices: i64,
    /// Real on-hand value at generic item prices; None without cost visibility
    pub stock_value: Option<Decimal>,
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Replayed real and fictitious stock for every item with a balance
    pub async fn warehouse_stock(&self, capabilities: &Capabilities) -> AppResult<Vec<WarehouseStockRow>> {
        let movements = ledger_store::all_movements(&self.db).await?;
        let stock = warehouse_stock(&movements);
        let ids: Vec<Uuid> = stock.iter().map(|s| s.item_id).collect();
        let catalog = ledger_store::catalog(&self.db, &ids).await?;

        let mut rows: Vec<WarehouseStockRow> = stock
            .into_iter()
            .filter_map(|s| {
                let item = catalog.get(&s.item_id)?;
                Some(WarehouseStockRow {
                    item_id: s.item_id,
                    code: item.code.clone(),
                    name: item.name.clone(),
                    unit: item.unit.clone(),
                    quantity: s.quantity,
                    pieces: s.pieces,
                    fictitious_quantity: s.fictitious_quantity,
                    min_stock: item.min_stock,
                    below_minimum: item.min_stock > Decimal::ZERO && s.quantity < item.min_stock,
                    unit_price: item.price.filter(|_| capabilities.can_view_cost),
                })
            })
            .collect();
        rows.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(rows)
    }

    pub async fn dashboard(&self, capabilities: &Capabilities) -> AppResult<DashboardMetrics> {
        let counts: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM inventory_items),
                (SELECT COUNT(*) FROM jobs WHERE is_active),
                (SELECT COUNT(*) FROM purchases WHERE status = 'draft'),
                (SELECT COUNT(*) FROM delivery_notes WHERE status = 'draft')
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let missing_prices: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT purchase_id) FROM purchase_items WHERE price = 0",
        )
        .fetch_one(&self.db)
        .await?;

        let items = super::ItemService::new(self.db.clone()).list(None).await?;
        let movements = ledger_store::all_movements(&self.db).await?;
        let below = low_stock_items(&items, &movements).len() as i64;

        let stock_value = if capabilities.can_view_cost {
            let on_hand = warehouse_stock(&movements);
            let value: Decimal = on_hand
                .iter()
                .filter_map(|s| {
                    let price = items.iter().find(|i| i.id == s.item_id)?.price?;
                    Some(s.quantity.max(Decimal::ZERO) * price)
                })
                .sum();
            Some(round2(value))
        } else {
            None
        };

        Ok(DashboardMetrics {
            item_count: counts.0,
            items_below_minimum: below,
            active_jobs: counts.1,
            draft_purchases: counts.2,
            draft_delivery_notes: counts.3,
            purchases_with_missing_prices: missing_prices,
            stock_value,
        })
    }

    /// Export report data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}
