//! Inventory catalogue service

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::ledger::{
    item_stock, warehouse_valuation, FifoSuggestion, ItemStock,
    WarehouseValuation,
};
use shared::models::{format_item_code, BatchAvailability, InventoryItem, ItemInput, Movement};
use shared::validation::{validate_coefficient, validate_non_negative};
use sqlx::PgPool;
use uuid::Uuid;

use super::ledger_store::{self, ItemRow, ITEM_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::services::BatchService;

/// Catalogue service; stock figures come from ledger replay
#[derive(Clone)]
pub struct ItemService {
    db: PgPool,
}

/// Ledger balance beside the manually audited count
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub item_id: Uuid,
    pub ledger: ItemStock,
    /// Cached figure before the refresh
    pub cached_quantity: Decimal,
    pub real_quantity: Option<Decimal>,
    /// real − ledger, when a real count exists
    pub difference: Option<Decimal>,
}

/// An item whose replayed stock is under its minimum
#[derive(Debug, Clone, Serialize)]
pub struct LowStockItem {
    pub item_id: Uuid,
    pub code: String,
    pub name: String,
    pub min_stock: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RealQuantityInput {
    pub real_quantity: Option<Decimal>,
}

fn validate_item(input: &ItemInput) -> AppResult<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::validation("name", "Name is required", "Il nome è obbligatorio"));
    }
    if let Some(coefficient) = input.coefficient {
        validate_coefficient(coefficient)
            .map_err(|msg| AppError::validation("coefficient", msg, "Il coefficiente deve essere maggiore di zero"))?;
    }
    if let Some(min_stock) = input.min_stock {
        validate_non_negative(min_stock)
            .map_err(|msg| AppError::validation("min_stock", msg, "La scorta minima non può essere negativa"))?;
    }
    if let Some(price) = input.price {
        validate_non_negative(price)
            .map_err(|msg| AppError::validation("price", msg, "Il prezzo non può essere negativo"))?;
    }
    Ok(())
}

impl ItemService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, search: Option<&str>) -> AppResult<Vec<InventoryItem>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            SELECT {} FROM inventory_items
            WHERE $1::text IS NULL OR name ILIKE $1 OR code ILIKE $1 OR brand ILIKE $1
            ORDER BY code
            "#,
            ITEM_COLUMNS
        ))
        .bind(pattern)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(InventoryItem::from).collect())
    }

    pub async fn get(&self, item_id: Uuid) -> AppResult<InventoryItem> {
        ledger_store::item_by_id(&self.db, item_id).await
    }

    /// Create an item with the next catalogue code
    pub async fn create(&self, input: ItemInput) -> AppResult<InventoryItem> {
        validate_item(&input)?;

        let mut tx = self.db.begin().await?;
        let sequence: i64 = sqlx::query_scalar("SELECT nextval('inventory_item_code_seq')")
            .fetch_one(&mut *tx)
            .await?;
        let code = format_item_code(sequence);

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            INSERT INTO inventory_items (
                code, name, model, brand, item_type, supplier_code, unit, coefficient,
                min_stock, price, description, image_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(&code)
        .bind(input.name.trim())
        .bind(&input.model)
        .bind(&input.brand)
        .bind(&input.item_type)
        .bind(&input.supplier_code)
        .bind(input.unit.as_deref().unwrap_or("pz"))
        .bind(input.coefficient.unwrap_or(Decimal::ONE))
        .bind(input.min_stock.unwrap_or(Decimal::ZERO))
        .bind(input.price)
        .bind(&input.description)
        .bind(&input.image_url)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(code = %code, "item created");
        Ok(row.into())
    }

    /// Update catalogue fields. The coefficient only affects future movements;
    /// stored movements keep the coefficient they were written with.
    pub async fn update(&self, item_id: Uuid, input: ItemInput) -> AppResult<InventoryItem> {
        validate_item(&input)?;
        let existing = self.get(item_id).await?;

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            UPDATE inventory_items
            SET name = $1, model = $2, brand = $3, item_type = $4, supplier_code = $5,
                unit = $6, coefficient = $7, min_stock = $8, price = $9, description = $10,
                image_url = $11, updated_at = NOW()
            WHERE id = $12
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(input.name.trim())
        .bind(&input.model)
        .bind(&input.brand)
        .bind(&input.item_type)
        .bind(&input.supplier_code)
        .bind(input.unit.unwrap_or(existing.unit))
        .bind(input.coefficient.unwrap_or(existing.coefficient))
        .bind(input.min_stock.unwrap_or(existing.min_stock))
        .bind(input.price)
        .bind(&input.description)
        .bind(&input.image_url)
        .bind(item_id)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    /// Delete an item with no history; referenced items are refused
    pub async fn delete(&self, item_id: Uuid) -> AppResult<()> {
        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM movements WHERE item_id = $1)
                OR EXISTS(SELECT 1 FROM purchase_items WHERE item_id = $1)
                OR EXISTS(SELECT 1 FROM delivery_note_items WHERE item_id = $1)
            "#,
        )
        .bind(item_id)
        .fetch_one(&self.db)
        .await?;
        if referenced {
            return Err(AppError::ConstraintViolation(
                "item has movements or document lines and cannot be deleted".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM inventory_items WHERE id = $1")
            .bind(item_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Item".to_string()));
        }
        Ok(())
    }

    /// Record or clear the manually audited count. Never writes a movement.
    pub async fn set_real_quantity(
        &self,
        item_id: Uuid,
        real_quantity: Option<Decimal>,
    ) -> AppResult<InventoryItem> {
        if let Some(value) = real_quantity {
            validate_non_negative(value).map_err(|msg| {
                AppError::validation("real_quantity", msg, "La quantità reale non può essere negativa")
            })?;
        }
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "UPDATE inventory_items SET real_quantity = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
            ITEM_COLUMNS
        ))
        .bind(real_quantity)
        .bind(item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
        Ok(row.into())
    }

    /// Replayed warehouse stock
    pub async fn stock(&self, item_id: Uuid) -> AppResult<ItemStock> {
        self.get(item_id).await?;
        let movements = ledger_store::movements_for_item(&self.db, item_id).await?;
        Ok(item_stock(item_id, &movements))
    }

    /// Refresh the cached balance from the ledger and compare with the audit
    pub async fn reconcile(&self, item_id: Uuid) -> AppResult<Reconciliation> {
        let mut tx = self.db.begin().await?;
        ledger_store::lock_item(&mut tx, item_id).await?;
        let before = ledger_store::item_by_id(&mut *tx, item_id).await?;
        let ledger = ledger_store::refresh_item_cache(&mut tx, item_id).await?;
        tx.commit().await?;

        if before.quantity != ledger.quantity {
            tracing::warn!(
                item_id = %item_id,
                cached = %before.quantity,
                replayed = %ledger.quantity,
                "cached stock drifted from ledger"
            );
        }

        Ok(Reconciliation {
            item_id,
            difference: before.real_quantity.map(|real| real - ledger.quantity),
            cached_quantity: before.quantity,
            real_quantity: before.real_quantity,
            ledger,
        })
    }

    /// Items whose replayed stock is below their minimum
    pub async fn low_stock(&self) -> AppResult<Vec<LowStockItem>> {
        let items = self.list(None).await?;
        let movements = ledger_store::all_movements(&self.db).await?;
        Ok(low_stock_items(&items, &movements))
    }

    pub async fn valuation(&self, item_id: Uuid) -> AppResult<WarehouseValuation> {
        let item = self.get(item_id).await?;
        let batches = ledger_store::batches_for_item(&self.db, item_id).await?;
        let movements = ledger_store::movements_for_item(&self.db, item_id).await?;
        Ok(warehouse_valuation(&item, &batches, &movements))
    }

    pub async fn batches(&self, item_id: Uuid, include_exhausted: bool) -> AppResult<Vec<BatchAvailability>> {
        self.get(item_id).await?;
        BatchService::new(self.db.clone())
            .for_item(item_id, include_exhausted)
            .await
    }

    pub async fn suggest_fifo(&self, item_id: Uuid, quantity: Decimal) -> AppResult<FifoSuggestion> {
        self.get(item_id).await?;
        BatchService::new(self.db.clone()).suggest(item_id, quantity).await
    }

    /// Movements of the item, newest first
    pub async fn movements(&self, item_id: Uuid) -> AppResult<Vec<Movement>> {
        self.get(item_id).await?;
        let mut movements = ledger_store::movements_for_item(&self.db, item_id).await?;
        movements.reverse();
        Ok(movements)
    }
}

pub(crate) fn low_stock_items(items: &[InventoryItem], movements: &[Movement]) -> Vec<LowStockItem> {
    items
        .iter()
        .filter(|item| item.min_stock > Decimal::ZERO)
        .filter_map(|item| {
            let stock = item_stock(item.id, movements);
            (stock.quantity < item.min_stock).then(|| LowStockItem {
                item_id: item.id,
                code: item.code.clone(),
                name: item.name.clone(),
                min_stock: item.min_stock,
                quantity: stock.quantity,
            })
        })
        .collect()
}
