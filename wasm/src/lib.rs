//! WebAssembly module for the fire-safety stock ledger
//!
//! Provides client-side computation for:
//! - Pieces/quantity conversion while a line is edited
//! - Movement direction per observer
//! - FIFO batch suggestions and purchase price warnings
//! - Offline delivery note validation

use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

use shared::ledger::{
    checked_to_pieces, checked_to_quantity, direction, has_missing_prices, parse_decimal, suggest_fifo,
    DeliveryNoteDraft, Perspective, QuantityPair,
};
use shared::models::{format_delivery_note_number, BatchAvailability, MovementType, PurchaseItem};
use shared::validation::validate_vat_number;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Set up panic hook for better error messages in browser console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn to_js(message: String) -> JsValue {
    web_sys::console::warn_1(&JsValue::from_str(&message));
    JsValue::from_str(&message)
}

/// Two-decimal rendering used by the form fields
fn fmt2(value: Decimal) -> String {
    format!("{:.2}", value)
}

fn parse_coefficient(raw: &str) -> Result<Decimal, String> {
    parse_decimal(raw)
        .filter(|c| *c > Decimal::ZERO)
        .ok_or_else(|| format!("Invalid coefficient '{}'", raw))
}

fn parse_perspective(raw: &str) -> Result<Perspective, String> {
    match raw {
        "warehouse" => Ok(Perspective::Warehouse),
        "job_site" => Ok(Perspective::JobSite),
        other => Err(format!("Unknown perspective '{}'", other)),
    }
}

fn direction_of(movement_type: &str, perspective: &str) -> Result<&'static str, String> {
    let kind = MovementType::from_str(movement_type)
        .ok_or_else(|| format!("Unknown movement type '{}'", movement_type))?;
    Ok(direction(kind, parse_perspective(perspective)?).as_str())
}

fn fifo_for(available_json: &str, requested: &str) -> Result<String, String> {
    let available: Vec<BatchAvailability> =
        serde_json::from_str(available_json).map_err(|e| format!("Invalid batches JSON: {}", e))?;
    let requested = parse_decimal(requested).ok_or_else(|| format!("Invalid quantity '{}'", requested))?;
    let suggestion = suggest_fifo(&available, requested);
    serde_json::to_string(&suggestion).map_err(|e| e.to_string())
}

fn missing_prices_in(lines_json: &str) -> Result<bool, String> {
    let lines: Vec<PurchaseItem> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid lines JSON: {}", e))?;
    Ok(has_missing_prices(&lines))
}

fn check_draft(draft_json: &str) -> Result<(), String> {
    let draft: DeliveryNoteDraft =
        serde_json::from_str(draft_json).map_err(|e| format!("Invalid delivery note JSON: {}", e))?;
    draft.validate_header().map_err(|e| e.to_string())?;
    draft.validate_lines().map_err(|e| e.to_string())
}

/// Quantity for a number of pieces; `None` when either input is not a number
#[wasm_bindgen]
pub fn pieces_to_quantity(pieces: &str, coefficient: &str) -> Option<String> {
    let coefficient = parse_coefficient(coefficient).ok()?;
    parse_decimal(pieces)
        .and_then(|p| checked_to_quantity(p, coefficient))
        .map(fmt2)
}

#[wasm_bindgen]
pub fn quantity_to_pieces(quantity: &str, coefficient: &str) -> Option<String> {
    let coefficient = parse_coefficient(coefficient).ok()?;
    parse_decimal(quantity)
        .and_then(|q| checked_to_pieces(q, coefficient))
        .map(fmt2)
}

/// Pieces/quantity pair bound to a form line
#[wasm_bindgen]
pub struct QuantityEditor {
    pair: QuantityPair,
}

#[wasm_bindgen]
impl QuantityEditor {
    #[wasm_bindgen(constructor)]
    pub fn new(coefficient: &str) -> Result<QuantityEditor, JsValue> {
        let coefficient = parse_coefficient(coefficient).map_err(to_js)?;
        Ok(QuantityEditor {
            pair: QuantityPair::new(coefficient),
        })
    }

    pub fn edit_pieces(&mut self, raw: &str) {
        self.pair.edit_pieces(raw);
    }

    pub fn edit_quantity(&mut self, raw: &str) {
        self.pair.edit_quantity(raw);
    }

    /// Item switched: pieces stay, quantity is recomputed
    pub fn set_coefficient(&mut self, coefficient: &str) -> Result<(), JsValue> {
        self.pair.set_coefficient(parse_coefficient(coefficient).map_err(to_js)?);
        Ok(())
    }

    #[wasm_bindgen(getter)]
    pub fn pieces(&self) -> Option<String> {
        self.pair.pieces.map(fmt2)
    }

    #[wasm_bindgen(getter)]
    pub fn quantity(&self) -> Option<String> {
        self.pair.quantity.map(fmt2)
    }
}

/// "in" or "out" for a movement kind seen from "warehouse" or "job_site"
#[wasm_bindgen]
pub fn movement_direction(movement_type: &str, perspective: &str) -> Result<String, JsValue> {
    direction_of(movement_type, perspective)
        .map(str::to_string)
        .map_err(to_js)
}

/// FIFO split of a quantity over the given batch availabilities (JSON in, JSON out)
#[wasm_bindgen]
pub fn suggest_fifo_batches(available_json: &str, requested: &str) -> Result<String, JsValue> {
    fifo_for(available_json, requested).map_err(to_js)
}

#[wasm_bindgen]
pub fn purchase_has_missing_prices(lines_json: &str) -> Result<bool, JsValue> {
    missing_prices_in(lines_json).map_err(to_js)
}

/// Header and line checks that need no server round trip
#[wasm_bindgen]
pub fn validate_delivery_note(draft_json: &str) -> Result<(), JsValue> {
    check_draft(draft_json).map_err(to_js)
}

#[wasm_bindgen]
pub fn delivery_note_number(number: i32, year: i32) -> String {
    format_delivery_note_number(number, year)
}

#[wasm_bindgen]
pub fn is_valid_vat_number(vat: &str) -> bool {
    validate_vat_number(vat).is_ok()
}
