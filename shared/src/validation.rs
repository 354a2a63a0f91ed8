//! Validation utilities for ledger inputs

use rust_decimal::Decimal;
use validator::ValidationErrors;

use crate::ledger::LedgerError;

// ============================================================================
// Quantity Validations
// ============================================================================

/// Coefficients convert pieces to quantity and must be strictly positive
pub fn validate_coefficient(coefficient: Decimal) -> Result<(), &'static str> {
    if coefficient <= Decimal::ZERO {
        return Err("Coefficient must be greater than zero");
    }
    Ok(())
}

pub fn validate_positive(value: Decimal) -> Result<(), &'static str> {
    if value <= Decimal::ZERO {
        return Err("Value must be greater than zero");
    }
    Ok(())
}

pub fn validate_non_negative(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO {
        return Err("Value cannot be negative");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Job codes: 1-32 chars, alphanumeric plus '-', '_' and '/'
pub fn validate_job_code(code: &str) -> Result<(), &'static str> {
    if code.is_empty() || code.len() > 32 {
        return Err("Job code must be 1-32 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '/')
    {
        return Err("Job code may only contain letters, digits, '-', '_' and '/'");
    }
    Ok(())
}

/// Italian VAT number (partita IVA): 11 digits with a Luhn-style check digit
pub fn validate_vat_number(vat: &str) -> Result<(), &'static str> {
    let vat = vat.trim().trim_start_matches("IT");
    if vat.len() != 11 || !vat.chars().all(|c| c.is_ascii_digit()) {
        return Err("VAT number must be 11 digits");
    }
    let digits: Vec<u32> = vat.chars().filter_map(|c| c.to_digit(10)).collect();
    let mut sum = 0;
    for (i, digit) in digits.iter().take(10).enumerate() {
        if i % 2 == 0 {
            sum += digit;
        } else {
            let doubled = digit * 2;
            sum += if doubled > 9 { doubled - 9 } else { doubled };
        }
    }
    let check = (10 - sum % 10) % 10;
    if check != digits[10] {
        return Err("Invalid VAT number check digit");
    }
    Ok(())
}

/// Map derive-validator errors to the first offending field
pub fn first_validation_error(errors: ValidationErrors) -> LedgerError {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| *field);
    match fields.first() {
        Some((field, errs)) => {
            let message = errs
                .first()
                .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| format!("Invalid value for {}", field));
            LedgerError::validation(*field, message)
        }
        None => LedgerError::validation("input", "Invalid input"),
    }
}
