//! Job (commessa) models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cost-tracked work order or construction site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub client_name: Option<String>,
    /// Site address, copied into delivery notes sent to the job
    pub site_address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    pub code: String,
    pub name: String,
    pub client_name: Option<String>,
    pub site_address: Option<String>,
}

/// Per-job override price used to value fictitious stock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FictitiousPrice {
    pub job_id: Uuid,
    pub item_id: Uuid,
    pub price: Decimal,
    pub updated_at: DateTime<Utc>,
}
