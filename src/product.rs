use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A product specification document as stored in the table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub brand: String,
    pub specifications: Map<String, Value>, // per-category, no fixed schema
    pub created_at: String,
    pub updated_at: String,
}

/// A dataset entry: a product before it has been written, so without timestamps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeedProduct {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub brand: String,
    pub specifications: Map<String, Value>,
}

impl SeedProduct {
    /// Turns the entry into a stored record written at `at`.
    pub fn stamp(&self, at: DateTime<Utc>) -> Product {
        let ts = iso_timestamp(at);
        Product {
            product_id: self.product_id.clone(),
            product_name: self.product_name.clone(),
            category: self.category.clone(),
            brand: self.brand.clone(),
            specifications: self.specifications.clone(),
            created_at: ts.clone(),
            updated_at: ts,
        }
    }
}

/// `2024-05-01T12:00:00.000Z`
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
