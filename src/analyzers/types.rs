//! Data types flowing through the rollup pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A rating row exactly as stored. Any column may be null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRating {
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    pub rating: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
}

/// A rating row with every field present.
#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub user_id: String,
    pub product_id: String,
    pub rating: f64,
    pub timestamp: NaiveDateTime,
}

impl Rating {
    /// Field-for-field identity. Ratings compare by value, so `-0.0` and
    /// `0.0` are the same rating.
    pub(crate) fn identity(&self) -> (&str, &str, u64, NaiveDateTime) {
        let rating = if self.rating == 0.0 { 0.0 } else { self.rating };
        (&self.user_id, &self.product_id, rating.to_bits(), self.timestamp)
    }
}

/// Mean rating of one product over a period. Serialized as one artifact row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    #[serde(rename = "productid")]
    pub product_id: String,
    pub avg_rating: f64,
}
