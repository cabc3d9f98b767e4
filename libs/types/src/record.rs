//! Sparse merged records
//!
//! A `MergedRecord` is keyed by a primary-series timestamp. Secondary fields
//! are present only when a secondary series had a sample at exactly that
//! timestamp; absent fields are omitted from JSON, never written as zero.

use serde::{Deserialize, Serialize};

/// Field a secondary series contributes to a merged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesField {
    Buys,
    Sells,
}

impl SeriesField {
    /// Route a series by its `name` label.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "buys" => Some(SeriesField::Buys),
            "sells" => Some(SeriesField::Sells),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesField::Buys => "buys",
            SeriesField::Sells => "sells",
        }
    }
}

/// One time-aligned output row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MergedRecord {
    pub time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buys: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sells: Option<f64>,
}

impl MergedRecord {
    /// Record for a primary sample.
    pub fn priced(time: i64, price: f64) -> Self {
        Self {
            time,
            price: Some(price),
            ..Self::default()
        }
    }

    /// Set a secondary field.
    pub fn set(&mut self, field: SeriesField, value: f64) {
        match field {
            SeriesField::Buys => self.buys = Some(value),
            SeriesField::Sells => self.sells = Some(value),
        }
    }

    /// Read a secondary field.
    pub fn get(&self, field: SeriesField) -> Option<f64> {
        match field {
            SeriesField::Buys => self.buys,
            SeriesField::Sells => self.sells,
        }
    }
}
