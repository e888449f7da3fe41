use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::config::FeatureColumns;
use crate::error::{DetectionError, Result};

/// The four identifier columns of a transaction row.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct EntityIds {
    #[serde(rename = "AccountID")]
    pub account_id: String,
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    #[serde(rename = "IP Address")]
    pub ip_address: String,
    #[serde(rename = "MerchantID")]
    pub merchant_id: String,
}

const ID_COLUMNS: [&str; 4] = ["AccountID", "DeviceID", "IP Address", "MerchantID"];

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub ids: EntityIds,
    /// One slot per configured numeric column; `None` for missing or
    /// non-numeric cells.
    pub attributes: Vec<Option<f64>>,
}

impl TransactionRecord {
    pub fn new(
        account_id: &str,
        device_id: &str,
        ip_address: &str,
        merchant_id: &str,
        attributes: Vec<Option<f64>>,
    ) -> Self {
        Self {
            ids: EntityIds {
                account_id: account_id.to_string(),
                device_id: device_id.to_string(),
                ip_address: ip_address.to_string(),
                merchant_id: merchant_id.to_string(),
            },
            attributes,
        }
    }

    /// Attribute vector with every missing or non-finite value replaced by 0.
    pub fn to_feature_vector(&self) -> Vec<f64> {
        self.attributes
            .iter()
            .map(|value| match value {
                Some(v) if v.is_finite() => *v,
                _ => 0.0,
            })
            .collect()
    }
}

/// Lenient numeric parse: anything that is not a finite number is `None`.
pub fn parse_numeric(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

pub fn read_transactions<P: AsRef<Path>>(
    file_path: P,
    columns: &FeatureColumns,
) -> Result<Vec<TransactionRecord>> {
    let file = File::open(file_path)?;
    read_transactions_from(file, columns)
}

pub fn read_transactions_from<R: Read>(
    reader: R,
    columns: &FeatureColumns,
) -> Result<Vec<TransactionRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    for name in ID_COLUMNS {
        if !headers.iter().any(|h| h == name) {
            return Err(DetectionError::MissingColumn {
                name: name.to_string(),
            });
        }
    }

    let positions = columns
        .names()
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| DetectionError::MissingColumn { name: name.clone() })
        })
        .collect::<Result<Vec<usize>>>()?;

    let mut transactions = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let ids: EntityIds = row.deserialize(Some(&headers))?;
        let attributes = positions
            .iter()
            .map(|&pos| row.get(pos).and_then(parse_numeric))
            .collect();
        transactions.push(TransactionRecord { ids, attributes });
    }

    log::debug!("read {} transaction rows", transactions.len());
    Ok(transactions)
}
