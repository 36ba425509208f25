//! Frequency encoding of categorical columns.
//!
//! `fit` records, per column, how often each level occurs in the reference
//! table; `transform` replaces every level with that relative frequency.
//! Levels never seen during `fit` encode as 0.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::FeatureValue;

#[derive(Debug, Error, PartialEq)]
pub enum EncoderError {
    #[error("column names must be provided for unlabelled input")]
    MissingColumns,
    #[error("row {row} has {got} values, expected {expected}")]
    WidthMismatch {
        row: usize,
        got: usize,
        expected: usize,
    },
}

// ---------- Table ----------

/// Row-major table with optional column labels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<FeatureValue>>,
}

impl Table {
    pub fn labelled(columns: Vec<String>, rows: Vec<Vec<FeatureValue>>) -> Self {
        Self {
            columns: Some(columns),
            rows,
        }
    }

    pub fn unlabelled(rows: Vec<Vec<FeatureValue>>) -> Self {
        Self {
            columns: None,
            rows,
        }
    }

    /// Values of the named column, or `None` when the table has no such label.
    pub fn column(&self, name: &str) -> Option<Vec<&FeatureValue>> {
        let idx = self.columns.as_ref()?.iter().position(|c| c == name)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }
}

fn check_width(rows: &[Vec<FeatureValue>], expected: usize) -> Result<(), EncoderError> {
    match rows.iter().position(|r| r.len() != expected) {
        Some(row) => Err(EncoderError::WidthMismatch {
            row,
            got: rows[row].len(),
            expected,
        }),
        None => Ok(()),
    }
}

// ---------- Encoder ----------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEncoder {
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    freq_maps: BTreeMap<String, HashMap<String, f64>>,
}

impl FrequencyEncoder {
    /// `columns` names the fields of unlabelled input; labelled input overrides it.
    pub fn new(columns: Option<Vec<String>>) -> Self {
        Self {
            columns,
            freq_maps: BTreeMap::new(),
        }
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn is_fitted(&self) -> bool {
        !self.freq_maps.is_empty()
    }

    /// Names of the columns this encoder rewrites.
    pub fn encoded_columns(&self) -> impl Iterator<Item = &str> {
        self.freq_maps.keys().map(String::as_str)
    }

    pub fn frequencies(&self, column: &str) -> Option<&HashMap<String, f64>> {
        self.freq_maps.get(column)
    }

    /// Stored frequency of `level` in `column`; 0 when either is unknown.
    pub fn frequency(&self, column: &str, level: &str) -> f64 {
        self.freq_maps
            .get(column)
            .and_then(|m| m.get(level))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn fit(&mut self, table: &Table) -> Result<&mut Self, EncoderError> {
        let columns = match (&table.columns, &self.columns) {
            (Some(labels), _) => labels.clone(),
            (None, Some(configured)) => configured.clone(),
            (None, None) => return Err(EncoderError::MissingColumns),
        };
        check_width(&table.rows, columns.len())?;

        let mut freq_maps = BTreeMap::new();
        for (idx, name) in columns.iter().enumerate() {
            let mut counts: HashMap<String, usize> = HashMap::new();
            let mut total = 0usize;
            for level in table.rows.iter().filter_map(|r| r[idx].level()) {
                *counts.entry(level).or_default() += 1;
                total += 1;
            }
            let freqs = counts
                .into_iter()
                .map(|(level, n)| (level, n as f64 / total as f64))
                .collect();
            freq_maps.insert(name.clone(), freqs);
        }

        self.columns = Some(columns);
        self.freq_maps = freq_maps;
        Ok(self)
    }

    /// Encodes a copy of `table`. Columns without a stored map pass through.
    pub fn transform(&self, table: &Table) -> Result<Table, EncoderError> {
        let columns = table
            .columns
            .as_ref()
            .or(self.columns.as_ref())
            .ok_or(EncoderError::MissingColumns)?
            .clone();
        check_width(&table.rows, columns.len())?;

        let mut rows = table.rows.clone();
        for (idx, name) in columns.iter().enumerate() {
            let Some(map) = self.freq_maps.get(name) else {
                continue;
            };
            for row in rows.iter_mut() {
                let freq = row[idx]
                    .level()
                    .and_then(|level| map.get(&level).copied())
                    .unwrap_or(0.0);
                row[idx] = FeatureValue::Number(freq);
            }
        }

        Ok(Table::labelled(columns, rows))
    }

    pub fn fit_transform(&mut self, table: &Table) -> Result<Table, EncoderError> {
        self.fit(table)?;
        self.transform(table)
    }
}
