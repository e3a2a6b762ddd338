// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Data table step arguments.
//!
//! This module provides a [`DataTable`] type: the raw rows of cells attached
//! to a step, plus the key/value reinterpretation used to bind two-column
//! tables into structured targets.

use std::fmt;

use serde_json::{Map, Value as Json};

use crate::value::{ConversionError, Value};

/// A data table attached to a step.
///
/// # Example
///
/// ```rust
/// use kubestep::DataTable;
///
/// let table = DataTable::from(vec![
///     vec!["replicas", "3"],
///     vec!["paused", "false"],
/// ]);
///
/// let object = table.to_object().unwrap();
/// assert_eq!(object["replicas"], 3);
/// assert_eq!(object["paused"], false);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataTable {
    rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Creates a new [`DataTable`] from a vector of rows.
    #[must_use]
    pub const fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Returns all rows of this table.
    #[must_use]
    pub fn raw(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Returns the rows following the first (header) one.
    #[must_use]
    pub fn body(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or_default()
    }

    /// Returns the table's rows as `(key, value)` pairs.
    ///
    /// # Errors
    ///
    /// With [`ConversionError::TableMustBeWidthTwo`] if any row doesn't have
    /// exactly 2 cells.
    pub fn key_values(
        &self,
    ) -> Result<Vec<(&str, &str)>, ConversionError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| match cells.as_slice() {
                [key, value] => Ok((key.as_str(), value.as_str())),
                _ => Err(ConversionError::TableMustBeWidthTwo {
                    row,
                    width: cells.len(),
                }),
            })
            .collect()
    }

    /// Reinterprets a two-column table as a JSON object.
    ///
    /// Every value cell is type-sniffed independently (number, boolean, null,
    /// falling back to a string), so the object may be deserialized into an
    /// arbitrary structure afterwards.
    ///
    /// # Errors
    ///
    /// With [`ConversionError::TableMustBeWidthTwo`] if any row doesn't have
    /// exactly 2 cells.
    pub fn to_object(&self) -> Result<Json, ConversionError> {
        let object = self
            .key_values()?
            .into_iter()
            .map(|(k, v)| {
                let value = Value::sniff(v).to_json().unwrap_or(Json::Null);
                (k.to_owned(), value)
            })
            .collect::<Map<_, _>>();
        Ok(Json::Object(object))
    }

    /// Checks if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the number of rows in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns the width (number of cells) of the first row.
    ///
    /// Returns 0 if the table is empty.
    #[must_use]
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

impl From<Vec<Vec<&str>>> for DataTable {
    fn from(rows: Vec<Vec<&str>>) -> Self {
        let string_rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(String::from).collect())
            .collect();
        Self::new(string_rows)
    }
}

impl From<Vec<Vec<String>>> for DataTable {
    fn from(rows: Vec<Vec<String>>) -> Self {
        Self::new(rows)
    }
}

impl From<&gherkin::Table> for DataTable {
    fn from(table: &gherkin::Table) -> Self {
        Self::new(table.rows.clone())
    }
}

impl fmt::Display for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "| {} |", row.join(" | "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn raw_and_body() {
        let table = DataTable::from(vec![
            vec!["name", "age"],
            vec!["Alice", "30"],
            vec!["Bob", "25"],
        ]);

        assert_eq!(table.raw().len(), 3);
        assert_eq!(table.body(), &[vec!["Alice", "30"], vec!["Bob", "25"]]);
        assert_eq!(table.width(), 2);
        assert!(DataTable::default().body().is_empty());
    }

    #[test]
    fn to_object_sniffs_every_cell() {
        let table = DataTable::from(vec![
            vec!["key1", "val1"],
            vec!["key2", "12"],
            vec!["ratio", "0.5"],
            vec!["enabled", "true"],
            vec!["owner", "null"],
        ]);

        assert_eq!(
            table.to_object().unwrap(),
            json!({
                "key1": "val1",
                "key2": 12,
                "ratio": 0.5,
                "enabled": true,
                "owner": null,
            }),
        );
    }

    #[test]
    fn key_values_require_two_columns() {
        let table = DataTable::from(vec![
            vec!["a", "b"],
            vec!["1", "2", "3"],
        ]);

        assert_eq!(
            table.to_object(),
            Err(ConversionError::TableMustBeWidthTwo { row: 1, width: 3 }),
        );
    }

    #[test]
    fn displays_as_gherkin() {
        let table = DataTable::from(vec![vec!["dry run", "true"]]);
        assert_eq!(table.to_string(), "| dry run | true |\n");
    }
}
