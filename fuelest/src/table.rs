//! Column-oriented trajectory table.
//!
//! A [`Table`] is the unit both pipelines operate on: named columns of equal
//! length, either numeric ([`Column::Float`], missing values as NaN) or text
//! ([`Column::Str`]). Column insertion order is preserved so augmented output
//! keeps the caller's layout with derived columns appended at the end.

use std::collections::HashMap;

use crate::FuelError;

#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Str(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(values) => values.len(),
            Column::Str(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Column::Float(values) => Some(values),
            Column::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&[String]> {
        match self {
            Column::Str(values) => Some(values),
            Column::Float(_) => None,
        }
    }

    fn permuted(&self, order: &[usize]) -> Column {
        match self {
            Column::Float(values) => {
                Column::Float(order.iter().map(|&i| values[i]).collect())
            }
            Column::Str(values) => {
                Column::Str(order.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    order: Vec<String>,
    columns: HashMap<String, Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, zero for an empty table.
    pub fn n_rows(&self) -> usize {
        self.order
            .first()
            .and_then(|name| self.columns.get(name))
            .map(Column::len)
            .unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.order.len()
    }

    /// Column names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Numeric column accessor; errors if the column is missing or textual.
    pub fn float(&self, name: &str) -> Result<&[f64], FuelError> {
        let column = self
            .columns
            .get(name)
            .ok_or_else(|| FuelError::MissingColumn(name.to_string()))?;
        column
            .as_float()
            .ok_or_else(|| FuelError::NumericColumn(name.to_string()))
    }

    /// Text column accessor; errors if the column is missing or numeric.
    pub fn strs(&self, name: &str) -> Result<&[String], FuelError> {
        let column = self
            .columns
            .get(name)
            .ok_or_else(|| FuelError::MissingColumn(name.to_string()))?;
        column
            .as_str()
            .ok_or_else(|| FuelError::TextColumn(name.to_string()))
    }

    /// Insert or replace a column. A replacement keeps the original position;
    /// a new column is appended. Lengths must agree with the existing rows.
    pub fn insert(&mut self, name: &str, column: Column) -> Result<(), FuelError> {
        if !self.order.is_empty() && column.len() != self.n_rows() {
            return Err(FuelError::LengthMismatch {
                column: name.to_string(),
                expected: self.n_rows(),
                found: column.len(),
            });
        }
        if !self.columns.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    /// A copy of the table with rows rearranged by `order` (a permutation of
    /// row indices).
    pub(crate) fn permuted(&self, order: &[usize]) -> Table {
        let mut out = Table::new();
        for name in &self.order {
            let column = self.columns[name].permuted(order);
            out.order.push(name.clone());
            out.columns.insert(name.clone(), column);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_preserves_order_and_replaces_in_place() {
        let mut table = Table::new();
        table
            .insert("a", Column::Float(vec![1.0, 2.0]))
            .expect("insert a");
        table
            .insert("b", Column::Str(vec!["x".into(), "y".into()]))
            .expect("insert b");
        table
            .insert("a", Column::Float(vec![3.0, 4.0]))
            .expect("replace a");
        assert_eq!(table.names(), ["a", "b"]);
        assert_eq!(table.float("a").unwrap(), [3.0, 4.0]);
        assert_eq!(table.n_rows(), 2);
    }

    #[test]
    fn insert_rejects_length_mismatch() {
        let mut table = Table::new();
        table
            .insert("a", Column::Float(vec![1.0, 2.0]))
            .expect("insert a");
        let err = table.insert("b", Column::Float(vec![1.0])).unwrap_err();
        assert!(matches!(err, FuelError::LengthMismatch { .. }));
    }

    #[test]
    fn typed_accessors_distinguish_columns() {
        let mut table = Table::new();
        table
            .insert("num", Column::Float(vec![1.0]))
            .expect("insert num");
        table
            .insert("txt", Column::Str(vec!["A320".into()]))
            .expect("insert txt");
        assert!(table.float("num").is_ok());
        assert!(matches!(
            table.float("txt"),
            Err(FuelError::NumericColumn(_))
        ));
        assert!(matches!(
            table.float("missing"),
            Err(FuelError::MissingColumn(_))
        ));
        assert!(table.strs("txt").is_ok());
        assert!(matches!(table.strs("num"), Err(FuelError::TextColumn(_))));
    }

    #[test]
    fn permuted_reorders_every_column() {
        let mut table = Table::new();
        table
            .insert("t", Column::Float(vec![30.0, 24.0, 36.0]))
            .expect("insert t");
        table
            .insert(
                "s",
                Column::Str(vec!["b".into(), "a".into(), "c".into()]),
            )
            .expect("insert s");
        let sorted = table.permuted(&[1, 0, 2]);
        assert_eq!(sorted.float("t").unwrap(), [24.0, 30.0, 36.0]);
        assert_eq!(
            sorted.strs("s").unwrap(),
            ["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }
}
