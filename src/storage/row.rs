use crate::common::{Error, Result};
use crate::types::field::Field;
use dyn_clone::DynClone;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::slice::Iter;

/// A row iterator.
pub type Rows = Box<dyn RowIterator>;

/// A Row iterator trait, which requires the iterator to be both clonable and
/// object-safe. Cloning lets a consumer replay a result set from the start.
/// It has a blanket implementation for all matching iterators.
pub trait RowIterator: Iterator<Item = Result<Row>> + DynClone {}
impl<I: Iterator<Item = Result<Row>> + DynClone> RowIterator for I {}
dyn_clone::clone_trait_object!(RowIterator);

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Field>,
}

impl From<Vec<Field>> for Row {
    fn from(values: Vec<Field>) -> Self {
        Row { values }
    }
}

impl From<Vec<&Field>> for Row {
    fn from(values: Vec<&Field>) -> Self {
        Row {
            values: values.into_iter().cloned().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = Field;
    type IntoIter = std::vec::IntoIter<Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.values.iter().join(", "))
    }
}

impl Row {
    pub fn iter(&self) -> Iter<Field> {
        self.values.iter()
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn get_field(&self, index: usize) -> Result<Field> {
        Ok(self.values.get(index).ok_or(Error::OutOfBounds)?.clone())
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.values.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_replayable() {
        let rows: Vec<Result<Row>> = vec![
            Ok(Row::from(vec![Field::from(1), Field::from("a")])),
            Ok(Row::from(vec![Field::from(2), Field::Null])),
        ];
        let iter: Rows = Box::new(rows.into_iter());
        let replay = iter.clone();
        assert_eq!(iter.count(), 2);
        let first = replay.map(|r| r.unwrap().to_string()).collect_vec();
        assert_eq!(first, vec!["1, 'a'", "2, NULL"]);
    }

    #[test]
    fn test_get_field_out_of_bounds() {
        let row = Row::from(vec![Field::from(true)]);
        assert_eq!(row.get_field(0).unwrap(), Field::from(true));
        assert_eq!(row.get_field(1), Err(Error::OutOfBounds));
    }
}
