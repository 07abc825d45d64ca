//! Tabular batch of raw bars, as returned by historical bar endpoints.
//!
//! A [`BarFrame`] is a loosely-typed table: named columns, one row per bar, and an
//! optional timestamp index. Column names are whatever the producing provider used
//! (`open`, `Open`, `o`, ...); mapping them onto a storage schema is the job of the
//! consumer.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A single cell of a [`BarFrame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Time(DateTime<Utc>),
    Null,
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<DateTime<Utc>> for Cell {
    fn from(v: DateTime<Utc>) -> Self {
        Cell::Time(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::Null, Into::into)
    }
}

/// Shape violations when appending rows.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("row has {got} cells but the frame has {expected} columns")]
    Width { expected: usize, got: usize },

    #[error("frame is indexed; rows need a timestamp")]
    MissingIndex,

    #[error("frame has no index; row timestamps go in a column")]
    UnexpectedIndex,
}

/// Column-named table of raw bar rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarFrame {
    columns: Vec<String>,
    index: Option<Vec<DateTime<Utc>>>,
    rows: Vec<Vec<Cell>>,
}

impl BarFrame {
    /// Frame whose timestamps live in a column.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            index: None,
            rows: Vec::new(),
        }
    }

    /// Frame whose timestamps are a row index (pandas-style).
    pub fn indexed<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index: Some(Vec::new()),
            ..Self::new(columns)
        }
    }

    /// Append an unindexed row.
    pub fn push_row(&mut self, cells: Vec<Cell>) -> Result<(), FrameError> {
        if self.index.is_some() {
            return Err(FrameError::MissingIndex);
        }
        self.check_width(&cells)?;
        self.rows.push(cells);
        Ok(())
    }

    /// Append a row keyed by its index timestamp.
    pub fn push_indexed_row(
        &mut self,
        ts: DateTime<Utc>,
        cells: Vec<Cell>,
    ) -> Result<(), FrameError> {
        self.check_width(&cells)?;
        let index = self.index.as_mut().ok_or(FrameError::UnexpectedIndex)?;
        index.push(ts);
        self.rows.push(cells);
        Ok(())
    }

    fn check_width(&self, cells: &[Cell]) -> Result<(), FrameError> {
        if cells.len() != self.columns.len() {
            return Err(FrameError::Width {
                expected: self.columns.len(),
                got: cells.len(),
            });
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Borrow one row. Panics if `row` is out of bounds, like slice indexing.
    pub fn row(&self, row: usize) -> RowView<'_> {
        assert!(row < self.rows.len(), "row {row} out of bounds");
        RowView { frame: self, row }
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        (0..self.rows.len()).map(move |row| RowView { frame: self, row })
    }
}

/// A borrowed row of a [`BarFrame`].
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    frame: &'a BarFrame,
    row: usize,
}

impl<'a> RowView<'a> {
    /// Position of the row within its frame.
    pub fn position(&self) -> usize {
        self.row
    }

    /// Index timestamp, when the frame is indexed.
    pub fn index(&self) -> Option<DateTime<Utc>> {
        self.frame.index.as_ref().map(|ix| ix[self.row])
    }

    /// `(column name, cell)` pairs in column order.
    pub fn cells(&self) -> impl Iterator<Item = (&'a str, Cell)> + 'a {
        let frame = self.frame;
        let row = self.row;
        frame
            .columns
            .iter()
            .zip(frame.rows[row].iter())
            .map(|(name, cell)| (name.as_str(), *cell))
    }
}
