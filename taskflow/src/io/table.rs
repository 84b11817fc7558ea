//! In-memory row source for table-driven repeats.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::core::collaborators::RowSource;
use crate::core::types::Row;

/// Rows visited in order, or in a seeded shuffled order fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct TableRows {
    rows: Vec<Row>,
    /// Index of the current row; `None` before the first `move_next`.
    position: Option<usize>,
}

impl TableRows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            position: None,
        }
    }

    /// Shuffle once with `seed`; a zero seed keeps authored order.
    pub fn with_seed(mut rows: Vec<Row>, seed: u64) -> Self {
        if seed != 0 {
            rows.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        Self::new(rows)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl RowSource for TableRows {
    fn move_next(&mut self) -> bool {
        let next = self.position.map_or(0, |index| index + 1);
        if next < self.rows.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.rows.len());
            false
        }
    }

    fn reset(&mut self) {
        self.position = None;
    }

    fn current(&self) -> Result<Row, String> {
        match self.position {
            None => Err("no current row before the first move".to_string()),
            Some(index) => self
                .rows
                .get(index)
                .cloned()
                .ok_or_else(|| format!("row {index} is past the end of {} rows", self.rows.len())),
        }
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}
