//! Per-iteration planning table with growable columns.
//!
//! Each planning round appends one row. Columns are kept in order of first
//! appearance; adding a column back-fills `0` into every earlier row so the
//! table stays rectangular.

use crate::core::types::{ReturnSummary, View};

/// Columns every planning table starts with, before the metric columns.
pub const BASE_COLUMNS: [&str; 12] = [
    "pos_x",
    "pos_y",
    "pos_z",
    "rot_x",
    "rot_y",
    "rot_z",
    "rot_w",
    "return_value",
    "winning_margin",
    "return_value_mean",
    "return_value_stddev",
    "cost",
];

/// Value for cells that were never written.
pub const DEFAULT_CELL: f64 = 0.0;

/// What `record_iteration` had to discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordReport {
    /// Information values beyond the configured metric count.
    pub dropped_information: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanningTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    metric_names: Vec<String>,
}

impl PlanningTable {
    /// Table with no columns; every column is added on first use.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table with the base columns followed by one column per metric.
    pub fn with_metrics<S: AsRef<str>>(metric_names: &[S]) -> Self {
        let mut table = Self::empty();
        for name in BASE_COLUMNS {
            table.column_index(name);
        }
        for name in metric_names {
            table.column_index(name.as_ref());
        }
        table.metric_names = metric_names
            .iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.rows.get(row).and_then(|values| values.get(index)).copied()
    }

    /// Append a row from `(column, value)` pairs.
    ///
    /// Unknown columns are added at the end; cells not named in `fields` stay at
    /// [`DEFAULT_CELL`]. A column named twice keeps the last value.
    pub fn record(&mut self, fields: &[(&str, f64)]) {
        let mut row = vec![DEFAULT_CELL; self.columns.len()];
        for &(name, value) in fields {
            let index = self.column_index(name);
            if row.len() <= index {
                row.resize(index + 1, DEFAULT_CELL);
            }
            row[index] = value;
        }
        self.rows.push(row);
    }

    /// Append the row for one completed planning round.
    ///
    /// `information` is matched to the metric columns by position; missing
    /// values stay at [`DEFAULT_CELL`] and values beyond the metric count are
    /// dropped and reported.
    pub fn record_iteration(
        &mut self,
        view: &View,
        summary: &ReturnSummary,
        cost: f64,
        information: &[f64],
        extra: &[(&str, f64)],
    ) -> RecordReport {
        let pose = view.pose.components();
        let stats = [
            summary.best_return,
            summary.winning_margin,
            summary.mean,
            summary.stddev,
            cost,
        ];
        let kept = information.len().min(self.metric_names.len());

        let metric_names = self.metric_names.clone();
        let mut fields: Vec<(&str, f64)> =
            Vec::with_capacity(BASE_COLUMNS.len() + kept + extra.len());
        fields.extend(BASE_COLUMNS.iter().copied().zip(pose.into_iter().chain(stats)));
        fields.extend(
            metric_names
                .iter()
                .map(String::as_str)
                .zip(information[..kept].iter().copied()),
        );
        fields.extend_from_slice(extra);
        self.record(&fields);

        RecordReport {
            dropped_information: information.len() - kept,
        }
    }

    /// Render as text: a header of space-separated column names, then one line
    /// per row in column order.
    pub fn render(&self) -> String {
        let mut out = self.columns.join(" ");
        out.push('\n');
        for row in &self.rows {
            let line: Vec<String> = (0..self.columns.len())
                .map(|index| row.get(index).copied().unwrap_or(DEFAULT_CELL).to_string())
                .collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out
    }

    /// Index of `name`, adding the column (back-filled with defaults) if new.
    fn column_index(&mut self, name: &str) -> usize {
        if let Some(index) = self.columns.iter().position(|column| column == name) {
            return index;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(DEFAULT_CELL);
        }
        self.columns.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Pose, ViewId};

    #[test]
    fn new_columns_back_fill_earlier_rows() {
        let mut table = PlanningTable::empty();
        table.record(&[("A", 1.0), ("B", 2.0)]);
        table.record(&[("A", 3.0), ("C", 4.0)]);

        assert_eq!(table.columns(), ["A", "B", "C"]);
        assert_eq!(table.rows(), [vec![1.0, 2.0, 0.0], vec![3.0, 0.0, 4.0]]);
        assert_eq!(table.render(), "A B C\n1 2 0\n3 0 4\n");
    }

    #[test]
    fn render_is_non_destructive() {
        let mut table = PlanningTable::empty();
        table.record(&[("A", 1.5)]);
        let first = table.render();
        table.record(&[("A", 2.5)]);
        assert_eq!(first, "A\n1.5\n");
        assert_eq!(table.render(), "A\n1.5\n2.5\n");
    }

    #[test]
    fn iteration_row_fills_base_and_metric_columns() {
        let mut table = PlanningTable::with_metrics(&["m1", "m2"]);
        let view = View::new(ViewId(3), Pose::at(1.0, 2.0, 3.0));
        let summary = ReturnSummary {
            best_return: 18.0,
            winning_margin: 9.0,
            mean: 13.5,
            stddev: 4.5,
        };

        let report = table.record_iteration(&view, &summary, 2.0, &[10.0], &[]);

        assert_eq!(report.dropped_information, 0);
        assert_eq!(table.columns().len(), BASE_COLUMNS.len() + 2);
        assert_eq!(table.value(0, "pos_y"), Some(2.0));
        assert_eq!(table.value(0, "rot_w"), Some(1.0));
        assert_eq!(table.value(0, "return_value"), Some(18.0));
        assert_eq!(table.value(0, "winning_margin"), Some(9.0));
        assert_eq!(table.value(0, "cost"), Some(2.0));
        assert_eq!(table.value(0, "m1"), Some(10.0));
        assert_eq!(table.value(0, "m2"), Some(0.0));
    }

    #[test]
    fn iteration_row_drops_excess_information() {
        let mut table = PlanningTable::with_metrics(&["m1"]);
        let view = View::new(ViewId(1), Pose::at(0.0, 0.0, 0.0));
        let report =
            table.record_iteration(&view, &ReturnSummary::default(), 1.0, &[1.0, 2.0, 3.0], &[]);
        assert_eq!(report.dropped_information, 2);
        assert_eq!(table.columns().len(), BASE_COLUMNS.len() + 1);
        assert_eq!(table.value(0, "m1"), Some(1.0));
    }

    #[test]
    fn extra_fields_extend_schema() {
        let mut table = PlanningTable::with_metrics(&["m1"]);
        let view = View::new(ViewId(1), Pose::at(0.0, 0.0, 0.0));
        let summary = ReturnSummary::default();
        table.record_iteration(&view, &summary, 1.0, &[1.0], &[]);
        table.record_iteration(&view, &summary, 1.0, &[1.0], &[("candidates", 4.0)]);

        assert_eq!(table.columns().last().map(String::as_str), Some("candidates"));
        assert_eq!(table.value(0, "candidates"), Some(0.0));
        assert_eq!(table.value(1, "candidates"), Some(4.0));
    }
}
