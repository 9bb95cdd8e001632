use std::io::{IsTerminal, Write};

use anyhow::Result;

use terminal::{TerminalTable, TerminalTableOpts, TerminalTableTitle};

pub mod terminal;

/// A table held in memory, so that the column widths can be derived
/// from the contents before printing.
#[derive(Debug, Clone, Default)]
pub struct OutputTable {
    pub titles: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl OutputTable {
    /// Spacing between columns in human-readable format
    const COLUMN_GAP: usize = 2;

    pub fn new<S: Into<String>>(titles: impl IntoIterator<Item = S>) -> Self {
        Self {
            titles: titles.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Widths of all but the last column, including the gap.
    pub fn column_widths(&self) -> Vec<usize> {
        let n = self.titles.len().saturating_sub(1);
        (0..n)
            .map(|i| {
                std::iter::once(&self.titles[i])
                    .chain(self.rows.iter().filter_map(|row| row.get(i)))
                    .map(|s| s.chars().count())
                    .max()
                    .unwrap_or(0)
                    + Self::COLUMN_GAP
            })
            .collect()
    }

    fn write_to<O: Write>(&self, mut table: TerminalTable<O>) -> Result<O> {
        for row in &self.rows {
            table.write_data_row(row, None)?;
        }
        table.finish()
    }

    pub fn print<O: Write + IsTerminal>(&self, opts: TerminalTableOpts, out: O) -> Result<O> {
        let titles: Vec<TerminalTableTitle> =
            self.titles.iter().map(|t| TerminalTableTitle::new(t.as_str())).collect();
        let table = TerminalTable::start(&self.column_widths(), &titles, opts, out)?;
        self.write_to(table)
    }

    /// Render to a string, never colored.
    pub fn to_string_with(&self, opts: TerminalTableOpts) -> Result<String> {
        let titles: Vec<TerminalTableTitle> =
            self.titles.iter().map(|t| TerminalTableTitle::new(t.as_str())).collect();
        let table =
            TerminalTable::start_with_terminal(&self.column_widths(), &titles, opts, Vec::new(), false)?;
        Ok(String::from_utf8(self.write_to(table)?)?)
    }
}
