//! Incremental table output for listing commands
//!
//! Rows are appended as the traversal delivers them. A chunk of rows is
//! rendered on `flush` (once per page for flat listings) or whenever the
//! configured row threshold is reached (tree listings), then a fresh table is
//! started. The header is only printed above the first chunk and the footer
//! closes the last one. In JSON mode every row is printed as one JSON line.

use std::io::{self, Write};

use comfy_table::{ContentArrangement, Table, presets};
use serde::Serialize;

use super::Formatter;

/// A value that can be rendered as a table row
pub trait Row: Serialize {
    fn cells(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Table,
    Json,
    Silent,
}

/// Row sink rendering borderless, left aligned tables
pub struct TableSink<W: Write> {
    out: W,
    mode: Mode,
    header: Vec<String>,
    header_written: bool,
    table: Table,
    rows: usize,
    flush_every: Option<usize>,
}

impl<W: Write> TableSink<W> {
    pub fn new(out: W, header: &[&str], formatter: &Formatter) -> Self {
        let mode = if formatter.is_quiet() {
            Mode::Silent
        } else if formatter.is_json() {
            Mode::Json
        } else {
            Mode::Table
        };

        Self {
            out,
            mode,
            header: header.iter().map(|h| h.to_string()).collect(),
            header_written: false,
            table: new_table(),
            rows: 0,
            flush_every: None,
        }
    }

    /// Render and clear the table every `rows` rows; 0 disables the threshold
    pub fn flush_every(mut self, rows: usize) -> Self {
        self.flush_every = (rows > 0).then_some(rows);
        self
    }

    pub fn push<R: Row>(&mut self, row: &R) -> io::Result<()> {
        match self.mode {
            Mode::Silent => Ok(()),
            Mode::Json => write_json_line(&mut self.out, row),
            Mode::Table => {
                self.table.add_row(row.cells());
                self.rows += 1;
                if self.flush_every.is_some_and(|n| self.rows >= n) {
                    self.flush()?;
                }
                Ok(())
            }
        }
    }

    /// Render the rows collected so far
    pub fn flush(&mut self) -> io::Result<()> {
        if self.mode != Mode::Table || self.rows == 0 {
            return Ok(());
        }
        self.render()
    }

    /// Render the remaining rows with a closing footer, or print the summary
    /// object in JSON mode
    pub fn finish<S: Serialize>(mut self, footer: Vec<String>, summary: &S) -> io::Result<W> {
        match self.mode {
            Mode::Silent => {}
            Mode::Json => write_json_line(&mut self.out, summary)?,
            Mode::Table => {
                self.table.add_row(footer);
                self.render()?;
            }
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn render(&mut self) -> io::Result<()> {
        let mut table = std::mem::replace(&mut self.table, new_table());
        if !self.header_written {
            table.set_header(self.header.clone());
            self.header_written = true;
        }
        writeln!(self.out, "{table}")?;
        self.rows = 0;
        Ok(())
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Disabled);
    table
}

fn write_json_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> io::Result<()> {
    let line = serde_json::to_string(value).map_err(io::Error::other)?;
    writeln!(out, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputConfig;

    #[derive(Serialize)]
    struct Pair {
        key: &'static str,
        size: u64,
    }

    impl Row for Pair {
        fn cells(&self) -> Vec<String> {
            vec![self.key.to_string(), self.size.to_string()]
        }
    }

    fn formatter(json: bool, quiet: bool) -> Formatter {
        Formatter::new(OutputConfig {
            json,
            quiet,
            no_color: true,
        })
    }

    fn render(sink: TableSink<Vec<u8>>) -> String {
        let out = sink
            .finish(vec!["Total: ".to_string(), "2".to_string()], &2)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_header_printed_once_across_chunks() {
        let mut sink = TableSink::new(Vec::new(), &["Key", "Size"], &formatter(false, false));
        sink.push(&Pair { key: "a", size: 1 }).unwrap();
        sink.flush().unwrap();
        sink.push(&Pair { key: "b", size: 2 }).unwrap();

        let text = render(sink);
        assert_eq!(text.matches("Key").count(), 1);
        assert!(text.find('a') < text.find('b'));
        assert!(text.contains("Total:"));
    }

    #[test]
    fn test_empty_flush_renders_nothing() {
        let mut sink = TableSink::new(Vec::new(), &["Key", "Size"], &formatter(false, false));
        sink.flush().unwrap();
        let text = render(sink);
        // header and footer only
        assert_eq!(text.lines().filter(|l| !l.trim().is_empty()).count(), 2);
    }

    #[test]
    fn test_threshold_flush() {
        let mut sink = TableSink::new(Vec::new(), &["Key", "Size"], &formatter(false, false))
            .flush_every(2);
        for key in ["a", "b", "c"] {
            sink.push(&Pair { key, size: 0 }).unwrap();
        }
        assert_eq!(sink.rows, 1);
        assert!(sink.header_written);
    }

    #[test]
    fn test_json_lines() {
        let mut sink = TableSink::new(Vec::new(), &["Key", "Size"], &formatter(true, false));
        sink.push(&Pair { key: "a", size: 1 }).unwrap();
        sink.push(&Pair { key: "b", size: 2 }).unwrap();

        let text = render(sink);
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["key"], "a");
        assert_eq!(lines[2], 2);
    }

    #[test]
    fn test_quiet_prints_nothing() {
        let mut sink = TableSink::new(Vec::new(), &["Key", "Size"], &formatter(false, true));
        sink.push(&Pair { key: "a", size: 1 }).unwrap();
        assert!(render(sink).is_empty());
    }
}
