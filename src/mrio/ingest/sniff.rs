//! Layout detection for delimited MRIO text files.
//!
//! Releases differ in separator, number of header rows and number of label
//! columns, and even files of one release do not always agree. The sniffer
//! inspects a fixed window of leading lines and infers all three.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mrio::ingest::config::SniffConfig;
use crate::mrio::ingest::error::{IngestError, Result};
use crate::mrio::ingest::io::{Repository, read_grid};

/// Layout of a delimited matrix file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutFormat {
    pub separator: char,
    pub header_rows: usize,
    pub index_cols: usize,
}

/// Sniffs a repository member.
pub fn sniff_member(repo: &Repository, member: &str, config: &SniffConfig) -> Result<LayoutFormat> {
    let bytes = repo.read(member)?;
    sniff_csv_format(&repo.describe(member), &bytes, config)
}

/// Infers separator, header rows and index columns from the first
/// `config.sample_lines` lines of `bytes`. `name` only labels errors.
pub fn sniff_csv_format(name: &str, bytes: &[u8], config: &SniffConfig) -> Result<LayoutFormat> {
    let text = String::from_utf8_lossy(bytes);
    let window: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(config.sample_lines.max(1))
        .collect();
    if window.is_empty() {
        return Err(IngestError::format(name, "file is empty"));
    }

    let separator = pick_separator(&window, &config.separators)?
        .ok_or_else(|| IngestError::format(name, "no separator gives a consistent field count"))?;

    let sample = window.join("\n");
    let rows = read_grid(&sample, separator)?;

    let is_numeric = |cell: &str| cell.parse::<f64>().is_ok_and(f64::is_finite);
    let header_rows = rows
        .iter()
        .position(|row| row.last().is_some_and(|cell| is_numeric(cell)))
        .ok_or_else(|| IngestError::format(name, "no numeric data row in the sampled lines"))?;

    // Labels run up to the first numeric or empty cell; the most common
    // run length over the data rows wins, ties going to the wider one.
    let mut label_widths: HashMap<usize, usize> = HashMap::new();
    for row in &rows[header_rows..] {
        let width = row
            .iter()
            .take_while(|cell| !cell.trim().is_empty() && !is_numeric(cell))
            .count();
        *label_widths.entry(width).or_default() += 1;
    }
    let index_cols = label_widths
        .into_iter()
        .max_by(|(wa, ca), (wb, cb)| ca.cmp(cb).then(wa.cmp(wb)))
        .map_or(0, |(width, _)| width);

    let format = LayoutFormat {
        separator,
        header_rows,
        index_cols,
    };
    debug!(file = name, ?format, "sniffed layout");
    Ok(format)
}

/// Chooses the candidate whose modal field count (>1) is shared by the most
/// lines, at least half of the window. Ties go to the larger field count,
/// then to the earlier candidate.
fn pick_separator(window: &[&str], candidates: &[char]) -> Result<Option<char>> {
    let mut best: Option<(char, usize, usize)> = None;
    for &separator in candidates {
        let mut frequencies: HashMap<usize, usize> = HashMap::new();
        for line in window {
            let fields = read_grid(line, separator)?
                .first()
                .map_or(1, Vec::len);
            *frequencies.entry(fields).or_default() += 1;
        }
        let Some((fields, lines)) = frequencies
            .into_iter()
            .max_by(|(fa, la), (fb, lb)| la.cmp(lb).then(fa.cmp(fb)))
        else {
            continue;
        };
        if fields <= 1 || lines * 2 < window.len() {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, best_fields, best_lines)) => (lines, fields) > (best_lines, best_fields),
        };
        if better {
            best = Some((separator, fields, lines));
        }
    }
    Ok(best.map(|(separator, _, _)| separator))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sniff(text: &str) -> Result<LayoutFormat> {
        sniff_csv_format("test", text.as_bytes(), &SniffConfig::default())
    }

    #[test]
    fn detects_tab_layout_with_two_label_columns() {
        let text = "region\tsector\tAT\tAT\n\t\tfood\tsteel\nAT\tfood\t1.5\t2\nAT\tsteel\t0\t3e2\n";
        let format = sniff(text).unwrap();
        assert_eq!(
            format,
            LayoutFormat {
                separator: '\t',
                header_rows: 2,
                index_cols: 2,
            }
        );
    }

    #[test]
    fn comma_wins_when_semicolons_are_inside_labels() {
        let text = "code,a;b,c\nx,1,2\ny,3,4\n";
        let format = sniff(text).unwrap();
        assert_eq!(format.separator, ',');
        assert_eq!(format.header_rows, 1);
        assert_eq!(format.index_cols, 1);
    }

    #[test]
    fn empty_value_cells_are_not_labels() {
        let text = "region\tsector\tAT\tAT\n\t\tfood\tsteel\nAT\tfood\t\t3\nAT\tsteel\t1\t2\n";
        let format = sniff(text).unwrap();
        assert_eq!(format.header_rows, 2);
        assert_eq!(format.index_cols, 2);
    }

    #[test]
    fn text_only_file_fails() {
        let err = sniff("a,b\nc,d\n").unwrap_err();
        assert!(matches!(err, IngestError::FormatDetection { .. }));
    }

    #[test]
    fn single_column_file_fails() {
        let err = sniff("1\n2\n3\n").unwrap_err();
        assert!(matches!(err, IngestError::FormatDetection { .. }));
    }
}
