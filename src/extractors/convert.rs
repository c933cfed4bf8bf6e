// src/extractors/convert.rs
use crate::extractors::html::{RawRow, RawTable};
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;

// Digits and separators, starting and ending on a digit.
static NUMERIC_CANDIDATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d(?:[\d.,]*\d)?$").expect("Failed to compile NUMERIC_CANDIDATE_RE")
});

static DOT_GROUPED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[1-9]\d{0,2}(?:\.\d{3})+$").expect("Failed to compile DOT_GROUPED_RE")
});

static COMMA_GROUPED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[1-9]\d{0,2}(?:,\d{3})+$").expect("Failed to compile COMMA_GROUPED_RE")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Anything that is not a number: fund names, dates, labels.
    Text(String),
    /// Canonical number: optional `-`, digits, optional `.` and fraction digits.
    Number(String),
    /// Looked numeric but matched neither separator convention. Kept verbatim.
    Unparsed(String),
}

impl Cell {
    pub fn as_str(&self) -> &str {
        match self {
            Cell::Text(s) | Cell::Number(s) | Cell::Unparsed(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl NormalizedTable {
    pub fn unparsed_cells(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .flatten()
            .filter(|c| matches!(c, Cell::Unparsed(_)))
            .map(Cell::as_str)
    }
}

fn grouping_re(separator: char) -> &'static Regex {
    if separator == '.' {
        &*DOT_GROUPED_RE
    } else {
        &*COMMA_GROUPED_RE
    }
}

fn canonical(sign: &str, int_part: &str, frac: Option<&str>) -> String {
    match frac {
        Some(frac) => format!("{sign}{int_part}.{frac}"),
        None => format!("{sign}{int_part}"),
    }
}

/// Classifies one cell.
///
/// With both `.` and `,` present the rightmost one is the decimal point.
/// A lone separator followed by one or two digits is a decimal point; a
/// repeated one, or a lone one followed by exactly three digits, groups
/// thousands. Grouping must come in blocks of three after a first group
/// without a leading zero, or the cell is [`Cell::Unparsed`].
pub fn classify(text: &str) -> Cell {
    let text = text.trim();
    if !NUMERIC_CANDIDATE_RE.is_match(text) {
        return Cell::Text(text.to_string());
    }

    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let unparsed = || Cell::Unparsed(text.to_string());

    let dots = body.matches('.').count();
    let commas = body.matches(',').count();

    match (dots, commas) {
        (0, 0) => Cell::Number(text.to_string()),
        (d, c) if d > 0 && c > 0 => {
            // Rightmost separator is the decimal point; it must be unique.
            let Some(at) = body.rfind(['.', ',']) else {
                return unparsed();
            };
            let decimal = if body[at..].starts_with('.') { '.' } else { ',' };
            let group = if decimal == '.' { ',' } else { '.' };
            if body.matches(decimal).count() != 1 {
                return unparsed();
            }
            let (int_part, frac) = (&body[..at], &body[at + 1..]);
            if !grouping_re(group).is_match(int_part) {
                return unparsed();
            }
            Cell::Number(canonical(sign, &int_part.replace(group, ""), Some(frac)))
        }
        _ => {
            let separator = if dots > 0 { '.' } else { ',' };
            let count = dots.max(commas);
            if count == 1 {
                let at = body.find(separator).unwrap_or_default();
                let (int_part, frac) = (&body[..at], &body[at + 1..]);
                match frac.len() {
                    1 | 2 => return Cell::Number(canonical(sign, int_part, Some(frac))),
                    3 => {}
                    _ => return unparsed(),
                }
            }
            if grouping_re(separator).is_match(body) {
                Cell::Number(canonical(sign, &body.replace(separator, ""), None))
            } else {
                unparsed()
            }
        }
    }
}

/// Lays header rows out on a column grid, honouring colspan and rowspan.
fn header_grid(rows: &[RawRow]) -> Vec<Vec<String>> {
    // Per column: header rows still covered by a rowspan above, and its label.
    let mut carried: Vec<(usize, String)> = Vec::new();
    let mut grid = Vec::with_capacity(rows.len());

    for row in rows {
        let mut line: Vec<String> = Vec::new();
        let mut cells = row.cells.iter();
        loop {
            let col = line.len();
            if let Some((remaining, label)) = carried.get_mut(col) {
                if *remaining > 0 {
                    *remaining -= 1;
                    line.push(label.clone());
                    continue;
                }
            }
            let Some(cell) = cells.next() else { break };
            for _ in 0..cell.colspan {
                let col = line.len();
                if carried.len() <= col {
                    carried.resize(col + 1, (0, String::new()));
                }
                carried[col] = (cell.rowspan - 1, cell.text.clone());
                line.push(cell.text.clone());
            }
        }
        grid.push(line);
    }
    grid
}

/// One label per column: the distinct non-empty parts, top to bottom.
fn flatten_headers(rows: &[RawRow]) -> Vec<String> {
    let grid = header_grid(rows);
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);

    (0..width)
        .map(|col| {
            let mut parts: Vec<&str> = Vec::new();
            for part in grid.iter().filter_map(|line| line.get(col)) {
                if !part.is_empty() && parts.last() != Some(&part.as_str()) {
                    parts.push(part.as_str());
                }
            }
            parts.join(" ")
        })
        .collect()
}

/// Converts a located table. The first row, plus any directly following
/// rows made only of `<th>` cells, form the header.
pub fn convert(table: &RawTable) -> Result<NormalizedTable, ExtractError> {
    let Some(first) = table.rows.first() else {
        return Err(ExtractError::EmptyTable);
    };
    let header_rows = 1 + table.rows[1..]
        .iter()
        .take_while(|row| first.is_header_only() && row.is_header_only())
        .count();

    let data = &table.rows[header_rows..];
    if data.is_empty() {
        return Err(ExtractError::EmptyTable);
    }

    let headers = flatten_headers(&table.rows[..header_rows]);
    let rows: Vec<Vec<Cell>> = data
        .iter()
        .map(|row| row.cells.iter().map(|c| classify(&c.text)).collect())
        .collect();

    let normalized = NormalizedTable { headers, rows };
    let unparsed = normalized.unparsed_cells().count();
    if unparsed > 0 {
        tracing::warn!(
            "{} numeric-looking cell(s) matched no separator convention (first: '{}')",
            unparsed,
            normalized.unparsed_cells().next().unwrap_or_default()
        );
    }
    tracing::debug!(
        "Converted table: {} columns, {} data rows",
        normalized.headers.len(),
        normalized.rows.len()
    );
    Ok(normalized)
}
