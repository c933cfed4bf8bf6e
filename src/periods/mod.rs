// src/periods/mod.rs
use std::fmt;

use serde::Serialize;

use crate::spensiones::models::Frequency;
use crate::utils::error::PeriodError;

/// A point in time at the granularity a dataset expects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PeriodToken(String);

impl PeriodToken {
    fn year(year: i32) -> Self {
        PeriodToken(format!("{year:04}"))
    }

    fn month(year: i32, month: u32) -> Self {
        PeriodToken(format!("{year:04}{month:02}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the user asked for, before expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodRequest {
    /// A single `YYYYMM` (or `YYYY` for annual datasets).
    Single(String),
    /// Every valid period within one year.
    Year(i32),
    /// Every valid period of every year in `[from, to]`.
    YearRange(i32, i32),
}

impl PeriodRequest {
    /// Builds a request from the `--periodo` / `--rango` command line pair.
    /// A four digit `periodo` means a whole year.
    pub fn from_args(periodo: Option<&str>, rango: Option<(i32, i32)>) -> Result<Self, PeriodError> {
        match (periodo, rango) {
            (Some(p), None) => {
                let p = p.trim();
                if !p.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(PeriodError::Malformed(p.to_string()));
                }
                match p.len() {
                    4 => Ok(PeriodRequest::Year(parse_year(p)?)),
                    6 => Ok(PeriodRequest::Single(p.to_string())),
                    _ => Err(PeriodError::Malformed(p.to_string())),
                }
            }
            (None, Some((from, to))) => Ok(PeriodRequest::YearRange(from, to)),
            (Some(p), Some(_)) => Err(PeriodError::Malformed(format!("{p} together with a range"))),
            (None, None) => Err(PeriodError::Malformed(String::new())),
        }
    }
}

fn parse_year(text: &str) -> Result<i32, PeriodError> {
    text.parse::<i32>()
        .map_err(|_| PeriodError::Malformed(text.to_string()))
}

fn check_year(year: i32) -> Result<(), PeriodError> {
    if (1000..=9999).contains(&year) {
        Ok(())
    } else {
        Err(PeriodError::Malformed(year.to_string()))
    }
}

fn invalid(token: &str, frequency: Frequency, reason: &str) -> PeriodError {
    PeriodError::InvalidPeriod {
        token: token.to_string(),
        frequency,
        reason: reason.to_string(),
    }
}

/// Periods published in one year, ascending.
fn periods_of_year(year: i32, frequency: Frequency) -> Vec<PeriodToken> {
    match frequency {
        Frequency::Annual => vec![PeriodToken::year(year)],
        _ => frequency
            .months()
            .iter()
            .map(|&m| PeriodToken::month(year, m))
            .collect(),
    }
}

/// Expands `request` into the ordered list of tokens to fetch.
///
/// An inverted range resolves to no tokens. Month level tokens that the
/// frequency does not publish fail with [`PeriodError::InvalidPeriod`].
pub fn resolve(request: &PeriodRequest, frequency: Frequency) -> Result<Vec<PeriodToken>, PeriodError> {
    match request {
        PeriodRequest::Single(text) => resolve_single(text, frequency).map(|t| vec![t]),
        PeriodRequest::Year(year) => {
            check_year(*year)?;
            Ok(periods_of_year(*year, frequency))
        }
        PeriodRequest::YearRange(from, to) => {
            if to < from {
                return Ok(Vec::new());
            }
            check_year(*from)?;
            check_year(*to)?;
            Ok((*from..=*to)
                .flat_map(|year| periods_of_year(year, frequency))
                .collect())
        }
    }
}

fn resolve_single(text: &str, frequency: Frequency) -> Result<PeriodToken, PeriodError> {
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PeriodError::Malformed(text.to_string()));
    }
    match text.len() {
        4 => {
            let year = parse_year(text)?;
            check_year(year)?;
            match frequency {
                Frequency::Annual => Ok(PeriodToken::year(year)),
                _ => Err(invalid(text, frequency, "expected YYYYMM")),
            }
        }
        6 => {
            let year = parse_year(&text[..4])?;
            check_year(year)?;
            let month: u32 = text[4..]
                .parse()
                .map_err(|_| PeriodError::Malformed(text.to_string()))?;
            if !(1..=12).contains(&month) {
                return Err(PeriodError::Malformed(text.to_string()));
            }
            match frequency {
                Frequency::Annual => Err(invalid(text, frequency, "annual datasets take YYYY")),
                Frequency::Quarterly if !frequency.months().contains(&month) => {
                    Err(invalid(text, frequency, "month must be 03, 06, 09 or 12"))
                }
                _ => Ok(PeriodToken::month(year, month)),
            }
        }
        _ => Err(PeriodError::Malformed(text.to_string())),
    }
}
