// 📅 Date Normalizer - heterogeneous date encodings → canonical YYYY-MM-DD
// Standard calendar layouts plus compact positional codes from loan tapes

use crate::config::{DateColumnSpec, RunConfig};
use crate::error::PipelineResult;
use crate::table::{DataTable, Value};
use chrono::{NaiveDate, NaiveDateTime};

/// Canonical output format for every normalized date column.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// FORMAT DISPATCH
// ============================================================================

/// One entry in the fixed set of standard calendar layouts.
pub struct StandardFormat {
    /// Identifier as it appears in configuration.
    pub id: &'static str,
    /// chrono pattern used to parse it.
    pub pattern: &'static str,
    pub has_time: bool,
}

/// The enumerated standard layouts. Identifiers double as the config-facing
/// names, so a configuration written against the source system keeps working.
pub const STANDARD_FORMATS: &[StandardFormat] = &[
    // ISO formats
    StandardFormat { id: "ISO8601", pattern: "", has_time: false },
    StandardFormat { id: "%Y-%m-%d", pattern: "%Y-%m-%d", has_time: false },
    StandardFormat { id: "%Y%m%d", pattern: "%Y%m%d", has_time: false },
    // American formats
    StandardFormat { id: "%m/%d/%Y", pattern: "%m/%d/%Y", has_time: false },
    StandardFormat { id: "%m-%d-%Y", pattern: "%m-%d-%Y", has_time: false },
    StandardFormat { id: "%m.%d.%Y", pattern: "%m.%d.%Y", has_time: false },
    StandardFormat { id: "%b %d, %Y", pattern: "%b %d, %Y", has_time: false },
    StandardFormat { id: "%B %d, %Y", pattern: "%B %d, %Y", has_time: false },
    // European formats
    StandardFormat { id: "%d/%m/%Y", pattern: "%d/%m/%Y", has_time: false },
    StandardFormat { id: "%d-%m-%Y", pattern: "%d-%m-%Y", has_time: false },
    StandardFormat { id: "%d.%m.%Y", pattern: "%d.%m.%Y", has_time: false },
    StandardFormat { id: "%d %b %Y", pattern: "%d %b %Y", has_time: false },
    StandardFormat { id: "%d %B %Y", pattern: "%d %B %Y", has_time: false },
    // Year first formats
    StandardFormat { id: "%Y/%m/%d", pattern: "%Y/%m/%d", has_time: false },
    StandardFormat { id: "%Y.%m.%d", pattern: "%Y.%m.%d", has_time: false },
    // With time components
    StandardFormat { id: "%Y-%m-%d %H:%M:%S", pattern: "%Y-%m-%d %H:%M:%S", has_time: true },
    StandardFormat { id: "%Y-%m-%d %H:%M:%S.%f", pattern: "%Y-%m-%d %H:%M:%S%.f", has_time: true },
    StandardFormat { id: "%Y-%m-%dT%H:%M:%S", pattern: "%Y-%m-%dT%H:%M:%S", has_time: true },
    StandardFormat { id: "%Y-%m-%dT%H:%M:%S.%f", pattern: "%Y-%m-%dT%H:%M:%S%.f", has_time: true },
    // Two digit year formats
    StandardFormat { id: "%y-%m-%d", pattern: "%y-%m-%d", has_time: false },
    StandardFormat { id: "%d/%m/%y", pattern: "%d/%m/%y", has_time: false },
    StandardFormat { id: "%m/%d/%y", pattern: "%m/%d/%y", has_time: false },
    // Month name formats
    StandardFormat { id: "%b-%d-%Y", pattern: "%b-%d-%Y", has_time: false },
    StandardFormat { id: "%B-%d-%Y", pattern: "%B-%d-%Y", has_time: false },
];

/// Parsing strategy for one date column. Compact variants are positional
/// numeric codes without separators: the trailing digits carry the year,
/// the leading digits the month (and optionally a day digit before or
/// after it); day defaults to 28 when not encoded; two-digit-year
/// variants prefix "20".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateFormat {
    Standard(usize), // index into STANDARD_FORMATS
    MonthYear,       // XMYYYY    e.g. "122023" → 2023-12-28
    DayMonthYear,    // XDXMYYYY  e.g. "3112023" → 2023-01-31
    MonthDayYear,    // XMXDYYYY  e.g. "1232023" → 2023-12-03
    DayMonthYy,      // DDMMYY    e.g. "311223" → 2023-12-31
    MonthDayYy,      // MMDDYY    e.g. "123123" → 2023-12-31
    FlexDayMonthYy,  // XDXMYY    e.g. "31123"  → 2023-01-31
    FlexMonthDayYy,  // XMXDYY    e.g. "12323"  → 2023-12-03
}

impl DateFormat {
    /// Resolve a configured format identifier. `None` means the identifier
    /// is unrecognized and the column must be left untouched.
    pub fn from_identifier(id: &str) -> Option<DateFormat> {
        if let Some(idx) = STANDARD_FORMATS.iter().position(|f| f.id == id) {
            return Some(DateFormat::Standard(idx));
        }
        match id {
            "XMYYYY" => Some(DateFormat::MonthYear),
            "XDXMYYYY" => Some(DateFormat::DayMonthYear),
            "XMXDYYYY" => Some(DateFormat::MonthDayYear),
            "DDMMYY" => Some(DateFormat::DayMonthYy),
            "MMDDYY" => Some(DateFormat::MonthDayYy),
            "XDXMYY" => Some(DateFormat::FlexDayMonthYy),
            "XMXDYY" => Some(DateFormat::FlexMonthDayYy),
            _ => None,
        }
    }

    pub fn is_compact(&self) -> bool {
        !matches!(self, DateFormat::Standard(_))
    }

    /// Parse a single raw value. Compact variants expect separators to
    /// have been stripped already. `None` for anything malformed.
    pub fn parse(&self, raw: &str) -> Option<NaiveDate> {
        match self {
            DateFormat::Standard(idx) => parse_standard(&STANDARD_FORMATS[*idx], raw),
            compact => parse_compact(*compact, raw),
        }
    }
}

fn parse_standard(format: &StandardFormat, raw: &str) -> Option<NaiveDate> {
    if format.id == "ISO8601" {
        return parse_iso8601(raw);
    }
    if format.has_time {
        NaiveDateTime::parse_from_str(raw, format.pattern)
            .ok()
            .map(|dt| dt.date())
    } else {
        NaiveDate::parse_from_str(raw, format.pattern).ok()
    }
}

/// ISO-8601 accepts date-only and datetime spellings.
fn parse_iso8601(raw: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(dt.date());
        }
    }
    None
}

// ── Compact positional parsing ──────────────────────────────────────────────
// The slices below mirror how the codes are laid out on the tape: the year
// anchors the tail of the string, month/day fill whatever is left in front.

/// Last `n` characters (fewer if the string is shorter).
fn tail(s: &str, n: usize) -> &str {
    &s[s.len().saturating_sub(n)..]
}

/// Everything except the last `n` characters.
fn drop_tail(s: &str, n: usize) -> &str {
    &s[..s.len().saturating_sub(n)]
}

/// The single character at position `len - n` (e.g. n=5 → `x[-5:-4]`).
fn char_from_end(s: &str, n: usize) -> &str {
    if s.len() < n {
        ""
    } else {
        &s[s.len() - n..s.len() - n + 1]
    }
}

fn piece(s: &str) -> Option<u32> {
    if s.is_empty() {
        None
    } else {
        s.parse::<u32>().ok()
    }
}

/// Day defaults to 28 when the code does not encode one.
fn day_or_default(s: &str) -> Option<u32> {
    if s.is_empty() {
        Some(28)
    } else {
        s.parse::<u32>().ok()
    }
}

fn parse_compact(format: DateFormat, raw: &str) -> Option<NaiveDate> {
    // Compact codes are purely numeric once separators are stripped.
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let (year, month, day) = match format {
        DateFormat::MonthYear => {
            (piece(tail(raw, 4))?, piece(drop_tail(raw, 4))?, 28)
        }
        DateFormat::DayMonthYear => (
            piece(tail(raw, 4))?,
            piece(char_from_end(raw, 5))?,
            day_or_default(drop_tail(raw, 5))?,
        ),
        DateFormat::MonthDayYear => (
            piece(tail(raw, 4))?,
            piece(drop_tail(raw, 5))?,
            day_or_default(char_from_end(raw, 5))?,
        ),
        DateFormat::DayMonthYy => (
            2000 + piece(tail(raw, 2))?,
            piece(slice2(raw, 2, 4))?,
            day_or_default(slice2(raw, 0, 2))?,
        ),
        DateFormat::MonthDayYy => (
            2000 + piece(tail(raw, 2))?,
            piece(slice2(raw, 0, 2))?,
            day_or_default(slice2(raw, 2, 4))?,
        ),
        DateFormat::FlexDayMonthYy => (
            2000 + piece(tail(raw, 2))?,
            piece(char_from_end(raw, 3))?,
            day_or_default(drop_tail(raw, 3))?,
        ),
        DateFormat::FlexMonthDayYy => (
            2000 + piece(tail(raw, 2))?,
            piece(drop_tail(raw, 3))?,
            day_or_default(char_from_end(raw, 3))?,
        ),
        DateFormat::Standard(_) => unreachable!("standard formats parsed above"),
    };

    NaiveDate::from_ymd_opt(year as i32, month, day)
}

/// Forward slice `s[from..to]`, clamped to the string length.
fn slice2(s: &str, from: usize, to: usize) -> &str {
    let end = to.min(s.len());
    if from >= end {
        ""
    } else {
        &s[from..end]
    }
}

// ============================================================================
// COLUMN NORMALIZATION
// ============================================================================

/// Strip configured separator characters from a raw value before
/// positional parsing.
pub fn strip_separators(value: &str, separators: &[String]) -> String {
    let mut out = value.to_string();
    for sep in separators {
        out = out.replace(sep.as_str(), "");
    }
    out
}

/// Normalize one column in place. Per-value failures become nulls and are
/// counted; the column is never aborted. An unrecognized format identifier
/// leaves the column untouched with a warning.
pub fn normalize_column(table: &mut DataTable, column: &str, spec: &DateColumnSpec) {
    let Some(col) = table.column_index(column) else {
        log::warn!("date column '{}' not present in data; skipping", column);
        return;
    };

    let Some(format) = DateFormat::from_identifier(&spec.date_format) else {
        log::warn!(
            "unrecognized date format '{}' for column '{}'; column left unconverted",
            spec.date_format,
            column
        );
        return;
    };

    let mut failures = 0usize;
    for row in table.rows.iter_mut() {
        if row[col].is_null() {
            continue;
        }
        let raw = row[col].render();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            row[col] = Value::Null;
            continue;
        }
        let candidate = if format.is_compact() {
            strip_separators(trimmed, &spec.separator)
        } else {
            trimmed.to_string()
        };
        match format.parse(&candidate) {
            Some(date) => {
                row[col] = Value::Str(date.format(CANONICAL_DATE_FORMAT).to_string());
            }
            None => {
                row[col] = Value::Null;
                failures += 1;
            }
        }
    }

    if failures > 0 {
        log::warn!(
            "date column '{}': {} value(s) did not parse as {} and were nulled",
            column,
            failures,
            spec.date_format
        );
    }
}

/// Normalize every configured date column.
pub fn convert_date_columns(table: &mut DataTable, config: &RunConfig) -> PipelineResult<()> {
    for (column, spec) in &config.data_specific_functions.date_columns {
        normalize_column(table, column, spec);
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(id: &str, raw: &str) -> Option<String> {
        DateFormat::from_identifier(id)
            .unwrap()
            .parse(raw)
            .map(|d| d.format(CANONICAL_DATE_FORMAT).to_string())
    }

    #[test]
    fn test_month_year_code_defaults_day_to_28() {
        assert_eq!(parse("XMYYYY", "122023").as_deref(), Some("2023-12-28"));
        assert_eq!(parse("XMYYYY", "12023").as_deref(), Some("2023-01-28"));
        assert_eq!(parse("XMYYYY", "62023").as_deref(), Some("2023-06-28"));
    }

    #[test]
    fn test_day_month_two_digit_year_code() {
        assert_eq!(parse("DDMMYY", "311223").as_deref(), Some("2023-12-31"));
        assert_eq!(parse("DDMMYY", "150123").as_deref(), Some("2023-01-15"));
        assert_eq!(parse("DDMMYY", "300623").as_deref(), Some("2023-06-30"));
    }

    #[test]
    fn test_month_day_two_digit_year_code() {
        assert_eq!(parse("MMDDYY", "123123").as_deref(), Some("2023-12-31"));
    }

    #[test]
    fn test_day_before_month_four_digit_year_code() {
        assert_eq!(parse("XDXMYYYY", "3112023").as_deref(), Some("2023-01-31"));
        // Day not encoded: defaults to 28
        assert_eq!(parse("XDXMYYYY", "12023").as_deref(), Some("2023-01-28"));
    }

    #[test]
    fn test_day_after_month_four_digit_year_code() {
        assert_eq!(parse("XMXDYYYY", "1232023").as_deref(), Some("2023-12-03"));
    }

    #[test]
    fn test_flex_two_digit_year_codes() {
        assert_eq!(parse("XDXMYY", "31123").as_deref(), Some("2023-01-31"));
        assert_eq!(parse("XMXDYY", "12323").as_deref(), Some("2023-12-03"));
    }

    #[test]
    fn test_invalid_compact_values_yield_none() {
        assert_eq!(parse("XMYYYY", "2023"), None); // no month digits
        assert_eq!(parse("XMYYYY", "132023"), None); // month 13
        assert_eq!(parse("DDMMYY", "321223"), None); // day 32
        assert_eq!(parse("XMYYYY", "12-2023"), None); // separator not stripped
    }

    #[test]
    fn test_standard_formats() {
        assert_eq!(parse("%Y-%m-%d", "2023-12-31").as_deref(), Some("2023-12-31"));
        assert_eq!(parse("%m/%d/%Y", "12/31/2023").as_deref(), Some("2023-12-31"));
        assert_eq!(parse("%d %b %Y", "31 Dec 2023").as_deref(), Some("2023-12-31"));
        assert_eq!(
            parse("%Y-%m-%d %H:%M:%S", "2023-12-31 23:59:59").as_deref(),
            Some("2023-12-31")
        );
        assert_eq!(parse("%d/%m/%y", "31/12/23").as_deref(), Some("2023-12-31"));
    }

    #[test]
    fn test_iso8601_accepts_date_and_datetime() {
        assert_eq!(parse("ISO8601", "2023-12-31").as_deref(), Some("2023-12-31"));
        assert_eq!(
            parse("ISO8601", "2023-12-31T23:59:59").as_deref(),
            Some("2023-12-31")
        );
        assert_eq!(
            parse("ISO8601", "2023-12-31 23:59:59.999999").as_deref(),
            Some("2023-12-31")
        );
    }

    fn one_column_table(values: &[&str]) -> DataTable {
        let mut t = DataTable::new(vec!["ORIG_DATE".to_string()]);
        for v in values {
            let cell = if v.is_empty() {
                Value::Null
            } else {
                Value::Str(v.to_string())
            };
            t.push_row(vec![cell]).unwrap();
        }
        t
    }

    #[test]
    fn test_normalize_column_strips_separators_first() {
        let mut t = one_column_table(&["12-2023", "06/2023"]);
        let spec = DateColumnSpec {
            date_format: "XMYYYY".to_string(),
            separator: vec!["-".to_string(), "/".to_string(), ".".to_string()],
        };
        normalize_column(&mut t, "ORIG_DATE", &spec);
        assert_eq!(t.rows[0][0], Value::Str("2023-12-28".to_string()));
        assert_eq!(t.rows[1][0], Value::Str("2023-06-28".to_string()));
    }

    #[test]
    fn test_normalize_column_nulls_failures_without_aborting() {
        let mut t = one_column_table(&["122023", "garbage", "", "062023"]);
        let spec = DateColumnSpec {
            date_format: "XMYYYY".to_string(),
            separator: vec![],
        };
        normalize_column(&mut t, "ORIG_DATE", &spec);
        assert_eq!(t.rows[0][0], Value::Str("2023-12-28".to_string()));
        assert_eq!(t.rows[1][0], Value::Null);
        assert_eq!(t.rows[2][0], Value::Null);
        assert_eq!(t.rows[3][0], Value::Str("2023-06-28".to_string()));
    }

    #[test]
    fn test_unrecognized_format_leaves_column_untouched() {
        let mut t = one_column_table(&["122023"]);
        let spec = DateColumnSpec {
            date_format: "NOT_A_FORMAT".to_string(),
            separator: vec![],
        };
        normalize_column(&mut t, "ORIG_DATE", &spec);
        assert_eq!(t.rows[0][0], Value::Str("122023".to_string()));
    }
}
