//! CSV parsing into bar candidates.
//!
//! The first record is inspected to locate the timestamp and OHLC columns by
//! name. Documents without a header fall back to the fixed order
//! `time, open, high, low, close[, volume]`. A row that fails validation is
//! skipped and reported as a [`RowError`]; only structural problems abort the
//! whole document.

use barstack_core::{BarTime, ColumnOverrides, Error, ParsedBar, ParserConfig, Result, RowError};
use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::timestamp::parse_timestamp;

/// What a header cell refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    Timestamp,
    Date,
    Time,
    Open,
    High,
    Low,
    Close,
    Volume,
}

fn role_for_token(token: &str) -> Option<ColumnRole> {
    match token {
        "timestamp" | "datetime" | "date_time" | "ts" => Some(ColumnRole::Timestamp),
        "date" => Some(ColumnRole::Date),
        "time" => Some(ColumnRole::Time),
        "open" | "o" => Some(ColumnRole::Open),
        "high" | "h" => Some(ColumnRole::High),
        "low" | "l" => Some(ColumnRole::Low),
        "close" | "c" => Some(ColumnRole::Close),
        "volume" | "vol" | "v" => Some(ColumnRole::Volume),
        _ => None,
    }
}

/// Match a header cell case-insensitively, either as a whole or by its last
/// token, so `"USI: open"` and `"Date Time"` are recognized.
fn column_role(name: &str) -> Option<ColumnRole> {
    let lower = name.trim().to_lowercase();
    role_for_token(&lower).or_else(|| {
        lower
            .rsplit(|c: char| c == ':' || c.is_whitespace())
            .find(|t| !t.is_empty())
            .and_then(role_for_token)
    })
}

fn find_named(header: &StringRecord, name: &str) -> Option<usize> {
    let wanted = name.trim().to_lowercase();
    header.iter().position(|cell| cell.to_lowercase() == wanted)
}

/// Where the timestamp of a row comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeColumns {
    /// One cell holds the full timestamp.
    Single(usize),
    /// Separate date and time-of-day cells.
    DateAndTime(usize, usize),
}

/// Column positions for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub time: TimeColumns,
    pub open: usize,
    pub high: usize,
    pub low: usize,
    pub close: usize,
    pub volume: Option<usize>,
}

impl ColumnMap {
    /// Layout assumed for documents without a header.
    pub const FIXED: ColumnMap = ColumnMap {
        time: TimeColumns::Single(0),
        open: 1,
        high: 2,
        low: 3,
        close: 4,
        volume: Some(5),
    };

    /// Locate columns from a header record.
    ///
    /// Pinned names in `overrides` are used as given. Other roles take the
    /// first header cell whose name matches.
    fn from_header(header: &StringRecord, overrides: &ColumnOverrides) -> Result<Self> {
        let mut found: Vec<(ColumnRole, usize)> = Vec::new();
        for (idx, cell) in header.iter().enumerate() {
            if let Some(role) = column_role(cell) {
                if !found.iter().any(|(r, _)| *r == role) {
                    found.push((role, idx));
                }
            }
        }
        let position = |role: ColumnRole| found.iter().find(|(r, _)| *r == role).map(|(_, i)| *i);

        let mut unmatched: Vec<String> = Vec::new();
        let mut resolve = |name: Option<&str>, matched: Option<usize>| match name {
            Some(name) => {
                let idx = find_named(header, name);
                if idx.is_none() {
                    unmatched.push(name.to_string());
                }
                idx
            }
            None => matched,
        };

        let time = match overrides.time.as_deref() {
            Some(name) => resolve(Some(name), None).map(TimeColumns::Single),
            None => match (
                position(ColumnRole::Timestamp),
                position(ColumnRole::Date),
                position(ColumnRole::Time),
            ) {
                (Some(ts), _, _) => Some(TimeColumns::Single(ts)),
                (None, Some(d), Some(t)) => Some(TimeColumns::DateAndTime(d, t)),
                (None, Some(d), None) => Some(TimeColumns::Single(d)),
                (None, None, Some(t)) => Some(TimeColumns::Single(t)),
                (None, None, None) => None,
            },
        };

        let open = resolve(overrides.open.as_deref(), position(ColumnRole::Open));
        let high = resolve(overrides.high.as_deref(), position(ColumnRole::High));
        let low = resolve(overrides.low.as_deref(), position(ColumnRole::Low));
        let close = resolve(overrides.close.as_deref(), position(ColumnRole::Close));
        let volume = resolve(overrides.volume.as_deref(), position(ColumnRole::Volume));

        if !unmatched.is_empty() {
            return Err(Error::MissingColumns(unmatched));
        }

        match (time, open, high, low, close) {
            (Some(time), Some(open), Some(high), Some(low), Some(close)) => Ok(ColumnMap {
                time,
                open,
                high,
                low,
                close,
                volume,
            }),
            _ => {
                let missing: Vec<String> = [
                    ("time", time.is_some()),
                    ("open", open.is_some()),
                    ("high", high.is_some()),
                    ("low", low.is_some()),
                    ("close", close.is_some()),
                ]
                .iter()
                .filter(|(_, present)| !present)
                .map(|(name, _)| name.to_string())
                .collect();
                Err(Error::MissingColumns(missing))
            }
        }
    }
}

/// Result of parsing one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    /// Bar candidates in input order.
    pub bars: Vec<ParsedBar>,
    /// One entry per skipped row.
    pub errors: Vec<RowError>,
    /// Whether the first record was a header.
    pub has_header: bool,
    /// Column layout used.
    pub columns: ColumnMap,
}

/// CSV parser for OHLC documents.
#[derive(Debug, Clone, Default)]
pub struct CsvParser {
    config: ParserConfig,
}

impl CsvParser {
    /// Create a parser with the given rules.
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse a whole document.
    ///
    /// Fails only on structural problems: bytes that are not UTF-8, an empty
    /// document, or a first record that is neither a usable header nor data.
    pub fn parse(&self, raw: &[u8]) -> Result<ParseOutput> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| Error::decode(format!("input is not valid UTF-8: {e}")))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(self.config.delimiter_byte()?)
            .from_reader(text.as_bytes());

        let mut bars = Vec::new();
        let mut errors = Vec::new();
        let mut layout: Option<(ColumnMap, bool)> = None;
        let mut column_count = 0usize;

        for (idx, result) in reader.records().enumerate() {
            let row_number = idx + 1;
            let record = match result {
                Ok(record) => record,
                Err(e) if layout.is_none() => {
                    return Err(Error::header(format!("unreadable first record: {e}")));
                }
                Err(e) => {
                    errors.push(RowError::new(row_number, format!("malformed CSV record: {e}")));
                    continue;
                }
            };

            if record.iter().all(str::is_empty) {
                continue;
            }

            let columns = match layout {
                Some((columns, _)) => columns,
                None => {
                    column_count = record.len();
                    let overrides = &self.config.columns;
                    let is_header = record.iter().any(|cell| column_role(cell).is_some())
                        || overrides.names().any(|name| find_named(&record, name).is_some());
                    if is_header {
                        let columns = ColumnMap::from_header(&record, overrides)?;
                        debug!(?columns, "located columns from header");
                        layout = Some((columns, true));
                        continue;
                    }
                    if record.get(0).and_then(parse_timestamp).is_none() {
                        return Err(Error::header(format!(
                            "first record is neither a header nor a data row: {:?}",
                            record.iter().collect::<Vec<_>>()
                        )));
                    }
                    if !self.config.columns.is_empty() {
                        warn!("no header found, column overrides ignored");
                    }
                    debug!("no header found, using fixed column order");
                    layout = Some((ColumnMap::FIXED, false));
                    ColumnMap::FIXED
                }
            };

            match self.parse_record(row_number, &record, &columns) {
                Ok(bar) => bars.push(bar),
                Err(reason) => {
                    debug!(row_number, %reason, "skipping row");
                    errors.push(RowError::new(row_number, reason));
                }
            }
        }

        let (columns, has_header) = layout.ok_or(Error::EmptyInput)?;

        info!(
            rows = bars.len() + errors.len(),
            columns = column_count,
            has_header,
            "CSV loaded"
        );
        if !errors.is_empty() {
            warn!(rejected = errors.len(), "some rows could not be parsed");
        }

        Ok(ParseOutput {
            bars,
            errors,
            has_header,
            columns,
        })
    }

    fn parse_record(
        &self,
        row_number: usize,
        record: &StringRecord,
        columns: &ColumnMap,
    ) -> std::result::Result<ParsedBar, String> {
        let time = self.parse_time(record, columns.time)?;

        let open = self.parse_price(record, columns.open, "open")?;
        let high = self.parse_price(record, columns.high, "high")?;
        let low = self.parse_price(record, columns.low, "low")?;
        let close = self.parse_price(record, columns.close, "close")?;

        if self.config.reject_inconsistent_ohlc
            && (low > open.min(close) || high < open.max(close) || low > high)
        {
            return Err(format!(
                "inconsistent OHLC: open={open}, high={high}, low={low}, close={close}"
            ));
        }

        let volume = match columns.volume.and_then(|i| record.get(i)) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
                _ => return Err(format!("invalid volume value '{raw}'")),
            },
        };

        Ok(ParsedBar {
            row_number,
            time,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    fn parse_time(
        &self,
        record: &StringRecord,
        columns: TimeColumns,
    ) -> std::result::Result<BarTime, String> {
        let raw = match columns {
            TimeColumns::Single(i) => record
                .get(i)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| "missing timestamp field".to_string())?
                .to_string(),
            TimeColumns::DateAndTime(d, t) => {
                let date = record
                    .get(d)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| "missing date field".to_string())?;
                match record.get(t).filter(|s| !s.is_empty()) {
                    Some(time) => format!("{date} {time}"),
                    None => date.to_string(),
                }
            }
        };
        parse_timestamp(&raw).ok_or_else(|| format!("unparseable timestamp '{raw}'"))
    }

    fn parse_price(
        &self,
        record: &StringRecord,
        idx: usize,
        name: &str,
    ) -> std::result::Result<f64, String> {
        let raw = record
            .get(idx)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("missing {name} field"))?;
        let value: f64 = raw
            .parse()
            .map_err(|_| format!("invalid {name} value '{raw}'"))?;
        if !value.is_finite() {
            return Err(format!("non-finite {name} value '{raw}'"));
        }
        if value.abs() > self.config.max_abs_price {
            return Err(format!("extreme {name} value {value}"));
        }
        Ok(value)
    }
}

/// Parse a document with the default rules.
pub fn parse(raw: &[u8]) -> Result<ParseOutput> {
    CsvParser::default().parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    #[test]
    fn test_header_case_insensitive() {
        let csv = "Time,OPEN,High,low,Close,Volume\n\
                   2024-01-02 09:30:00,100,101,99,100.5,1200\n";
        let out = parse(csv.as_bytes()).unwrap();

        assert!(out.has_header);
        assert!(out.errors.is_empty());
        assert_eq!(out.bars.len(), 1);
        let bar = &out.bars[0];
        assert_eq!(bar.row_number, 2);
        assert_relative_eq!(bar.open, 100.0);
        assert_relative_eq!(bar.close, 100.5);
        assert_eq!(bar.volume, Some(1200.0));
        assert!(bar.time.is_naive());
    }

    #[test]
    fn test_header_columns_in_any_order_with_prefixes() {
        let csv = "time,USI: close,USI: low,USI: high,USI: open,extra\n\
                   1704205800,100.5,99,101,100,x\n";
        let out = parse(csv.as_bytes()).unwrap();

        assert_eq!(out.columns.open, 4);
        assert_eq!(out.columns.close, 1);
        assert_eq!(out.columns.volume, None);
        let bar = &out.bars[0];
        assert_relative_eq!(bar.open, 100.0);
        assert_relative_eq!(bar.high, 101.0);
        assert_relative_eq!(bar.low, 99.0);
        assert_relative_eq!(bar.close, 100.5);
        assert!(!bar.time.is_naive());
    }

    #[test]
    fn test_separate_date_and_time_columns() {
        let csv = "Date,Time,Open,High,Low,Close\n\
                   01/02/2024,09:30,100,101,99,100.5\n";
        let out = parse(csv.as_bytes()).unwrap();

        assert_eq!(out.columns.time, TimeColumns::DateAndTime(0, 1));
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(out.bars[0].time, BarTime::Naive(expected));
    }

    #[test]
    fn test_headerless_fixed_order() {
        let csv = "2024-01-02 09:30:00,100,101,99,100.5\n\
                   2024-01-02 09:31:00,100.5,102,100,101,50\n";
        let out = parse(csv.as_bytes()).unwrap();

        assert!(!out.has_header);
        assert_eq!(out.columns, ColumnMap::FIXED);
        assert_eq!(out.bars.len(), 2);
        assert_eq!(out.bars[0].row_number, 1);
        assert_eq!(out.bars[0].volume, None);
        assert_eq!(out.bars[1].volume, Some(50.0));
    }

    #[test]
    fn test_bad_timestamp_row_is_reported_once() {
        let csv = "time,open,high,low,close\n\
                   2024-01-02 09:30:00,100,101,99,100.5\n\
                   not-a-date,100,101,99,100.5\n\
                   2024-01-02 09:32:00,100,101,99,100.5\n";
        let out = parse(csv.as_bytes()).unwrap();

        assert_eq!(out.bars.len(), 2);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].row_number, 3);
        assert!(out.errors[0].reason.contains("not-a-date"));
        assert_eq!(out.bars[1].row_number, 4);
    }

    #[test]
    fn test_bad_numeric_fields() {
        let csv = "time,open,high,low,close,volume\n\
                   2024-01-02 09:30:00,abc,101,99,100.5,\n\
                   2024-01-02 09:31:00,100,101,99\n\
                   2024-01-02 09:32:00,100,NaN,99,100.5,\n\
                   2024-01-02 09:33:00,100,101,99,100.5,-3\n\
                   2024-01-02 09:34:00,100,101,99,100.5,\n";
        let out = parse(csv.as_bytes()).unwrap();

        assert_eq!(out.bars.len(), 1);
        assert_eq!(out.bars[0].row_number, 6);
        let rows: Vec<usize> = out.errors.iter().map(|e| e.row_number).collect();
        assert_eq!(rows, vec![2, 3, 4, 5]);
        assert!(out.errors[0].reason.contains("open"));
        assert!(out.errors[1].reason.contains("missing close"));
        assert!(out.errors[2].reason.contains("non-finite high"));
        assert!(out.errors[3].reason.contains("volume"));
    }

    #[test]
    fn test_inconsistent_ohlc_rejected() {
        let csv = "time,open,high,low,close\n\
                   2024-01-02 09:30:00,100,99,98,100.5\n";
        let out = parse(csv.as_bytes()).unwrap();
        assert!(out.bars.is_empty());
        assert!(out.errors[0].reason.contains("inconsistent OHLC"));

        let lenient = CsvParser::new(ParserConfig {
            reject_inconsistent_ohlc: false,
            ..ParserConfig::default()
        });
        let out = lenient.parse(csv.as_bytes()).unwrap();
        assert_eq!(out.bars.len(), 1);
    }

    #[test]
    fn test_extreme_price_rejected() {
        let csv = "time,open,high,low,close\n\
                   2024-01-02 09:30:00,100,2000000000,99,100.5\n";
        let out = parse(csv.as_bytes()).unwrap();
        assert!(out.bars.is_empty());
        assert!(out.errors[0].reason.contains("extreme high"));
    }

    #[test]
    fn test_preserves_input_order() {
        let csv = "time,open,high,low,close\n\
                   2024-01-02 09:32:00,1,1,1,1\n\
                   2024-01-02 09:30:00,2,2,2,2\n\
                   2024-01-02 09:31:00,3,3,3,3\n";
        let out = parse(csv.as_bytes()).unwrap();
        let opens: Vec<f64> = out.bars.iter().map(|b| b.open).collect();
        assert_eq!(opens, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_bom_and_blank_lines() {
        let csv = "\u{feff}time,open,high,low,close\n\
                   \n\
                   2024-01-02 09:30:00,100,101,99,100.5\n\
                   ,,,,\n";
        let out = parse(csv.as_bytes()).unwrap();
        assert!(out.has_header);
        assert_eq!(out.bars.len(), 1);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_custom_delimiter() {
        let parser = CsvParser::new(ParserConfig {
            delimiter: ';',
            ..ParserConfig::default()
        });
        let csv = "time;open;high;low;close\n2024-01-02 09:30:00;100;101;99;100.5\n";
        let out = parser.parse(csv.as_bytes()).unwrap();
        assert_eq!(out.bars.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_is_structural() {
        let raw = b"time,open,high,low,close\n\xff\xfe,1,1,1,1\n";
        assert!(matches!(parse(raw), Err(Error::Decode(_))));
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(parse(b""), Err(Error::EmptyInput)));
        assert!(matches!(parse(b"\n\n"), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_header_missing_columns() {
        let csv = "time,open,close\n2024-01-02 09:30:00,100,100.5\n";
        match parse(csv.as_bytes()) {
            Err(Error::MissingColumns(missing)) => {
                assert_eq!(missing, vec!["high".to_string(), "low".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unrecognizable_first_record() {
        let csv = "foo,bar,baz\n1,2,3\n";
        assert!(matches!(parse(csv.as_bytes()), Err(Error::Header(_))));
    }

    #[test]
    fn test_header_only_document() {
        let out = parse(b"time,open,high,low,close\n").unwrap();
        assert!(out.has_header);
        assert!(out.bars.is_empty());
        assert!(out.errors.is_empty());
    }

    const INDICATOR_EXPORT: &str = "\
time,open,high,low,close,BLKVOL.ASK.US-BLKVOL.BID.US · USI: open,BLKVOL.ASK.US-BLKVOL.BID.US · USI: high,BLKVOL.ASK.US-BLKVOL.BID.US · USI: low,BLKVOL.ASK.US-BLKVOL.BID.US · USI: close,Volume
1704205800,500,501,499,500.5,10,11,9.5,10.5,1200
";

    #[test]
    fn test_name_matching_takes_first_price_columns() {
        let out = parse(INDICATOR_EXPORT.as_bytes()).unwrap();
        assert_eq!(out.columns.open, 1);
        assert_relative_eq!(out.bars[0].open, 500.0);
    }

    #[test]
    fn test_column_overrides_select_indicator_series() {
        let parser = CsvParser::new(ParserConfig {
            columns: ColumnOverrides::with_price_prefix("blkvol.ask.us-blkvol.bid.us · usi: "),
            ..ParserConfig::default()
        });
        let out = parser.parse(INDICATOR_EXPORT.as_bytes()).unwrap();

        assert_eq!(out.columns.open, 5);
        assert_eq!(out.columns.close, 8);
        assert_eq!(out.columns.time, TimeColumns::Single(0));
        assert_eq!(out.columns.volume, Some(9));
        let bar = &out.bars[0];
        assert_relative_eq!(bar.open, 10.0);
        assert_relative_eq!(bar.high, 11.0);
        assert_relative_eq!(bar.low, 9.5);
        assert_relative_eq!(bar.close, 10.5);
        assert_eq!(bar.volume, Some(1200.0));
    }

    #[test]
    fn test_column_override_for_time_and_unknown_name() {
        let csv = "Bar Start,px_o,px_h,px_l,px_c\n2024-01-02 09:30:00,100,101,99,100.5\n";
        let parser = CsvParser::new(ParserConfig {
            columns: ColumnOverrides {
                time: Some("bar start".into()),
                open: Some("px_o".into()),
                high: Some("px_h".into()),
                low: Some("px_l".into()),
                close: Some("px_c".into()),
                volume: None,
            },
            ..ParserConfig::default()
        });
        let out = parser.parse(csv.as_bytes()).unwrap();
        assert!(out.has_header);
        assert_eq!(out.bars.len(), 1);
        assert_relative_eq!(out.bars[0].close, 100.5);

        let parser = CsvParser::new(ParserConfig {
            columns: ColumnOverrides {
                close: Some("settle".into()),
                ..ColumnOverrides::default()
            },
            ..ParserConfig::default()
        });
        match parser.parse(INDICATOR_EXPORT.as_bytes()) {
            Err(Error::MissingColumns(missing)) => assert_eq!(missing, vec!["settle".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
