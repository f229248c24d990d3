//! Filters and paging for bank entry listings.

use chrono::{Months, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::config::EngineSettings;
use crate::services::error::ConsolidationError;
use crate::services::ingestion::parse_transaction_date;

/// Raw listing parameters as they arrive on the query string. Numbers stay
/// strings so that junk values fall back to defaults instead of failing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub bank_code: Option<String>,
    pub branch: Option<String>,
    pub amount_type: Option<String>,
    #[serde(alias = "description")]
    pub desc: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub month: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub flat: Option<String>,
}

/// Resolved filter set. Every bound is inclusive except `before`, which is
/// the exclusive end of a `month` range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub bank_code: String,
    pub branch: Option<String>,
    pub amount_type: Option<String>,
    /// Already escaped and wrapped in `%` for ILIKE.
    pub description_pattern: Option<String>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    pub month_start: Option<NaiveDateTime>,
    pub before: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: i64,
    pub offset: i64,
}

impl PageWindow {
    pub fn resolve(limit: Option<&str>, offset: Option<&str>, settings: &EngineSettings) -> Self {
        let limit = match limit.and_then(|l| l.trim().parse::<i64>().ok()) {
            Some(l) if l > 0 => l.min(settings.max_page_limit),
            _ => settings.default_page_limit,
        };
        let offset = offset
            .and_then(|o| o.trim().parse::<i64>().ok())
            .filter(|o| *o >= 0)
            .unwrap_or(0);

        Self { limit, offset }
    }

    pub fn has_next(&self, total: i64) -> bool {
        self.offset + self.limit < total
    }

    /// Offset of the following page, or the current offset on the last page.
    pub fn next_offset(&self, total: i64) -> i64 {
        if self.has_next(total) {
            self.offset + self.limit
        } else {
            self.offset
        }
    }
}

impl ListParams {
    pub fn wants_flat(&self) -> bool {
        self.flat
            .as_deref()
            .map(str::trim)
            .is_some_and(|f| f == "1" || f.eq_ignore_ascii_case("true"))
    }

    pub fn window(&self, settings: &EngineSettings) -> PageWindow {
        PageWindow::resolve(self.limit.as_deref(), self.offset.as_deref(), settings)
    }

    pub fn filter(&self) -> Result<EntryFilter, ConsolidationError> {
        let bank_code = non_blank(&self.bank_code)
            .ok_or_else(|| ConsolidationError::validation("bankCode is required"))?;

        let (month_start, before) = match non_blank(&self.month) {
            Some(month) => {
                let (start, end) = month_range(&month)?;
                (Some(start), Some(end))
            }
            None => (None, None),
        };

        Ok(EntryFilter {
            bank_code,
            branch: non_blank(&self.branch),
            amount_type: non_blank(&self.amount_type),
            description_pattern: non_blank(&self.desc).map(|d| contains_pattern(&d)),
            from: non_blank(&self.start_date)
                .map(|d| parse_transaction_date(&d))
                .transpose()?,
            to: non_blank(&self.end_date)
                .map(|d| parse_transaction_date(&d))
                .transpose()?,
            month_start,
            before,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// `[first day of month, first day of next month)` for a `YYYY-MM` value.
pub fn month_range(month: &str) -> Result<(NaiveDateTime, NaiveDateTime), ConsolidationError> {
    let invalid = || ConsolidationError::validation("invalid month, expected YYYY-MM");

    let first = NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
        .map_err(|_| invalid())?;
    let next = first.checked_add_months(Months::new(1)).ok_or_else(invalid)?;

    Ok((first.and_time(Default::default()), next.and_time(Default::default())))
}

/// Case-insensitive substring pattern with LIKE wildcards taken literally.
pub fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(bank_code: &str) -> ListParams {
        ListParams {
            bank_code: Some(bank_code.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn bank_code_is_required() {
        assert!(params("  ").filter().is_err());
        assert!(ListParams::default().filter().is_err());
        assert_eq!(params(" BRI ").filter().unwrap().bank_code, "BRI");
    }

    #[test]
    fn limit_defaults_and_clamps() {
        let settings = EngineSettings::default();

        let cases = [
            (None, 50),
            (Some("0"), 50),
            (Some("-3"), 50),
            (Some("abc"), 50),
            (Some("1"), 1),
            (Some("20"), 20),
            (Some("500"), 500),
            (Some("501"), 500),
        ];
        for (raw, expected) in cases {
            assert_eq!(PageWindow::resolve(raw, None, &settings).limit, expected, "{raw:?}");
        }

        assert_eq!(PageWindow::resolve(None, Some("-1"), &settings).offset, 0);
        assert_eq!(PageWindow::resolve(None, Some("40"), &settings).offset, 40);
    }

    #[test]
    fn next_offset_stays_put_on_last_page() {
        let window = PageWindow { limit: 50, offset: 0 };
        assert!(window.has_next(51));
        assert_eq!(window.next_offset(51), 50);

        assert!(!window.has_next(50));
        assert_eq!(window.next_offset(50), 0);

        let last = PageWindow { limit: 50, offset: 100 };
        assert_eq!(last.next_offset(120), 100);
    }

    #[test]
    fn month_is_half_open() {
        let (start, end) = month_range("2025-12").unwrap();
        assert_eq!(start.to_string(), "2025-12-01 00:00:00");
        assert_eq!(end.to_string(), "2026-01-01 00:00:00");

        assert!(month_range("2025-13").is_err());
        assert!(month_range("12/2025").is_err());
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(contains_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(contains_pattern("transfer"), "%transfer%");
    }

    #[test]
    fn date_bounds_use_statement_date_rules() {
        let filter = ListParams {
            start_date: Some("01/11/2025".to_string()),
            end_date: Some("2025-11-30".to_string()),
            ..params("BRI")
        }
        .filter()
        .unwrap();

        assert_eq!(filter.from.unwrap().to_string(), "2025-11-01 00:00:00");
        assert_eq!(filter.to.unwrap().to_string(), "2025-11-30 00:00:00");

        let bad = ListParams {
            start_date: Some("Nov 1".to_string()),
            ..params("BRI")
        };
        assert!(matches!(
            bad.filter().unwrap_err(),
            ConsolidationError::UnsupportedDateFormat(_)
        ));
    }

    #[test]
    fn flat_accepts_one_or_true() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("0", false), ("yes", false)] {
            let p = ListParams {
                flat: Some(raw.to_string()),
                ..Default::default()
            };
            assert_eq!(p.wants_flat(), expected, "{raw}");
        }
        assert!(!ListParams::default().wants_flat());
    }
}
