use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FetcherError;

/// A single patent as returned by the patent API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patent {
    pub patent_number: String,
    pub title: String,
    pub grant_date: NaiveDate,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub claims: Vec<String>,
    pub assignees: Vec<String>,
    pub inventors: Vec<String>,
    pub description: String,
}

/// Grant-date range, `from` strictly before `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(rename = "grant_from_date")]
    from: NaiveDate,
    #[serde(rename = "grant_to_date")]
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, FetcherError> {
        if from >= to {
            return Err(FetcherError::InvalidDateRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn start(&self) -> NaiveDate {
        self.from
    }

    pub fn end(&self) -> NaiveDate {
        self.to
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// Page number and page size sent to the patent API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    page: u32,
    page_size: u32,
}

impl PageWindow {
    pub fn new(page: u32, page_size: u32, max_page_size: u32) -> Result<Self, FetcherError> {
        if page == 0 {
            return Err(FetcherError::InvalidPageWindow(
                "page must be at least 1".to_string(),
            ));
        }
        validate_page_size(page_size, max_page_size)?;
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Same size, different page.
    pub fn with_page(self, page: u32) -> Self {
        Self { page, ..self }
    }
}

fn validate_page_size(page_size: u32, max_page_size: u32) -> Result<u32, FetcherError> {
    if page_size == 0 || page_size > max_page_size {
        return Err(FetcherError::InvalidPageWindow(format!(
            "page_size {page_size} must be between 1 and {max_page_size}"
        )));
    }
    Ok(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_range_requires_ordering() {
        assert!(DateRange::new(date(2001, 4, 25), date(2001, 5, 25)).is_ok());
        let err = DateRange::new(date(2001, 5, 25), date(2001, 5, 25)).unwrap_err();
        assert_matches!(err, FetcherError::InvalidDateRange { .. });
    }

    #[test]
    fn page_window_bounds() {
        assert!(PageWindow::new(1, 1000, 1000).is_ok());
        assert_matches!(
            PageWindow::new(0, 10, 1000),
            Err(FetcherError::InvalidPageWindow(_))
        );
        assert_matches!(
            PageWindow::new(1, 1001, 1000),
            Err(FetcherError::InvalidPageWindow(_))
        );
        assert_matches!(
            PageWindow::new(1, 0, 1000),
            Err(FetcherError::InvalidPageWindow(_))
        );
    }

    #[test]
    fn patent_uses_wire_field_names() {
        let raw = r#"{
            "patent_number": "US1234567",
            "title": "Widget",
            "grant_date": "2001-05-01",
            "abstract": "A widget.",
            "claims": ["1. A widget."],
            "assignees": ["Acme"],
            "inventors": ["Ada"],
            "description": "Widgets all the way down."
        }"#;
        let patent: Patent = serde_json::from_str(raw).unwrap();
        assert_eq!(patent.abstract_text, "A widget.");
        assert_eq!(patent.grant_date, date(2001, 5, 1));

        let value = serde_json::to_value(&patent).unwrap();
        assert_eq!(value["abstract"], "A widget.");
    }
}
