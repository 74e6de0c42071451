//! Dates as the site shows them: to the day, to the month, or just a year.

use std::fmt;

use chrono::{Datelike, NaiveDate};

use storygraph_session::Fields;
use storygraph_shared::{Result, StoryGraphError};

/// Text the site renders for a missing date.
pub const NO_DATE: &str = "No date";

/// How much of a date is known. Ordered from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateAccuracy {
    Year,
    Month,
    Day,
}

impl DateAccuracy {
    /// Every accuracy, coarsest first.
    pub const ALL: [Self; 3] = [Self::Year, Self::Month, Self::Day];

    fn field(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
        }
    }
}

/// A date together with how much of it is meaningful.
///
/// A month-accurate date is stored as the first of that month; a
/// year-accurate one as the first of January.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproxDate {
    pub date: NaiveDate,
    pub accuracy: DateAccuracy,
}

impl ApproxDate {
    pub fn new(date: NaiveDate, accuracy: DateAccuracy) -> Self {
        Self { date, accuracy }
    }

    /// A date known to the day.
    pub fn day(date: NaiveDate) -> Self {
        Self::new(date, DateAccuracy::Day)
    }

    /// Parse `12 March 2023`, `March 2023`, `2023` or `No date`.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        if text == NO_DATE {
            return Ok(None);
        }

        if let Ok(date) = NaiveDate::parse_from_str(text, "%d %B %Y") {
            return Ok(Some(Self::new(date, DateAccuracy::Day)));
        }

        if let Ok(date) = NaiveDate::parse_from_str(&format!("1 {text}"), "%d %B %Y") {
            return Ok(Some(Self::new(date, DateAccuracy::Month)));
        }

        if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
            let year = text.parse().map_err(|_| StoryGraphError::date(text))?;
            if let Some(date) = NaiveDate::from_ymd_opt(year, 1, 1) {
                return Ok(Some(Self::new(date, DateAccuracy::Year)));
            }
        }

        Err(StoryGraphError::date(text))
    }

    /// Year/month/day form fields; parts finer than the accuracy are sent empty.
    ///
    /// `template` names the field with `{}` standing for `year`, `month` or
    /// `day`, e.g. `journal_entry[{}]`.
    pub fn form_fields(&self, template: &str) -> Fields {
        DateAccuracy::ALL
            .iter()
            .map(|&part| {
                let value = if self.accuracy >= part {
                    match part {
                        DateAccuracy::Year => self.date.year().to_string(),
                        DateAccuracy::Month => self.date.month().to_string(),
                        DateAccuracy::Day => self.date.day().to_string(),
                    }
                } else {
                    String::new()
                };
                (template.replace("{}", part.field()), value)
            })
            .collect()
    }
}

impl fmt::Display for ApproxDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.accuracy {
            DateAccuracy::Day => "%d %B %Y",
            DateAccuracy::Month => "%B %Y",
            DateAccuracy::Year => "%Y",
        };
        write!(f, "{}", self.date.format(pattern))
    }
}

/// Render an optional date the way the site does.
pub fn describe(date: Option<&ApproxDate>) -> String {
    date.map_or_else(|| NO_DATE.to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_each_accuracy() {
        assert_eq!(
            ApproxDate::parse("5 March 2023").unwrap(),
            Some(ApproxDate::day(ymd(2023, 3, 5)))
        );
        assert_eq!(
            ApproxDate::parse(" March 2023\n").unwrap(),
            Some(ApproxDate::new(ymd(2023, 3, 1), DateAccuracy::Month))
        );
        assert_eq!(
            ApproxDate::parse("2019").unwrap(),
            Some(ApproxDate::new(ymd(2019, 1, 1), DateAccuracy::Year))
        );
        assert_eq!(ApproxDate::parse("No date").unwrap(), None);
    }

    #[test]
    fn rejects_other_text() {
        for text in ["Started", "45%", "Edit", "", "12 Smarch 2020", "19"] {
            let err = ApproxDate::parse(text).unwrap_err();
            assert!(matches!(err, StoryGraphError::Date { .. }), "{text:?}");
        }
    }

    #[test]
    fn display_matches_accuracy() {
        let date = ymd(2023, 3, 5);
        assert_eq!(ApproxDate::day(date).to_string(), "05 March 2023");
        assert_eq!(
            ApproxDate::new(date, DateAccuracy::Month).to_string(),
            "March 2023"
        );
        assert_eq!(ApproxDate::new(date, DateAccuracy::Year).to_string(), "2023");
        assert_eq!(describe(None), "No date");
    }

    #[test]
    fn accuracy_is_ordered() {
        assert!(DateAccuracy::Year < DateAccuracy::Month);
        assert!(DateAccuracy::Month < DateAccuracy::Day);
    }

    #[test]
    fn form_fields_blank_finer_parts() {
        let date = ApproxDate::new(ymd(2023, 3, 5), DateAccuracy::Month);
        assert_eq!(
            date.form_fields("read_instance[start_{}]"),
            vec![
                ("read_instance[start_year]".to_string(), "2023".to_string()),
                ("read_instance[start_month]".to_string(), "3".to_string()),
                ("read_instance[start_day]".to_string(), String::new()),
            ]
        );

        let date = ApproxDate::day(ymd(2024, 1, 12));
        let fields = date.form_fields("journal_entry[{}]");
        assert_eq!(fields[2], ("journal_entry[day]".to_string(), "12".to_string()));
    }
}
