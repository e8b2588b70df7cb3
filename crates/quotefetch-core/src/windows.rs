//! Date-window batching over list-dates discovery results.
//!
//! Discovery returns one row per available date per identity. Rows are
//! filtered by a [`WindowPolicy`], bucketed by [`Granularity`] and folded to
//! `(first, last)` date windows that become the next round of contracts.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::contract::{ContractRequest, FetchParams};
use crate::domain::{Identity, QuoteDate};
use crate::envelope::Record;
use crate::ValidationError;

/// A discovered date for one identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DiscoveryRow {
    pub identity: Identity,
    pub date: QuoteDate,
}

impl DiscoveryRow {
    /// Read the dates out of a list-dates result. The date column is the
    /// operation's record key (`quote`, `implied_volatility`, ...) or `date`.
    pub fn from_records(
        request: &ContractRequest,
        records: &[Record],
    ) -> Result<Vec<Self>, WindowError> {
        let key = request.operation().record_key();
        records
            .iter()
            .map(|record| {
                let value = record
                    .get(key)
                    .or_else(|| record.get("date"))
                    .ok_or_else(|| WindowError::MissingDate {
                        key: key.to_owned(),
                    })?;
                let date = QuoteDate::from_json(value)?;
                Ok(Self {
                    identity: request.identity().clone(),
                    date,
                })
            })
            .collect()
    }
}

/// Which discovered dates survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Dates strictly after `expiry - N business days`.
    CutoffBeforeExpiry(u32),
    ExactDate(QuoteDate),
    /// The business day before today.
    MostRecentBusinessDay,
    AllAvailable,
}

impl FromStr for WindowPolicy {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidPolicy {
            value: input.to_owned(),
        };
        let normalized = input.trim().to_ascii_lowercase();
        match normalized.split_once(':') {
            Some(("cutoff", days)) => days
                .trim()
                .parse()
                .map(Self::CutoffBeforeExpiry)
                .map_err(|_| invalid()),
            Some(("date", date)) => QuoteDate::parse(date)
                .map(Self::ExactDate)
                .map_err(|_| invalid()),
            Some(_) => Err(invalid()),
            None => match normalized.as_str() {
                "yesterday" => Ok(Self::MostRecentBusinessDay),
                "all" => Ok(Self::AllAvailable),
                _ => Err(invalid()),
            },
        }
    }
}

impl Display for WindowPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CutoffBeforeExpiry(days) => write!(f, "cutoff:{days}"),
            Self::ExactDate(date) => write!(f, "date:{date}"),
            Self::MostRecentBusinessDay => f.write_str("yesterday"),
            Self::AllAvailable => f.write_str("all"),
        }
    }
}

/// Bucket size used to fold dates into windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    #[default]
    Day,
    /// ISO week starting Monday.
    Week,
    Month,
}

impl Granularity {
    pub fn bucket(self, date: QuoteDate) -> QuoteDate {
        match self {
            Self::Day => date,
            Self::Week => date.start_of_week(),
            Self::Month => date.start_of_month(),
        }
    }
}

impl FromStr for Granularity {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "day" | "d" => Ok(Self::Day),
            "week" | "w" => Ok(Self::Week),
            "month" | "m" => Ok(Self::Month),
            _ => Err(ValidationError::InvalidGranularity {
                value: input.to_owned(),
            }),
        }
    }
}

/// Contiguous fetch range for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    pub identity: Identity,
    pub start_date: QuoteDate,
    pub end_date: QuoteDate,
    pub extras: Vec<(String, String)>,
}

impl DateWindow {
    pub fn fetch_params(&self) -> FetchParams {
        FetchParams {
            extras: self.extras.clone(),
            ..FetchParams::range(self.start_date, self.end_date)
        }
    }
}

impl Serialize for DateWindow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("root", &self.identity.root)?;
        map.serialize_entry("exp", &self.identity.expiry)?;
        map.serialize_entry("strike", &self.identity.strike().map(|strike| strike.dollars()))?;
        map.serialize_entry("right", &self.identity.right())?;
        map.serialize_entry("start_date", &self.start_date)?;
        map.serialize_entry("end_date", &self.end_date)?;
        for (key, value) in &self.extras {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// Reportable: the caller should log the unfiltered rows and skip this identity.
    #[error("all {} discovered dates were filtered out", unfiltered.len())]
    AllDatesFiltered { unfiltered: Vec<DiscoveryRow> },
    #[error("cutoff policy needs an expiration for '{identity}'")]
    ExpiryRequired { identity: String },
    #[error("discovery record has no '{key}' date column")]
    MissingDate { key: String },
    #[error(transparent)]
    InvalidDate(#[from] ValidationError),
}

/// Applies a policy and granularity to discovery rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowBuilder {
    policy: WindowPolicy,
    granularity: Granularity,
    extras: Vec<(String, String)>,
    today: QuoteDate,
}

impl WindowBuilder {
    pub fn new(policy: WindowPolicy, granularity: Granularity) -> Self {
        Self {
            policy,
            granularity,
            extras: Vec::new(),
            today: QuoteDate::today_utc(),
        }
    }

    /// Reference date for [`WindowPolicy::MostRecentBusinessDay`].
    pub fn with_today(mut self, today: QuoteDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.push((key.into(), value.into()));
        self
    }

    pub fn with_extras(mut self, extras: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extras.extend(extras);
        self
    }

    /// Filter, bucket and fold. Windows come out ordered by identity, then date.
    pub fn build_windows(&self, rows: &[DiscoveryRow]) -> Result<Vec<DateWindow>, WindowError> {
        let mut groups: BTreeMap<(&Identity, QuoteDate), (QuoteDate, QuoteDate)> = BTreeMap::new();

        for row in rows {
            if !self.keeps(row)? {
                continue;
            }
            let key = (&row.identity, self.granularity.bucket(row.date));
            groups
                .entry(key)
                .and_modify(|(first, last)| {
                    *first = (*first).min(row.date);
                    *last = (*last).max(row.date);
                })
                .or_insert((row.date, row.date));
        }

        if groups.is_empty() {
            return Err(WindowError::AllDatesFiltered {
                unfiltered: rows.to_vec(),
            });
        }

        Ok(groups
            .into_iter()
            .map(|((identity, _), (start_date, end_date))| DateWindow {
                identity: identity.clone(),
                start_date,
                end_date,
                extras: self.extras.clone(),
            })
            .collect())
    }

    fn keeps(&self, row: &DiscoveryRow) -> Result<bool, WindowError> {
        Ok(match self.policy {
            WindowPolicy::CutoffBeforeExpiry(days) => {
                let expiry = row
                    .identity
                    .expiry
                    .ok_or_else(|| WindowError::ExpiryRequired {
                        identity: row.identity.to_string(),
                    })?;
                row.date > expiry.sub_business_days(days)
            }
            WindowPolicy::ExactDate(date) => row.date == date,
            WindowPolicy::MostRecentBusinessDay => row.date == self.today.sub_business_days(1),
            WindowPolicy::AllAvailable => true,
        })
    }
}

/// Flat view of the rows handed back by a filtered-out discovery, for dumps.
pub fn unfiltered_dump(rows: &[DiscoveryRow]) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            serde_json::json!({
                "root": row.identity.root,
                "exp": row.identity.expiry,
                "strike": row.identity.strike().map(|strike| strike.dollars()),
                "right": row.identity.right(),
                "date": row.date,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::contract::{ContractFactory, QuoteServerFactory};
    use crate::domain::{DataKind, Operation, OptionLeg, Right, Root, SecurityType, Strike};

    fn date(raw: &str) -> QuoteDate {
        QuoteDate::parse(raw).expect("valid date")
    }

    fn identity(strike: i64, expiry: &str) -> Identity {
        Identity::series(
            Root::parse("AAPL").expect("root"),
            date(expiry),
            OptionLeg::new(Strike::from_scaled(strike).expect("strike"), Right::Call),
        )
    }

    fn rows(identity: &Identity, dates: &[&str]) -> Vec<DiscoveryRow> {
        dates
            .iter()
            .map(|raw| DiscoveryRow {
                identity: identity.clone(),
                date: date(raw),
            })
            .collect()
    }

    fn retained(windows: &[DateWindow]) -> Vec<String> {
        windows.iter().map(|w| w.start_date.to_wire()).collect()
    }

    #[test]
    fn cutoff_keeps_dates_close_to_expiry() {
        let series = identity(150_000, "20230301");
        let discovered = rows(&series, &["20230101", "20230115", "20230201"]);

        let windows = WindowBuilder::new(WindowPolicy::CutoffBeforeExpiry(30), Granularity::Day)
            .build_windows(&discovered)
            .expect("one survivor");

        assert_eq!(retained(&windows), ["20230201"]);
    }

    #[test]
    fn cutoff_boundary_is_strict() {
        // 2023-03-01 minus 2 business days is 2023-02-27.
        let series = identity(150_000, "20230301");
        let discovered = rows(&series, &["20230224", "20230227", "20230228", "20230301"]);

        let windows = WindowBuilder::new(WindowPolicy::CutoffBeforeExpiry(2), Granularity::Day)
            .build_windows(&discovered)
            .expect("survivors");
        assert_eq!(retained(&windows), ["20230228", "20230301"]);

        let error = WindowBuilder::new(WindowPolicy::CutoffBeforeExpiry(0), Granularity::Day)
            .build_windows(&discovered)
            .expect_err("nothing after expiry");
        assert!(matches!(error, WindowError::AllDatesFiltered { ref unfiltered } if unfiltered.len() == 4));
    }

    #[test]
    fn day_granularity_yields_single_date_windows() {
        let series = identity(150_000, "20230317");
        let discovered = rows(&series, &["20230302", "20230301", "20230303"]);

        let windows = WindowBuilder::new(WindowPolicy::AllAvailable, Granularity::Day)
            .build_windows(&discovered)
            .expect("windows");

        assert_eq!(windows.len(), 3);
        assert!(windows.iter().all(|w| w.start_date == w.end_date));
        assert_eq!(retained(&windows), ["20230301", "20230302", "20230303"]);
    }

    #[test]
    fn month_granularity_folds_to_min_and_max() {
        let series = identity(150_000, "20230317");
        let discovered = rows(
            &series,
            &["20230210", "20230203", "20230228", "20230301", "20230315"],
        );

        let windows = WindowBuilder::new(WindowPolicy::AllAvailable, Granularity::Month)
            .build_windows(&discovered)
            .expect("windows");

        let ranges: Vec<(String, String)> = windows
            .iter()
            .map(|w| (w.start_date.to_wire(), w.end_date.to_wire()))
            .collect();
        assert_eq!(
            ranges,
            [
                (String::from("20230203"), String::from("20230228")),
                (String::from("20230301"), String::from("20230315")),
            ]
        );
    }

    #[test]
    fn week_granularity_starts_on_monday() {
        let series = identity(150_000, "20230317");
        // Sunday 2023-03-05 belongs to the week of Monday 2023-02-27.
        let discovered = rows(&series, &["20230227", "20230305", "20230306"]);

        let windows = WindowBuilder::new(WindowPolicy::AllAvailable, Granularity::Week)
            .build_windows(&discovered)
            .expect("windows");

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].end_date, date("20230305"));
        assert_eq!(windows[1].start_date, date("20230306"));
    }

    #[test]
    fn identities_are_grouped_separately() {
        let low = identity(150_000, "20230317");
        let high = identity(155_000, "20230317");
        let mut discovered = rows(&high, &["20230301"]);
        discovered.extend(rows(&low, &["20230301", "20230302"]));

        let windows = WindowBuilder::new(WindowPolicy::AllAvailable, Granularity::Month)
            .with_extra("rth", "true")
            .build_windows(&discovered)
            .expect("windows");

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].identity, low);
        assert_eq!(windows[0].end_date, date("20230302"));
        assert_eq!(windows[1].extras, [(String::from("rth"), String::from("true"))]);
    }

    #[test]
    fn yesterday_means_previous_business_day() {
        let series = identity(150_000, "20230317");
        let discovered = rows(&series, &["20230302", "20230303", "20230306"]);

        // Monday 2023-03-06: the previous business day is Friday 2023-03-03.
        let windows = WindowBuilder::new(WindowPolicy::MostRecentBusinessDay, Granularity::Day)
            .with_today(date("20230306"))
            .build_windows(&discovered)
            .expect("windows");
        assert_eq!(retained(&windows), ["20230303"]);

        let exact = WindowBuilder::new(WindowPolicy::ExactDate(date("20230302")), Granularity::Day)
            .build_windows(&discovered)
            .expect("windows");
        assert_eq!(retained(&exact), ["20230302"]);
    }

    #[test]
    fn cutoff_requires_an_expiration() {
        let discovered = vec![DiscoveryRow {
            identity: Identity::root(Root::parse("SPY").expect("root")),
            date: date("20230301"),
        }];
        let error = WindowBuilder::new(WindowPolicy::CutoffBeforeExpiry(5), Granularity::Day)
            .build_windows(&discovered)
            .expect_err("no expiry");
        assert!(matches!(error, WindowError::ExpiryRequired { .. }));
    }

    #[test]
    fn policies_parse_from_cli_syntax() {
        assert_eq!(
            "cutoff:30".parse::<WindowPolicy>().expect("cutoff"),
            WindowPolicy::CutoffBeforeExpiry(30)
        );
        assert_eq!(
            "date:20230301".parse::<WindowPolicy>().expect("date"),
            WindowPolicy::ExactDate(date("20230301"))
        );
        assert_eq!(
            "Yesterday".parse::<WindowPolicy>().expect("yesterday"),
            WindowPolicy::MostRecentBusinessDay
        );
        assert!("cutoff:soon".parse::<WindowPolicy>().is_err());
        assert!("weekly".parse::<Granularity>().is_err());
        assert_eq!("month".parse::<Granularity>().expect("month"), Granularity::Month);
    }

    #[test]
    fn discovery_rows_read_integer_dates() {
        let request = QuoteServerFactory::default()
            .build(
                SecurityType::Option,
                identity(150_000, "20230317"),
                Operation::ListDates(DataKind::ImpliedVolatility),
                &FetchParams::default(),
            )
            .expect("contract");
        let records: Vec<Record> = [json!({"implied_volatility": 20230301}), json!({"implied_volatility": "20230302"})]
            .into_iter()
            .filter_map(|value| value.as_object().cloned())
            .collect();

        let discovered = DiscoveryRow::from_records(&request, &records).expect("rows");
        assert_eq!(discovered.len(), 2);
        assert_eq!(discovered[1].date, date("20230302"));
    }

    #[test]
    fn windows_serialize_strikes_in_dollars() {
        let window = DateWindow {
            identity: identity(152_500, "20230317"),
            start_date: date("20230301"),
            end_date: date("20230303"),
            extras: vec![(String::from("ivl"), String::from("60000"))],
        };
        assert_eq!(
            serde_json::to_value(&window).expect("json"),
            json!({
                "root": "AAPL", "exp": "20230317", "strike": 152.5, "right": "C",
                "start_date": "20230301", "end_date": "20230303", "ivl": "60000"
            })
        );
    }
}
