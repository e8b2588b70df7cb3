use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use time::{Date, Duration, Month, OffsetDateTime, Weekday};

use crate::ValidationError;

/// Calendar date exchanged with the quote server as an 8-digit `YYYYMMDD` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuoteDate(Date);

impl QuoteDate {
    pub fn from_ymd(year: i32, month: u8, day: u8) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidDate {
            value: format!("{year:04}{month:02}{day:02}"),
        };
        let month = Month::try_from(month).map_err(|_| invalid())?;
        Date::from_calendar_date(year, month, day)
            .map(Self)
            .map_err(|_| invalid())
    }

    /// Parse `YYYYMMDD` or `YYYY-MM-DD`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let invalid = || ValidationError::InvalidDate {
            value: input.to_owned(),
        };

        let bytes = trimmed.as_bytes();
        let digits = match bytes.len() {
            8 => trimmed.to_owned(),
            10 if bytes[4] == b'-' && bytes[7] == b'-' => trimmed.replace('-', ""),
            _ => return Err(invalid()),
        };
        if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let year: i32 = digits[0..4].parse().map_err(|_| invalid())?;
        let month: u8 = digits[4..6].parse().map_err(|_| invalid())?;
        let day: u8 = digits[6..8].parse().map_err(|_| invalid())?;
        Self::from_ymd(year, month, day).map_err(|_| invalid())
    }

    /// Read a date from a decoded record field; the server emits either
    /// `20230101` or `"20230101"`.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        match value {
            Value::String(text) => Self::parse(text),
            Value::Number(number) => match number.as_u64() {
                Some(raw) => Self::parse(&raw.to_string()),
                None => Err(ValidationError::InvalidDate {
                    value: number.to_string(),
                }),
            },
            other => Err(ValidationError::InvalidDate {
                value: other.to_string(),
            }),
        }
    }

    pub fn today_utc() -> Self {
        Self(OffsetDateTime::now_utc().date())
    }

    pub const fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub const fn into_inner(self) -> Date {
        self.0
    }

    pub fn to_wire(self) -> String {
        format!(
            "{:04}{:02}{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }

    pub fn weekday(self) -> Weekday {
        self.0.weekday()
    }

    pub fn is_business_day(self) -> bool {
        !matches!(self.0.weekday(), Weekday::Saturday | Weekday::Sunday)
    }

    /// Step back `n` weekdays. A weekend start rolls back to Friday as the first step;
    /// `n == 0` is the identity. Exchange holidays are not modelled.
    pub fn sub_business_days(self, n: u32) -> Self {
        let mut date = self;
        let mut remaining = n;
        while remaining > 0 {
            match date.0.previous_day() {
                Some(previous) => date = Self(previous),
                None => break,
            }
            if date.is_business_day() {
                remaining -= 1;
            }
        }
        date
    }

    /// Monday of the ISO week containing this date.
    pub fn start_of_week(self) -> Self {
        let offset = i64::from(self.0.weekday().number_days_from_monday());
        self.0
            .checked_sub(Duration::days(offset))
            .map(Self)
            .unwrap_or(self)
    }

    pub fn start_of_month(self) -> Self {
        Date::from_calendar_date(self.0.year(), self.0.month(), 1)
            .map(Self)
            .unwrap_or(self)
    }

    /// Standard monthly expiration day.
    pub fn is_third_friday(self) -> bool {
        self.0.weekday() == Weekday::Friday && (15..=21).contains(&self.0.day())
    }
}

impl Display for QuoteDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl Serialize for QuoteDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for QuoteDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(D::Error::custom)
    }
}
