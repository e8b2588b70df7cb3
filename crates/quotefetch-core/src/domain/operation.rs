use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize, Serializer};

use crate::domain::{Identity, SecurityType};
use crate::ValidationError;

/// Dataset served by the list-dates, hist and at-time endpoint families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Quote,
    Trade,
    ImpliedVolatility,
    ImpliedVolatilityVerbose,
    Greeks,
    TradeGreeks,
    GreeksSecondOrder,
    GreeksThirdOrder,
    TradeQuote,
    Ohlc,
    OpenInterest,
    Eod,
    EodQuoteGreeks,
}

impl DataKind {
    pub const ALL: [Self; 13] = [
        Self::Quote,
        Self::Trade,
        Self::ImpliedVolatility,
        Self::ImpliedVolatilityVerbose,
        Self::Greeks,
        Self::TradeGreeks,
        Self::GreeksSecondOrder,
        Self::GreeksThirdOrder,
        Self::TradeQuote,
        Self::Ohlc,
        Self::OpenInterest,
        Self::Eod,
        Self::EodQuoteGreeks,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Trade => "trade",
            Self::ImpliedVolatility => "implied_volatility",
            Self::ImpliedVolatilityVerbose => "implied_volatility_verbose",
            Self::Greeks => "greeks",
            Self::TradeGreeks => "trade_greeks",
            Self::GreeksSecondOrder => "greeks_second_order",
            Self::GreeksThirdOrder => "greeks_third_order",
            Self::TradeQuote => "trade_quote",
            Self::Ohlc => "ohlc",
            Self::OpenInterest => "open_interest",
            Self::Eod => "eod",
            Self::EodQuoteGreeks => "eod_quote_greeks",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownDataKind {
                value: input.to_owned(),
            })
    }

    /// Interval sent when the caller gives none. Daily datasets ignore `ivl` but the
    /// server still expects the parameter.
    pub const fn default_interval_ms(self) -> Option<u64> {
        match self {
            Self::Eod | Self::Ohlc | Self::OpenInterest | Self::EodQuoteGreeks => Some(3_600_000),
            _ => None,
        }
    }
}

impl Display for DataKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint family, the first URL path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    List,
    Hist,
    AtTime,
    BulkHist,
    BulkAtTime,
}

impl CallType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Hist => "hist",
            Self::AtTime => "at_time",
            Self::BulkHist => "bulk_hist",
            Self::BulkAtTime => "bulk_at_time",
        }
    }
}

/// Supported quote-server operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListRoots,
    ListExpirations,
    ListStrikes,
    ListDates(DataKind),
    Hist(DataKind),
    AtTime(DataKind),
    BulkHist(DataKind),
    BulkAtTime(DataKind),
}

const FIXED_OPERATIONS: [(&str, Operation); 3] = [
    ("list_roots", Operation::ListRoots),
    ("list_expirations", Operation::ListExpirations),
    ("list_strikes", Operation::ListStrikes),
];

// Longest prefixes first so `bulk_at_time_` never resolves as `at_time_`.
const KIND_OPERATIONS: [(&str, fn(DataKind) -> Operation); 5] = [
    ("list_dates_", Operation::ListDates),
    ("bulk_at_time_", Operation::BulkAtTime),
    ("bulk_hist_", Operation::BulkHist),
    ("at_time_", Operation::AtTime),
    ("hist_", Operation::Hist),
];

const RANGE_PARAMS: &[&str] = &["start_date", "end_date", "ivl"];

impl Operation {
    /// Resolve a canonical name such as `hist_implied_volatility`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_lowercase();
        let unknown = || ValidationError::UnknownOperation {
            value: input.to_owned(),
        };

        if let Some((_, operation)) = FIXED_OPERATIONS
            .iter()
            .find(|(name, _)| *name == normalized)
        {
            return Ok(*operation);
        }

        for (prefix, build) in KIND_OPERATIONS {
            if let Some(rest) = normalized.strip_prefix(prefix) {
                return DataKind::parse(rest).map(build).map_err(|_| unknown());
            }
        }

        Err(unknown())
    }

    pub fn name(self) -> String {
        match (self.call_type(), self.kind()) {
            (_, None) => match self {
                Self::ListRoots => String::from("list_roots"),
                Self::ListExpirations => String::from("list_expirations"),
                _ => String::from("list_strikes"),
            },
            (CallType::List, Some(kind)) => format!("list_dates_{kind}"),
            (call, Some(kind)) => format!("{}_{kind}", call.as_str()),
        }
    }

    pub const fn call_type(self) -> CallType {
        match self {
            Self::ListRoots | Self::ListExpirations | Self::ListStrikes | Self::ListDates(_) => {
                CallType::List
            }
            Self::Hist(_) => CallType::Hist,
            Self::AtTime(_) => CallType::AtTime,
            Self::BulkHist(_) => CallType::BulkHist,
            Self::BulkAtTime(_) => CallType::BulkAtTime,
        }
    }

    pub const fn kind(self) -> Option<DataKind> {
        match self {
            Self::ListRoots | Self::ListExpirations | Self::ListStrikes => None,
            Self::ListDates(kind)
            | Self::Hist(kind)
            | Self::AtTime(kind)
            | Self::BulkHist(kind)
            | Self::BulkAtTime(kind) => Some(kind),
        }
    }

    /// URL path below the service base.
    pub fn path(self, security: SecurityType) -> String {
        match self {
            Self::ListRoots => String::from("list/roots"),
            Self::ListExpirations => String::from("list/expirations"),
            Self::ListStrikes => String::from("list/strikes"),
            Self::ListDates(kind) => format!("list/dates/{}/{kind}", security.as_str()),
            Self::Hist(kind) | Self::AtTime(kind) | Self::BulkHist(kind) | Self::BulkAtTime(kind) => {
                format!("{}/{}/{kind}", self.call_type().as_str(), security.as_str())
            }
        }
    }

    /// Column name used when the envelope carries no `format`.
    pub const fn record_key(self) -> &'static str {
        match self {
            Self::ListRoots => "roots",
            Self::ListExpirations => "expirations",
            Self::ListStrikes => "strikes",
            Self::ListDates(kind)
            | Self::Hist(kind)
            | Self::AtTime(kind)
            | Self::BulkHist(kind)
            | Self::BulkAtTime(kind) => kind.as_str(),
        }
    }

    /// Bulk responses nest `{contract, ticks}` objects instead of flat rows.
    pub const fn is_bulk(self) -> bool {
        matches!(self, Self::BulkHist(_) | Self::BulkAtTime(_))
    }

    /// Whether the operation takes a `start_date`/`end_date` window.
    pub const fn is_ranged(self) -> bool {
        matches!(
            self.call_type(),
            CallType::Hist | CallType::AtTime | CallType::BulkHist | CallType::BulkAtTime
        )
    }

    pub const fn required_params(self) -> &'static [&'static str] {
        if self.is_ranged() {
            RANGE_PARAMS
        } else {
            &[]
        }
    }

    /// Check that `identity` has the shape this operation addresses.
    pub fn validate_identity(
        self,
        security: SecurityType,
        identity: &Identity,
    ) -> Result<(), ValidationError> {
        let operation = self.name();
        let has_expiry = identity.expiry.is_some();
        let has_leg = identity.leg.is_some();

        let (needs_expiry, needs_leg, allows_leg) = match (security, self) {
            (_, Self::ListRoots | Self::ListExpirations) => (false, false, false),
            (SecurityType::Stock, _) => (false, false, false),
            (SecurityType::Option, Self::ListStrikes | Self::BulkHist(_) | Self::BulkAtTime(_)) => {
                (true, false, false)
            }
            (SecurityType::Option, Self::ListDates(_)) => (true, false, true),
            (SecurityType::Option, Self::Hist(_) | Self::AtTime(_)) => (true, true, true),
        };

        if needs_expiry && !has_expiry {
            return Err(ValidationError::ExpiryRequired { operation });
        }
        if needs_leg && !has_leg {
            return Err(ValidationError::LegRequired { operation });
        }
        if has_leg && !allows_leg {
            return Err(ValidationError::UnexpectedField {
                operation,
                field: "a strike and right",
            });
        }
        if has_expiry && !needs_expiry {
            return Err(ValidationError::UnexpectedField {
                operation,
                field: "an expiration",
            });
        }
        Ok(())
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for Operation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OptionLeg, QuoteDate, Right, Root, Strike};

    #[test]
    fn names_resolve_through_the_lookup_table() {
        let cases = [
            ("list_roots", Operation::ListRoots),
            ("list_strikes", Operation::ListStrikes),
            ("list_dates_implied_volatility", Operation::ListDates(DataKind::ImpliedVolatility)),
            ("hist_eod", Operation::Hist(DataKind::Eod)),
            ("at_time_greeks", Operation::AtTime(DataKind::Greeks)),
            ("bulk_at_time_quote", Operation::BulkAtTime(DataKind::Quote)),
            ("bulk_hist_trade_quote", Operation::BulkHist(DataKind::TradeQuote)),
        ];

        for (name, expected) in cases {
            let parsed = Operation::parse(name).expect("known operation");
            assert_eq!(parsed, expected, "{name}");
            assert_eq!(parsed.name(), name);
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            Operation::parse("hist_volume_profile"),
            Err(ValidationError::UnknownOperation { .. })
        ));
        assert!(Operation::parse("get_hist_eod").is_err());
    }

    #[test]
    fn paths_follow_the_server_layout() {
        let kind = DataKind::ImpliedVolatility;
        assert_eq!(
            Operation::ListDates(kind).path(SecurityType::Option),
            "list/dates/option/implied_volatility"
        );
        assert_eq!(
            Operation::AtTime(DataKind::Quote).path(SecurityType::Stock),
            "at_time/stock/quote"
        );
        assert_eq!(Operation::ListStrikes.path(SecurityType::Option), "list/strikes");
    }

    #[test]
    fn hist_requires_a_full_series_identity() {
        let root = Root::parse("AAPL").expect("root");
        let expiry = QuoteDate::parse("20230317").expect("date");
        let whole_expiry = Identity::expiration(root.clone(), expiry);
        let series = Identity::series(
            root,
            expiry,
            OptionLeg::new(Strike::from_scaled(150_000).expect("strike"), Right::Call),
        );
        let operation = Operation::Hist(DataKind::Quote);

        assert!(matches!(
            operation.validate_identity(SecurityType::Option, &whole_expiry),
            Err(ValidationError::LegRequired { .. })
        ));
        assert!(operation
            .validate_identity(SecurityType::Option, &series)
            .is_ok());
        assert!(Operation::ListDates(DataKind::Quote)
            .validate_identity(SecurityType::Option, &whole_expiry)
            .is_ok());
    }
}
