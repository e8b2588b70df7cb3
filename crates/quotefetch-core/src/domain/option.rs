use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::{QuoteDate, Root};
use crate::ValidationError;

/// Multiplier between the dollar strike and its wire representation.
pub const STRIKE_SCALE: i64 = 1_000;

/// Strike price stored as a fixed-point integer scaled by [`STRIKE_SCALE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Strike(i64);

impl Strike {
    pub fn from_scaled(scaled: i64) -> Result<Self, ValidationError> {
        if scaled < 0 {
            return Err(ValidationError::InvalidStrike {
                value: scaled.to_string(),
            });
        }
        Ok(Self(scaled))
    }

    pub fn from_dollars(dollars: f64) -> Result<Self, ValidationError> {
        if !dollars.is_finite() || dollars < 0.0 {
            return Err(ValidationError::InvalidStrike {
                value: dollars.to_string(),
            });
        }
        Ok(Self((dollars * STRIKE_SCALE as f64).round() as i64))
    }

    pub const fn scaled(self) -> i64 {
        self.0
    }

    pub fn dollars(self) -> f64 {
        self.0 as f64 / STRIKE_SCALE as f64
    }

    /// Whether the strike sits on a whole-dollar multiple, e.g. every $5.
    pub fn is_multiple_of(self, dollars: u32) -> bool {
        let step = i64::from(dollars) * STRIKE_SCALE;
        step == 0 || self.0 % step == 0
    }
}

impl Display for Strike {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dollars())
    }
}

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Right {
    #[serde(rename = "C")]
    Call,
    #[serde(rename = "P")]
    Put,
}

impl Right {
    pub const ALL: [Self; 2] = [Self::Call, Self::Put];

    /// Accepts anything naming a call or put: `C`, `call`, `Put`, ...
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let upper = input.trim().to_ascii_uppercase();
        if upper.contains('C') {
            Ok(Self::Call)
        } else if upper.contains('P') {
            Ok(Self::Put)
        } else {
            Err(ValidationError::InvalidRight {
                value: input.to_owned(),
            })
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }
}

impl Display for Right {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single option series within an expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OptionLeg {
    pub strike: Strike,
    pub right: Right,
}

impl OptionLeg {
    pub const fn new(strike: Strike, right: Right) -> Self {
        Self { strike, right }
    }
}

/// Which security family an endpoint addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityType {
    Option,
    Stock,
}

impl SecurityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Option => "option",
            Self::Stock => "stock",
        }
    }

    /// Value of the `sec` parameter on root listings.
    pub const fn listing_code(self) -> &'static str {
        match self {
            Self::Option => "OPTION",
            Self::Stock => "STOCK",
        }
    }
}

/// Identity fields shared by contracts and date windows.
///
/// A contract either addresses a whole expiration (`leg == None`) or a single
/// series; strike and right can never be set independently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub root: Root,
    pub expiry: Option<QuoteDate>,
    pub leg: Option<OptionLeg>,
}

impl Identity {
    pub fn root(root: Root) -> Self {
        Self {
            root,
            expiry: None,
            leg: None,
        }
    }

    pub fn expiration(root: Root, expiry: QuoteDate) -> Self {
        Self {
            root,
            expiry: Some(expiry),
            leg: None,
        }
    }

    pub fn series(root: Root, expiry: QuoteDate, leg: OptionLeg) -> Self {
        Self {
            root,
            expiry: Some(expiry),
            leg: Some(leg),
        }
    }

    pub fn strike(&self) -> Option<Strike> {
        self.leg.map(|leg| leg.strike)
    }

    pub fn right(&self) -> Option<Right> {
        self.leg.map(|leg| leg.right)
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.root.as_str())?;
        if let Some(expiry) = self.expiry {
            write!(f, "_{expiry}")?;
        }
        if let Some(leg) = self.leg {
            write!(f, "_{}_{}", leg.right, leg.strike)?;
        }
        Ok(())
    }
}
