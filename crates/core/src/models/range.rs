use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::CoreError;

/// Discrete selector of the intraday / history window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeCode {
    Day1,
    Days14,
    Month1,
    Month3,
    Month6,
    Year1,
    Year2,
    Year3,
    Max,
    /// Code not known to the core; passed to the source as a raw mode.
    Custom(String),
}

/// The query the intraday source understands: a mode and, for `RANGE`,
/// an inclusive date span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntradayQuery {
    pub mode: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl RangeCode {
    pub const ALL: [RangeCode; 9] = [
        RangeCode::Day1,
        RangeCode::Days14,
        RangeCode::Month1,
        RangeCode::Month3,
        RangeCode::Month6,
        RangeCode::Year1,
        RangeCode::Year2,
        RangeCode::Year3,
        RangeCode::Max,
    ];

    /// Parse a range code. Unknown codes degrade to [`RangeCode::Custom`]
    /// with a warning.
    pub fn parse(code: &str) -> Self {
        match Self::parse_strict(code) {
            Ok(range) => range,
            Err(_) => {
                warn!(code, "unknown range code, using it as a single source mode");
                RangeCode::Custom(code.to_string())
            }
        }
    }

    /// Parse a range code, rejecting unknown ones.
    pub fn parse_strict(code: &str) -> Result<Self, CoreError> {
        match code.trim().to_ascii_uppercase().as_str() {
            "1D" => Ok(RangeCode::Day1),
            "14D" => Ok(RangeCode::Days14),
            "1M" => Ok(RangeCode::Month1),
            "3M" => Ok(RangeCode::Month3),
            "6M" => Ok(RangeCode::Month6),
            "1R" => Ok(RangeCode::Year1),
            "2R" => Ok(RangeCode::Year2),
            "3R" => Ok(RangeCode::Year3),
            "MAX" => Ok(RangeCode::Max),
            _ => Err(CoreError::InvalidRangeCode(code.to_string())),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            RangeCode::Day1 => "1D",
            RangeCode::Days14 => "14D",
            RangeCode::Month1 => "1M",
            RangeCode::Month3 => "3M",
            RangeCode::Month6 => "6M",
            RangeCode::Year1 => "1R",
            RangeCode::Year2 => "2R",
            RangeCode::Year3 => "3R",
            RangeCode::Max => "MAX",
            RangeCode::Custom(code) => code,
        }
    }

    /// Whether the series spans more than the current session and gets the
    /// latest intraday bar appended.
    pub fn is_multi_day(&self) -> bool {
        !matches!(self, RangeCode::Day1 | RangeCode::Custom(_))
    }

    /// First day covered by the range, `None` when unbounded.
    pub fn start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            RangeCode::Day1 => Some(today),
            RangeCode::Days14 => today.checked_sub_days(Days::new(14)),
            RangeCode::Month1 => today.checked_sub_months(Months::new(1)),
            RangeCode::Month3 => today.checked_sub_months(Months::new(3)),
            RangeCode::Month6 => today.checked_sub_months(Months::new(6)),
            RangeCode::Year1 => today.checked_sub_months(Months::new(12)),
            RangeCode::Year2 => today.checked_sub_months(Months::new(24)),
            RangeCode::Year3 => today.checked_sub_months(Months::new(36)),
            RangeCode::Max | RangeCode::Custom(_) => None,
        }
    }

    /// Source query for this range: `1D` is the `CURR` mode, `MAX` the
    /// `ARCH` mode, the rest are computed `RANGE` queries.
    pub fn query(&self, today: NaiveDate) -> IntradayQuery {
        match self {
            RangeCode::Day1 => IntradayQuery {
                mode: "CURR".to_string(),
                from: None,
                to: None,
            },
            RangeCode::Max => IntradayQuery {
                mode: "ARCH".to_string(),
                from: None,
                to: None,
            },
            RangeCode::Custom(code) => IntradayQuery {
                mode: code.to_ascii_uppercase(),
                from: None,
                to: None,
            },
            _ => IntradayQuery {
                mode: "RANGE".to_string(),
                from: self.start_date(today),
                to: Some(today),
            },
        }
    }
}

impl std::fmt::Display for RangeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
