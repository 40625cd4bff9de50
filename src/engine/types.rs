use chrono::{NaiveDateTime, TimeDelta};
use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Days per year used for every tenor conversion in the crate.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Seconds per year, consistent with [`DAYS_PER_YEAR`].
pub const SECONDS_PER_YEAR: f64 = DAYS_PER_YEAR * 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Signed distance between spot and strike: `spot - strike` for calls,
    /// `strike - spot` for puts.
    pub fn moneyness(self, spot: f64, strike: f64) -> f64 {
        match self {
            OptionType::Call => spot - strike,
            OptionType::Put => strike - spot,
        }
    }

    pub fn intrinsic(self, spot: f64, strike: f64) -> f64 {
        self.moneyness(spot, strike).max(0.0)
    }

    /// Parse the loose labels found in quote files ("call", "C", "Put", ...).
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().chars().next()?.to_ascii_lowercase() {
            'c' => Some(OptionType::Call),
            'p' => Some(OptionType::Put),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which quoted price a lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSide {
    Bid,
    Mark,
    Ask,
}

impl QuoteSide {
    pub const ALL: [QuoteSide; 3] = [QuoteSide::Bid, QuoteSide::Mark, QuoteSide::Ask];

    pub fn column(self) -> &'static str {
        match self {
            QuoteSide::Bid => "bid_price",
            QuoteSide::Mark => "mark_price",
            QuoteSide::Ask => "ask_price",
        }
    }
}

/// How a strategy turns its `target` into a strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PricingMode {
    #[default]
    Moneyness,
    Delta,
}

/// One row of a quote snapshot. Prices are fractions of spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub option_type: OptionType,
    pub strike: f64,
    pub expiration: NaiveDateTime,
    pub bid_price: f64,
    pub mark_price: f64,
    pub ask_price: f64,
    pub underlying_price: f64,
    pub iv_ratio: f64,
    pub spot_ratio: f64,
}

impl Quote {
    pub fn price(&self, side: QuoteSide) -> f64 {
        match side {
            QuoteSide::Bid => self.bid_price,
            QuoteSide::Mark => self.mark_price,
            QuoteSide::Ask => self.ask_price,
        }
    }
}

/// Result of every surface lookup: premium, strike and the IV used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pricing {
    pub price: f64,
    pub strike: f64,
    pub iv: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SurfaceConfig {
    /// Flat IV used when the snapshot cannot support interpolation
    #[serde(default = "default_iv")]
    #[garde(range(min = 0.0001, max = 20.0))]
    pub default_iv: f64,
    /// Slack above the largest observed IV allowed by skew extrapolation
    #[serde(default = "default_iv_margin")]
    #[garde(range(min = 1.0, max = 10.0))]
    pub iv_margin: f64,
    /// Continuously-compounded annual rate
    #[serde(default)]
    #[garde(range(min = -1.0, max = 1.0))]
    pub risk_free_rate: f64,
}

fn default_iv() -> f64 {
    1.0
}

fn default_iv_margin() -> f64 {
    1.25
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            default_iv: default_iv(),
            iv_margin: default_iv_margin(),
            risk_free_rate: 0.0,
        }
    }
}

pub fn year_fraction(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_YEAR
}

pub fn days(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 86_400_000.0
}

/// Parse compact duration strings such as `"90m"`, `"1h"`, `"7d"`, `"2w"`.
pub fn parse_duration(text: &str) -> Result<TimeDelta, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| format!("duration '{text}' is missing a unit"))?;
    let (amount, unit) = text.split_at(split);
    let amount: f64 = amount
        .parse()
        .map_err(|_| format!("invalid duration amount in '{text}'"))?;
    let seconds_per_unit = match unit.trim() {
        "s" | "sec" => 1.0,
        "m" | "min" => 60.0,
        "h" | "hr" => 3_600.0,
        "d" | "day" | "days" => 86_400.0,
        "w" | "week" | "weeks" => 604_800.0,
        other => return Err(format!("unknown duration unit '{other}' in '{text}'")),
    };
    let millis = (amount * seconds_per_unit * 1000.0).round();
    if !millis.is_finite() || millis <= 0.0 {
        return Err(format!("duration '{text}' must be positive"));
    }
    Ok(TimeDelta::milliseconds(millis as i64))
}

pub fn format_duration(delta: TimeDelta) -> String {
    let secs = delta.num_seconds();
    if secs % 604_800 == 0 {
        format!("{}w", secs / 604_800)
    } else if secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Serde adapter storing a [`TimeDelta`] as a compact duration string.
pub mod duration_str {
    use chrono::TimeDelta;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(D::Error::custom)
    }
}

/// Same as [`duration_str`] for optional fields.
pub mod option_duration_str {
    use chrono::TimeDelta;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<TimeDelta>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(delta) => serializer.serialize_str(&super::format_duration(*delta)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<TimeDelta>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| super::parse_duration(&text).map_err(D::Error::custom))
            .transpose()
    }
}
