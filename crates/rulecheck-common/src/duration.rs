use crate::error::{ParseError, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

const MS_PER_SECOND: i64 = 1000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
const MS_PER_WEEK: i64 = 7 * MS_PER_DAY;
const MS_PER_YEAR: i64 = 365 * MS_PER_DAY;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:([0-9]+)y)?(?:([0-9]+)w)?(?:([0-9]+)d)?(?:([0-9]+)h)?(?:([0-9]+)m)?(?:([0-9]+)s)?(?:([0-9]+)ms)?$",
    )
    .unwrap_or_else(|e| panic!("duration pattern must compile: {e}"))
});

/// A non-negative millisecond-precision duration written in the
/// `1y2w3d4h5m6s7ms` notation.
///
/// Every virtual instant of a rule test is a `ModelDuration` offset from the
/// Unix epoch, so instants and step intervals share one exact integer axis.
///
/// # Examples
///
/// ```
/// use rulecheck_common::duration::ModelDuration;
///
/// let d: ModelDuration = "1h30m".parse().unwrap();
/// assert_eq!(d.as_millis(), 90 * 60 * 1000);
/// assert_eq!(d.to_string(), "1h30m");
/// assert_eq!(ModelDuration::ZERO.to_string(), "0s");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelDuration(i64);

impl ModelDuration {
    pub const ZERO: Self = Self(0);

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * MS_PER_SECOND)
    }

    pub const fn from_mins(mins: i64) -> Self {
        Self(mins * MS_PER_MINUTE)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Rounds up to the next whole second strictly above `self`.
    pub fn next_whole_second(self) -> Self {
        Self((self.0 + MS_PER_SECOND) / MS_PER_SECOND * MS_PER_SECOND)
    }
}

impl FromStr for ModelDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "0" {
            return Ok(Self::ZERO);
        }
        if s.is_empty() {
            return Err(ParseError::InvalidDuration(s.to_string()));
        }
        let caps = DURATION_RE
            .captures(s)
            .ok_or_else(|| ParseError::InvalidDuration(s.to_string()))?;

        let units = [
            MS_PER_YEAR,
            MS_PER_WEEK,
            MS_PER_DAY,
            MS_PER_HOUR,
            MS_PER_MINUTE,
            MS_PER_SECOND,
            1,
        ];
        let mut total: i64 = 0;
        for (i, unit) in units.iter().enumerate() {
            let Some(m) = caps.get(i + 1) else {
                continue;
            };
            let n: i64 = m
                .as_str()
                .parse()
                .map_err(|_| ParseError::InvalidDuration(s.to_string()))?;
            total = n
                .checked_mul(*unit)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(|| ParseError::InvalidDuration(s.to_string()))?;
        }
        Ok(Self(total))
    }
}

impl fmt::Display for ModelDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ms = self.0;
        if ms == 0 {
            return f.write_str("0s");
        }
        if ms < 0 {
            f.write_str("-")?;
            ms = -ms;
        }
        // Years and weeks are only printed when they divide exactly.
        let units: [(&str, i64, bool); 7] = [
            ("y", MS_PER_YEAR, true),
            ("w", MS_PER_WEEK, true),
            ("d", MS_PER_DAY, false),
            ("h", MS_PER_HOUR, false),
            ("m", MS_PER_MINUTE, false),
            ("s", MS_PER_SECOND, false),
            ("ms", 1, false),
        ];
        for (suffix, mult, exact) in units {
            if exact && ms % mult != 0 {
                continue;
            }
            let v = ms / mult;
            if v > 0 {
                write!(f, "{v}{suffix}")?;
                ms -= v * mult;
            }
        }
        Ok(())
    }
}

impl Serialize for ModelDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DurationVisitor;

        impl serde::de::Visitor<'_> for DurationVisitor {
            type Value = ModelDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string such as \"1m30s\"")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            // Bare YAML integers are read as their decimal text, so only `0` is accepted.
            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
