use crate::format::format_float;
use crate::histogram::FloatHistogram;
use crate::labels::Labels;
use std::fmt;

/// Milliseconds since the Unix epoch on the virtual test axis.
pub type Timestamp = i64;

/// Bit pattern of the NaN used to mark a series as stale.
pub const STALE_NAN_BITS: u64 = 0x7ff0_0000_0000_0002;

pub fn stale_nan() -> f64 {
    f64::from_bits(STALE_NAN_BITS)
}

pub fn is_stale_nan(v: f64) -> bool {
    v.to_bits() == STALE_NAN_BITS
}

/// A single stored value: a float, or a native histogram when `h` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub t: Timestamp,
    pub f: f64,
    pub h: Option<FloatHistogram>,
}

impl Point {
    pub fn float(t: Timestamp, f: f64) -> Self {
        Self { t, f, h: None }
    }

    pub fn histogram(t: Timestamp, h: FloatHistogram) -> Self {
        Self { t, f: 0.0, h: Some(h) }
    }

    pub fn is_stale(&self) -> bool {
        self.h.is_none() && is_stale_nan(self.f)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.h {
            Some(h) => write!(f, "{h} @[{}]", self.t),
            None => write!(f, "{} @[{}]", format_float(self.f), self.t),
        }
    }
}

/// A labelled value at one instant, the element of an instant vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub t: Timestamp,
    pub f: f64,
    pub h: Option<FloatHistogram>,
}

impl Sample {
    pub fn float(labels: Labels, t: Timestamp, f: f64) -> Self {
        Self { labels, t, f, h: None }
    }

    pub fn point(&self) -> Point {
        Point {
            t: self.t,
            f: self.f,
            h: self.h.clone(),
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.h {
            Some(h) => write!(f, "{} => {h} @[{}]", self.labels, self.t),
            None => write!(f, "{} => {} @[{}]", self.labels, format_float(self.f), self.t),
        }
    }
}

/// A labelled run of points, the element of a range vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: Labels,
    pub points: Vec<Point>,
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} =>", self.labels)?;
        for p in &self.points {
            write!(f, "\n{p}")?;
        }
        Ok(())
    }
}
