use crate::error::{ParseError, Result};
use crate::format::format_float;
use std::collections::BTreeMap;
use std::fmt;

/// A native float histogram with sparse exponential buckets.
///
/// Buckets are stored by absolute index, so two histograms that describe the
/// same distribution compare equal regardless of how their spans were laid
/// out in the source notation. Zero-count buckets are never stored.
///
/// # Examples
///
/// ```
/// use rulecheck_common::histogram::FloatHistogram;
///
/// let a = FloatHistogram::parse("{{schema:0 count:4 sum:5 buckets:[0 1 3]}}").unwrap();
/// let b = FloatHistogram::parse("{{sum:5 count:4 offset:1 buckets:[1 3]}}").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.test_expression(), "{{count:4 sum:5 offset:1 buckets:[1 3]}}");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatHistogram {
    pub schema: i32,
    pub count: f64,
    pub sum: f64,
    pub zero_threshold: f64,
    pub zero_count: f64,
    pub positive: BTreeMap<i32, f64>,
    pub negative: BTreeMap<i32, f64>,
}

impl FloatHistogram {
    /// Parses a `{{key:value ...}}` descriptor. The surrounding double
    /// braces are required.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .ok_or_else(|| invalid(input, "expected {{...}}"))?;

        let mut h = Self::default();
        let mut offset = 0i32;
        let mut n_offset = 0i32;
        let mut buckets: Vec<f64> = Vec::new();
        let mut n_buckets: Vec<f64> = Vec::new();

        for (key, value) in fields(body).map_err(|msg| invalid(input, &msg))? {
            match key.as_str() {
                "schema" => h.schema = parse_int(input, &key, &value)?,
                "count" => h.count = parse_num(input, &key, &value)?,
                "sum" => h.sum = parse_num(input, &key, &value)?,
                "z_bucket" => h.zero_count = parse_num(input, &key, &value)?,
                "z_bucket_w" => h.zero_threshold = parse_num(input, &key, &value)?,
                "offset" => offset = parse_int(input, &key, &value)?,
                "n_offset" => n_offset = parse_int(input, &key, &value)?,
                "buckets" => buckets = parse_list(input, &key, &value)?,
                "n_buckets" => n_buckets = parse_list(input, &key, &value)?,
                "counter_reset_hint" => {}
                other => return Err(invalid(input, &format!("unknown field {other:?}"))),
            }
        }

        for (i, v) in buckets.into_iter().enumerate() {
            h.positive.insert(offset + i as i32, v);
        }
        for (i, v) in n_buckets.into_iter().enumerate() {
            h.negative.insert(n_offset + i as i32, v);
        }
        h.compact();
        Ok(h)
    }

    /// Canonical textual description used for equality in test assertions.
    /// Fields at their zero value are omitted.
    pub fn test_expression(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.schema != 0 {
            parts.push(format!("schema:{}", self.schema));
        }
        if self.count != 0.0 {
            parts.push(format!("count:{}", format_float(self.count)));
        }
        if self.sum != 0.0 {
            parts.push(format!("sum:{}", format_float(self.sum)));
        }
        if self.zero_count != 0.0 {
            parts.push(format!("z_bucket:{}", format_float(self.zero_count)));
        }
        if self.zero_threshold != 0.0 {
            parts.push(format!("z_bucket_w:{}", format_float(self.zero_threshold)));
        }
        push_buckets(&mut parts, &self.positive, "offset", "buckets");
        push_buckets(&mut parts, &self.negative, "n_offset", "n_buckets");
        format!("{{{{{}}}}}", parts.join(" "))
    }

    /// Bucket-wise sum. Histograms of different schemas cannot be combined.
    pub fn add(&self, other: &Self) -> std::result::Result<Self, String> {
        if self.schema != other.schema {
            return Err(format!(
                "cannot combine histograms with schemas {} and {}",
                self.schema, other.schema
            ));
        }
        let mut out = self.clone();
        out.count += other.count;
        out.sum += other.sum;
        out.zero_count += other.zero_count;
        out.zero_threshold = out.zero_threshold.max(other.zero_threshold);
        for (idx, v) in &other.positive {
            *out.positive.entry(*idx).or_insert(0.0) += v;
        }
        for (idx, v) in &other.negative {
            *out.negative.entry(*idx).or_insert(0.0) += v;
        }
        out.compact();
        Ok(out)
    }

    pub fn sub(&self, other: &Self) -> std::result::Result<Self, String> {
        self.add(&other.scale(-1.0))
    }

    pub fn scale(&self, factor: f64) -> Self {
        let mut out = self.clone();
        out.count *= factor;
        out.sum *= factor;
        out.zero_count *= factor;
        out.positive.values_mut().for_each(|v| *v *= factor);
        out.negative.values_mut().for_each(|v| *v *= factor);
        out.compact();
        out
    }

    fn compact(&mut self) {
        self.positive.retain(|_, v| *v != 0.0);
        self.negative.retain(|_, v| *v != 0.0);
    }
}

impl fmt::Display for FloatHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.test_expression())
    }
}

fn push_buckets(parts: &mut Vec<String>, buckets: &BTreeMap<i32, f64>, offset_key: &str, key: &str) {
    let (Some((&first, _)), Some((&last, _))) = (buckets.first_key_value(), buckets.last_key_value())
    else {
        return;
    };
    if first != 0 {
        parts.push(format!("{offset_key}:{first}"));
    }
    let values: Vec<String> = (first..=last)
        .map(|i| format_float(buckets.get(&i).copied().unwrap_or(0.0)))
        .collect();
    parts.push(format!("{key}:[{}]", values.join(" ")));
}

/// Splits `key:value` pairs separated by whitespace, keeping bracketed
/// lists (which contain spaces) intact.
fn fields(body: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    let mut rest = body.trim_start();
    while !rest.is_empty() {
        let colon = rest
            .find(':')
            .ok_or_else(|| format!("missing ':' in {rest:?}"))?;
        let key = rest[..colon].trim().to_string();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(format!("invalid field name {key:?}"));
        }
        let after = rest[colon + 1..].trim_start();
        let (value, remaining) = if let Some(list) = after.strip_prefix('[') {
            let end = list
                .find(']')
                .ok_or_else(|| format!("unterminated list for {key:?}"))?;
            (list[..end].to_string(), &list[end + 1..])
        } else {
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            (after[..end].to_string(), &after[end..])
        };
        out.push((key, value));
        rest = remaining.trim_start();
    }
    Ok(out)
}

fn parse_num(input: &str, key: &str, value: &str) -> Result<f64> {
    crate::series::parse_float(value)
        .ok_or_else(|| invalid(input, &format!("{key}: {value:?} is not a number")))
}

fn parse_int(input: &str, key: &str, value: &str) -> Result<i32> {
    value
        .parse()
        .map_err(|_| invalid(input, &format!("{key}: {value:?} is not an integer")))
}

fn parse_list(input: &str, key: &str, value: &str) -> Result<Vec<f64>> {
    value
        .split_whitespace()
        .map(|v| parse_num(input, key, v))
        .collect()
}

fn invalid(input: &str, message: &str) -> ParseError {
    ParseError::InvalidHistogram {
        input: input.to_string(),
        message: message.to_string(),
    }
}
