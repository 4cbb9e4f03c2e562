//! Parser for the compact series notation used to declare test input.
//!
//! A declaration is a metric descriptor followed by a whitespace separated
//! value sequence, e.g. `up{job="api"} 1+1x3 _ stale {{count:2 sum:3}}`.

use crate::error::{ParseError, Result};
use crate::histogram::FloatHistogram;
use crate::labels::{is_valid_label_name, Labels, METRIC_NAME};
use crate::types::stale_nan;

/// One step of a declared series.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceValue {
    pub value: f64,
    /// No sample exists at this step.
    pub omitted: bool,
    pub histogram: Option<FloatHistogram>,
}

impl SequenceValue {
    pub fn float(value: f64) -> Self {
        Self {
            value,
            omitted: false,
            histogram: None,
        }
    }

    pub fn omitted() -> Self {
        Self {
            value: 0.0,
            omitted: true,
            histogram: None,
        }
    }

    pub fn histogram(h: FloatHistogram) -> Self {
        Self {
            value: 0.0,
            omitted: false,
            histogram: Some(h),
        }
    }
}

/// Parses a number the way series notation accepts it, including
/// `Inf`, `+Inf`, `-Inf` and `NaN` in any case.
pub fn parse_float(s: &str) -> Option<f64> {
    match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        lower if lower.contains("inf") || lower.contains("nan") => None,
        _ => s.parse().ok(),
    }
}

/// Parses a metric descriptor such as `up{job="api"}` or `{a="b"}`. Blank
/// input is the empty label set.
///
/// # Examples
///
/// ```
/// use rulecheck_common::series::parse_metric;
///
/// let labels = parse_metric(r#"http_requests{code="200", path='/'}"#).unwrap();
/// assert_eq!(labels.get("__name__"), Some("http_requests"));
/// assert_eq!(labels.get("path"), Some("/"));
/// assert!(parse_metric("").unwrap().is_empty());
/// assert!(parse_metric("up{job=}").is_err());
/// ```
pub fn parse_metric(input: &str) -> Result<Labels> {
    if input.trim().is_empty() {
        return Ok(Labels::new());
    }
    let mut cursor = Cursor::new(input);
    let labels = parse_descriptor(&mut cursor, input)?;
    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(metric_error(input, &format!("unexpected {:?}", cursor.rest())));
    }
    Ok(labels)
}

/// Parses a full series declaration into its labels and expanded values.
///
/// # Examples
///
/// ```
/// use rulecheck_common::series::parse_series_desc;
///
/// let (labels, values) = parse_series_desc(r#"up{job="a"} 1+1x2 _ 7"#).unwrap();
/// assert_eq!(labels.get("job"), Some("a"));
/// let floats: Vec<f64> = values.iter().map(|v| v.value).collect();
/// assert_eq!(floats, vec![1.0, 2.0, 3.0, 0.0, 7.0]);
/// assert!(values[3].omitted);
/// ```
pub fn parse_series_desc(input: &str) -> Result<(Labels, Vec<SequenceValue>)> {
    let mut cursor = Cursor::new(input);
    let labels = parse_descriptor(&mut cursor, input)?;
    let mut values = Vec::new();
    for item in split_items(cursor.rest())? {
        values.extend(expand_item(&item)?);
    }
    Ok((labels, values))
}

fn parse_descriptor(cursor: &mut Cursor<'_>, input: &str) -> Result<Labels> {
    cursor.skip_ws();
    let name = cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(metric_error(input, "metric name must not start with a digit"));
    }
    let mut labels = Labels::new();
    let mut braces = false;

    cursor.skip_ws();
    // `{{` opens a histogram value, not a label set.
    if !cursor.rest().starts_with("{{") && cursor.eat('{') {
        braces = true;
        loop {
            cursor.skip_ws();
            if cursor.eat('}') {
                break;
            }
            let lname = cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            if !is_valid_label_name(lname) {
                return Err(metric_error(input, &format!("invalid label name {lname:?}")));
            }
            cursor.skip_ws();
            if !cursor.eat('=') {
                return Err(metric_error(input, &format!("expected '=' after {lname:?}")));
            }
            cursor.skip_ws();
            let value = parse_quoted(cursor).map_err(|msg| metric_error(input, &msg))?;
            if labels.has(lname) {
                return Err(metric_error(input, &format!("duplicate label {lname:?}")));
            }
            labels.set(lname, value);
            cursor.skip_ws();
            if cursor.eat(',') {
                continue;
            }
            if !cursor.eat('}') {
                return Err(metric_error(input, "expected ',' or '}'"));
            }
            break;
        }
    }

    if !name.is_empty() {
        if labels.has(METRIC_NAME) {
            return Err(metric_error(input, "metric name set twice"));
        }
        labels.set(METRIC_NAME, name);
    } else if !braces {
        return Err(metric_error(input, "missing metric name or label set"));
    }
    Ok(labels)
}

fn parse_quoted(cursor: &mut Cursor<'_>) -> std::result::Result<String, String> {
    let quote = match cursor.bump() {
        Some(q @ ('"' | '\'' | '`')) => q,
        Some(c) => return Err(format!("expected quoted string, found {c:?}")),
        None => return Err("expected quoted string".into()),
    };
    let mut out = String::new();
    loop {
        match cursor.bump() {
            None => return Err("unterminated quoted string".into()),
            Some(c) if c == quote => return Ok(out),
            Some('\\') if quote != '`' => match cursor.bump() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(c @ ('\\' | '"' | '\'')) => out.push(c),
                Some(c) => return Err(format!("unknown escape sequence \\{c}")),
                None => return Err("unterminated escape sequence".into()),
            },
            Some(c) => out.push(c),
        }
    }
}

/// Splits the value part on whitespace, keeping `{{...}}` blocks whole.
fn split_items(rest: &str) -> Result<Vec<String>> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '{' && rest[i..].starts_with("{{") {
            let end = rest[i..].find("}}").ok_or_else(|| ParseError::InvalidSeriesValue {
                item: rest[i..].to_string(),
                message: "unterminated histogram".into(),
            })?;
            current.push_str(&rest[i..i + end + 2]);
            while chars.peek().is_some_and(|(j, _)| *j < i + end + 2) {
                chars.next();
            }
        } else if c.is_whitespace() {
            if !current.is_empty() {
                items.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        items.push(current);
    }
    Ok(items)
}

fn expand_item(item: &str) -> Result<Vec<SequenceValue>> {
    if item == "_" {
        return Ok(vec![SequenceValue::omitted()]);
    }
    if let Some(times) = item.strip_prefix("_x") {
        let n = parse_times(item, times)?;
        return Ok((0..n).map(|_| SequenceValue::omitted()).collect());
    }
    if item == "stale" {
        return Ok(vec![SequenceValue::float(stale_nan())]);
    }
    if item.starts_with("{{") {
        return expand_histogram_item(item);
    }

    let Some((base, times)) = split_times(item) else {
        let v = parse_float(item).ok_or_else(|| value_error(item, "not a number"))?;
        return Ok(vec![SequenceValue::float(v)]);
    };
    let n = parse_times(item, times)?;
    let (start, delta) = split_increment(base);
    let mut k = parse_float(start).ok_or_else(|| value_error(item, "not a number"))?;
    let delta = match delta {
        Some((sign, d)) => sign * parse_float(d).ok_or_else(|| value_error(item, "bad increment"))?,
        None => 0.0,
    };
    let mut out = Vec::with_capacity(n as usize + 1);
    for _ in 0..=n {
        out.push(SequenceValue::float(k));
        k += delta;
    }
    Ok(out)
}

fn expand_histogram_item(item: &str) -> Result<Vec<SequenceValue>> {
    let end = item.find("}}").ok_or_else(|| value_error(item, "unterminated histogram"))? + 2;
    let first = FloatHistogram::parse(&item[..end])?;
    let rest = &item[end..];
    if rest.is_empty() {
        return Ok(vec![SequenceValue::histogram(first)]);
    }
    if let Some(times) = rest.strip_prefix('x') {
        let n = parse_times(item, times)?;
        return Ok((0..=n).map(|_| SequenceValue::histogram(first.clone())).collect());
    }

    let (negate, inc) = match rest.as_bytes()[0] {
        b'+' => (false, &rest[1..]),
        b'-' => (true, &rest[1..]),
        _ => return Err(value_error(item, "expected 'x', '+' or '-' after histogram")),
    };
    let inc_end = inc
        .find("}}")
        .ok_or_else(|| value_error(item, "unterminated histogram increment"))?
        + 2;
    let delta = FloatHistogram::parse(&inc[..inc_end])?;
    let times = inc[inc_end..]
        .strip_prefix('x')
        .ok_or_else(|| value_error(item, "histogram increment requires 'xN'"))?;
    let n = parse_times(item, times)?;

    let mut current = first;
    let mut out = Vec::with_capacity(n as usize + 1);
    for _ in 0..=n {
        out.push(SequenceValue::histogram(current.clone()));
        let next = if negate { current.sub(&delta) } else { current.add(&delta) };
        current = next.map_err(|msg| value_error(item, &msg))?;
    }
    Ok(out)
}

fn split_times(item: &str) -> Option<(&str, &str)> {
    let idx = item.rfind('x')?;
    let (base, times) = (&item[..idx], &item[idx + 1..]);
    if base.is_empty() || times.is_empty() || !times.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, times))
}

/// Splits `a+b` / `a-b` into the start value and a signed increment. A sign
/// directly after an exponent marker belongs to the number.
fn split_increment(base: &str) -> (&str, Option<(f64, &str)>) {
    let bytes = base.as_bytes();
    for i in 1..bytes.len() {
        let prev = bytes[i - 1];
        if (bytes[i] == b'+' || bytes[i] == b'-') && prev != b'e' && prev != b'E' {
            let sign = if bytes[i] == b'-' { -1.0 } else { 1.0 };
            return (&base[..i], Some((sign, &base[i + 1..])));
        }
    }
    (base, None)
}

/// Upper bound on the `xN` repetition count of a single item.
const MAX_REPETITIONS: u64 = 1 << 20;

fn parse_times(item: &str, times: &str) -> Result<u64> {
    let n: u64 = times
        .parse()
        .map_err(|_| value_error(item, &format!("invalid repetition count {times:?}")))?;
    match n.checked_add(1) {
        Some(total) if total <= MAX_REPETITIONS => Ok(n),
        _ => Err(value_error(
            item,
            &format!("repetition count {n} exceeds the limit of {MAX_REPETITIONS} values"),
        )),
    }
}

fn value_error(item: &str, message: &str) -> ParseError {
    ParseError::InvalidSeriesValue {
        item: item.to_string(),
        message: message.to_string(),
    }
}

fn metric_error(input: &str, message: &str) -> ParseError {
    ParseError::InvalidMetric {
        input: input.to_string(),
        message: message.to_string(),
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.rest().chars().next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }
}
