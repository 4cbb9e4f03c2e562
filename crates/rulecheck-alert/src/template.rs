//! Expansion of alert label and annotation templates.
//!
//! Supports the Go-template subset rule authors reach for: `{{ $labels.x }}`,
//! `{{ $value }}`, `{{ $externalLabels.x }}`, `{{ $externalURL }}`, their
//! `.Labels`/`.Value`/`.ExternalLabels`/`.ExternalURL` forms, string and
//! number literals, comments, `{{-`/`-}}` trimming and pipelines through
//! `humanize`, `humanizePercentage`, `humanizeDuration`, `toUpper` and
//! `toLower`.

use rulecheck_common::format::format_float;
use rulecheck_common::labels::Labels;
use rulecheck_common::series::parse_float;

/// Values visible to a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateData<'a> {
    pub labels: &'a Labels,
    pub external_labels: &'a Labels,
    pub external_url: &'a str,
    pub value: f64,
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Action { operand: Operand, pipeline: Vec<Func> },
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Label(String),
    ExternalLabel(String),
    Value,
    ExternalUrl,
    Str(String),
    Num(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Humanize,
    HumanizePercentage,
    HumanizeDuration,
    ToUpper,
    ToLower,
}

enum Datum {
    Str(String),
    Num(f64),
}

impl Template {
    pub fn parse(name: &str, text: &str) -> Result<Self, String> {
        let mut nodes = Vec::new();
        let mut rest = text;
        let mut trim_next = false;
        while let Some(open) = rest.find("{{") {
            let mut before = &rest[..open];
            if trim_next {
                before = before.trim_start();
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or_else(|| format!("template: {name}: unclosed action"))?;
            let mut inner = &after_open[..close];
            rest = &after_open[close + 2..];

            if let Some(stripped) = inner.strip_prefix("- ") {
                before = before.trim_end();
                inner = stripped;
            }
            trim_next = false;
            if let Some(stripped) = inner.strip_suffix(" -") {
                trim_next = true;
                inner = stripped;
            }

            if !before.is_empty() {
                nodes.push(Node::Text(before.to_string()));
            }
            let inner = inner.trim();
            if inner.starts_with("/*") && inner.ends_with("*/") {
                continue;
            }
            nodes.push(parse_action(name, inner)?);
        }
        let tail = if trim_next { rest.trim_start() } else { rest };
        if !tail.is_empty() {
            nodes.push(Node::Text(tail.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            nodes,
        })
    }

    pub fn execute(&self, data: &TemplateData<'_>) -> Result<String, String> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action { operand, pipeline } => {
                    let mut datum = match operand {
                        Operand::Label(name) => Datum::Str(data.labels.get(name).unwrap_or_default().to_string()),
                        Operand::ExternalLabel(name) => {
                            Datum::Str(data.external_labels.get(name).unwrap_or_default().to_string())
                        }
                        Operand::Value => Datum::Num(data.value),
                        Operand::ExternalUrl => Datum::Str(data.external_url.to_string()),
                        Operand::Str(s) => Datum::Str(s.clone()),
                        Operand::Num(n) => Datum::Num(*n),
                    };
                    for func in pipeline {
                        datum = apply(&self.name, *func, datum)?;
                    }
                    match datum {
                        Datum::Str(s) => out.push_str(&s),
                        Datum::Num(n) => out.push_str(&format_float(n)),
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Parses and executes `text`, rendering any failure inline the way alert
/// annotations report broken templates.
///
/// # Examples
///
/// ```
/// use rulecheck_alert::template::{expand, TemplateData};
/// use rulecheck_common::labels::Labels;
///
/// let labels = Labels::from_pairs([("instance", "db-1")]);
/// let data = TemplateData {
///     labels: &labels,
///     external_labels: &Labels::new(),
///     external_url: "http://prom",
///     value: 0.25,
/// };
/// assert_eq!(expand("t", "{{ $labels.instance }} at {{ $value }}", &data), "db-1 at 0.25");
/// assert_eq!(expand("t", "{{ $value | humanizePercentage }}", &data), "25%");
/// assert!(expand("t", "{{ $nope }}", &data).starts_with("<error expanding template:"));
/// ```
pub fn expand(name: &str, text: &str, data: &TemplateData<'_>) -> String {
    match Template::parse(name, text).and_then(|t| t.execute(data)) {
        Ok(s) => s,
        Err(e) => format!("<error expanding template: {e}>"),
    }
}

fn parse_action(name: &str, inner: &str) -> Result<Node, String> {
    let mut stages = split_pipeline(inner).into_iter();
    let head = stages
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("template: {name}: missing value for command"))?;
    let operand = parse_operand(name, &head)?;
    let pipeline = stages
        .map(|stage| match stage.as_str() {
            "humanize" => Ok(Func::Humanize),
            "humanizePercentage" => Ok(Func::HumanizePercentage),
            "humanizeDuration" => Ok(Func::HumanizeDuration),
            "toUpper" => Ok(Func::ToUpper),
            "toLower" => Ok(Func::ToLower),
            other => Err(format!("template: {name}: function {other:?} not defined")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Node::Action { operand, pipeline })
}

/// Splits on `|` outside quoted strings and trims each stage.
fn split_pipeline(inner: &str) -> Vec<String> {
    let mut stages = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in inner.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, '"' | '`') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '|') => stages.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    stages.push(current.trim().to_string());
    stages
}

fn parse_operand(name: &str, token: &str) -> Result<Operand, String> {
    let field = |prefix: &str| token.strip_prefix(prefix).filter(|f| !f.is_empty()).map(str::to_string);
    if let Some(label) = field("$labels.").or_else(|| field(".Labels.")) {
        return Ok(Operand::Label(label));
    }
    if let Some(label) = field("$externalLabels.").or_else(|| field(".ExternalLabels.")) {
        return Ok(Operand::ExternalLabel(label));
    }
    match token {
        "$value" | ".Value" => return Ok(Operand::Value),
        "$externalURL" | ".ExternalURL" => return Ok(Operand::ExternalUrl),
        _ => {}
    }
    if let Some(s) = token
        .strip_prefix('`')
        .and_then(|t| t.strip_suffix('`'))
        .or_else(|| token.strip_prefix('"').and_then(|t| t.strip_suffix('"')))
    {
        return Ok(Operand::Str(s.to_string()));
    }
    if let Ok(n) = token.parse::<f64>() {
        return Ok(Operand::Num(n));
    }
    if token.starts_with('$') {
        let var = token.split('.').next().unwrap_or(token);
        return Err(format!("template: {name}: undefined variable {var:?}"));
    }
    Err(format!("template: {name}: unsupported action {token:?}"))
}

fn apply(name: &str, func: Func, datum: Datum) -> Result<Datum, String> {
    let number = |d: Datum| match d {
        Datum::Num(n) => Ok(n),
        Datum::Str(s) => parse_float(&s).ok_or_else(|| format!("template: {name}: cannot convert {s:?} to float")),
    };
    Ok(match func {
        Func::Humanize => Datum::Str(humanize(number(datum)?)),
        Func::HumanizePercentage => Datum::Str(format!("{}%", format_g(number(datum)? * 100.0, 4))),
        Func::HumanizeDuration => Datum::Str(humanize_duration(number(datum)?)),
        Func::ToUpper => Datum::Str(text(datum).to_uppercase()),
        Func::ToLower => Datum::Str(text(datum).to_lowercase()),
    })
}

fn text(datum: Datum) -> String {
    match datum {
        Datum::Str(s) => s,
        Datum::Num(n) => format_float(n),
    }
}

const BIG_PREFIXES: [&str; 8] = ["k", "M", "G", "T", "P", "E", "Z", "Y"];
const SMALL_PREFIXES: [&str; 8] = ["m", "u", "n", "p", "f", "a", "z", "y"];

fn humanize(mut v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return format_g(v, 4);
    }
    let mut prefix = "";
    if v.abs() >= 1.0 {
        for p in BIG_PREFIXES {
            if v.abs() < 1000.0 {
                break;
            }
            prefix = p;
            v /= 1000.0;
        }
    } else {
        for p in SMALL_PREFIXES {
            if v.abs() >= 1.0 {
                break;
            }
            prefix = p;
            v *= 1000.0;
        }
    }
    format!("{}{prefix}", format_g(v, 4))
}

fn humanize_duration(mut v: f64) -> String {
    if !v.is_finite() {
        return format_g(v, 4);
    }
    if v == 0.0 {
        return format!("{}s", format_g(v, 4));
    }
    if v.abs() >= 1.0 {
        let sign = if v < 0.0 { "-" } else { "" };
        v = v.abs();
        let total = v as i64;
        let (days, hours, minutes, seconds) = (total / 86_400, (total / 3600) % 24, (total / 60) % 60, total % 60);
        return if days != 0 {
            format!("{sign}{days}d {hours}h {minutes}m {seconds}s")
        } else if hours != 0 {
            format!("{sign}{hours}h {minutes}m {seconds}s")
        } else if minutes != 0 {
            format!("{sign}{minutes}m {seconds}s")
        } else {
            format!("{sign}{}s", format_g(v, 4))
        };
    }
    let mut prefix = "";
    for p in SMALL_PREFIXES {
        if v.abs() >= 1.0 {
            break;
        }
        prefix = p;
        v *= 1000.0;
    }
    format!("{}{prefix}s", format_g(v, 4))
}

/// `%.<precision>g` with trailing zeros removed.
fn format_g(v: f64, precision: usize) -> String {
    if v.is_nan() {
        return "NaN".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf".into() } else { "-Inf".into() };
    }
    if v == 0.0 {
        return "0".into();
    }
    let sci = format!("{:.*e}", precision - 1, v);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= precision as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_zeros(mantissa), exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
