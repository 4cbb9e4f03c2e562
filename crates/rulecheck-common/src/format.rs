//! Float rendering compatible with the textual forms used in rule test
//! reports (`%g`-style shortest output and `E`-notation).

/// Shortest representation, switching to exponent form when the decimal
/// exponent is below -4 or at least 6.
///
/// # Examples
///
/// ```
/// use rulecheck_common::format::format_float;
///
/// assert_eq!(format_float(2.0), "2");
/// assert_eq!(format_float(0.25), "0.25");
/// assert_eq!(format_float(1e6), "1e+06");
/// assert_eq!(format_float(f64::INFINITY), "+Inf");
/// ```
pub fn format_float(v: f64) -> String {
    if let Some(special) = special(v) {
        return special;
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0".into() } else { "0".into() };
    }
    let (mantissa, exp) = split_exponent(v);
    if !(-4..6).contains(&exp) {
        format!("{mantissa}e{}", exponent_suffix(exp))
    } else {
        format!("{v}")
    }
}

/// Shortest mantissa in upper-case exponent form, e.g. `2E+00`.
///
/// # Examples
///
/// ```
/// use rulecheck_common::format::format_float_exp;
///
/// assert_eq!(format_float_exp(2.0), "2E+00");
/// assert_eq!(format_float_exp(-0.015), "-1.5E-02");
/// ```
pub fn format_float_exp(v: f64) -> String {
    if let Some(special) = special(v) {
        return special;
    }
    let (mantissa, exp) = split_exponent(v);
    format!("{mantissa}E{}", exponent_suffix(exp))
}

fn special(v: f64) -> Option<String> {
    if v.is_nan() {
        Some("NaN".into())
    } else if v == f64::INFINITY {
        Some("+Inf".into())
    } else if v == f64::NEG_INFINITY {
        Some("-Inf".into())
    } else {
        None
    }
}

fn split_exponent(v: f64) -> (String, i32) {
    let formatted = format!("{v:e}");
    match formatted.split_once('e') {
        Some((mantissa, exp)) => (mantissa.to_string(), exp.parse().unwrap_or(0)),
        None => (formatted, 0),
    }
}

fn exponent_suffix(exp: i32) -> String {
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{sign}{:02}", exp.abs())
}
