use crate::ast::{Expr, Function};
use crate::engine::{type_error, Engine};
use crate::error::{QueryError, Result};
use crate::value::Value;
use rulecheck_common::labels::{Labels, METRIC_NAME};
use rulecheck_common::matcher::MatchOp;
use rulecheck_common::types::{Point, Sample, Series, Timestamp};

pub(crate) fn call(engine: &Engine, func: Function, args: &[Expr], ts: Timestamp) -> Result<Value> {
    let arg = |i: usize| args.get(i).ok_or_else(|| type_error_missing(func, i));
    let vector = match func {
        Function::Abs => map_floats(engine.eval_vector(arg(0)?, ts)?, f64::abs),
        Function::Ceil => map_floats(engine.eval_vector(arg(0)?, ts)?, f64::ceil),
        Function::Floor => map_floats(engine.eval_vector(arg(0)?, ts)?, f64::floor),
        Function::Sqrt => map_floats(engine.eval_vector(arg(0)?, ts)?, f64::sqrt),
        Function::Exp => map_floats(engine.eval_vector(arg(0)?, ts)?, f64::exp),
        Function::Ln => map_floats(engine.eval_vector(arg(0)?, ts)?, f64::ln),
        Function::Round => {
            let to_nearest = match args.get(1) {
                Some(e) => engine.eval_scalar(e, ts)?,
                None => 1.0,
            };
            let inverse = 1.0 / to_nearest;
            map_floats(engine.eval_vector(arg(0)?, ts)?, |v| (v * inverse + 0.5).floor() / inverse)
        }
        Function::ClampMin => {
            let min = engine.eval_scalar(arg(1)?, ts)?;
            map_floats(engine.eval_vector(arg(0)?, ts)?, |v| v.max(min))
        }
        Function::ClampMax => {
            let max = engine.eval_scalar(arg(1)?, ts)?;
            map_floats(engine.eval_vector(arg(0)?, ts)?, |v| v.min(max))
        }
        Function::Absent => {
            if !engine.eval_vector(arg(0)?, ts)?.is_empty() {
                Vec::new()
            } else {
                vec![Sample::float(absent_labels(arg(0)?), ts, 1.0)]
            }
        }
        Function::Vector => vec![Sample::float(Labels::new(), ts, engine.eval_scalar(arg(0)?, ts)?)],
        Function::Scalar => {
            let samples = engine.eval_vector(arg(0)?, ts)?;
            let v = match samples.as_slice() {
                [only] if only.h.is_none() => only.f,
                _ => f64::NAN,
            };
            return Ok(Value::Scalar { t: ts, v });
        }
        Function::Time => {
            return Ok(Value::Scalar {
                t: ts,
                v: ts as f64 / 1000.0,
            })
        }
        Function::Timestamp => {
            let samples = match unwrap_parens(arg(0)?) {
                Expr::Selector(sel) => engine.instant_samples(sel, ts, true),
                other => engine.eval_vector(other, ts)?,
            };
            samples
                .into_iter()
                .map(|s| Sample::float(s.labels.without_metric_name(), ts, s.t as f64 / 1000.0))
                .collect()
        }
        Function::HistogramCount | Function::HistogramSum => engine
            .eval_vector(arg(0)?, ts)?
            .into_iter()
            .filter_map(|s| {
                let h = s.h?;
                let v = if func == Function::HistogramCount { h.count } else { h.sum };
                Some(Sample::float(s.labels.without_metric_name(), ts, v))
            })
            .collect(),
        Function::Rate | Function::Increase | Function::Delta => {
            let (series, start, end) = range_arg(engine, arg(0)?, ts)?;
            series
                .into_iter()
                .filter_map(|s| {
                    let v = extrapolated_rate(&s.points, start, end, func)?;
                    Some(Sample::float(s.labels.without_metric_name(), ts, v))
                })
                .collect()
        }
        Function::AvgOverTime
        | Function::MinOverTime
        | Function::MaxOverTime
        | Function::SumOverTime
        | Function::CountOverTime
        | Function::LastOverTime => {
            let (series, _, _) = range_arg(engine, arg(0)?, ts)?;
            series
                .into_iter()
                .filter_map(|s| over_time(func, s, ts))
                .collect()
        }
    };
    Ok(Value::Vector(vector))
}

fn type_error_missing(func: Function, i: usize) -> QueryError {
    QueryError::Type(format!("missing argument {} to {}()", i + 1, func.name()))
}

fn unwrap_parens(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(inner) => unwrap_parens(inner),
        other => other,
    }
}

/// Applies `f` to every float sample and drops the metric name. Histogram
/// samples are skipped.
fn map_floats(samples: Vec<Sample>, f: impl Fn(f64) -> f64) -> Vec<Sample> {
    samples
        .into_iter()
        .filter(|s| s.h.is_none())
        .map(|s| Sample::float(s.labels.without_metric_name(), s.t, f(s.f)))
        .collect()
}

/// Labels taken from the equality matchers of a plain selector argument;
/// names matched more than once are left out.
fn absent_labels(expr: &Expr) -> Labels {
    let Expr::Selector(sel) = unwrap_parens(expr) else {
        return Labels::new();
    };
    let mut labels = Labels::new();
    let mut repeated: Vec<&str> = Vec::new();
    for m in &sel.matchers {
        if m.name == METRIC_NAME {
            continue;
        }
        let seen = sel.matchers.iter().filter(|o| o.name == m.name).count() > 1;
        if seen {
            repeated.push(&m.name);
        } else if m.op == MatchOp::Equal {
            labels.set(m.name.clone(), m.value.clone());
        }
    }
    for name in repeated {
        labels.remove(name);
    }
    labels
}

fn range_arg(engine: &Engine, expr: &Expr, ts: Timestamp) -> Result<(Vec<Series>, Timestamp, Timestamp)> {
    match unwrap_parens(expr) {
        Expr::Range { selector, range } => Ok(engine.range_series(selector, *range, ts)),
        other => Err(type_error("range vector", &engine.eval_expr(other, ts)?)),
    }
}

/// Rate-style difference over a window, extrapolated towards the window
/// edges when the samples stop short of them.
fn extrapolated_rate(points: &[Point], start: Timestamp, end: Timestamp, func: Function) -> Option<f64> {
    let floats: Vec<&Point> = points.iter().filter(|p| p.h.is_none()).collect();
    let (first, last) = match floats.as_slice() {
        [first, .., last] => (*first, *last),
        _ => return None,
    };
    let is_counter = func != Function::Delta;

    let mut result = last.f - first.f;
    if is_counter {
        for pair in floats.windows(2) {
            if pair[1].f < pair[0].f {
                result += pair[0].f;
            }
        }
    }

    let mut to_start = (first.t - start) as f64 / 1000.0;
    let mut to_end = (end - last.t) as f64 / 1000.0;
    let sampled = (last.t - first.t) as f64 / 1000.0;
    let average_step = sampled / (floats.len() - 1) as f64;

    // A counter cannot extrapolate below zero.
    if is_counter && result > 0.0 && first.f >= 0.0 {
        let to_zero = sampled * (first.f / result);
        if to_zero < to_start {
            to_start = to_zero;
        }
    }

    let threshold = average_step * 1.1;
    let mut interval = sampled;
    if to_start >= threshold {
        to_start = average_step / 2.0;
    }
    interval += to_start;
    if to_end >= threshold {
        to_end = average_step / 2.0;
    }
    interval += to_end;

    let mut factor = interval / sampled;
    if func == Function::Rate {
        factor /= (end - start) as f64 / 1000.0;
    }
    Some(result * factor)
}

fn over_time(func: Function, series: Series, ts: Timestamp) -> Option<Sample> {
    let labels = series.labels.without_metric_name();
    if func == Function::CountOverTime {
        return Some(Sample::float(labels, ts, series.points.len() as f64));
    }
    if func == Function::LastOverTime {
        let point = series.points.last()?;
        return Some(Sample {
            labels: series.labels.clone(),
            t: ts,
            f: point.f,
            h: point.h.clone(),
        });
    }

    let values: Vec<f64> = series.points.iter().filter(|p| p.h.is_none()).map(|p| p.f).collect();
    let first = *values.first()?;
    let v = match func {
        Function::SumOverTime => values.iter().sum(),
        Function::AvgOverTime => values.iter().sum::<f64>() / values.len() as f64,
        Function::MinOverTime => values.iter().fold(first, |m, &v| if m.is_nan() || v < m { v } else { m }),
        Function::MaxOverTime => values.iter().fold(first, |m, &v| if m.is_nan() || v > m { v } else { m }),
        _ => return None,
    };
    Some(Sample::float(labels, ts, v))
}
