use crate::ast::{AggregateOp, BinaryOp, Expr, VectorMatching, VectorSelector};
use crate::error::{QueryError, Result};
use crate::functions;
use crate::value::Value;
use crate::QueryEngine;
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::histogram::FloatHistogram;
use rulecheck_common::labels::{Labels, METRIC_NAME};
use rulecheck_common::types::{Sample, Series, Timestamp};
use rulecheck_storage::SeriesStore;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How far back an instant selector looks for the most recent sample.
pub const DEFAULT_LOOKBACK: ModelDuration = ModelDuration::from_mins(5);

/// Evaluates expressions against a [`SeriesStore`].
///
/// # Examples
///
/// ```
/// use rulecheck_common::labels::Labels;
/// use rulecheck_common::types::Point;
/// use rulecheck_query::{Engine, QueryEngine, Value};
/// use rulecheck_storage::memory::MemoryStore;
/// use rulecheck_storage::SeriesStore;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// for job in ["a", "b"] {
///     let labels = Labels::from_pairs([("__name__", "up"), ("job", job)]);
///     store.append(&labels, Point::float(0, 1.0)).unwrap();
/// }
/// let engine = Engine::new(store);
/// let Value::Vector(samples) = engine.instant_query("sum(up)", 0).unwrap() else {
///     panic!("expected a vector");
/// };
/// assert_eq!(samples[0].f, 2.0);
/// ```
pub struct Engine {
    store: Arc<dyn SeriesStore>,
    lookback: i64,
}

impl Engine {
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self {
            store,
            lookback: DEFAULT_LOOKBACK.as_millis(),
        }
    }

    pub fn with_lookback(mut self, lookback: ModelDuration) -> Self {
        if !lookback.is_zero() {
            self.lookback = lookback.as_millis();
        }
        self
    }

    pub fn store(&self) -> &Arc<dyn SeriesStore> {
        &self.store
    }

    pub(crate) fn eval_expr(&self, expr: &Expr, ts: Timestamp) -> Result<Value> {
        match expr {
            Expr::Number(v) => Ok(Value::Scalar { t: ts, v: *v }),
            Expr::String(s) => Ok(Value::String { t: ts, s: s.clone() }),
            Expr::Selector(sel) => Ok(Value::Vector(self.instant_samples(sel, ts, false))),
            Expr::Range { selector, range } => Ok(Value::Matrix(self.range_series(selector, *range, ts).0)),
            Expr::Paren(inner) => self.eval_expr(inner, ts),
            Expr::Negate(inner) => match self.eval_expr(inner, ts)? {
                Value::Scalar { t, v } => Ok(Value::Scalar { t, v: -v }),
                Value::Vector(samples) => Ok(Value::Vector(
                    samples
                        .into_iter()
                        .map(|mut s| {
                            s.labels.remove(METRIC_NAME);
                            s.f = -s.f;
                            s.h = s.h.map(|h| h.scale(-1.0));
                            s
                        })
                        .collect(),
                )),
                other => Err(type_error("unary expression", &other)),
            },
            Expr::Binary {
                op,
                lhs,
                rhs,
                return_bool,
                matching,
            } => {
                let lhs = self.eval_expr(lhs, ts)?;
                let rhs = self.eval_expr(rhs, ts)?;
                self.binary(*op, lhs, rhs, *return_bool, matching.as_ref(), ts)
            }
            Expr::Aggregate {
                op,
                expr,
                param,
                grouping,
                without,
            } => {
                let samples = self.eval_vector(expr, ts)?;
                let param = match param {
                    Some(p) => Some(self.eval_scalar(p, ts)?),
                    None => None,
                };
                aggregate(*op, samples, param, grouping, *without, ts).map(Value::Vector)
            }
            Expr::Call { func, args } => functions::call(self, *func, args, ts),
        }
    }

    pub(crate) fn eval_vector(&self, expr: &Expr, ts: Timestamp) -> Result<Vec<Sample>> {
        match self.eval_expr(expr, ts)? {
            Value::Vector(samples) => Ok(samples),
            other => Err(type_error("instant vector", &other)),
        }
    }

    pub(crate) fn eval_scalar(&self, expr: &Expr, ts: Timestamp) -> Result<f64> {
        match self.eval_expr(expr, ts)? {
            Value::Scalar { v, .. } => Ok(v),
            other => Err(type_error("scalar", &other)),
        }
    }

    /// Latest non-stale sample per matching series within the lookback
    /// window `(t - lookback, t]`. Samples carry the evaluation time unless
    /// `point_time` is set.
    pub(crate) fn instant_samples(&self, sel: &VectorSelector, ts: Timestamp, point_time: bool) -> Vec<Sample> {
        let ref_t = ts - sel.offset;
        self.store
            .select(&sel.matchers, ref_t - self.lookback + 1, ref_t)
            .into_iter()
            .filter_map(|series| {
                let point = series.points.last()?;
                if point.is_stale() {
                    return None;
                }
                Some(Sample {
                    labels: series.labels,
                    t: if point_time { point.t } else { ts },
                    f: point.f,
                    h: point.h.clone(),
                })
            })
            .collect()
    }

    /// Series with their non-stale points in `(ts - offset - range, ts - offset]`,
    /// plus the window bounds. The left edge is excluded.
    pub(crate) fn range_series(
        &self,
        sel: &VectorSelector,
        range: i64,
        ts: Timestamp,
    ) -> (Vec<Series>, Timestamp, Timestamp) {
        let end = ts - sel.offset;
        let start = end - range;
        let series = self
            .store
            .select(&sel.matchers, start + 1, end)
            .into_iter()
            .filter_map(|mut s| {
                s.points.retain(|p| !p.is_stale());
                (!s.points.is_empty()).then_some(s)
            })
            .collect();
        (series, start, end)
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        return_bool: bool,
        matching: Option<&VectorMatching>,
        ts: Timestamp,
    ) -> Result<Value> {
        match (lhs, rhs) {
            (Value::Scalar { v: l, .. }, Value::Scalar { v: r, .. }) => {
                let (value, keep) = scalar_binop(op, l, r);
                let v = if op.is_comparison() { f64::from(u8::from(keep)) } else { value };
                Ok(Value::Scalar { t: ts, v })
            }
            (Value::Vector(v), Value::Scalar { v: s, .. }) => {
                Ok(Value::Vector(vector_scalar(op, v, s, false, return_bool)))
            }
            (Value::Scalar { v: s, .. }, Value::Vector(v)) => {
                Ok(Value::Vector(vector_scalar(op, v, s, true, return_bool)))
            }
            (Value::Vector(l), Value::Vector(r)) => {
                let out = match op {
                    BinaryOp::And => set_and(l, r, matching, false),
                    BinaryOp::Unless => set_and(l, r, matching, true),
                    BinaryOp::Or => set_or(l, r, matching),
                    _ => vector_vector(op, l, r, matching, return_bool)?,
                };
                Ok(Value::Vector(out))
            }
            (l, r) => Err(QueryError::Type(format!(
                "binary expression must contain only scalar and instant vector types, got {} {op} {}",
                l.type_name(),
                r.type_name()
            ))),
        }
    }
}

impl QueryEngine for Engine {
    fn eval(&self, expr: &Expr, ts: Timestamp) -> Result<Value> {
        tracing::trace!(ts, "Evaluating expression");
        let value = self.eval_expr(expr, ts)?;
        if let Value::Vector(samples) = &value {
            ensure_unique_labels(samples)?;
        }
        Ok(value)
    }
}

pub(crate) fn type_error(expected: &str, got: &Value) -> QueryError {
    QueryError::Type(format!("expected {expected}, got {}", got.type_name()))
}

pub(crate) fn ensure_unique_labels(samples: &[Sample]) -> Result<()> {
    let mut seen = HashSet::with_capacity(samples.len());
    for s in samples {
        if !seen.insert(&s.labels) {
            return Err(QueryError::Execution(format!(
                "vector cannot contain metrics with the same labelset {}",
                s.labels
            )));
        }
    }
    Ok(())
}

/// Applies a float operator. For comparisons the second element tells
/// whether the pair satisfies it and the first is the left operand.
fn scalar_binop(op: BinaryOp, l: f64, r: f64) -> (f64, bool) {
    match op {
        BinaryOp::Add => (l + r, true),
        BinaryOp::Sub => (l - r, true),
        BinaryOp::Mul => (l * r, true),
        BinaryOp::Div => (l / r, true),
        BinaryOp::Mod => (l % r, true),
        BinaryOp::Pow => (l.powf(r), true),
        BinaryOp::Eq => (l, l == r),
        BinaryOp::Ne => (l, l != r),
        BinaryOp::Gt => (l, l > r),
        BinaryOp::Lt => (l, l < r),
        BinaryOp::Ge => (l, l >= r),
        BinaryOp::Le => (l, l <= r),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Unless => (f64::NAN, false),
    }
}

fn vector_scalar(op: BinaryOp, samples: Vec<Sample>, scalar: f64, swap: bool, return_bool: bool) -> Vec<Sample> {
    samples
        .into_iter()
        .filter_map(|mut s| {
            if let Some(h) = s.h.take() {
                let scaled = match (op, swap) {
                    (BinaryOp::Mul, _) => h.scale(scalar),
                    (BinaryOp::Div, false) => h.scale(1.0 / scalar),
                    _ => return None,
                };
                s.labels.remove(METRIC_NAME);
                s.h = Some(scaled);
                return Some(s);
            }
            let (l, r) = if swap { (scalar, s.f) } else { (s.f, scalar) };
            let (value, keep) = scalar_binop(op, l, r);
            if op.is_comparison() {
                if return_bool {
                    s.labels.remove(METRIC_NAME);
                    s.f = f64::from(u8::from(keep));
                    return Some(s);
                }
                return keep.then_some(s);
            }
            s.labels.remove(METRIC_NAME);
            s.f = value;
            Some(s)
        })
        .collect()
}

fn signature(labels: &Labels, matching: Option<&VectorMatching>) -> Labels {
    match matching {
        Some(m) if m.on => labels.keep(&m.labels),
        Some(m) => labels.drop_names(&m.labels).without_metric_name(),
        None => labels.without_metric_name(),
    }
}

fn vector_vector(
    op: BinaryOp,
    lhs: Vec<Sample>,
    rhs: Vec<Sample>,
    matching: Option<&VectorMatching>,
    return_bool: bool,
) -> Result<Vec<Sample>> {
    let mut right: HashMap<Labels, Sample> = HashMap::with_capacity(rhs.len());
    for s in rhs {
        let sig = signature(&s.labels, matching);
        if right.contains_key(&sig) {
            return Err(QueryError::Execution(format!(
                "found duplicate series for the match group {sig} on the right hand-side of the operation; many-to-many matching not allowed: matching labels must be unique on one side"
            )));
        }
        right.insert(sig, s);
    }

    let drop_name = !op.is_comparison() || return_bool;
    let mut matched: HashSet<Labels> = HashSet::new();
    let mut out = Vec::new();
    for mut l in lhs {
        let sig = signature(&l.labels, matching);
        let Some(r) = right.get(&sig) else {
            continue;
        };
        if !matched.insert(sig.clone()) {
            return Err(QueryError::Execution(format!(
                "multiple matches for labels {sig}: many-to-one matching must be explicit (group_left/group_right)"
            )));
        }

        match (l.h.take(), &r.h) {
            (None, None) => {
                let (value, keep) = scalar_binop(op, l.f, r.f);
                if op.is_comparison() {
                    if return_bool {
                        l.f = f64::from(u8::from(keep));
                    } else if !keep {
                        continue;
                    }
                } else {
                    l.f = value;
                }
            }
            (Some(lh), Some(rh)) => {
                let combined = match op {
                    BinaryOp::Add => lh.add(rh),
                    BinaryOp::Sub => lh.sub(rh),
                    _ => continue,
                };
                l.h = Some(combined.map_err(QueryError::Execution)?);
            }
            _ => continue,
        }

        if drop_name {
            l.labels.remove(METRIC_NAME);
        }
        if let Some(m) = matching {
            l.labels = if m.on { l.labels.keep(&m.labels) } else { l.labels.drop_names(&m.labels) };
        }
        out.push(l);
    }
    ensure_unique_labels(&out)?;
    Ok(out)
}

/// `and` when `negate` is false, `unless` otherwise.
fn set_and(lhs: Vec<Sample>, rhs: Vec<Sample>, matching: Option<&VectorMatching>, negate: bool) -> Vec<Sample> {
    let right: HashSet<Labels> = rhs.iter().map(|s| signature(&s.labels, matching)).collect();
    lhs.into_iter()
        .filter(|s| right.contains(&signature(&s.labels, matching)) != negate)
        .collect()
}

fn set_or(lhs: Vec<Sample>, rhs: Vec<Sample>, matching: Option<&VectorMatching>) -> Vec<Sample> {
    let left: HashSet<Labels> = lhs.iter().map(|s| signature(&s.labels, matching)).collect();
    let mut out = lhs;
    out.extend(
        rhs.into_iter()
            .filter(|s| !left.contains(&signature(&s.labels, matching))),
    );
    out
}

fn aggregate(
    op: AggregateOp,
    samples: Vec<Sample>,
    param: Option<f64>,
    grouping: &[String],
    without: bool,
    ts: Timestamp,
) -> Result<Vec<Sample>> {
    let mut order: Vec<Labels> = Vec::new();
    let mut groups: HashMap<Labels, Vec<Sample>> = HashMap::new();
    for s in samples {
        let key = if without {
            s.labels.drop_names(grouping).without_metric_name()
        } else {
            s.labels.keep(grouping)
        };
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(s);
    }

    let mut out = Vec::new();
    for key in order {
        let Some(members) = groups.remove(&key) else {
            continue;
        };
        match op {
            AggregateOp::TopK | AggregateOp::BottomK => {
                let k = param.unwrap_or(0.0);
                if !(k >= 1.0) {
                    continue;
                }
                let mut floats: Vec<Sample> = members.into_iter().filter(|s| s.h.is_none()).collect();
                let descending = op == AggregateOp::TopK;
                floats.sort_by(|a, b| rank(a.f, b.f, descending));
                out.extend(floats.into_iter().take(k as usize).map(|mut s| {
                    s.t = ts;
                    s
                }));
            }
            _ => {
                if let Some(sample) = reduce(op, key, &members, ts)? {
                    out.push(sample);
                }
            }
        }
    }
    Ok(out)
}

/// Orders values for topk/bottomk; NaN always sorts last.
fn rank(a: f64, b: f64, descending: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ if descending => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn reduce(op: AggregateOp, labels: Labels, members: &[Sample], ts: Timestamp) -> Result<Option<Sample>> {
    let n = members.len() as f64;
    let histograms: Vec<&FloatHistogram> = members.iter().filter_map(|s| s.h.as_ref()).collect();
    let floats: Vec<f64> = members.iter().filter(|s| s.h.is_none()).map(|s| s.f).collect();
    let float_sample = |f: f64| Some(Sample::float(labels.clone(), ts, f));

    Ok(match op {
        AggregateOp::Count => float_sample(n),
        AggregateOp::Group => float_sample(1.0),
        AggregateOp::Sum | AggregateOp::Avg if !histograms.is_empty() => {
            // Mixing floats and histograms in one group yields nothing.
            if !floats.is_empty() {
                return Ok(None);
            }
            let mut total = histograms[0].clone();
            for h in &histograms[1..] {
                total = total.add(h).map_err(QueryError::Execution)?;
            }
            if op == AggregateOp::Avg {
                total = total.scale(1.0 / n);
            }
            Some(Sample {
                labels: labels.clone(),
                t: ts,
                f: 0.0,
                h: Some(total),
            })
        }
        AggregateOp::Sum => float_sample(floats.iter().sum()),
        AggregateOp::Avg => float_sample(floats.iter().sum::<f64>() / n),
        AggregateOp::Min | AggregateOp::Max => {
            let Some(&first) = floats.first() else {
                return Ok(None);
            };
            let pick = floats[1..].iter().fold(first, |cur, &v| {
                let better = if op == AggregateOp::Max { v > cur } else { v < cur };
                if cur.is_nan() || better {
                    v
                } else {
                    cur
                }
            });
            float_sample(pick)
        }
        AggregateOp::TopK | AggregateOp::BottomK => None,
    })
}
