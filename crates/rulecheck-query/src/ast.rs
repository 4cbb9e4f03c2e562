use rulecheck_common::matcher::LabelMatcher;
use std::fmt;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Selector(VectorSelector),
    Range {
        selector: VectorSelector,
        /// Range width in milliseconds.
        range: i64,
    },
    Paren(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        return_bool: bool,
        matching: Option<VectorMatching>,
    },
    Aggregate {
        op: AggregateOp,
        expr: Box<Expr>,
        param: Option<Box<Expr>>,
        grouping: Vec<String>,
        without: bool,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
}

/// An instant vector selector such as `up{job="api"} offset 5m`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSelector {
    pub name: Option<String>,
    /// All matchers, including the one implied by `name`.
    pub matchers: Vec<LabelMatcher>,
    /// Offset in milliseconds; negative values look ahead.
    pub offset: i64,
}

/// `on(...)` / `ignoring(...)` clause of a binary operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMatching {
    pub on: bool,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
    Unless,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Gt | Self::Lt | Self::Ge | Self::Le)
    }

    pub fn is_set(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Unless)
    }

    /// Binding strength; higher binds tighter.
    pub(crate) fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And | Self::Unless => 2,
            Self::Eq | Self::Ne | Self::Gt | Self::Lt | Self::Ge | Self::Le => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div | Self::Mod => 5,
            Self::Pow => 6,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::And => "and",
            Self::Or => "or",
            Self::Unless => "unless",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    Group,
    TopK,
    BottomK,
}

impl AggregateOp {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            "count" => Self::Count,
            "group" => Self::Group,
            "topk" => Self::TopK,
            "bottomk" => Self::BottomK,
            _ => return None,
        })
    }

    pub fn takes_param(self) -> bool {
        matches!(self, Self::TopK | Self::BottomK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Ceil,
    Floor,
    Round,
    Sqrt,
    Exp,
    Ln,
    ClampMin,
    ClampMax,
    Absent,
    Vector,
    Scalar,
    Time,
    Timestamp,
    Rate,
    Increase,
    Delta,
    AvgOverTime,
    MinOverTime,
    MaxOverTime,
    SumOverTime,
    CountOverTime,
    LastOverTime,
    HistogramCount,
    HistogramSum,
}

/// Argument kinds a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Scalar,
    Instant,
    Range,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "ceil" => Self::Ceil,
            "floor" => Self::Floor,
            "round" => Self::Round,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "ln" => Self::Ln,
            "clamp_min" => Self::ClampMin,
            "clamp_max" => Self::ClampMax,
            "absent" => Self::Absent,
            "vector" => Self::Vector,
            "scalar" => Self::Scalar,
            "time" => Self::Time,
            "timestamp" => Self::Timestamp,
            "rate" => Self::Rate,
            "increase" => Self::Increase,
            "delta" => Self::Delta,
            "avg_over_time" => Self::AvgOverTime,
            "min_over_time" => Self::MinOverTime,
            "max_over_time" => Self::MaxOverTime,
            "sum_over_time" => Self::SumOverTime,
            "count_over_time" => Self::CountOverTime,
            "last_over_time" => Self::LastOverTime,
            "histogram_count" => Self::HistogramCount,
            "histogram_sum" => Self::HistogramSum,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Ceil => "ceil",
            Self::Floor => "floor",
            Self::Round => "round",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::ClampMin => "clamp_min",
            Self::ClampMax => "clamp_max",
            Self::Absent => "absent",
            Self::Vector => "vector",
            Self::Scalar => "scalar",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::Rate => "rate",
            Self::Increase => "increase",
            Self::Delta => "delta",
            Self::AvgOverTime => "avg_over_time",
            Self::MinOverTime => "min_over_time",
            Self::MaxOverTime => "max_over_time",
            Self::SumOverTime => "sum_over_time",
            Self::CountOverTime => "count_over_time",
            Self::LastOverTime => "last_over_time",
            Self::HistogramCount => "histogram_count",
            Self::HistogramSum => "histogram_sum",
        }
    }

    /// Required arguments followed by optional ones.
    pub fn signature(self) -> (&'static [ArgKind], &'static [ArgKind]) {
        use ArgKind::*;
        match self {
            Self::Abs | Self::Ceil | Self::Floor | Self::Sqrt | Self::Exp | Self::Ln => (&[Instant], &[]),
            Self::Round => (&[Instant], &[Scalar]),
            Self::ClampMin | Self::ClampMax => (&[Instant, Scalar], &[]),
            Self::Absent | Self::Scalar | Self::Timestamp => (&[Instant], &[]),
            Self::HistogramCount | Self::HistogramSum => (&[Instant], &[]),
            Self::Vector => (&[Scalar], &[]),
            Self::Time => (&[], &[]),
            Self::Rate
            | Self::Increase
            | Self::Delta
            | Self::AvgOverTime
            | Self::MinOverTime
            | Self::MaxOverTime
            | Self::SumOverTime
            | Self::CountOverTime
            | Self::LastOverTime => (&[Range], &[]),
        }
    }
}
