//! Recursive-descent parser producing [`Expr`] trees.

use crate::ast::{AggregateOp, ArgKind, BinaryOp, Expr, Function, VectorMatching, VectorSelector};
use crate::error::{QueryError, Result};
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::{is_valid_label_name, METRIC_NAME};
use rulecheck_common::matcher::{LabelMatcher, MatchOp};
use rulecheck_common::series::parse_float;

/// Parses an expression and checks operand types.
///
/// # Examples
///
/// ```
/// use rulecheck_query::parse;
///
/// assert!(parse(r#"sum by (job) (rate(http_requests_total{code=~"5.."}[5m])) > 0.1"#).is_ok());
/// assert!(parse("rate(up)").is_err());
/// assert!(parse("1 > 2").is_err());
/// ```
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr(0)?;
    if let Some(tok) = parser.peek_token() {
        return Err(parse_error(tok.pos, format!("unexpected {}", tok.kind.describe())));
    }
    Ok(expr)
}

/// Static type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueType {
    Scalar,
    Instant,
    Range,
    String,
}

impl ValueType {
    fn describe(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Instant => "instant vector",
            Self::Range => "range vector",
            Self::String => "string",
        }
    }
}

pub(crate) fn value_type(expr: &Expr) -> ValueType {
    match expr {
        Expr::Number(_) => ValueType::Scalar,
        Expr::String(_) => ValueType::String,
        Expr::Selector(_) => ValueType::Instant,
        Expr::Range { .. } => ValueType::Range,
        Expr::Paren(inner) | Expr::Negate(inner) => value_type(inner),
        Expr::Binary { lhs, rhs, .. } => {
            if value_type(lhs) == ValueType::Scalar && value_type(rhs) == ValueType::Scalar {
                ValueType::Scalar
            } else {
                ValueType::Instant
            }
        }
        Expr::Aggregate { .. } => ValueType::Instant,
        Expr::Call { func, .. } => match func {
            Function::Scalar | Function::Time => ValueType::Scalar,
            _ => ValueType::Instant,
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Duration(i64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Assign,
    RegexMatch,
    RegexNoMatch,
    Op(BinaryOp),
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Str(s) => format!("string {s:?}"),
            Self::Ident(s) => format!("identifier {s:?}"),
            Self::Duration(_) => "duration".into(),
            Self::LParen => "\"(\"".into(),
            Self::RParen => "\")\"".into(),
            Self::LBrace => "\"{\"".into(),
            Self::RBrace => "\"}\"".into(),
            Self::LBracket => "\"[\"".into(),
            Self::RBracket => "\"]\"".into(),
            Self::Comma => "\",\"".into(),
            Self::Assign => "\"=\"".into(),
            Self::RegexMatch => "\"=~\"".into(),
            Self::RegexNoMatch => "\"!~\"".into(),
            Self::Op(op) => format!("operator \"{op}\""),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        let next = chars.get(i + 1).copied();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '+' => TokenKind::Op(BinaryOp::Add),
            '-' => TokenKind::Op(BinaryOp::Sub),
            '*' => TokenKind::Op(BinaryOp::Mul),
            '/' => TokenKind::Op(BinaryOp::Div),
            '%' => TokenKind::Op(BinaryOp::Mod),
            '^' => TokenKind::Op(BinaryOp::Pow),
            '=' => match next {
                Some('=') => {
                    i += 1;
                    TokenKind::Op(BinaryOp::Eq)
                }
                Some('~') => {
                    i += 1;
                    TokenKind::RegexMatch
                }
                _ => TokenKind::Assign,
            },
            '!' => match next {
                Some('=') => {
                    i += 1;
                    TokenKind::Op(BinaryOp::Ne)
                }
                Some('~') => {
                    i += 1;
                    TokenKind::RegexNoMatch
                }
                _ => return Err(parse_error(start, "unexpected character after '!'")),
            },
            '>' | '<' => {
                let or_equal = next == Some('=');
                if or_equal {
                    i += 1;
                }
                TokenKind::Op(match (c, or_equal) {
                    ('>', true) => BinaryOp::Ge,
                    ('>', false) => BinaryOp::Gt,
                    (_, true) => BinaryOp::Le,
                    (_, false) => BinaryOp::Lt,
                })
            }
            '"' | '\'' | '`' => {
                let (s, end) = lex_string(&chars, i)?;
                i = end;
                tokens.push(Token {
                    kind: TokenKind::Str(s),
                    pos: start,
                });
                continue;
            }
            c if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let (kind, end) = lex_number(&chars, i)?;
                i = end;
                tokens.push(Token { kind, pos: start });
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == ':' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == ':') {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(chars[start..i].iter().collect()),
                    pos: start,
                });
                continue;
            }
            other => return Err(parse_error(start, format!("unexpected character {other:?}"))),
        };
        i += 1;
        tokens.push(Token { kind, pos: start });
    }
    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' && quote != '`' {
            i += 1;
            let escaped = chars
                .get(i)
                .ok_or_else(|| parse_error(i, "unterminated escape sequence"))?;
            out.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '\\' => '\\',
                '"' => '"',
                '\'' => '\'',
                other => return Err(parse_error(i, format!("unknown escape sequence \\{other}"))),
            });
        } else {
            out.push(c);
        }
        i += 1;
    }
    Err(parse_error(start, "unterminated quoted string"))
}

fn lex_number(chars: &[char], start: usize) -> Result<(TokenKind, usize)> {
    let mut i = start;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let sign = usize::from(matches!(chars.get(i + 1), Some('+' | '-')));
        if chars.get(i + 1 + sign).is_some_and(|c| c.is_ascii_digit()) {
            i += 1 + sign;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    if i < chars.len() && chars[i].is_ascii_alphabetic() {
        let mut end = i;
        while end < chars.len() && chars[end].is_ascii_alphanumeric() {
            end += 1;
        }
        let text: String = chars[start..end].iter().collect();
        let duration: ModelDuration = text
            .parse()
            .map_err(|_| parse_error(start, format!("bad number or duration syntax {text:?}")))?;
        return Ok((TokenKind::Duration(duration.as_millis()), end));
    }
    let text: String = chars[start..i].iter().collect();
    let value = text
        .parse()
        .map_err(|_| parse_error(start, format!("bad number syntax {text:?}")))?;
    Ok((TokenKind::Number(value), i))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| parse_error(self.current_pos(), "unexpected end of input"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        let tok = self.next()?;
        if tok.kind != kind {
            return Err(parse_error(
                tok.pos,
                format!("unexpected {}, expected {}", tok.kind.describe(), kind.describe()),
            ));
        }
        Ok(())
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(TokenKind::Ident(s)) if s.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        match self.peek()? {
            TokenKind::Op(op) => Some(*op),
            TokenKind::Ident(s) => match s.to_ascii_lowercase().as_str() {
                "and" => Some(BinaryOp::And),
                "or" => Some(BinaryOp::Or),
                "unless" => Some(BinaryOp::Unless),
                _ => None,
            },
            _ => None,
        }
    }

    fn expr(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            let op_pos = self.current_pos();
            self.pos += 1;

            let return_bool = self.eat_keyword("bool");
            if return_bool && !op.is_comparison() {
                return Err(parse_error(op_pos, "bool modifier can only be used on comparison operators"));
            }
            let matching = self.vector_matching()?;
            if self.eat_keyword("group_left") || self.eat_keyword("group_right") {
                return Err(parse_error(op_pos, "many-to-one matching is not supported"));
            }

            // `^` is right associative.
            let next_min = if op == BinaryOp::Pow { prec } else { prec + 1 };
            let rhs = self.expr(next_min)?;
            lhs = check_binary(op, lhs, rhs, return_bool, matching, op_pos)?;
        }
        Ok(lhs)
    }

    fn vector_matching(&mut self) -> Result<Option<VectorMatching>> {
        let on = if self.eat_keyword("on") {
            true
        } else if self.eat_keyword("ignoring") {
            false
        } else {
            return Ok(None);
        };
        let labels = self.label_list()?;
        Ok(Some(VectorMatching { on, labels }))
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(TokenKind::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) => {
                let negate = *op == BinaryOp::Sub;
                let pos = self.current_pos();
                self.pos += 1;
                let operand = self.expr(BinaryOp::Pow.precedence())?;
                match value_type(&operand) {
                    ValueType::Scalar | ValueType::Instant => {}
                    other => {
                        return Err(parse_error(
                            pos,
                            format!("unary expression only allowed on expressions of type scalar or instant vector, got {}", other.describe()),
                        ))
                    }
                }
                Ok(match (negate, operand) {
                    (false, e) => e,
                    (true, Expr::Number(n)) => Expr::Number(-n),
                    (true, e) => Expr::Negate(Box::new(e)),
                })
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        if self.peek() == Some(&TokenKind::LBracket) {
            let pos = self.current_pos();
            self.pos += 1;
            let range = self.duration()?;
            self.expect(TokenKind::RBracket)?;
            expr = match expr {
                Expr::Selector(selector) => Expr::Range { selector, range },
                _ => return Err(parse_error(pos, "ranges only allowed for vector selectors")),
            };
        }
        if self.eat_keyword("offset") {
            let pos = self.current_pos();
            let negative = self.eat(&TokenKind::Op(BinaryOp::Sub));
            let offset = self.duration()?;
            let offset = if negative { -offset } else { offset };
            match &mut expr {
                Expr::Selector(selector) | Expr::Range { selector, .. } => selector.offset = offset,
                _ => return Err(parse_error(pos, "offset modifier must be preceded by a selector")),
            }
        }
        Ok(expr)
    }

    fn duration(&mut self) -> Result<i64> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Duration(ms) if ms > 0 => Ok(ms),
            TokenKind::Duration(_) => Err(parse_error(tok.pos, "duration must be greater than 0")),
            other => Err(parse_error(tok.pos, format!("unexpected {}, expected duration", other.describe()))),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Str(s) => Ok(Expr::String(s)),
            TokenKind::LParen => {
                let inner = self.expr(0)?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::LBrace => {
                self.pos -= 1;
                self.selector(None, tok.pos)
            }
            TokenKind::Ident(name) => self.identifier(name, tok.pos),
            other => Err(parse_error(tok.pos, format!("unexpected {}", other.describe()))),
        }
    }

    fn identifier(&mut self, name: String, pos: usize) -> Result<Expr> {
        let lower = name.to_ascii_lowercase();
        if lower == "inf" || lower == "nan" {
            return parse_float(&name)
                .map(Expr::Number)
                .ok_or_else(|| parse_error(pos, "bad number"));
        }
        if let Some(op) = AggregateOp::from_name(&lower) {
            let opens = matches!(self.peek(), Some(TokenKind::LParen));
            let grouped = matches!(self.peek(), Some(TokenKind::Ident(k)) if k == "by" || k == "without");
            if opens || grouped {
                return self.aggregate(op, pos);
            }
        }
        if let Some(func) = Function::from_name(&name) {
            if self.peek() == Some(&TokenKind::LParen) {
                return self.call(func, pos);
            }
        }
        if self.peek() == Some(&TokenKind::LParen) {
            return Err(parse_error(pos, format!("unknown function with name {name:?}")));
        }
        self.selector(Some(name), pos)
    }

    fn aggregate(&mut self, op: AggregateOp, pos: usize) -> Result<Expr> {
        let (mut grouping, mut without, grouped) = match self.grouping_keyword() {
            Some(without) => (self.label_list()?, without, true),
            None => (Vec::new(), false, false),
        };

        self.expect(TokenKind::LParen)?;
        let param = if op.takes_param() {
            let p = self.expr(0)?;
            self.expect(TokenKind::Comma)?;
            if value_type(&p) != ValueType::Scalar {
                return Err(parse_error(pos, format!("expected type scalar in aggregation parameter, got {}", value_type(&p).describe())));
            }
            Some(Box::new(p))
        } else {
            None
        };
        let inner = self.expr(0)?;
        self.expect(TokenKind::RParen)?;

        if !grouped {
            if let Some(w) = self.grouping_keyword() {
                without = w;
                grouping = self.label_list()?;
            }
        }

        let kind = value_type(&inner);
        if kind != ValueType::Instant {
            return Err(parse_error(
                pos,
                format!("expected type instant vector in aggregation expression, got {}", kind.describe()),
            ));
        }
        Ok(Expr::Aggregate {
            op,
            expr: Box::new(inner),
            param,
            grouping,
            without,
        })
    }

    /// Consumes `by` or `without`, returning whether it was `without`.
    fn grouping_keyword(&mut self) -> Option<bool> {
        if self.eat_keyword("by") {
            Some(false)
        } else if self.eat_keyword("without") {
            Some(true)
        } else {
            None
        }
    }

    fn call(&mut self, func: Function, pos: usize) -> Result<Expr> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                args.push(self.expr(0)?);
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }

        let (required, optional) = func.signature();
        if args.len() < required.len() || args.len() > required.len() + optional.len() {
            return Err(parse_error(
                pos,
                format!("wrong number of arguments for function {}(), got {}", func.name(), args.len()),
            ));
        }
        for (arg, kind) in args.iter().zip(required.iter().chain(optional)) {
            let got = value_type(arg);
            let want = match kind {
                ArgKind::Scalar => ValueType::Scalar,
                ArgKind::Instant => ValueType::Instant,
                ArgKind::Range => ValueType::Range,
            };
            if got != want {
                return Err(parse_error(
                    pos,
                    format!(
                        "expected type {} in call to function {}(), got {}",
                        want.describe(),
                        func.name(),
                        got.describe()
                    ),
                ));
            }
        }
        Ok(Expr::Call { func, args })
    }

    fn label_list(&mut self) -> Result<Vec<String>> {
        self.expect(TokenKind::LParen)?;
        let mut labels = Vec::new();
        loop {
            let tok = self.next()?;
            match tok.kind {
                TokenKind::RParen => break,
                TokenKind::Ident(name) if is_valid_label_name(&name) => {
                    labels.push(name);
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(TokenKind::RParen)?;
                        break;
                    }
                }
                other => {
                    return Err(parse_error(tok.pos, format!("unexpected {} in grouping opts, expected label", other.describe())))
                }
            }
        }
        Ok(labels)
    }

    fn selector(&mut self, name: Option<String>, pos: usize) -> Result<Expr> {
        let mut matchers = Vec::new();
        if let Some(n) = &name {
            matchers.push(matcher(MatchOp::Equal, METRIC_NAME, n, pos)?);
        }
        if self.eat(&TokenKind::LBrace) {
            loop {
                let tok = self.next()?;
                let label = match tok.kind {
                    TokenKind::RBrace => break,
                    TokenKind::Ident(label) => label,
                    TokenKind::Str(label) => label,
                    other => {
                        return Err(parse_error(tok.pos, format!("unexpected {} in label matching, expected label", other.describe())))
                    }
                };
                let op_tok = self.next()?;
                let op = match op_tok.kind {
                    TokenKind::Assign => MatchOp::Equal,
                    TokenKind::Op(BinaryOp::Ne) => MatchOp::NotEqual,
                    TokenKind::RegexMatch => MatchOp::Regex,
                    TokenKind::RegexNoMatch => MatchOp::NotRegex,
                    other => {
                        return Err(parse_error(op_tok.pos, format!("unexpected {} in label matching, expected operator", other.describe())))
                    }
                };
                let value_tok = self.next()?;
                let TokenKind::Str(value) = value_tok.kind else {
                    return Err(parse_error(value_tok.pos, "label matcher value must be a quoted string"));
                };
                if label == METRIC_NAME && name.is_some() {
                    return Err(parse_error(tok.pos, "metric name must not be set twice"));
                }
                matchers.push(matcher(op, &label, &value, tok.pos)?);
                if !self.eat(&TokenKind::Comma) {
                    self.expect(TokenKind::RBrace)?;
                    break;
                }
            }
        }
        if matchers.iter().all(LabelMatcher::matches_empty) {
            return Err(parse_error(pos, "vector selector must contain at least one non-empty matcher"));
        }
        Ok(Expr::Selector(VectorSelector {
            name,
            matchers,
            offset: 0,
        }))
    }
}

fn matcher(op: MatchOp, name: &str, value: &str, pos: usize) -> Result<LabelMatcher> {
    LabelMatcher::new(op, name, value).map_err(|e| parse_error(pos, e.to_string()))
}

fn check_binary(
    op: BinaryOp,
    lhs: Expr,
    rhs: Expr,
    return_bool: bool,
    matching: Option<VectorMatching>,
    pos: usize,
) -> Result<Expr> {
    let (lt, rt) = (value_type(&lhs), value_type(&rhs));
    for t in [lt, rt] {
        if !matches!(t, ValueType::Scalar | ValueType::Instant) {
            return Err(parse_error(
                pos,
                format!("binary expression must contain only scalar and instant vector types, got {}", t.describe()),
            ));
        }
    }
    let both_scalar = lt == ValueType::Scalar && rt == ValueType::Scalar;
    if op.is_comparison() && both_scalar && !return_bool {
        return Err(parse_error(pos, "comparisons between scalars must use BOOL modifier"));
    }
    if op.is_set() && (lt != ValueType::Instant || rt != ValueType::Instant) {
        return Err(parse_error(pos, format!("set operator {op} not allowed in binary scalar expression")));
    }
    if matching.is_some() && (lt != ValueType::Instant || rt != ValueType::Instant) {
        return Err(parse_error(pos, "vector matching only allowed between instant vectors"));
    }
    Ok(Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        return_bool,
        matching,
    })
}

fn parse_error(pos: usize, message: impl Into<String>) -> QueryError {
    QueryError::Parse {
        pos,
        message: message.into(),
    }
}
