//! Typed criteria expressions over table columns.
//!
//! Expressions are plain data: build them with [`col`] and the combinators on
//! [`Expr`], or parse the textual form with [`Expr::parse`]. Nothing is
//! evaluated until the expression meets a table, at which point every
//! referenced column is checked against that table's columns.
//!
//! ```
//! use popler::expr::{Expr, col};
//!
//! let built = col("genus").eq("Poa").and(col("species").eq("fendleriana"));
//! let parsed = Expr::parse(r#"genus == "Poa" & species == "fendleriana""#).unwrap();
//! assert_eq!(built, parsed);
//! ```

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::table::{Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A boolean predicate over the columns of one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Const(bool),
    Compare {
        column: String,
        op: CmpOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    Not(Box<Expr>),
    /// Holds when every operand holds; `TRUE` when empty.
    And(Vec<Expr>),
    /// Holds when any operand holds; `FALSE` when empty.
    Or(Vec<Expr>),
}

/// Deepest nesting of `!`, `&`, `|` and parentheses accepted by
/// [`Expr::parse`] and [`Expr::bind`].
pub const MAX_DEPTH: usize = 128;

/// Starts an expression on a column.
pub fn col(name: impl Into<String>) -> ColumnRef {
    ColumnRef { name: name.into() }
}

/// A column reference waiting for its comparison.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    name: String,
}

impl ColumnRef {
    fn cmp(self, op: CmpOp, value: impl Into<Value>) -> Expr {
        Expr::Compare {
            column: self.name,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Ge, value)
    }

    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::In {
            column: self.name,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Expr {
    /// Conjunction; chained calls extend one flat `And`.
    pub fn and(self, other: Expr) -> Expr {
        let mut items = match self {
            Expr::And(items) => items,
            e => vec![e],
        };
        match other {
            Expr::And(more) => items.extend(more),
            e => items.push(e),
        }
        Expr::And(items)
    }

    /// Disjunction; chained calls extend one flat `Or`.
    pub fn or(self, other: Expr) -> Expr {
        let mut items = match self {
            Expr::Or(items) => items,
            e => vec![e],
        };
        match other {
            Expr::Or(more) => items.extend(more),
            e => items.push(e),
        }
        Expr::Or(items)
    }

    /// Negation; a double negation cancels out.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        match self {
            Expr::Not(inner) => *inner,
            e => Expr::Not(Box::new(e)),
        }
    }

    /// Disjunction of all `exprs`; `FALSE` when there are none.
    pub fn any(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        exprs
            .into_iter()
            .reduce(Expr::or)
            .unwrap_or(Expr::Const(false))
    }

    /// Conjunction of all `exprs`; `TRUE` when there are none.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        exprs
            .into_iter()
            .reduce(Expr::and)
            .unwrap_or(Expr::Const(true))
    }

    /// Every column name the expression mentions, sorted.
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Const(_) => {}
            Expr::Compare { column, .. } | Expr::In { column, .. } => {
                out.insert(column);
            }
            Expr::Not(e) => e.collect_columns(out),
            Expr::And(items) | Expr::Or(items) => {
                for e in items {
                    e.collect_columns(out);
                }
            }
        }
    }

    /// Nesting depth of the tree, counted without recursion.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((e, d)) = stack.pop() {
            deepest = deepest.max(d);
            match e {
                Expr::Not(inner) => stack.push((inner, d + 1)),
                Expr::And(items) | Expr::Or(items) => {
                    stack.extend(items.iter().map(|i| (i, d + 1)));
                }
                Expr::Const(_) | Expr::Compare { .. } | Expr::In { .. } => {}
            }
        }
        deepest
    }

    /// Resolves column names against `table`, failing with
    /// [`Error::UnknownColumns`] if any is missing and with
    /// [`Error::TooDeep`] past [`MAX_DEPTH`].
    pub fn bind<'t>(&self, table: &'t Table) -> Result<Bound<'t>> {
        if self.depth() > MAX_DEPTH {
            return Err(Error::TooDeep { limit: MAX_DEPTH });
        }
        let unknown: Vec<String> = self
            .columns()
            .into_iter()
            .filter(|c| !table.has_column(c))
            .map(str::to_string)
            .collect();
        if !unknown.is_empty() {
            return Err(Error::UnknownColumns { columns: unknown });
        }
        Ok(Bound {
            table,
            node: self.resolve(table),
        })
    }

    fn resolve(&self, table: &Table) -> Node {
        let index = |c: &str| table.column_index(c).unwrap_or(usize::MAX);
        match self {
            Expr::Const(b) => Node::Const(*b),
            Expr::Compare { column, op, value } => Node::Compare {
                idx: index(column),
                op: *op,
                value: value.clone(),
            },
            Expr::In { column, values } => Node::In {
                idx: index(column),
                values: values.clone(),
            },
            Expr::Not(e) => Node::Not(Box::new(e.resolve(table))),
            Expr::And(items) => Node::And(items.iter().map(|e| e.resolve(table)).collect()),
            Expr::Or(items) => Node::Or(items.iter().map(|e| e.resolve(table)).collect()),
        }
    }

    /// Parses the textual criteria form, e.g.
    /// `genus == "Poa" & (studystartyr >= 1990 | lterid %in% c("SEV", "SBC"))`.
    pub fn parse(input: &str) -> Result<Expr> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            index: 0,
            end: input.len(),
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some((pos, tok)) = parser.tokens.get(parser.index) {
            return Err(Error::Parse {
                position: *pos,
                message: format!("unexpected {tok} after end of expression"),
            });
        }
        Ok(expr)
    }
}

/// An expression whose columns have been resolved against a table.
#[derive(Debug)]
pub struct Bound<'t> {
    table: &'t Table,
    node: Node,
}

impl Bound<'_> {
    /// Evaluates the predicate on row `row`.
    pub fn matches(&self, row: usize) -> bool {
        match self.table.rows().get(row) {
            Some(r) => self.node.eval(r),
            None => false,
        }
    }

    /// Indices of all rows for which the predicate holds.
    pub fn matching_rows(&self) -> Vec<usize> {
        self.table
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, r)| self.node.eval(r))
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug)]
enum Node {
    Const(bool),
    Compare { idx: usize, op: CmpOp, value: Value },
    In { idx: usize, values: Vec<Value> },
    Not(Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
}

impl Node {
    fn eval(&self, row: &[Value]) -> bool {
        match self {
            Node::Const(b) => *b,
            Node::Compare { idx, op, value } => row
                .get(*idx)
                .and_then(|cell| compare(cell, value))
                .is_some_and(|ord| op.holds(ord)),
            Node::In { idx, values } => row.get(*idx).is_some_and(|cell| {
                values
                    .iter()
                    .any(|v| compare(cell, v) == Some(Ordering::Equal))
            }),
            Node::Not(e) => !e.eval(row),
            Node::And(items) => items.iter().all(|n| n.eval(row)),
            Node::Or(items) => items.iter().any(|n| n.eval(row)),
        }
    }
}

/// Orders a cell against a literal. `None` means the comparison is not
/// satisfiable: a null on either side, a NaN, or values of different kinds.
/// Integers and floats are one kind and compare numerically.
fn compare(cell: &Value, lit: &Value) -> Option<Ordering> {
    match (cell, lit) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Table(_), _) | (_, Value::Table(_)) => None,
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(true) => f.write_str("TRUE"),
            Expr::Const(false) => f.write_str("FALSE"),
            Expr::Compare { column, op, value } => {
                write!(f, "{} {} {}", Name(column), op.symbol(), Literal(value))
            }
            Expr::In { column, values } => {
                write!(f, "{} %in% c(", Name(column))?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", Literal(v))?;
                }
                f.write_str(")")
            }
            Expr::Not(e) => write!(f, "!({e})"),
            Expr::And(items) if items.is_empty() => f.write_str("TRUE"),
            Expr::Or(items) if items.is_empty() => f.write_str("FALSE"),
            Expr::And(items) => write_operands(f, items, " & "),
            Expr::Or(items) => write_operands(f, items, " | "),
        }
    }
}

// Nested `And`/`Or` operands are parenthesized; `&` binding tighter than `|`
// does the rest.
fn write_operands(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, e) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match e {
            Expr::And(_) | Expr::Or(_) => write!(f, "({e})")?,
            _ => write!(f, "{e}")?,
        }
    }
    Ok(())
}

/// A column name, backquoted unless it reads as a plain identifier.
struct Name<'a>(&'a str);

impl Name<'_> {
    fn is_plain(&self) -> bool {
        let mut chars = self.0.chars();
        let starts_well = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_');
        starts_well
            && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
            && !RESERVED.contains(&self.0)
    }
}

impl fmt::Display for Name<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_plain() {
            return f.write_str(self.0);
        }
        f.write_str("`")?;
        for c in self.0.chars() {
            match c {
                '`' => f.write_str("\\`")?,
                '\\' => f.write_str("\\\\")?,
                c => write!(f, "{c}")?,
            }
        }
        f.write_str("`")
    }
}

const RESERVED: &[&str] = &[
    "and", "AND", "or", "OR", "not", "NOT", "TRUE", "FALSE", "NA", "NaN", "Inf",
];

struct Literal<'a>(&'a Value);

impl fmt::Display for Literal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Text(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Value::Float(v) if v.is_nan() => f.write_str("NaN"),
            Value::Float(v) if v.is_infinite() => {
                f.write_str(if *v > 0.0 { "Inf" } else { "-Inf" })
            }
            Value::Float(v) => write!(f, "{v:?}"),
            other => write!(f, "{other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    /// A backquoted name; never a keyword.
    Quoted(String),
    Str(String),
    Num(Value),
    Op(CmpOp),
    In,
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier `{s}`"),
            Token::Quoted(s) => write!(f, "name `{s}`"),
            Token::Str(s) => write!(f, "string \"{s}\""),
            Token::Num(v) => write!(f, "number {v}"),
            Token::Op(op) => write!(f, "`{}`", op.symbol()),
            Token::In => f.write_str("`%in%`"),
            Token::And => f.write_str("`&`"),
            Token::Or => f.write_str("`|`"),
            Token::Not => f.write_str("`!`"),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
            Token::Comma => f.write_str("`,`"),
        }
    }
}

fn parse_error(position: usize, message: impl Into<String>) -> Error {
    Error::Parse {
        position,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>> {
    let mut out = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let two = input.get(pos..pos + 2).unwrap_or("");
        let token = match c {
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            ',' => {
                chars.next();
                Token::Comma
            }
            '&' | '|' => {
                chars.next();
                if chars.peek().map(|&(_, n)| n) == Some(c) {
                    chars.next();
                }
                if c == '&' { Token::And } else { Token::Or }
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let op = match two {
                    "==" => Some(CmpOp::Eq),
                    "!=" => Some(CmpOp::Ne),
                    "<=" => Some(CmpOp::Le),
                    ">=" => Some(CmpOp::Ge),
                    _ => None,
                };
                match (op, c) {
                    (Some(op), _) => {
                        chars.next();
                        Token::Op(op)
                    }
                    (None, '<') => Token::Op(CmpOp::Lt),
                    (None, '>') => Token::Op(CmpOp::Gt),
                    (None, '!') => Token::Not,
                    _ => return Err(parse_error(pos, "expected `==`")),
                }
            }
            '%' => {
                if input[pos..].starts_with("%in%") {
                    for _ in 0..4 {
                        chars.next();
                    }
                    Token::In
                } else {
                    return Err(parse_error(pos, "unknown operator, expected `%in%`"));
                }
            }
            '"' | '\'' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, esc)) => s.push(esc),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => s.push(ch),
                    }
                }
                if !closed {
                    return Err(parse_error(pos, "unterminated string"));
                }
                Token::Str(s)
            }
            '`' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, esc)) => s.push(esc),
                            None => break,
                        },
                        '`' => {
                            closed = true;
                            break;
                        }
                        ch => s.push(ch),
                    }
                }
                if !closed {
                    return Err(parse_error(pos, "unterminated `quoted` name"));
                }
                Token::Quoted(s)
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut s = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    let sign_after_exp =
                        (ch == '-' || ch == '+') && s.ends_with(['e', 'E']);
                    if ch.is_ascii_digit()
                        || ch == '.'
                        || ch == 'e'
                        || ch == 'E'
                        || sign_after_exp
                        || (ch == '-' && s.is_empty())
                    {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if s == "-" && input[pos + 1..].starts_with("Inf") {
                    for _ in 0..3 {
                        chars.next();
                    }
                    out.push((pos, Token::Num(Value::Float(f64::NEG_INFINITY))));
                    continue;
                }
                // R integer suffix, as in `1990L`
                if chars.peek().map(|&(_, ch)| ch) == Some('L') {
                    chars.next();
                }
                if let Ok(i) = s.parse::<i64>() {
                    Token::Num(Value::Int(i))
                } else if let Ok(v) = s.parse::<f64>() {
                    Token::Num(Value::Float(v))
                } else {
                    return Err(parse_error(pos, format!("invalid number `{s}`")));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match s.as_str() {
                    "and" | "AND" => Token::And,
                    "or" | "OR" => Token::Or,
                    "not" | "NOT" => Token::Not,
                    _ => Token::Ident(s),
                }
            }
            other => return Err(parse_error(pos, format!("unexpected character `{other}`"))),
        };
        out.push((pos, token));
    }

    Ok(out)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    index: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|(p, _)| *p)
            .unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.index).map(|(_, t)| t.clone());
        if tok.is_some() {
            self.index += 1;
        }
        tok
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        let pos = self.position();
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(parse_error(pos, format!("expected {want}, found {t}"))),
            None => Err(parse_error(pos, format!("expected {want}, found end of input"))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            left = left.or(self.parse_and()?);
        }
        Ok(left)
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(parse_error(
                self.position(),
                format!("expression nested deeper than {MAX_DEPTH} levels"),
            ));
        }
        Ok(())
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            left = left.and(self.parse_unary()?);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Not) => {
                self.next();
                self.descend()?;
                let e = self.parse_unary()?;
                self.depth -= 1;
                Ok(e.not())
            }
            Some(Token::LParen) => {
                self.next();
                self.descend()?;
                let e = self.parse_or()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(e)
            }
            Some(Token::Ident(name)) if name == "TRUE" || name == "FALSE" => {
                let b = name == "TRUE";
                self.next();
                Ok(Expr::Const(b))
            }
            _ => self.parse_compare(),
        }
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        let pos = self.position();
        let column = match self.next() {
            Some(Token::Ident(name)) | Some(Token::Quoted(name)) => name,
            Some(t) => return Err(parse_error(pos, format!("expected a column name, found {t}"))),
            None => return Err(parse_error(pos, "expected a column name, found end of input")),
        };

        let pos = self.position();
        match self.next() {
            Some(Token::Op(op)) => {
                let value = self.parse_literal()?;
                Ok(col(column).cmp(op, value))
            }
            Some(Token::In) => {
                let pos = self.position();
                match self.next() {
                    Some(Token::Ident(c)) if c == "c" => {}
                    _ => return Err(parse_error(pos, "expected `c(` after `%in%`")),
                }
                self.expect(Token::LParen)?;
                let mut values = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    values.push(self.parse_literal()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.next();
                        values.push(self.parse_literal()?);
                    }
                }
                self.expect(Token::RParen)?;
                Ok(col(column).is_in(values))
            }
            Some(t) => Err(parse_error(
                pos,
                format!("expected a comparison after `{column}`, found {t}"),
            )),
            None => Err(parse_error(
                pos,
                format!("expected a comparison after `{column}`, found end of input"),
            )),
        }
    }

    fn parse_literal(&mut self) -> Result<Value> {
        let pos = self.position();
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::Text(s)),
            Some(Token::Num(v)) => Ok(v),
            Some(Token::Ident(s)) if s == "TRUE" => Ok(Value::Bool(true)),
            Some(Token::Ident(s)) if s == "FALSE" => Ok(Value::Bool(false)),
            Some(Token::Ident(s)) if s == "NA" => Ok(Value::Null),
            Some(Token::Ident(s)) if s == "NaN" => Ok(Value::Float(f64::NAN)),
            Some(Token::Ident(s)) if s == "Inf" => Ok(Value::Float(f64::INFINITY)),
            Some(t) => Err(parse_error(pos, format!("expected a literal, found {t}"))),
            None => Err(parse_error(pos, "expected a literal, found end of input")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_rows(
            ["key", "genus", "year", "cover"],
            vec![
                vec![1.into(), "Poa".into(), 1990.into(), 0.5.into()],
                vec![2.into(), "Bouteloua".into(), 2001.into(), Value::Null],
                vec![3.into(), "Poa".into(), 2010.into(), 1.5.into()],
                vec![4.into(), Value::Null, 1985.into(), 2.0.into()],
            ],
        )
        .unwrap()
    }

    fn rows(e: &Expr) -> Vec<usize> {
        let t = table();
        e.bind(&t).unwrap().matching_rows()
    }

    #[test]
    fn builder_equality_and_conjunction() {
        assert_eq!(rows(&col("genus").eq("Poa")), [0, 2]);
        assert_eq!(rows(&col("genus").eq("Poa").and(col("year").gt(2000))), [2]);
        assert_eq!(rows(&col("year").lt(1990).or(col("key").eq(2))), [1, 3]);
    }

    #[test]
    fn nulls_never_satisfy_a_comparison() {
        assert_eq!(rows(&col("genus").ne("Poa")), [1]);
        assert_eq!(rows(&col("cover").ge(0)), [0, 2, 3]);
        assert_eq!(rows(&col("cover").ge(0).not()), [1]);
    }

    #[test]
    fn integers_and_floats_compare_numerically() {
        assert_eq!(rows(&col("cover").eq(2)), [3]);
        assert_eq!(rows(&col("year").le(1990.0)), [0, 3]);
    }

    #[test]
    fn mismatched_kinds_never_match() {
        let t = Table::from_rows(["k"], vec![vec![3.into()], vec![10.into()]]).unwrap();
        let matching = |e: Expr| e.bind(&t).unwrap().matching_rows();
        assert!(matching(col("k").eq("3")).is_empty());
        assert!(matching(col("k").gt("2")).is_empty());
        assert!(matching(col("k").ne("3")).is_empty());
        assert!(matching(col("k").eq(true)).is_empty());
        assert_eq!(matching(col("k").gt(2)), [0, 1]);
        assert_eq!(rows(&col("genus").is_in([1, 2])), Vec::<usize>::new());
    }

    #[test]
    fn membership() {
        assert_eq!(rows(&col("key").is_in([1, 4])), [0, 3]);
        assert_eq!(rows(&col("genus").is_in(["Bouteloua", "Larrea"])), [1]);
    }

    #[test]
    fn any_and_all_of_nothing() {
        assert_eq!(rows(&Expr::any([])), Vec::<usize>::new());
        assert_eq!(rows(&Expr::all([])), [0, 1, 2, 3]);
    }

    #[test]
    fn bind_reports_every_unknown_column() {
        let t = table();
        let err = col("genuss")
            .eq("Poa")
            .and(col("yr").gt(1))
            .and(col("key").eq(1))
            .bind(&t)
            .unwrap_err();
        assert!(err.is_malformed_expression());
        match err {
            Error::UnknownColumns { columns } => assert_eq!(columns, ["genuss", "yr"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_matches_builder() {
        let parsed = Expr::parse(r#"genus == "Poa" & species == 'fendleriana'"#).unwrap();
        let built = col("genus").eq("Poa").and(col("species").eq("fendleriana"));
        assert_eq!(parsed, built);
    }

    #[test]
    fn parse_precedence_and_grouping() {
        let e = Expr::parse("a == 1 | b == 2 && !(c < 3.5)").unwrap();
        let want = col("a")
            .eq(1)
            .or(col("b").eq(2).and(col("c").lt(3.5).not()));
        assert_eq!(e, want);

        let e = Expr::parse("(a == 1 or b == 2) and c >= -4").unwrap();
        let want = col("a").eq(1).or(col("b").eq(2)).and(col("c").ge(-4));
        assert_eq!(e, want);
    }

    #[test]
    fn parse_membership_and_literals() {
        let e = Expr::parse(r#"lterid %in% c("SEV", "SBC") & derived == TRUE & doi != NA"#).unwrap();
        let want = col("lterid")
            .is_in(["SEV", "SBC"])
            .and(col("derived").eq(true))
            .and(col("doi").ne(Value::Null));
        assert_eq!(e, want);
    }

    #[test]
    fn parse_backquoted_names_and_escapes() {
        let e = Expr::parse(r#"`odd name` == "say \"hi\"""#).unwrap();
        assert_eq!(e, col("odd name").eq("say \"hi\""));
    }

    #[test]
    fn parse_errors_carry_positions() {
        match Expr::parse("genus = 'Poa'").unwrap_err() {
            Error::Parse { position, .. } => assert_eq!(position, 6),
            other => panic!("unexpected error: {other}"),
        }
        match Expr::parse("genus == 'Poa' &").unwrap_err() {
            Error::Parse { position, .. } => assert_eq!(position, 16),
            other => panic!("unexpected error: {other}"),
        }
        match Expr::parse("genus == 'Poa").unwrap_err() {
            Error::Parse { message, .. } => assert!(message.contains("unterminated")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(Expr::parse("genus == 'Poa' species").is_err());
    }

    #[test]
    fn display_parses_back_to_the_same_tree() {
        let e = col("key")
            .eq(1)
            .or(col("key").eq(2))
            .and(col("title").ne("a \"b\""))
            .and(col("cover").is_in([0.5, 2.0]).not());
        let text = e.to_string();
        assert_eq!(Expr::parse(&text).unwrap(), e);
    }

    #[test]
    fn display_quotes_odd_names_and_spells_non_finite_floats() {
        let e = col("odd name")
            .eq(1)
            .and(col("TRUE").eq(Value::Float(f64::NAN)))
            .and(col("w`x").is_in([f64::INFINITY, f64::NEG_INFINITY]))
            .and(col("v").is_in(Vec::<Value>::new()));
        let text = e.to_string();
        assert!(text.starts_with("`odd name` == 1 & `TRUE` == NaN"), "{text}");
        assert!(text.contains("c(Inf, -Inf)"), "{text}");
        assert_eq!(Expr::parse(&text).unwrap(), e);
    }

    #[test]
    fn chained_combinators_stay_flat() {
        let e = col("a").eq(1).or(col("b").eq(2)).or(col("c").eq(3));
        assert!(matches!(&e, Expr::Or(items) if items.len() == 3));
        assert_eq!(e.depth(), 2);
        assert_eq!(col("a").eq(1).not().not(), col("a").eq(1));
    }

    #[test]
    fn ten_thousand_keys_bind_evaluate_and_print() {
        let t = Table::from_rows(["k"], (0..50).map(|i| vec![Value::Int(i)]).collect()).unwrap();
        let e = Expr::any((0..10_000).map(|i| col("k").eq(i)));
        assert_eq!(e.bind(&t).unwrap().matching_rows().len(), 50);
        let text = e.to_string();
        assert_eq!(Expr::parse(&text).unwrap(), e);
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let input = format!("{}a == 1", "!".repeat(5000));
        match Expr::parse(&input).unwrap_err() {
            Error::Parse { message, .. } => assert!(message.contains("nested deeper")),
            other => panic!("unexpected error: {other}"),
        }
        let input = format!("{}a == 1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(Expr::parse(&input).is_err());
        let input = format!("{}a == 1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(Expr::parse(&input).is_ok());

        let mut deep = col("key").eq(1);
        for i in 0..MAX_DEPTH {
            deep = if i % 2 == 0 {
                deep.and(col("key").eq(2)).not()
            } else {
                deep.or(col("key").eq(3))
            };
        }
        let t = table();
        assert!(matches!(deep.bind(&t).unwrap_err(), Error::TooDeep { .. }));
    }
}
