//! # Formula engine
//!
//! Parses, dimension-checks and evaluates arithmetic over constants with
//! units, date/time literals, meter field references and entry counters.
//! Every AST node is annotated with its [`SiUnit`] while the tree is built,
//! so unit errors surface at parse time with a caret into the source text;
//! evaluation itself cannot produce a dimension error.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr   := term (('+'|'-') term)*
//! term   := factor (('*'|'/') factor)*
//! factor := number unit | 'datetime' | identifier | sqrt '(' expr ')' | '(' expr ')'
//! ```

pub mod interpolate;
pub mod lexer;

use chrono::{Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::dvparser::DVEntry;
use crate::units::si::SiUnit;
use crate::units::{
    can_convert, extract_unit, quantity_from_exp, si_unit_of, unit_from_name, unit_name, Quantity,
    Unit, SECONDS_PER_MONTH, SECONDS_PER_YEAR,
};
use lexer::{lex, Token, TokenKind};

/// Something that can resolve meter field references while a formula is
/// parsed and evaluated. Implemented by `Meter`; kept as a trait so the
/// formula engine does not own a meter handle.
pub trait FieldValueSource {
    /// Display unit of the field `vname`, if the source has such a field.
    fn field_unit(&self, vname: &str) -> Option<Unit>;
    /// Most recent numeric value of `vname`, converted into `unit`.
    fn field_value(&self, vname: &str, unit: Unit) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Storage,
    Tariff,
    Subunit,
}

impl CounterKind {
    fn name(&self) -> &'static str {
        match self {
            CounterKind::Storage => "storage",
            CounterKind::Tariff => "tariff",
            CounterKind::Subunit => "subunit",
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Constant { value: f64, unit: Unit, si: SiUnit },
    DateTimeLiteral { value: f64, si: SiUnit },
    MeterField { vname: String, unit: Unit, si: SiUnit },
    EntryCounter { kind: CounterKind, si: SiUnit },
    Add { left: Box<Node>, right: Box<Node>, si: SiUnit },
    Sub { left: Box<Node>, right: Box<Node>, si: SiUnit },
    Mul { left: Box<Node>, right: Box<Node>, si: SiUnit },
    Div { left: Box<Node>, right: Box<Node>, si: SiUnit },
    Sqrt { inner: Box<Node>, si: SiUnit },
}

impl Node {
    fn si(&self) -> &SiUnit {
        match self {
            Node::Constant { si, .. }
            | Node::DateTimeLiteral { si, .. }
            | Node::MeterField { si, .. }
            | Node::EntryCounter { si, .. }
            | Node::Add { si, .. }
            | Node::Sub { si, .. }
            | Node::Mul { si, .. }
            | Node::Div { si, .. }
            | Node::Sqrt { si, .. } => si,
        }
    }

    fn tree(&self) -> String {
        match self {
            Node::Constant { value, unit, si } => format!(
                "<CONST {} {}[{}]{}>",
                value,
                unit_name(*unit),
                si,
                si.quantity().name()
            ),
            Node::DateTimeLiteral { value, si } => {
                format!("<DATETIME {}[{}]{}>", value, si, si.quantity().name())
            }
            Node::MeterField { vname, unit, .. } => {
                format!("<FIELD {}_{}>", vname, unit_name(*unit))
            }
            Node::EntryCounter { kind, .. } => format!("<COUNTER {}>", kind.name()),
            Node::Add { left, right, .. } => format!("<ADD {} {} >", left.tree(), right.tree()),
            Node::Sub { left, right, .. } => format!("<SUB {} {} >", left.tree(), right.tree()),
            Node::Mul { left, right, .. } => format!("<TIMES {} {} >", left.tree(), right.tree()),
            Node::Div { left, right, .. } => format!("<DIV {} {} >", left.tree(), right.tree()),
            Node::Sqrt { inner, .. } => format!("<SQRT {} >", inner.tree()),
        }
    }
}

/// A formula error, rendered with the source line and a caret under the
/// offending spot when one is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaError {
    pub message: String,
    pub formula: String,
    pub pos: Option<usize>,
}

impl FormulaError {
    fn new(message: String, formula: &str, pos: Option<usize>) -> Self {
        Self { message, formula: formula.to_string(), pos }
    }
}

impl std::fmt::Display for FormulaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pos {
            Some(pos) => write!(
                f,
                "{}\n{}\n{}^~~~~\n",
                self.message,
                self.formula,
                " ".repeat(pos)
            ),
            None => writeln!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for FormulaError {}

/// `[kwh|Energy|3.6×10⁶kgm²s⁻²]` operand description used in diagnostics.
fn unit_bracket(si: &SiUnit) -> String {
    let name = si.as_unit().map(unit_name).unwrap_or("?");
    format!("[{}|{}|{}]", name, si.quantity().name(), si)
}

/// A parsed, dimension-checked formula.
#[derive(Debug, Clone)]
pub struct Formula {
    root: Node,
    text: String,
}

impl Formula {
    /// Parse and type-check. `source` resolves meter field references; a
    /// formula without field references parses fine with `None`.
    pub fn parse(text: &str, source: Option<&dyn FieldValueSource>) -> Result<Formula, FormulaError> {
        let tokens =
            lex(text).map_err(|e| FormulaError::new(e.message, text, Some(e.pos)))?;
        let mut p = Parser { src: text, tokens, pos: 0, source };
        let root = p.parse_expr()?;
        if p.pos != p.tokens.len() {
            let tok = &p.tokens[p.pos];
            return Err(FormulaError::new(
                "Trailing input after formula!".to_string(),
                text,
                Some(tok.start),
            ));
        }
        Ok(Formula { root, text: text.to_string() })
    }

    /// The SI unit of the whole formula.
    pub fn si_unit(&self) -> &SiUnit {
        self.root.si()
    }

    /// Evaluate and convert the result into `unit`.
    pub fn calculate(
        &self,
        unit: Unit,
        source: Option<&dyn FieldValueSource>,
        entry: Option<&DVEntry>,
    ) -> Result<f64, FormulaError> {
        let v = self.eval(&self.root, source, entry)?;
        let to = si_unit_of(unit);
        self.root.si().convert_to(v, &to).ok_or_else(|| {
            FormulaError::new(
                format!(
                    "Cannot convert {} to {}!",
                    unit_bracket(self.root.si()),
                    unit_bracket(&to)
                ),
                &self.text,
                None,
            )
        })
    }

    /// Debug rendering of the annotated AST.
    pub fn tree(&self) -> String {
        self.root.tree()
    }

    fn eval(
        &self,
        node: &Node,
        source: Option<&dyn FieldValueSource>,
        entry: Option<&DVEntry>,
    ) -> Result<f64, FormulaError> {
        let err = |m: String| FormulaError::new(m, &self.text, None);

        match node {
            Node::Constant { value, .. } => Ok(*value),
            Node::DateTimeLiteral { value, .. } => Ok(*value),
            Node::MeterField { vname, unit, .. } => {
                let source =
                    source.ok_or_else(|| err(format!("No meter bound for field {}", vname)))?;
                source
                    .field_value(vname, *unit)
                    .ok_or_else(|| err(format!("Meter field {} has no value yet", vname)))
            }
            Node::EntryCounter { kind, .. } => {
                let entry = entry
                    .ok_or_else(|| err(format!("No entry bound for {}_counter", kind.name())))?;
                Ok(match kind {
                    CounterKind::Storage => entry.storage_nr as f64,
                    CounterKind::Tariff => entry.tariff_nr as f64,
                    CounterKind::Subunit => entry.subunit_nr as f64,
                })
            }
            Node::Add { left, right, .. } => self.eval_addsub(left, right, 1.0, source, entry),
            Node::Sub { left, right, .. } => self.eval_addsub(left, right, -1.0, source, entry),
            Node::Mul { left, right, .. } => {
                Ok(self.eval(left, source, entry)? * self.eval(right, source, entry)?)
            }
            Node::Div { left, right, .. } => {
                let rv = self.eval(right, source, entry)?;
                if rv == 0.0 {
                    return Err(err("Division by zero".to_string()));
                }
                Ok(self.eval(left, source, entry)? / rv)
            }
            Node::Sqrt { inner, .. } => {
                let v = self.eval(inner, source, entry)?;
                if v < 0.0 {
                    return Err(err("Square root of negative value".to_string()));
                }
                Ok(v.sqrt())
            }
        }
    }

    fn eval_addsub(
        &self,
        left: &Node,
        right: &Node,
        sign: f64,
        source: Option<&dyn FieldValueSource>,
        entry: Option<&DVEntry>,
    ) -> Result<f64, FormulaError> {
        let lv = self.eval(left, source, entry)?;
        let rv = self.eval(right, source, entry)?;
        let l = left.si();
        let r = right.si();

        if l.quantity() == Quantity::PointInTime && r.quantity() == Quantity::Time {
            // Month and year durations move through the calendar; plain
            // durations are seconds.
            if (r.scalar() - SECONDS_PER_MONTH).abs() < 1e-6 {
                return self.calendar_add(lv, (sign * rv).round() as i64);
            }
            if (r.scalar() - SECONDS_PER_YEAR).abs() < 1e-6 {
                return self.calendar_add(lv, (sign * rv * 12.0).round() as i64);
            }
            return Ok(lv + sign * rv * r.scalar() / l.scalar());
        }

        let rv = r.convert_to(rv, l).ok_or_else(|| {
            FormulaError::new(
                format!(
                    "Cannot combine {} with {} at runtime!",
                    unit_bracket(l),
                    unit_bracket(r)
                ),
                &self.text,
                None,
            )
        })?;
        Ok(lv + sign * rv)
    }

    /// Add months to a point in time, clamping the day of month to the
    /// target month's last day (Jan 31 + 1 month = Feb 28/29).
    fn calendar_add(&self, ts: f64, months: i64) -> Result<f64, FormulaError> {
        let err = |m: &str| FormulaError::new(m.to_string(), &self.text, None);

        let dt = match Local.timestamp_opt(ts as i64, 0) {
            chrono::LocalResult::Single(t) => t,
            chrono::LocalResult::Ambiguous(t, _) => t,
            chrono::LocalResult::None => return Err(err("Timestamp out of range")),
        };
        let date = dt.date_naive();
        let time = dt.time();

        let shifted = if months >= 0 {
            date.checked_add_months(Months::new(months as u32))
        } else {
            date.checked_sub_months(Months::new((-months) as u32))
        }
        .ok_or_else(|| err("Month arithmetic out of range"))?;

        let ndt = shifted.and_time(time);
        match Local.from_local_datetime(&ndt) {
            chrono::LocalResult::Single(t) => Ok(t.timestamp() as f64),
            chrono::LocalResult::Ambiguous(t, _) => Ok(t.timestamp() as f64),
            chrono::LocalResult::None => Err(err("Shifted timestamp out of range")),
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    source: Option<&'a dyn FieldValueSource>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn error(&self, message: String, pos: Option<usize>) -> FormulaError {
        FormulaError::new(message, self.src, pos)
    }

    fn parse_expr(&mut self) -> Result<Node, FormulaError> {
        let mut left = self.parse_term()?;
        while let Some(tok) = self.peek() {
            let (is_add, op_pos) = match tok.kind {
                TokenKind::Plus => (true, tok.start),
                TokenKind::Minus => (false, tok.start),
                _ => break,
            };
            self.next();
            let right = self.parse_term()?;
            left = self.build_addsub(left, right, is_add, op_pos)?;
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Node, FormulaError> {
        let mut left = self.parse_factor()?;
        while let Some(tok) = self.peek() {
            let (is_mul, op_pos) = match tok.kind {
                TokenKind::Times => (true, tok.start),
                TokenKind::Divide => (false, tok.start),
                _ => break,
            };
            self.next();
            let right = self.parse_factor()?;
            left = self.build_muldiv(left, right, is_mul, op_pos)?;
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Node, FormulaError> {
        let Some(tok) = self.next() else {
            return Err(self.error("Unexpected end of formula!".to_string(), None));
        };

        match tok.kind {
            TokenKind::Number(value) => {
                // A constant must carry its unit, attached or as the next
                // word: 22kwh or 22 kwh.
                let Some(next) = self.peek() else {
                    return Err(self.error(
                        "Expected unit after number!".to_string(),
                        Some(tok.start),
                    ));
                };
                let TokenKind::Ident(word) = &next.kind else {
                    return Err(self.error(
                        "Expected unit after number!".to_string(),
                        Some(next.start),
                    ));
                };
                let Some(unit) = unit_from_name(word) else {
                    return Err(self.error(
                        format!("Unknown unit: {}", word),
                        Some(next.start),
                    ));
                };
                self.next();
                Ok(Node::Constant { value, unit, si: si_unit_of(unit) })
            }
            TokenKind::Quoted(text) => self.parse_datetime(&text, tok.start),
            TokenKind::Ident(word) if word == "sqrt" => {
                let open = self.next();
                if !matches!(open.as_ref().map(|t| &t.kind), Some(TokenKind::LParen)) {
                    return Err(self.error("Expected ( after sqrt".to_string(), Some(tok.start)));
                }
                let inner = self.parse_expr()?;
                let close = self.next();
                if !matches!(close.as_ref().map(|t| &t.kind), Some(TokenKind::RParen)) {
                    return Err(self.error("Expected ) after sqrt".to_string(), Some(tok.start)));
                }
                let si = inner.si();
                let Some(exp) = si.exp().sqrt() else {
                    return Err(self.error(
                        format!("Cannot take sqrt of {}!", unit_bracket(si)),
                        Some(tok.start),
                    ));
                };
                let scalar = si.scalar().sqrt();
                let si = SiUnit::new(quantity_from_exp(&exp), scalar, exp);
                Ok(Node::Sqrt { inner: Box::new(inner), si })
            }
            TokenKind::Ident(word) => self.parse_identifier(&word, tok.start),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let close = self.next();
                if !matches!(close.as_ref().map(|t| &t.kind), Some(TokenKind::RParen)) {
                    return Err(self.error("Expected )".to_string(), Some(tok.start)));
                }
                Ok(inner)
            }
            _ => Err(self.error("Unexpected token!".to_string(), Some(tok.start))),
        }
    }

    fn parse_identifier(&mut self, word: &str, pos: usize) -> Result<Node, FormulaError> {
        let counter = match word {
            "storage_counter" => Some(CounterKind::Storage),
            "tariff_counter" => Some(CounterKind::Tariff),
            "subunit_counter" => Some(CounterKind::Subunit),
            _ => None,
        };
        if let Some(kind) = counter {
            return Ok(Node::EntryCounter { kind, si: si_unit_of(Unit::Counter) });
        }

        let Some((vname, unit)) = extract_unit(word) else {
            return Err(self.error(format!("Unknown identifier: {}", word), Some(pos)));
        };
        let Some(source) = self.source else {
            return Err(self.error(
                format!("No meter bound, cannot reference field: {}", word),
                Some(pos),
            ));
        };
        let Some(display_unit) = source.field_unit(vname) else {
            return Err(self.error(format!("Unknown meter field: {}", word), Some(pos)));
        };
        if !can_convert(display_unit, unit) {
            return Err(self.error(
                format!(
                    "Field {} is {} which does not convert to {}!",
                    vname,
                    unit_name(display_unit),
                    unit_name(unit)
                ),
                Some(pos),
            ));
        }
        Ok(Node::MeterField {
            vname: vname.to_string(),
            unit,
            si: si_unit_of(unit),
        })
    }

    fn parse_datetime(&self, text: &str, pos: usize) -> Result<Node, FormulaError> {
        // Full date/time forms become unix timestamps in local time.
        let ndt = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M"))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            });
        if let Some(ndt) = ndt {
            let ts = match Local.from_local_datetime(&ndt) {
                chrono::LocalResult::Single(t) => t.timestamp(),
                chrono::LocalResult::Ambiguous(t, _) => t.timestamp(),
                chrono::LocalResult::None => {
                    return Err(self.error(
                        format!("Date/time does not exist locally: {}", text),
                        Some(pos),
                    ));
                }
            };
            return Ok(Node::DateTimeLiteral {
                value: ts as f64,
                si: si_unit_of(Unit::UnixTimestamp),
            });
        }

        // Bare clock times are durations counted in seconds.
        let time = NaiveTime::parse_from_str(text, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"));
        if let Ok(t) = time {
            use chrono::Timelike;
            let secs = t.num_seconds_from_midnight() as f64;
            return Ok(Node::DateTimeLiteral { value: secs, si: si_unit_of(Unit::Second) });
        }

        Err(self.error(format!("Bad date/time literal: {}", text), Some(pos)))
    }

    fn build_addsub(
        &self,
        left: Node,
        right: Node,
        is_add: bool,
        op_pos: usize,
    ) -> Result<Node, FormulaError> {
        let l = *left.si();
        let r = *right.si();

        let datetime_shift =
            l.quantity() == Quantity::PointInTime && r.quantity() == Quantity::Time;
        let convertible = r.convert_to(0.0, &l).is_some();

        if !datetime_shift && !convertible {
            let message = if is_add {
                format!("Cannot add {} to {}!", unit_bracket(&l), unit_bracket(&r))
            } else {
                format!(
                    "Cannot subtract {} from {}!",
                    unit_bracket(&r),
                    unit_bracket(&l)
                )
            };
            return Err(self.error(message, Some(op_pos)));
        }

        let node = if is_add {
            Node::Add { left: Box::new(left), right: Box::new(right), si: l }
        } else {
            Node::Sub { left: Box::new(left), right: Box::new(right), si: l }
        };
        Ok(node)
    }

    fn build_muldiv(
        &self,
        left: Node,
        right: Node,
        is_mul: bool,
        op_pos: usize,
    ) -> Result<Node, FormulaError> {
        let l = *left.si();
        let r = *right.si();

        // Celsius is affine; scaling it by anything but a plain factor has
        // no meaning.
        let celsius_abuse = (l.exp().c != 0 && !r.exp().is_dimensionless())
            || (r.exp().c != 0 && !l.exp().is_dimensionless());
        if celsius_abuse {
            return Err(self.error(
                format!(
                    "Cannot {} {} and {}!",
                    if is_mul { "multiply" } else { "divide" },
                    unit_bracket(&l),
                    unit_bracket(&r)
                ),
                Some(op_pos),
            ));
        }

        let (exp, scalar) = if is_mul {
            (l.exp().mul(r.exp()), l.scalar() * r.scalar())
        } else {
            (l.exp().div(r.exp()), l.scalar() / r.scalar())
        };
        if exp.is_invalid() {
            return Err(self.error(
                format!("Unit exponent overflow: {}!", exp),
                Some(op_pos),
            ));
        }
        let si = SiUnit::new(quantity_from_exp(&exp), scalar, exp);

        let node = if is_mul {
            Node::Mul { left: Box::new(left), right: Box::new(right), si }
        } else {
            Node::Div { left: Box::new(left), right: Box::new(right), si }
        };
        Ok(node)
    }
}
