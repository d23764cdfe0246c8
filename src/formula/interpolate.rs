//! String interpolation: `{formula}` substrings inside a template are
//! evaluated against the currently bound DV entry and spliced into the
//! surrounding text. Drivers use this to derive field names from storage
//! or tariff counters, e.g. `history_{storage_counter-12counter}_value`.

use crate::dvparser::DVEntry;
use crate::formula::{Formula, FormulaError};
use crate::units::Unit;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Formula(Formula),
}

/// A parsed template. Parse once, apply per entry.
#[derive(Debug, Clone)]
pub struct StringInterpolator {
    segments: Vec<Segment>,
}

impl StringInterpolator {
    /// Parse a template; every `{...}` body must be a valid formula over
    /// constants and entry counters.
    pub fn parse(template: &str) -> Result<Self, FormulaError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            if c != '{' {
                literal.push(c);
                continue;
            }
            let mut body = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                body.push(c);
            }
            if !closed {
                return Err(FormulaError {
                    message: "Unterminated { in template".to_string(),
                    formula: template.to_string(),
                    pos: None,
                });
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Formula(Formula::parse(&body, None)?));
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Evaluate every formula segment with `entry` bound and return the
    /// assembled string. Values render as plain decimals.
    pub fn apply(&self, entry: &DVEntry) -> Result<String, FormulaError> {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Formula(f) => {
                    let v = f.calculate(Unit::Counter, None, Some(entry))?;
                    out.push_str(&format!("{}", v));
                }
            }
        }
        Ok(out)
    }
}
