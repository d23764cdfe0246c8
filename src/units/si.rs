//! SI exponent vectors and concrete SI units.
//!
//! A [`SiExp`] is a vector of signed 8-bit exponents over the seven SI base
//! dimensions plus two domain extensions: degrees Celsius (which cannot be
//! folded into kelvin because conversions are affine, not linear) and
//! currency units. Exponent overflow or mixing kelvin with celsius marks
//! the vector invalid, and invalidity is sticky through all arithmetic.

use crate::units::{Quantity, Unit};

/// Exponent vector over (s, m, kg, A, K, mol, cd, °C, currency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SiExp {
    pub s: i8,
    pub m: i8,
    pub kg: i8,
    pub a: i8,
    pub k: i8,
    pub mol: i8,
    pub cd: i8,
    pub c: i8,
    pub cur: i8,
    invalid: bool,
}

impl SiExp {
    pub fn build() -> Self {
        Self::default()
    }

    pub fn s(mut self, v: i8) -> Self {
        self.s = v;
        self.check()
    }
    pub fn m(mut self, v: i8) -> Self {
        self.m = v;
        self.check()
    }
    pub fn kg(mut self, v: i8) -> Self {
        self.kg = v;
        self.check()
    }
    pub fn a(mut self, v: i8) -> Self {
        self.a = v;
        self.check()
    }
    pub fn k(mut self, v: i8) -> Self {
        self.k = v;
        self.check()
    }
    pub fn mol(mut self, v: i8) -> Self {
        self.mol = v;
        self.check()
    }
    pub fn cd(mut self, v: i8) -> Self {
        self.cd = v;
        self.check()
    }
    pub fn c(mut self, v: i8) -> Self {
        self.c = v;
        self.check()
    }
    pub fn cur(mut self, v: i8) -> Self {
        self.cur = v;
        self.check()
    }

    // Kelvin and celsius are distinct dimensions and must never meet in a
    // single vector.
    fn check(mut self) -> Self {
        if self.k != 0 && self.c != 0 {
            self.invalid = true;
        }
        self
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn is_dimensionless(&self) -> bool {
        !self.invalid && *self == Self::default()
    }

    fn combine(&self, other: &SiExp, sign: i8) -> SiExp {
        let mut invalid = self.invalid || other.invalid;
        let pairs = [
            (self.s, other.s),
            (self.m, other.m),
            (self.kg, other.kg),
            (self.a, other.a),
            (self.k, other.k),
            (self.mol, other.mol),
            (self.cd, other.cd),
            (self.c, other.c),
            (self.cur, other.cur),
        ];
        let mut out = [0i8; 9];
        for (i, (a, b)) in pairs.into_iter().enumerate() {
            let b = sign.wrapping_mul(b);
            out[i] = match a.checked_add(b) {
                Some(v) => v,
                None => {
                    invalid = true;
                    a.wrapping_add(b)
                }
            };
        }
        let r = SiExp {
            s: out[0],
            m: out[1],
            kg: out[2],
            a: out[3],
            k: out[4],
            mol: out[5],
            cd: out[6],
            c: out[7],
            cur: out[8],
            invalid,
        };
        r.check()
    }

    /// Componentwise addition of exponents (unit multiplication).
    pub fn mul(&self, other: &SiExp) -> SiExp {
        self.combine(other, 1)
    }

    /// Componentwise subtraction of exponents (unit division).
    pub fn div(&self, other: &SiExp) -> SiExp {
        self.combine(other, -1)
    }

    /// Halve every exponent (square root). Fails on odd exponents.
    pub fn sqrt(&self) -> Option<SiExp> {
        if self.invalid {
            return None;
        }
        let half = |v: i8| -> Option<i8> {
            if v % 2 != 0 {
                None
            } else {
                Some(v / 2)
            }
        };
        Some(SiExp {
            s: half(self.s)?,
            m: half(self.m)?,
            kg: half(self.kg)?,
            a: half(self.a)?,
            k: half(self.k)?,
            mol: half(self.mol)?,
            cd: half(self.cd)?,
            c: half(self.c)?,
            cur: half(self.cur)?,
            invalid: false,
        })
    }

    /// True when this vector is a bare temperature (k or c to the first
    /// power, nothing else).
    pub fn is_pure_temperature(&self) -> bool {
        let bare_k = *self == SiExp::build().k(1);
        let bare_c = *self == SiExp::build().c(1);
        !self.invalid && (bare_k || bare_c)
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (name, exp) in [
            ("kg", self.kg),
            ("m", self.m),
            ("s", self.s),
            ("a", self.a),
            ("k", self.k),
            ("mol", self.mol),
            ("cd", self.cd),
            ("c", self.c),
            ("cur", self.cur),
        ] {
            if exp == 0 {
                continue;
            }
            out.push_str(name);
            if exp != 1 {
                out.push_str(&superscript(exp as i32));
            }
        }
        out
    }
}

impl std::fmt::Display for SiExp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.invalid {
            write!(f, "!{}-Invalid!", self.render())
        } else {
            write!(f, "{}", self.render())
        }
    }
}

/// Render an integer with Unicode superscript digits, e.g. -128 -> ⁻¹²⁸.
pub fn superscript(v: i32) -> String {
    const DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
    let mut out = String::new();
    if v < 0 {
        out.push('⁻');
    }
    let mut digits = Vec::new();
    let mut n = (v as i64).unsigned_abs();
    if n == 0 {
        digits.push(0);
    }
    while n > 0 {
        digits.push((n % 10) as usize);
        n /= 10;
    }
    for d in digits.into_iter().rev() {
        out.push(DIGITS[d]);
    }
    out
}

/// Format a scalar magnitude the way unit strings print it: plain decimal
/// in the mid range, mantissa×10ⁿ outside it (3.6e6 -> "3.6×10⁶").
pub fn format_scalar(v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return format!("{}", v);
    }
    let exp10 = v.abs().log10().floor() as i32;
    if (-4..6).contains(&exp10) {
        let rounded = (v * 1e12).round() / 1e12;
        format!("{}", rounded)
    } else {
        let mantissa = v / 10f64.powi(exp10);
        let rounded = (mantissa * 1e9).round() / 1e9;
        format!("{}×10{}", rounded, superscript(exp10))
    }
}

/// A quantity tag, a scalar magnitude relative to the coherent SI unit, and
/// the exponent vector. `5 kw` is `(Power, 1000, kg m² s⁻³)` with value 5.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiUnit {
    quantity: Quantity,
    scalar: f64,
    exp: SiExp,
}

impl SiUnit {
    pub fn new(quantity: Quantity, scalar: f64, exp: SiExp) -> Self {
        Self { quantity, scalar, exp }
    }

    pub fn from_unit(unit: Unit) -> Self {
        crate::units::si_unit_of(unit)
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn scalar(&self) -> f64 {
        self.scalar
    }

    pub fn exp(&self) -> &SiExp {
        &self.exp
    }

    pub fn is_invalid(&self) -> bool {
        self.exp.is_invalid()
    }

    /// Reverse lookup into the unit table. Prefers an exact quantity match,
    /// falls back to any unit with the same scalar and exponents.
    pub fn as_unit(&self) -> Option<Unit> {
        crate::units::unit_from_si(self)
    }

    fn affine_to_celsius(&self, value: f64) -> Option<f64> {
        if self.quantity != Quantity::Temperature || !self.exp.is_pure_temperature() {
            return None;
        }
        if self.exp.k == 1 {
            Some(value - 273.15)
        } else if (self.scalar - 1.0).abs() < 1e-12 {
            Some(value) // celsius
        } else {
            Some((value - 32.0) * 5.0 / 9.0) // fahrenheit
        }
    }

    fn affine_from_celsius(&self, celsius: f64) -> Option<f64> {
        if self.quantity != Quantity::Temperature || !self.exp.is_pure_temperature() {
            return None;
        }
        if self.exp.k == 1 {
            Some(celsius + 273.15)
        } else if (self.scalar - 1.0).abs() < 1e-12 {
            Some(celsius)
        } else {
            Some(celsius * 9.0 / 5.0 + 32.0)
        }
    }

    /// Convert `value` expressed in this unit into `to`.
    ///
    /// Requires equal exponent vectors and compatible quantities. The
    /// energy family (true, reactive, apparent) is intra-convertible.
    /// Temperatures take the affine path. Returns `None` on mismatch
    /// without touching anything.
    pub fn convert_to(&self, value: f64, to: &SiUnit) -> Option<f64> {
        if self.is_invalid() || to.is_invalid() {
            return None;
        }
        if self == to {
            return Some(value);
        }

        // Affine temperature conversions (°C/K/°F) never go through plain
        // scalar multiplication.
        if self.exp.is_pure_temperature() || to.exp.is_pure_temperature() {
            let celsius = self.affine_to_celsius(value)?;
            return to.affine_from_celsius(celsius);
        }

        if self.exp != to.exp {
            return None;
        }

        let energy_family = |q: Quantity| {
            matches!(
                q,
                Quantity::Energy | Quantity::ReactiveEnergy | Quantity::ApparentEnergy
            )
        };
        let compatible = self.quantity == to.quantity
            || (energy_family(self.quantity) && energy_family(to.quantity));
        if !compatible {
            return None;
        }

        Some(value * self.scalar / to.scalar)
    }
}

impl std::fmt::Display for SiUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", format_scalar(self.scalar), self.exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exp_rendering() {
        let e = SiExp::build().s(-1).m(3);
        assert_eq!(e.to_string(), "m³s⁻¹");

        let f = SiExp::build().s(1);
        assert_eq!(f.to_string(), "s");

        let g = e.mul(&f);
        assert_eq!(g.to_string(), "m³");

        let j = e.div(&e);
        assert_eq!(j.to_string(), "");
    }

    #[test]
    fn test_exp_overflow_is_invalid() {
        let h = SiExp::build().s(127);
        let f = SiExp::build().s(1);
        let i = h.mul(&f);
        assert!(i.is_invalid());
        assert_eq!(i.to_string(), "!s⁻¹²⁸-Invalid!");
    }

    #[test]
    fn test_kelvin_celsius_mix_is_invalid() {
        let bad = SiExp::build().k(1).c(1);
        assert!(bad.is_invalid());
        assert_eq!(bad.to_string(), "!kc-Invalid!");
    }

    #[test]
    fn test_invalid_poisons() {
        let bad = SiExp::build().k(1).c(1);
        let ok = SiExp::build().s(1);
        assert!(bad.mul(&ok).is_invalid());
        assert!(ok.div(&bad).is_invalid());
    }

    #[test]
    fn test_sqrt() {
        let e = SiExp::build().kg(2).m(4).s(-4);
        assert_eq!(e.sqrt(), Some(SiExp::build().kg(1).m(2).s(-2)));
        assert_eq!(SiExp::build().m(3).sqrt(), None);
    }

    #[test]
    fn test_si_unit_strings() {
        let kwh = SiUnit::new(Quantity::Energy, 3.6e6, SiExp::build().kg(1).m(2).s(-2));
        assert_eq!(kwh.to_string(), "3.6×10⁶kgm²s⁻²");
        assert_eq!(SiUnit::from_unit(Unit::Kwh).to_string(), "3.6×10⁶kgm²s⁻²");

        let celsius = SiUnit::new(Quantity::Temperature, 1.0, SiExp::build().c(1));
        assert_eq!(celsius.to_string(), "1c");
        assert_eq!(SiUnit::from_unit(Unit::C).to_string(), "1c");
    }
}
