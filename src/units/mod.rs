//! # Units and quantities
//!
//! The closed set of named units meters report in, each with its physical
//! [`Quantity`] and [`SiUnit`] expansion. Conversion between two units goes
//! through their SI expansions; see [`si`] for the rules.

pub mod si;

pub use si::{format_scalar, superscript, SiExp, SiUnit};

use once_cell::sync::Lazy;

/// Physical kind attached to every SI unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Time,
    Length,
    Mass,
    Amperage,
    Temperature,
    AmountOfSubstance,
    LuminousIntensity,
    Energy,
    ReactiveEnergy,
    ApparentEnergy,
    Power,
    Volume,
    Flow,
    Voltage,
    Pressure,
    Frequency,
    Angle,
    Dimensionless,
    RelativeHumidity,
    Hca,
    PointInTime,
    Text,
}

impl Quantity {
    pub fn name(&self) -> &'static str {
        match self {
            Quantity::Time => "Time",
            Quantity::Length => "Length",
            Quantity::Mass => "Mass",
            Quantity::Amperage => "Amperage",
            Quantity::Temperature => "Temperature",
            Quantity::AmountOfSubstance => "AmountOfSubstance",
            Quantity::LuminousIntensity => "LuminousIntensity",
            Quantity::Energy => "Energy",
            Quantity::ReactiveEnergy => "ReactiveEnergy",
            Quantity::ApparentEnergy => "ApparentEnergy",
            Quantity::Power => "Power",
            Quantity::Volume => "Volume",
            Quantity::Flow => "Flow",
            Quantity::Voltage => "Voltage",
            Quantity::Pressure => "Pressure",
            Quantity::Frequency => "Frequency",
            Quantity::Angle => "Angle",
            Quantity::Dimensionless => "Dimensionless",
            Quantity::RelativeHumidity => "RelativeHumidity",
            Quantity::Hca => "HCA",
            Quantity::PointInTime => "PointInTime",
            Quantity::Text => "Text",
        }
    }

    pub fn from_name(s: &str) -> Option<Quantity> {
        ALL_QUANTITIES.iter().copied().find(|q| q.name() == s)
    }
}

pub const ALL_QUANTITIES: [Quantity; 22] = [
    Quantity::Time,
    Quantity::Length,
    Quantity::Mass,
    Quantity::Amperage,
    Quantity::Temperature,
    Quantity::AmountOfSubstance,
    Quantity::LuminousIntensity,
    Quantity::Energy,
    Quantity::ReactiveEnergy,
    Quantity::ApparentEnergy,
    Quantity::Power,
    Quantity::Volume,
    Quantity::Flow,
    Quantity::Voltage,
    Quantity::Pressure,
    Quantity::Frequency,
    Quantity::Angle,
    Quantity::Dimensionless,
    Quantity::RelativeHumidity,
    Quantity::Hca,
    Quantity::PointInTime,
    Quantity::Text,
];

/// Named units. Every unit knows its quantity and SI expansion through the
/// unit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Kwh,
    Mj,
    Gj,
    Kvarh,
    Kvah,
    M3c,
    M3,
    L,
    Kw,
    M3ch,
    M3h,
    Lh,
    Kgh,
    C,
    K,
    F,
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
    UnixTimestamp,
    Volt,
    Ampere,
    Bar,
    Pa,
    Hz,
    Degree,
    Radian,
    Counter,
    Factor,
    Number,
    Percentage,
    Hca,
    Rh,
    Mol,
    Cd,
    Kg,
    M,
    Txt,
}

/// Seconds in an average Gregorian month and year, used as the linear
/// scalars for the calendar units. Calendar-aware month addition happens in
/// the formula evaluator, not here.
pub const SECONDS_PER_MONTH: f64 = 2_629_746.0;
pub const SECONDS_PER_YEAR: f64 = 31_556_952.0;

struct UnitRow {
    unit: Unit,
    name: &'static str,
    quantity: Quantity,
    scalar: f64,
    exp: fn() -> SiExp,
}

macro_rules! row {
    ($unit:ident, $name:literal, $q:ident, $scalar:expr, $exp:expr) => {
        UnitRow {
            unit: Unit::$unit,
            name: $name,
            quantity: Quantity::$q,
            scalar: $scalar,
            exp: || $exp,
        }
    };
}

static UNIT_TABLE: &[UnitRow] = &[
    row!(Kwh, "kwh", Energy, 3.6e6, SiExp::build().kg(1).m(2).s(-2)),
    row!(Mj, "mj", Energy, 1e6, SiExp::build().kg(1).m(2).s(-2)),
    row!(Gj, "gj", Energy, 1e9, SiExp::build().kg(1).m(2).s(-2)),
    row!(Kvarh, "kvarh", ReactiveEnergy, 3.6e6, SiExp::build().kg(1).m(2).s(-2)),
    row!(Kvah, "kvah", ApparentEnergy, 3.6e6, SiExp::build().kg(1).m(2).s(-2)),
    row!(M3c, "m3c", Energy, 1.0, SiExp::build().m(3).c(1)),
    row!(M3, "m3", Volume, 1.0, SiExp::build().m(3)),
    row!(L, "l", Volume, 1e-3, SiExp::build().m(3)),
    row!(Kw, "kw", Power, 1e3, SiExp::build().kg(1).m(2).s(-3)),
    row!(M3ch, "m3ch", Power, 1.0 / 3600.0, SiExp::build().m(3).c(1).s(-1)),
    row!(M3h, "m3h", Flow, 1.0 / 3600.0, SiExp::build().m(3).s(-1)),
    row!(Lh, "lh", Flow, 1e-3 / 3600.0, SiExp::build().m(3).s(-1)),
    row!(Kgh, "kgh", Flow, 1.0 / 3600.0, SiExp::build().kg(1).s(-1)),
    row!(C, "c", Temperature, 1.0, SiExp::build().c(1)),
    row!(K, "k", Temperature, 1.0, SiExp::build().k(1)),
    row!(F, "f", Temperature, 5.0 / 9.0, SiExp::build().c(1)),
    row!(Second, "s", Time, 1.0, SiExp::build().s(1)),
    row!(Minute, "min", Time, 60.0, SiExp::build().s(1)),
    row!(Hour, "h", Time, 3600.0, SiExp::build().s(1)),
    row!(Day, "d", Time, 86400.0, SiExp::build().s(1)),
    row!(Month, "month", Time, SECONDS_PER_MONTH, SiExp::build().s(1)),
    row!(Year, "y", Time, SECONDS_PER_YEAR, SiExp::build().s(1)),
    row!(UnixTimestamp, "ut", PointInTime, 1.0, SiExp::build().s(1)),
    row!(Volt, "v", Voltage, 1.0, SiExp::build().kg(1).m(2).s(-3).a(-1)),
    row!(Ampere, "a", Amperage, 1.0, SiExp::build().a(1)),
    row!(Bar, "bar", Pressure, 1e5, SiExp::build().kg(1).m(-1).s(-2)),
    row!(Pa, "pa", Pressure, 1.0, SiExp::build().kg(1).m(-1).s(-2)),
    row!(Hz, "hz", Frequency, 1.0, SiExp::build().s(-1)),
    row!(Degree, "deg", Angle, std::f64::consts::PI / 180.0, SiExp::build()),
    row!(Radian, "rad", Angle, 1.0, SiExp::build()),
    row!(Counter, "counter", Dimensionless, 1.0, SiExp::build()),
    row!(Factor, "factor", Dimensionless, 1.0, SiExp::build()),
    row!(Number, "number", Dimensionless, 1.0, SiExp::build()),
    row!(Percentage, "pct", Dimensionless, 1.0, SiExp::build()),
    row!(Hca, "hca", Hca, 1.0, SiExp::build()),
    row!(Rh, "rh", RelativeHumidity, 1.0, SiExp::build()),
    row!(Mol, "mol", AmountOfSubstance, 1.0, SiExp::build().mol(1)),
    row!(Cd, "cd", LuminousIntensity, 1.0, SiExp::build().cd(1)),
    row!(Kg, "kg", Mass, 1.0, SiExp::build().kg(1)),
    row!(M, "m", Length, 1.0, SiExp::build().m(1)),
    row!(Txt, "txt", Text, 1.0, SiExp::build()),
];

fn unit_row(unit: Unit) -> &'static UnitRow {
    UNIT_TABLE
        .iter()
        .find(|r| r.unit == unit)
        .expect("every unit has a table row")
}

/// The SI expansion of a named unit.
pub fn si_unit_of(unit: Unit) -> SiUnit {
    let row = unit_row(unit);
    SiUnit::new(row.quantity, row.scalar, (row.exp)())
}

/// Lowercase suffix name used in field names and formulas ("kwh", "m3h").
pub fn unit_name(unit: Unit) -> &'static str {
    unit_row(unit).name
}

/// The quantity a unit measures.
pub fn quantity_of(unit: Unit) -> Quantity {
    unit_row(unit).quantity
}

/// Parse a lowercase unit suffix.
pub fn unit_from_name(name: &str) -> Option<Unit> {
    UNIT_TABLE.iter().find(|r| r.name == name).map(|r| r.unit)
}

/// Reverse lookup from an SI expansion to the named unit. Prefers an exact
/// quantity match so 3.6 MJ-scale energy resolves to kwh not kvah.
pub fn unit_from_si(si: &SiUnit) -> Option<Unit> {
    let matches = |r: &&UnitRow| (r.exp)() == *si.exp() && (r.scalar - si.scalar()).abs() < 1e-9 * r.scalar.abs().max(1.0);
    UNIT_TABLE
        .iter()
        .find(|r| r.quantity == si.quantity() && matches(r))
        .or_else(|| UNIT_TABLE.iter().find(matches))
        .map(|r| r.unit)
}

/// The quantity deduced from a bare exponent vector, used when formula
/// multiplication or division creates a unit no meter reported directly.
/// Unknown vectors fall back to Dimensionless.
pub fn quantity_from_exp(exp: &SiExp) -> Quantity {
    static QUANTITY_BY_EXP: Lazy<Vec<(SiExp, Quantity)>> = Lazy::new(|| {
        vec![
            (SiExp::build(), Quantity::Dimensionless),
            (SiExp::build().kg(1).m(2).s(-2), Quantity::Energy),
            (SiExp::build().kg(1).m(2).s(-3), Quantity::Power),
            (SiExp::build().m(3), Quantity::Volume),
            (SiExp::build().m(3).s(-1), Quantity::Flow),
            (SiExp::build().m(3).c(1), Quantity::Energy),
            (SiExp::build().m(3).c(1).s(-1), Quantity::Power),
            (SiExp::build().s(1), Quantity::Time),
            (SiExp::build().s(-1), Quantity::Frequency),
            (SiExp::build().m(1), Quantity::Length),
            (SiExp::build().kg(1), Quantity::Mass),
            (SiExp::build().a(1), Quantity::Amperage),
            (SiExp::build().k(1), Quantity::Temperature),
            (SiExp::build().c(1), Quantity::Temperature),
            (SiExp::build().mol(1), Quantity::AmountOfSubstance),
            (SiExp::build().cd(1), Quantity::LuminousIntensity),
            (SiExp::build().kg(1).m(2).s(-3).a(-1), Quantity::Voltage),
            (SiExp::build().kg(1).m(-1).s(-2), Quantity::Pressure),
        ]
    });

    QUANTITY_BY_EXP
        .iter()
        .find(|(e, _)| e == exp)
        .map(|(_, q)| *q)
        .unwrap_or(Quantity::Dimensionless)
}

/// The customary display unit for a quantity, used when a driver field
/// does not override it.
pub fn default_unit(q: Quantity) -> Unit {
    match q {
        Quantity::Time => Unit::Hour,
        Quantity::Length => Unit::M,
        Quantity::Mass => Unit::Kg,
        Quantity::Amperage => Unit::Ampere,
        Quantity::Temperature => Unit::C,
        Quantity::AmountOfSubstance => Unit::Mol,
        Quantity::LuminousIntensity => Unit::Cd,
        Quantity::Energy => Unit::Kwh,
        Quantity::ReactiveEnergy => Unit::Kvarh,
        Quantity::ApparentEnergy => Unit::Kvah,
        Quantity::Power => Unit::Kw,
        Quantity::Volume => Unit::M3,
        Quantity::Flow => Unit::M3h,
        Quantity::Voltage => Unit::Volt,
        Quantity::Pressure => Unit::Bar,
        Quantity::Frequency => Unit::Hz,
        Quantity::Angle => Unit::Radian,
        Quantity::Dimensionless => Unit::Counter,
        Quantity::RelativeHumidity => Unit::Rh,
        Quantity::Hca => Unit::Hca,
        Quantity::PointInTime => Unit::UnixTimestamp,
        Quantity::Text => Unit::Txt,
    }
}

/// Can a value in `from` be converted to `to`?
pub fn can_convert(from: Unit, to: Unit) -> bool {
    si_unit_of(from).convert_to(0.0, &si_unit_of(to)).is_some()
}

/// Convert a value between two named units.
pub fn convert(value: f64, from: Unit, to: Unit) -> Option<f64> {
    si_unit_of(from).convert_to(value, &si_unit_of(to))
}

/// Split a field name into its value name and trailing unit suffix:
/// `total_kwh` -> (`total`, Kwh). The value name must be non-empty.
pub fn extract_unit(name: &str) -> Option<(&str, Unit)> {
    let idx = name.rfind('_')?;
    let (vname, suffix) = (&name[..idx], &name[idx + 1..]);
    if vname.is_empty() {
        return None;
    }
    let unit = unit_from_name(suffix)?;
    Some((vname, unit))
}
