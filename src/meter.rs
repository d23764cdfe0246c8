//! # Meters
//!
//! A [`MeterInfo`] describes a configured meter or template: name, driver,
//! address expressions, decryption key and identity mode. A [`Meter`] is a
//! live instance built from that description against a driver registry: it
//! accepts telegrams whose addresses match, decrypts and walks them, binds
//! the driver's fields to DV entries and keeps the most recent value per
//! field.

use std::collections::HashMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{
    does_telegram_match_expressions, is_valid_sequence_of_address_expressions,
    split_address_expressions, AddressExpression, IdentityMode, TelegramMatch,
};
use crate::crypto::AesKey;
use crate::driver::{DriverRegistry, FieldInfo, VifScaling};
use crate::dvparser::DVEntry;
use crate::formula::{FieldValueSource, Formula};
use crate::linkmode::LinkModeSet;
use crate::telegram::Telegram;
use crate::units::{convert, Quantity, Unit};
use crate::util::hex::is_hex_string_strict;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeterError {
    #[error("Invalid meter configuration: {0}")]
    BadConfig(String),

    #[error("Invalid address expressions: {0}")]
    BadAddressExpressions(String),

    #[error("Invalid decryption key: {0}")]
    BadKey(String),
}

/// Configured meter or template descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterInfo {
    pub name: String,
    /// Driver name, or `auto` to defer selection to the registry.
    pub driver_name: String,
    pub extras: String,
    pub bus: String,
    pub bps: u32,
    pub link_modes: LinkModeSet,
    pub address_expressions: Vec<AddressExpression>,
    /// 32 hex digit AES key, None when the meter sends plaintext.
    pub key: Option<String>,
    pub identity_mode: IdentityMode,
}

impl MeterInfo {
    /// Parse a meter configuration record. The driver specification
    /// grammar is `driver[(extras)][:bus[:bps]][:linkmodes]`, with the
    /// parts after the driver recognized by shape in any order.
    pub fn parse(name: &str, driver_spec: &str, ids: &str, key: &str) -> Result<Self, MeterError> {
        let mut mi = MeterInfo {
            name: name.to_string(),
            driver_name: String::new(),
            extras: String::new(),
            bus: String::new(),
            bps: 0,
            link_modes: LinkModeSet::empty(),
            address_expressions: Vec::new(),
            key: None,
            identity_mode: IdentityMode::Id,
        };

        let mut parts = driver_spec.split(':');
        let driver = parts
            .next()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| MeterError::BadConfig(format!("empty driver in {:?}", driver_spec)))?;

        match driver.split_once('(') {
            Some((name, rest)) => {
                let extras = rest.strip_suffix(')').ok_or_else(|| {
                    MeterError::BadConfig(format!("unterminated extras in {:?}", driver_spec))
                })?;
                mi.driver_name = name.to_string();
                mi.extras = extras.to_string();
            }
            None => mi.driver_name = driver.to_string(),
        }

        for part in parts {
            if part.is_empty() {
                return Err(MeterError::BadConfig(format!(
                    "empty part in driver spec {:?}",
                    driver_spec
                )));
            }
            if part.bytes().all(|b| b.is_ascii_digit()) {
                mi.bps = part
                    .parse()
                    .map_err(|_| MeterError::BadConfig(format!("bad bps {:?}", part)))?;
            } else if let Ok(modes) = LinkModeSet::parse(part) {
                mi.link_modes = modes;
            } else if mi.bus.is_empty() {
                mi.bus = part.to_string();
            } else {
                return Err(MeterError::BadConfig(format!(
                    "cannot understand {:?} in driver spec {:?}",
                    part, driver_spec
                )));
            }
        }

        // Extras may carry the identity mode for template instantiation.
        for kv in mi.extras.split(',') {
            if let Some(mode) = kv.strip_prefix("identitymode=") {
                let im = IdentityMode::from_name(mode);
                if im == IdentityMode::Invalid {
                    return Err(MeterError::BadConfig(format!("bad identity mode {:?}", mode)));
                }
                mi.identity_mode = im;
            }
        }

        if !ids.is_empty() {
            if !is_valid_sequence_of_address_expressions(ids) {
                return Err(MeterError::BadAddressExpressions(ids.to_string()));
            }
            mi.address_expressions = split_address_expressions(ids);
        }

        mi.key = match key {
            "" | "NOKEY" => None,
            k => {
                let (ok, odd) = is_hex_string_strict(k);
                if !ok || odd || k.len() != 32 {
                    return Err(MeterError::BadKey(format!(
                        "expected 32 hex digits, got {:?}",
                        k
                    )));
                }
                Some(k.to_string())
            }
        };

        Ok(mi)
    }
}

/// A numeric or text field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Numeric(f64, Unit),
    Text(String),
}

/// A live meter instance.
#[derive(Debug)]
pub struct Meter {
    name: String,
    driver_name: String,
    /// None when the driver is unknown; the meter stays registered but
    /// decodes zero fields.
    fields: Vec<FieldInfo>,
    address_expressions: Vec<AddressExpression>,
    key: Option<AesKey>,
    identity_mode: IdentityMode,
    index: usize,
    num_updates: u64,
    numeric_values: HashMap<String, (f64, Unit)>,
    string_values: HashMap<String, String>,
}

impl Meter {
    /// Build a meter from its descriptor. The driver is resolved by name;
    /// an unresolvable driver leaves the meter with no fields.
    pub fn new(mi: &MeterInfo, registry: &DriverRegistry) -> Result<Meter, MeterError> {
        let fields = match registry.lookup(&mi.driver_name) {
            Some(ix) => registry.get(ix).map(|d| d.fields.clone()).unwrap_or_default(),
            None => {
                warn!(
                    "(meter) {}: unknown driver {}, meter will report no fields",
                    mi.name, mi.driver_name
                );
                Vec::new()
            }
        };

        let key = match &mi.key {
            Some(k) => {
                Some(AesKey::from_hex(k).map_err(|e| MeterError::BadKey(e.to_string()))?)
            }
            None => None,
        };

        let meter = Meter {
            name: mi.name.clone(),
            driver_name: mi.driver_name.clone(),
            fields,
            address_expressions: mi.address_expressions.clone(),
            key,
            identity_mode: mi.identity_mode,
            index: 0,
            num_updates: 0,
            numeric_values: HashMap::new(),
            string_values: HashMap::new(),
        };
        Ok(meter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    pub fn identity_mode(&self) -> IdentityMode {
        self.identity_mode
    }

    pub fn address_expressions(&self) -> &[AddressExpression] {
        &self.address_expressions
    }

    pub fn address_expressions_mut(&mut self) -> &mut Vec<AddressExpression> {
        &mut self.address_expressions
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Number of fields that currently hold a value.
    pub fn num_decoded_fields(&self) -> usize {
        self.numeric_values.len() + self.string_values.len()
    }

    /// The most recent value of a field, converted to `unit`.
    pub fn numeric_value(&self, field_name: &str, unit: Unit) -> Option<f64> {
        let (v, u) = self.numeric_values.get(field_name)?;
        convert(*v, *u, unit)
    }

    pub fn string_value(&self, field_name: &str) -> Option<&str> {
        self.string_values.get(field_name).map(|s| s.as_str())
    }

    /// Does the telegram belong to this meter?
    pub fn matches_telegram(&self, t: &Telegram) -> TelegramMatch {
        does_telegram_match_expressions(&t.addresses, &self.address_expressions)
    }

    /// Try to accept and decode a telegram. Returns whether the telegram
    /// was handled and the address match outcome; a matching telegram can
    /// still end up unhandled when decryption or parsing fails.
    pub fn handle_telegram(&mut self, frame: &[u8]) -> (bool, TelegramMatch) {
        let header = match Telegram::parse_header(frame) {
            Ok(h) => h,
            Err(e) => {
                debug!("(meter) {}: {}", self.name, e);
                return (false, TelegramMatch::default());
            }
        };

        let m = self.matches_telegram(&header);
        if !m.matched {
            return (false, m);
        }

        let telegram = match Telegram::parse(frame, self.key.as_ref()) {
            Ok(t) => t,
            Err(e) => {
                warn!("(meter) {}: {}", self.name, e);
                return (false, m);
            }
        };
        if !telegram.complete {
            debug!(
                "(meter) {}: telegram only partially understood, using parsed records",
                self.name
            );
        }

        self.process_telegram(&telegram);
        self.num_updates += 1;
        (true, m)
    }

    /// Bind driver fields to the telegram's entries and refresh values.
    fn process_telegram(&mut self, t: &Telegram) {
        let mut updates: Vec<(String, FieldValue)> = Vec::new();

        for field in &self.fields {
            if field.calculate.is_some() || !field.matcher.active {
                continue;
            }
            let Some(entry) = field.matcher.find_entry(&t.entries) else {
                continue;
            };
            match Self::decode_field(field, entry) {
                Some(v) => updates.push((field.name.clone(), v)),
                None => warn!(
                    "(meter) {}: could not decode field {} from entry {}",
                    self.name, field.name, entry.key
                ),
            }
        }
        self.apply(updates);

        // Calculated fields see the values decoded above.
        let mut updates: Vec<(String, FieldValue)> = Vec::new();
        for field in &self.fields {
            let Some(formula_src) = &field.calculate else {
                continue;
            };
            let formula = match Formula::parse(formula_src, Some(self)) {
                Ok(f) => f,
                Err(e) => {
                    warn!("(meter) {}: bad formula for {}: {}", self.name, field.name, e);
                    continue;
                }
            };
            match formula.calculate(field.display_unit, Some(self), None) {
                Ok(v) => updates.push((
                    field.name.clone(),
                    FieldValue::Numeric(v, field.display_unit),
                )),
                Err(e) => {
                    debug!("(meter) {}: formula for {} not computable: {}", self.name, field.name, e)
                }
            }
        }
        self.apply(updates);
    }

    fn apply(&mut self, updates: Vec<(String, FieldValue)>) {
        for (name, value) in updates {
            match value {
                FieldValue::Numeric(v, u) => {
                    self.numeric_values.insert(name, (v, u));
                }
                FieldValue::Text(s) => {
                    self.string_values.insert(name, s);
                }
            }
        }
    }

    fn decode_field(field: &FieldInfo, entry: &DVEntry) -> Option<FieldValue> {
        match field.quantity {
            Quantity::Text => {
                if !field.lookup.is_empty() {
                    let bits = entry.raw_value()? as u64;
                    Some(FieldValue::Text(field.lookup.translate(bits)))
                } else {
                    Some(FieldValue::Text(entry.text_value()))
                }
            }
            Quantity::PointInTime => {
                let d = entry.date_value()?;
                Some(FieldValue::Text(d.format("%Y-%m-%d %H:%M:%S").to_string()))
            }
            _ => {
                let raw = match field.vif_scaling {
                    VifScaling::Auto => entry.double_value()?,
                    VifScaling::None => entry.raw_value()?,
                };
                let v = convert(raw, entry.vif_info.unit, field.display_unit)?;
                Some(FieldValue::Numeric(v, field.display_unit))
            }
        }
    }
}

impl FieldValueSource for Meter {
    fn field_unit(&self, vname: &str) -> Option<Unit> {
        self.fields.iter().find(|f| f.name == vname).map(|f| f.display_unit)
    }

    fn field_value(&self, vname: &str, unit: Unit) -> Option<f64> {
        self.numeric_value(vname, unit)
    }
}
