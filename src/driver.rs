//! # Driver registry
//!
//! A driver is a value: a name, the mfct/version/type triplets it detects,
//! and a list of declarative field definitions. Drivers live in an arena
//! owned by the registry and are referenced by stable index, so meters and
//! formulas never hold owning handles into the registry.

use std::collections::HashMap;

use log::{debug, warn};

use crate::address::flag_to_manufacturer;
use crate::matcher::FieldMatcher;
use crate::translate::TranslateLookup;
use crate::units::{default_unit, Quantity, Unit};

pub type DriverIndex = usize;

/// What kind of meter a driver decodes, informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterType {
    WaterMeter,
    HeatMeter,
    ElectricityMeter,
    GasMeter,
    HeatCostAllocator,
    TempHygro,
    SmokeDetector,
    Unknown,
}

/// One mfct/version/type combination a driver claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionTriplet {
    pub mfct: u16,
    pub version: u8,
    pub device_type: u8,
}

/// Whether the VIF decimal scaling is applied to matched values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VifScaling {
    #[default]
    Auto,
    None,
}

/// Declarative description of one meter field.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Field name without the unit suffix, e.g. `total_energy_consumption`.
    pub name: String,
    pub quantity: Quantity,
    pub display_unit: Unit,
    pub matcher: FieldMatcher,
    /// Formula source for calculated fields, parsed when the meter is
    /// built so errors surface at configuration time.
    pub calculate: Option<String>,
    /// Bit/index translation for status style fields.
    pub lookup: TranslateLookup,
    pub vif_scaling: VifScaling,
}

impl FieldInfo {
    pub fn new(name: &str, quantity: Quantity, matcher: FieldMatcher) -> Self {
        Self {
            name: name.to_string(),
            quantity,
            display_unit: default_unit(quantity),
            matcher,
            calculate: None,
            lookup: TranslateLookup::new(),
            vif_scaling: VifScaling::Auto,
        }
    }

    pub fn display_unit(mut self, unit: Unit) -> Self {
        self.display_unit = unit;
        self
    }

    pub fn calculate(mut self, formula: &str) -> Self {
        self.calculate = Some(formula.to_string());
        self
    }

    pub fn lookup(mut self, lookup: TranslateLookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn vif_scaling(mut self, scaling: VifScaling) -> Self {
        self.vif_scaling = scaling;
        self
    }
}

/// A complete driver definition.
#[derive(Debug, Clone)]
pub struct DriverInfo {
    pub name: String,
    pub meter_type: MeterType,
    pub detect: Vec<DetectionTriplet>,
    pub fields: Vec<FieldInfo>,
}

impl DriverInfo {
    pub fn new(name: &str, meter_type: MeterType) -> Self {
        Self {
            name: name.to_string(),
            meter_type,
            detect: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Register a detection triplet. The manufacturer is given as the
    /// three letter flag, as in driver files: `detect("KAM", 0x1b, 0x16)`.
    pub fn detect(mut self, mfct_flag: &str, version: u8, device_type: u8) -> Self {
        match flag_to_manufacturer(mfct_flag) {
            Some(mfct) => self.detect.push(DetectionTriplet { mfct, version, device_type }),
            None => warn!(
                "(driver) {}: bad manufacturer flag {} in detection triplet",
                self.name, mfct_flag
            ),
        }
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }
}

/// Arena of driver definitions with name lookup and auto detection.
/// Constructed explicitly and handed to the manager so tests can build
/// isolated registries.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: Vec<DriverInfo>,
    by_name: HashMap<String, DriverIndex>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver, returning its stable index. Re-registering a
    /// name replaces the old definition and keeps the index.
    pub fn register(&mut self, driver: DriverInfo) -> DriverIndex {
        if let Some(&ix) = self.by_name.get(&driver.name) {
            debug!("(driver) replacing driver {}", driver.name);
            self.drivers[ix] = driver;
            return ix;
        }
        let ix = self.drivers.len();
        self.by_name.insert(driver.name.clone(), ix);
        self.drivers.push(driver);
        ix
    }

    pub fn lookup(&self, name: &str) -> Option<DriverIndex> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, ix: DriverIndex) -> Option<&DriverInfo> {
        self.drivers.get(ix)
    }

    /// Auto-pick a driver from the telegram identity. First exact triplet
    /// match wins, in registration order.
    pub fn pick(&self, mfct: u16, version: u8, device_type: u8) -> Option<DriverIndex> {
        self.drivers.iter().position(|d| {
            d.detect.iter().any(|t| {
                t.mfct == mfct && t.version == version && t.device_type == device_type
            })
        })
    }

    pub fn all(&self) -> impl Iterator<Item = (DriverIndex, &DriverInfo)> {
        self.drivers.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dvparser::MeasurementType;
    use crate::vif::VifRange;

    fn water_driver() -> DriverInfo {
        DriverInfo::new("aquastream", MeterType::WaterMeter)
            .detect("KAM", 0x1b, 0x16)
            .field(FieldInfo::new(
                "total",
                Quantity::Volume,
                FieldMatcher::build()
                    .measurement(MeasurementType::Instantaneous)
                    .vif_range(VifRange::Volume),
            ))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = DriverRegistry::new();
        let ix = reg.register(water_driver());
        assert_eq!(reg.lookup("aquastream"), Some(ix));
        assert_eq!(reg.lookup("nosuch"), None);
        assert_eq!(reg.get(ix).unwrap().fields.len(), 1);
    }

    #[test]
    fn test_reregister_keeps_index() {
        let mut reg = DriverRegistry::new();
        let ix = reg.register(water_driver());
        let ix2 = reg.register(water_driver().field(FieldInfo::new(
            "flow",
            Quantity::Flow,
            FieldMatcher::build().vif_range(VifRange::VolumeFlow),
        )));
        assert_eq!(ix, ix2);
        assert_eq!(reg.get(ix).unwrap().fields.len(), 2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_auto_pick() {
        let mut reg = DriverRegistry::new();
        reg.register(water_driver());
        let heat = DriverInfo::new("calorix", MeterType::HeatMeter).detect("KAM", 0x0a, 0x04);
        let heat_ix = reg.register(heat);

        let kam = flag_to_manufacturer("KAM").unwrap();
        assert_eq!(reg.pick(kam, 0x1b, 0x16), reg.lookup("aquastream"));
        assert_eq!(reg.pick(kam, 0x0a, 0x04), Some(heat_ix));
        assert_eq!(reg.pick(kam, 0x99, 0x16), None);
    }

    #[test]
    fn test_bad_detect_flag_is_skipped() {
        let d = DriverInfo::new("x", MeterType::Unknown).detect("K1M", 0, 0);
        assert!(d.detect.is_empty());
    }
}
