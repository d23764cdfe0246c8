//! # Field matcher
//!
//! Binds a driver's declarative field description to concrete DV entries.
//! Every predicate left unset is a wildcard; a matcher with several
//! predicates requires all of them. When several entries satisfy a matcher
//! the driver takes the first in parse order.

use crate::dvparser::{DVEntry, DifVifKey, MeasurementType};
use crate::vif::{VifCombinable, VifRange};

#[derive(Debug, Clone, Default)]
pub struct FieldMatcher {
    /// An inactive matcher matches nothing; used by fields that are pure
    /// calculations over other fields.
    pub active: bool,
    pub measurement_type: Option<MeasurementType>,
    pub vif_range: Option<VifRange>,
    /// Exact DIF/VIF key match for pesky vendor records.
    pub difvif_key: Option<DifVifKey>,
    pub storage_nr: Option<(u32, u32)>,
    pub tariff_nr: Option<(u16, u16)>,
    pub subunit_nr: Option<(u16, u16)>,
    /// Required combinable VIFEs; the entry's set must be a superset.
    /// [`VifCombinable::Any`] accepts any combinable set.
    pub combinables: Vec<VifCombinable>,
}

impl FieldMatcher {
    pub fn build() -> Self {
        Self { active: true, ..Default::default() }
    }

    pub fn measurement(mut self, mt: MeasurementType) -> Self {
        self.measurement_type = Some(mt);
        self
    }

    pub fn vif_range(mut self, r: VifRange) -> Self {
        self.vif_range = Some(r);
        self
    }

    pub fn difvif_key(mut self, key: &str) -> Self {
        self.difvif_key = Some(DifVifKey::new(key));
        self
    }

    pub fn storage(self, nr: u32) -> Self {
        self.storage_range(nr, nr)
    }

    pub fn storage_range(mut self, from: u32, to: u32) -> Self {
        self.storage_nr = Some((from, to));
        self
    }

    pub fn tariff(self, nr: u16) -> Self {
        self.tariff_range(nr, nr)
    }

    pub fn tariff_range(mut self, from: u16, to: u16) -> Self {
        self.tariff_nr = Some((from, to));
        self
    }

    pub fn subunit(self, nr: u16) -> Self {
        self.subunit_range(nr, nr)
    }

    pub fn subunit_range(mut self, from: u16, to: u16) -> Self {
        self.subunit_nr = Some((from, to));
        self
    }

    pub fn combinable(mut self, c: VifCombinable) -> Self {
        self.combinables.push(c);
        self
    }

    /// Does this matcher accept the entry? Unset predicates are wildcards.
    pub fn matches(&self, entry: &DVEntry) -> bool {
        if !self.active {
            return false;
        }
        if let Some(mt) = self.measurement_type {
            if entry.measurement_type != mt {
                return false;
            }
        }
        if let Some(key) = &self.difvif_key {
            if &entry.key != key {
                return false;
            }
        }
        if let Some(r) = self.vif_range {
            if r != VifRange::Any && entry.vif_range != r {
                return false;
            }
        }
        if let Some((from, to)) = self.storage_nr {
            if entry.storage_nr < from || entry.storage_nr > to {
                return false;
            }
        }
        if let Some((from, to)) = self.tariff_nr {
            if entry.tariff_nr < from || entry.tariff_nr > to {
                return false;
            }
        }
        if let Some((from, to)) = self.subunit_nr {
            if entry.subunit_nr < from || entry.subunit_nr > to {
                return false;
            }
        }
        if !self.combinables.is_empty() && !self.combinables.contains(&VifCombinable::Any) {
            for c in &self.combinables {
                if !entry.has_combinable(*c) {
                    return false;
                }
            }
        }
        true
    }

    /// First matching entry in parse order.
    pub fn find_entry<'a>(&self, entries: &'a crate::dvparser::Entries) -> Option<&'a DVEntry> {
        entries.iter().find(|e| self.matches(e))
    }
}
