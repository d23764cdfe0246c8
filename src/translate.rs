//! # Translate tables
//!
//! Status and error registers arrive as opaque bit patterns; drivers attach
//! a lookup to such fields to turn them into stable text tokens. A lookup
//! holds rules, each claiming a masked slice of the bits and mapping them
//! either bit by bit or as an index. Bits nobody claims surface as
//! `NAME_XX` so unexpected flags never disappear silently.

/// How a rule interprets its masked bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapType {
    BitToString,
    IndexToString,
}

/// Whether a mapping triggers on a set or a cleared bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestBit {
    Set,
    NotSet,
}

/// One bit (or index) to text mapping.
#[derive(Debug, Clone)]
pub struct TranslateMap {
    pub value: u64,
    pub text: String,
    pub test: TestBit,
}

impl TranslateMap {
    pub fn set(value: u64, text: &str) -> Self {
        Self { value, text: text.to_string(), test: TestBit::Set }
    }

    pub fn not_set(value: u64, text: &str) -> Self {
        Self { value, text: text.to_string(), test: TestBit::NotSet }
    }
}

/// A named rule over a masked slice of the status bits.
#[derive(Debug, Clone)]
pub struct TranslateRule {
    pub name: String,
    pub map_type: MapType,
    pub mask: u64,
    pub default_message: String,
    pub maps: Vec<TranslateMap>,
}

impl TranslateRule {
    pub fn new(name: &str, map_type: MapType) -> Self {
        Self {
            name: name.to_string(),
            map_type,
            mask: u64::MAX,
            default_message: "OK".to_string(),
            maps: Vec::new(),
        }
    }

    pub fn mask(mut self, mask: u64) -> Self {
        self.mask = mask;
        self
    }

    pub fn default_message(mut self, msg: &str) -> Self {
        self.default_message = msg.to_string();
        self
    }

    pub fn add(mut self, map: TranslateMap) -> Self {
        self.maps.push(map);
        self
    }

    fn translate(&self, bits: u64) -> Vec<String> {
        let masked = bits & self.mask;
        let mut out = Vec::new();

        match self.map_type {
            MapType::BitToString => {
                let mut known: u64 = 0;
                for m in &self.maps {
                    known |= m.value;
                    match m.test {
                        TestBit::Set => {
                            if masked & m.value == m.value && m.value != 0 {
                                out.push(m.text.clone());
                            }
                        }
                        TestBit::NotSet => {
                            if masked & m.value == 0 {
                                out.push(m.text.clone());
                            }
                        }
                    }
                }
                let unknown = masked & !known;
                if unknown != 0 {
                    out.push(format!("{}_{:X}", self.name, unknown));
                }
            }
            MapType::IndexToString => {
                match self.maps.iter().find(|m| m.value == masked) {
                    Some(m) => out.push(m.text.clone()),
                    None => out.push(format!("{}_{:X}", self.name, masked)),
                }
            }
        }
        out
    }
}

/// A set of rules applied together to one status value.
#[derive(Debug, Clone, Default)]
pub struct TranslateLookup {
    pub rules: Vec<TranslateRule>,
}

impl TranslateLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, rule: TranslateRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Translate the bits through every rule. Rules that produce nothing
    /// contribute their default message only when the whole lookup would
    /// otherwise be silent.
    pub fn translate(&self, bits: u64) -> String {
        let mut tokens = Vec::new();
        for rule in &self.rules {
            tokens.extend(rule.translate(bits));
        }
        if tokens.is_empty() {
            return self
                .rules
                .first()
                .map(|r| r.default_message.clone())
                .unwrap_or_else(|| "OK".to_string());
        }
        tokens.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::status::sort_status_string;

    fn access_lookup() -> TranslateLookup {
        TranslateLookup::new()
            .add(
                TranslateRule::new("ACCESS_BITS", MapType::BitToString)
                    .mask(0xf0)
                    .add(TranslateMap::set(0x10, "NO_ACCESS"))
                    .add(TranslateMap::set(0x20, "ALL_ACCESS"))
                    .add(TranslateMap::set(0x40, "TEMP_ACCESS")),
            )
            .add(
                TranslateRule::new("ACCESSOR_TYPE", MapType::IndexToString)
                    .mask(0x0f)
                    .add(TranslateMap::set(0x00, "ACCESSOR_RED"))
                    .add(TranslateMap::set(0x07, "ACCESSOR_GREEN")),
            )
    }

    #[test]
    fn test_bit_and_index_rules() {
        let lookup = access_lookup();

        assert_eq!(
            sort_status_string(&lookup.translate(0xa0)),
            sort_status_string("ALL_ACCESS ACCESS_BITS_80 ACCESSOR_RED")
        );
        assert_eq!(
            sort_status_string(&lookup.translate(0x35)),
            sort_status_string("NO_ACCESS ALL_ACCESS ACCESSOR_TYPE_5")
        );
    }

    #[test]
    fn test_default_message() {
        let lookup = TranslateLookup::new().add(
            TranslateRule::new("FLOW_FLAGS", MapType::BitToString)
                .mask(0x3f)
                .default_message("OOOK")
                .add(TranslateMap::set(0x01, "BACKWARD_FLOW"))
                .add(TranslateMap::set(0x02, "DRY"))
                .add(TranslateMap::set(0x10, "TRIG"))
                .add(TranslateMap::set(0x20, "COS")),
        );

        assert_eq!(lookup.translate(0x02), "DRY");
        assert_eq!(lookup.translate(0x00), "OOOK");
    }

    #[test]
    fn test_not_set_bits() {
        let lookup = TranslateLookup::new().add(
            TranslateRule::new("NO_FLAGS", MapType::BitToString)
                .mask(0x03)
                .add(TranslateMap::not_set(0x01, "NOT_INSTALLED"))
                .add(TranslateMap::set(0x02, "FOO")),
        );

        assert_eq!(
            sort_status_string(&lookup.translate(0x02)),
            sort_status_string("NOT_INSTALLED FOO")
        );
        assert_eq!(lookup.translate(0x01), "OK");
    }
}
