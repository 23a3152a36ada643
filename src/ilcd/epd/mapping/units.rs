//! Unit normalisation onto the canonical openEPD unit symbols.
//!
//! A unit string is first looked up in the dialect's spelling table, then
//! reduced to a lookup key: lower case, superscripts as digits, no spaces or
//! punctuation, and `eq`/`äq`/`equiv` suffixes folded into `e`. Canonical
//! symbols map onto themselves with factor 1.

use crate::ilcd::epd::error::UnitMappingError;

/// A unit with the factor that converts a value into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalUnit {
    pub symbol: &'static str,
    pub factor: f64,
}

const fn unit(symbol: &'static str, factor: f64) -> CanonicalUnit {
    CanonicalUnit { symbol, factor }
}

/// Lookup key to canonical unit.
const UNITS: &[(&str, CanonicalUnit)] = &[
    // mass
    ("kg", unit("kg", 1.0)),
    ("g", unit("kg", 1e-3)),
    ("mg", unit("kg", 1e-6)),
    ("t", unit("kg", 1e3)),
    ("tonne", unit("kg", 1e3)),
    // length
    ("m", unit("m", 1.0)),
    ("cm", unit("m", 1e-2)),
    ("mm", unit("m", 1e-3)),
    ("km", unit("m", 1e3)),
    // area
    ("m2", unit("m2", 1.0)),
    ("sqm", unit("m2", 1.0)),
    ("cm2", unit("m2", 1e-4)),
    ("mm2", unit("m2", 1e-6)),
    // volume
    ("m3", unit("m3", 1.0)),
    ("l", unit("m3", 1e-3)),
    ("dm3", unit("m3", 1e-3)),
    ("cm3", unit("m3", 1e-6)),
    ("ml", unit("m3", 1e-6)),
    // energy
    ("mj", unit("MJ", 1.0)),
    ("kj", unit("MJ", 1e-3)),
    ("gj", unit("MJ", 1e3)),
    ("kwh", unit("MJ", 3.6)),
    ("wh", unit("MJ", 3.6e-3)),
    // count
    ("item", unit("item", 1.0)),
    ("pcs", unit("item", 1.0)),
    ("piece", unit("item", 1.0)),
    // impacts
    ("kgco2e", unit("kgCO2e", 1.0)),
    ("gco2e", unit("kgCO2e", 1e-3)),
    ("tco2e", unit("kgCO2e", 1e3)),
    ("kgcfc11e", unit("kgCFC11e", 1.0)),
    ("kgr11e", unit("kgCFC11e", 1.0)),
    ("kgso2e", unit("kgSO2e", 1.0)),
    ("kgpo4e", unit("kgPO4e", 1.0)),
    ("kgpo43e", unit("kgPO4e", 1.0)),
    ("kgphosphatee", unit("kgPO4e", 1.0)),
    ("kgc2h4e", unit("kgC2H4e", 1.0)),
    ("kgethenee", unit("kgC2H4e", 1.0)),
    ("kgsbe", unit("kgSbe", 1.0)),
    ("kgpe", unit("kgPe", 1.0)),
    ("kgne", unit("kgNe", 1.0)),
    ("molne", unit("molNe", 1.0)),
    ("molh+e", unit("molH+e", 1.0)),
    ("molhe", unit("molH+e", 1.0)),
    ("kgnmvoce", unit("kgNMVOCe", 1.0)),
    ("kbqu235e", unit("kBqU235e", 1.0)),
    ("m3aware", unit("m3AWARE", 1.0)),
    ("m3worldedeprived", unit("m3AWARE", 1.0)),
    ("ctue", unit("CTUe", 1.0)),
    ("ctuh", unit("CTUh", 1.0)),
    ("diseaseincidence", unit("disease incidence", 1.0)),
];

const IGNORED: [char; 10] = [' ', '.', '-', '⁻', '_', '(', ')', '[', ']', ','];

/// Reduces a unit string to its lookup key.
pub fn unit_key(unit: &str) -> String {
    let key: String = unit
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !IGNORED.contains(c) && !c.is_whitespace())
        .map(|c| match c {
            '²' => '2',
            '³' => '3',
            '⁺' => '+',
            other => other,
        })
        .collect();
    for suffix in ["equivalents", "equivalent", "equiv", "eq", "äq"] {
        if let Some(stem) = key.strip_suffix(suffix) {
            return format!("{stem}e");
        }
    }
    // "m3 world eq. deprived" keeps the marker inside the key
    key.replace("worldeqdeprived", "worldedeprived")
}

/// Converts units with an optional provider spelling table in front of the
/// canonical table.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitConverter {
    spellings: &'static [(&'static str, &'static str)],
}

impl UnitConverter {
    pub fn new(spellings: &'static [(&'static str, &'static str)]) -> Self {
        Self { spellings }
    }

    /// Canonical unit of `unit`, if known.
    pub fn canonical(&self, unit: &str) -> Option<CanonicalUnit> {
        let trimmed = unit.trim();
        let spelled = self
            .spellings
            .iter()
            .find(|(spelling, _)| spelling.eq_ignore_ascii_case(trimmed))
            .map(|(_, symbol)| *symbol)
            .unwrap_or(trimmed);
        let key = unit_key(spelled);
        UNITS
            .iter()
            .find(|(known, _)| *known == key)
            .map(|(_, canonical)| *canonical)
    }

    /// Converts `value` given in `unit` into the canonical unit. `field`
    /// names the output field in the error.
    pub fn convert(
        &self,
        value: f64,
        unit: &str,
        field: &str,
    ) -> std::result::Result<(f64, &'static str), UnitMappingError> {
        self.canonical(unit)
            .map(|canonical| (value * canonical.factor, canonical.symbol))
            .ok_or_else(|| UnitMappingError {
                field: field.to_string(),
                unit: unit.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(value: f64, unit: &str) -> (f64, &'static str) {
        UnitConverter::default()
            .convert(value, unit, "test")
            .expect("known unit")
    }

    #[test]
    fn provider_spellings_normalise() {
        assert_eq!(unit_key("kg CO2 eq."), "kgco2e");
        assert_eq!(unit_key("kg CO2-Äq."), "kgco2e");
        assert_eq!(unit_key("m³"), "m3");
        assert_eq!(convert(2.0, "kg CFC-11 eq."), (2.0, "kgCFC11e"));
        assert_eq!(convert(1.0, "mol H+ eq."), (1.0, "molH+e"));
        assert_eq!(convert(1.0, "m²"), (1.0, "m2"));
        assert_eq!(unit_key("kg PO4³⁻ eq"), "kgpo43e");
        assert_eq!(convert(1.0, "kg PO4³⁻ eq"), (1.0, "kgPO4e"));
        assert_eq!(convert(1.0, "mol H⁺ eq."), (1.0, "molH+e"));
    }

    #[test]
    fn values_are_rescaled() {
        assert_eq!(convert(1500.0, "g"), (1.5, "kg"));
        assert_eq!(convert(2.0, "kWh"), (7.2, "MJ"));
        assert_eq!(convert(250.0, "g CO2 eq"), (0.25, "kgCO2e"));
        let (value, symbol) = convert(500.0, "l");
        assert_eq!(symbol, "m3");
        assert!((value - 0.5).abs() < 1e-12);
    }

    #[test]
    fn canonical_units_are_fixed_points() {
        let converter = UnitConverter::default();
        for (_, canonical) in UNITS {
            let again = converter
                .canonical(canonical.symbol)
                .expect("canonical symbol known");
            assert_eq!(again.symbol, canonical.symbol);
            assert_eq!(again.factor, 1.0, "{}", canonical.symbol);
        }
    }

    #[test]
    fn dialect_spellings_take_precedence() {
        static SPELLINGS: &[(&str, &str)] = &[("kg CO2 Äquivalent", "kgCO2e"), ("Stk", "item")];
        let converter = UnitConverter::new(SPELLINGS);
        assert_eq!(
            converter.convert(3.0, "Stk", "declared_unit"),
            Ok((3.0, "item"))
        );
        assert!(UnitConverter::default().canonical("Stk").is_none());
    }

    #[test]
    fn unknown_units_name_the_field() {
        let err = UnitConverter::default()
            .convert(1.0, "furlongs", "impacts.gwp.A1")
            .expect_err("unknown unit");
        assert_eq!(err.field, "impacts.gwp.A1");
        assert_eq!(err.unit, "furlongs");
        assert!(UnitConverter::default().canonical("").is_none());
    }
}
