//! MatML material documents embedded in flow datasets.

use std::collections::BTreeMap;
use std::fmt;

use crate::ilcd::epd::xml::Element;

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Float(value) => write!(f, "{value}"),
            PropertyValue::Integer(value) => write!(f, "{value}"),
            PropertyValue::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialProperty {
    pub value: PropertyValue,
    /// `None` for dimensionless properties (written as `-`).
    pub unit: Option<String>,
    pub internal_id: String,
}

impl MaterialProperty {
    /// `<value> <unit>`, or the bare value for dimensionless properties.
    pub fn to_unit_string(&self) -> String {
        match &self.unit {
            Some(unit) => format!("{} {unit}", self.value),
            None => self.value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatMlMaterial {
    pub name: String,
    /// Properties keyed by lower-cased property name.
    pub properties: BTreeMap<String, MaterialProperty>,
}

/// Reads `mm:Material/mm:BulkDetails` of a `MatML_Doc` element. Properties
/// without data, metadata or units are skipped; numbers that do not parse
/// are kept as text.
pub fn read_material(document: &Element) -> Option<MatMlMaterial> {
    let name = document.find_text("mm:Material/mm:BulkDetails/mm:Name")?;
    let mut material = MatMlMaterial {
        name: name.to_string(),
        properties: BTreeMap::new(),
    };

    for property in document.find_all("mm:Material/mm:BulkDetails/mm:PropertyData") {
        let Some(id) = property.attr("property") else {
            continue;
        };
        let Some(data) = property.find("mm:Data") else {
            continue;
        };
        let Some(raw) = data.text() else {
            continue;
        };
        let value = match data.attr("format") {
            Some("float") => raw
                .parse::<f64>()
                .map_or_else(|_| PropertyValue::Text(raw.to_string()), PropertyValue::Float),
            Some("integer") => raw
                .parse::<i64>()
                .map_or_else(|_| PropertyValue::Text(raw.to_string()), PropertyValue::Integer),
            _ => PropertyValue::Text(raw.to_string()),
        };

        let details = format!("mm:Metadata/mm:PropertyDetails[@id='{id}']");
        let Some(details) = document.find(&details) else {
            continue;
        };
        let Some(property_name) = details.find_text("mm:Name") else {
            continue;
        };
        let Some(units) = details.find("mm:Units") else {
            continue;
        };
        let unit = units
            .attr("name")
            .map(str::trim)
            .filter(|unit| !unit.is_empty() && *unit != "-")
            .map(str::to_string);

        material.properties.insert(
            property_name.to_lowercase(),
            MaterialProperty {
                value,
                unit,
                internal_id: id.to_string(),
            },
        );
    }
    Some(material)
}
