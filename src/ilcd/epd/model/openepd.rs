//! Serde model of the openEPD subset emitted by the converter.
//!
//! Every map is a [`BTreeMap`] so that serialising the same object twice
//! yields identical bytes.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extension namespace used for ILCD specific data in `ext` fields.
pub const EXTENSION_NAME: &str = "ilcd";

/// Attachment label pointing at the ILCD dataset itself.
pub const ILCD_ATTACHMENT: &str = "ILCD";

/// Attachment label pointing at the EPD document.
pub const PDF_ATTACHMENT: &str = "PDF";

/// Life-cycle stages openEPD accepts as `ScopeSet` keys.
pub const STAGES: [&str; 21] = [
    "A1A2A3", "A1", "A2", "A3", "A4", "A5", "B1", "B2", "B3", "B4", "B5", "B6", "B7", "C1", "C2",
    "C3", "C4", "D", "A4A5", "B1B7", "C1C4",
];

/// Stages allowed inside an end-of-life scenario.
pub const SCENARIO_STAGES: [&str; 5] = ["C1", "C2", "C3", "C4", "D"];

/// A value with its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub mean: f64,
    pub unit: String,
}

/// Declared unit of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub qty: f64,
    pub unit: String,
}

/// Values of one indicator for one end-of-life scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EolScenario {
    pub name: String,
    #[serde(flatten)]
    pub stages: BTreeMap<String, Measurement>,
}

/// Values of one indicator across life-cycle stages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScopeSet {
    #[serde(flatten)]
    pub stages: BTreeMap<String, Measurement>,
    #[serde(rename = "C_scenarios", default, skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<EolScenario>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ext: BTreeMap<String, Measurement>,
}

impl ScopeSet {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.scenarios.is_empty() && self.ext.is_empty()
    }
}

/// Impacts, resource uses or output flows keyed by openEPD indicator name.
/// Indicators without an openEPD name land in `ext`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSet {
    #[serde(flatten)]
    pub indicators: BTreeMap<String, ScopeSet>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ext: BTreeMap<String, ScopeSet>,
}

impl IndicatorSet {
    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty() && self.ext.is_empty()
    }
}

/// Postal location of an organisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
}

/// Contact details preserved from the ILCD contact dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ContactInfo {
    pub fn has_values(&self) -> bool {
        self.contact_person.is_some()
            || self.email.is_some()
            || self.phone.is_some()
            || self.website.is_some()
            || self.address.is_some()
    }
}

/// An organisation (manufacturer, program operator, verifier, PCR issuer).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Org {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_domain: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alt_ids: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hq_location: Option<Location>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ext: BTreeMap<String, Value>,
}

/// Product category rules document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pcr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Org>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alt_ids: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, String>,
}

/// A standard the EPD declares compliance with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compliance {
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// One review of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_type: Option<String>,
    pub org: Org,
}

/// Product specification block; ILCD product properties live in `ext`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Specs {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ext: BTreeMap<String, BTreeMap<String, String>>,
}

/// A classification entry that has no openEPD category mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownClassification {
    pub system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// The `ext.ilcd` block of an EPD.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IlcdEpdExtension {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_classification: Vec<UnknownClassification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<Validation>,
}

/// The openEPD declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epd {
    pub doctype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_published: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_operator_doc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<Org>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_operator: Option<Org>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_party_verifier: Option<Org>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_party_verifier_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcr: Option<Pcr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compliance: Vec<Compliance>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub product_class: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_unit: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specs: Option<Specs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impacts: Option<IndicatorSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_uses: Option<IndicatorSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_flows: Option<IndicatorSet>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ext: BTreeMap<String, IlcdEpdExtension>,
}

impl Default for Epd {
    fn default() -> Self {
        Self {
            doctype: "openEPD".to_string(),
            language: None,
            name: None,
            description: None,
            date_published: None,
            valid_until: None,
            program_operator_doc_id: None,
            declaration_url: None,
            attachments: BTreeMap::new(),
            manufacturer: None,
            program_operator: None,
            third_party_verifier: None,
            third_party_verifier_email: None,
            pcr: None,
            compliance: Vec::new(),
            product_class: BTreeMap::new(),
            category: Vec::new(),
            declared_unit: None,
            specs: None,
            impacts: None,
            resource_uses: None,
            output_flows: None,
            ext: BTreeMap::new(),
        }
    }
}

impl Epd {
    /// Serialises the declaration as pretty printed JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
