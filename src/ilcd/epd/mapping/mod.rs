//! Mapping of reader values onto the openEPD object graph.
//!
//! [`Mapper::convert`] calls the reader accessors in a fixed order:
//!
//! 1. identity and language (`ext.ilcd`, `language`)
//! 2. texts and dates (`name`, `description`, `date_published`, `valid_until`,
//!    `program_operator_doc_id`)
//! 3. links (`attachments`, `declaration_url`)
//! 4. organisations (`manufacturer`, `program_operator`, `third_party_verifier`,
//!    `pcr`, `compliance`, validations)
//! 5. classification (`product_class`, `category`, unknown classifications)
//! 6. product (`declared_unit`, `specs`)
//! 7. indicators (`impacts`, `resource_uses`, `output_flows`), then the
//!    derived `A1A2A3` totals
//!
//! Unit problems and missing required fields do not abort the conversion;
//! they turn the outcome into [`ConversionOutcome::MappingIncomplete`].

pub mod category;
pub mod identifiers;
pub mod sanitize;
pub mod units;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tracing::{debug, instrument, warn};

use crate::ilcd::epd::dialect::rules::{ClassRule, OperatorRule, VerifierRule};
use crate::ilcd::epd::error::{Result, UnitMappingError};
use crate::ilcd::epd::model::openepd::{
    Amount, EXTENSION_NAME, EolScenario, Epd, ILCD_ATTACHMENT, IlcdEpdExtension, IndicatorSet,
    Measurement, Org, SCENARIO_STAGES, STAGES, ScopeSet, Specs,
};
use crate::ilcd::epd::model::{LangPreference, ProductClass};
use crate::ilcd::epd::reader::EpdReader;
use crate::ilcd::epd::reader::scope_set::{IndicatorGroup, IndicatorName, RawIndicator};
use category::map_categories;
use sanitize::provider_domain;
use units::UnitConverter;

/// Fields a declaration cannot do without.
pub const REQUIRED_FIELDS: [&str; 2] = ["name", "declared_unit"];

const TOTAL_STAGE: &str = "A1A2A3";
const TOTAL_PARTS: [&str; 3] = ["A1", "A2", "A3"];

/// Settings of one conversion.
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Public base URL of the medium, used for dataset links.
    pub base_url: Option<String>,
    /// Key of provider UUIDs in `alt_ids`.
    pub provider: String,
    /// Name of the effective dialect, reported in `ext.ilcd.dialect`.
    pub dialect: String,
}

impl ConversionOptions {
    pub fn new(base_url: Option<String>, dialect: impl Into<String>) -> Self {
        let provider = provider_domain(base_url.as_deref());
        Self {
            base_url,
            provider,
            dialect: dialect.into(),
        }
    }
}

/// Result of a conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Complete(Epd),
    /// The declaration is usable but lacks required fields or carries
    /// values with unknown units.
    MappingIncomplete {
        epd: Epd,
        missing_fields: Vec<String>,
        unit_errors: Vec<UnitMappingError>,
    },
}

impl ConversionOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, ConversionOutcome::Complete(_))
    }

    pub fn epd(&self) -> &Epd {
        match self {
            ConversionOutcome::Complete(epd) | ConversionOutcome::MappingIncomplete { epd, .. } => {
                epd
            }
        }
    }

    pub fn into_epd(self) -> Epd {
        match self {
            ConversionOutcome::Complete(epd) | ConversionOutcome::MappingIncomplete { epd, .. } => {
                epd
            }
        }
    }

    /// One line per problem, for logs and error messages.
    pub fn problems(&self) -> Vec<String> {
        match self {
            ConversionOutcome::Complete(_) => Vec::new(),
            ConversionOutcome::MappingIncomplete {
                missing_fields,
                unit_errors,
                ..
            } => missing_fields
                .iter()
                .map(|field| format!("missing {field}"))
                .chain(unit_errors.iter().map(UnitMappingError::to_string))
                .collect(),
        }
    }
}

/// Converts readers into openEPD declarations.
#[derive(Debug, Clone)]
pub struct Mapper {
    options: ConversionOptions,
}

/// Problems collected while mapping.
#[derive(Default)]
struct Collected {
    unit_errors: Vec<UnitMappingError>,
    derived: Vec<String>,
}

impl Mapper {
    pub fn new(options: ConversionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    #[instrument(level = "debug", skip_all, fields(dataset = %reader.own_reference(), dialect = %self.options.dialect))]
    pub fn convert(&self, reader: &EpdReader<'_>, langs: &LangPreference) -> Result<ConversionOutcome> {
        let base_url = self.options.base_url.as_deref();
        let provider = self.options.provider.as_str();
        let rules = reader.rules();
        let units = UnitConverter::new(rules.unit_spellings());
        let mut collected = Collected::default();
        let mut epd = Epd::default();

        let own_reference = reader.own_reference();
        let mut ext = IlcdEpdExtension {
            dataset_type: Some(dataset_type(reader).to_string()),
            dataset_uuid: reader.uuid(),
            dataset_version: reader.version(),
            dialect: Some(self.options.dialect.clone()),
            ..IlcdEpdExtension::default()
        };
        epd.language = reader.document_language(langs);

        epd.name = match (
            reader.product_name(langs),
            reader.quantitative_properties(langs),
        ) {
            (Some(name), Some(properties)) => Some(format!("{name}; {properties}")),
            (name, _) => name,
        };
        epd.description = reader.description(langs);
        epd.date_published = reader.publication_date()?;
        epd.valid_until = reader.valid_until()?;
        epd.program_operator_doc_id = reader.program_operator_doc_id();

        if let Some(base_url) = base_url {
            epd.attachments.insert(
                ILCD_ATTACHMENT.to_string(),
                own_reference.to_url(Some(base_url)),
            );
        }
        epd.declaration_url = reader.declaration_url(langs, base_url)?;

        epd.manufacturer = reader
            .manufacturer()?
            .map(|contact| contact.to_org(langs, base_url, provider));
        epd.program_operator = match reader.program_operator()? {
            Some(contact) => Some(contact.to_org(langs, base_url, provider)),
            None if rules.operator() == OperatorRule::ShortDescriptionFallback => reader
                .program_operator_name()
                .map(|name| Org {
                    name: Some(name),
                    ..Org::default()
                }),
            None => None,
        };
        if let Some(verifier) = reader.verifier()? {
            if rules.verifier() == VerifierRule::PersonEmail {
                epd.third_party_verifier_email = verifier.email();
            }
            epd.third_party_verifier = Some(verifier.to_org(langs, base_url, provider));
        }
        epd.pcr = match reader.pcr()? {
            Some(pcr) => Some(pcr.to_pcr(langs, base_url, provider)?),
            None => None,
        };
        epd.compliance = reader
            .compliance()?
            .iter()
            .map(|compliance| compliance.to_compliance(langs, base_url))
            .collect();
        ext.validations = reader.validations(langs, base_url, provider)?;

        let classifications = reader.product_classes();
        epd.product_class = render_product_classes(&classifications, rules.product_class());
        let categories = map_categories(&classifications, rules.category());
        epd.category = categories.categories;
        ext.unknown_classification = categories.unknown;

        if let Some(quantity) = reader.declared_unit()? {
            match units.convert(quantity.value, &quantity.unit, "declared_unit") {
                Ok((qty, unit)) => {
                    epd.declared_unit = Some(Amount {
                        qty,
                        unit: unit.to_string(),
                    })
                }
                Err(err) => collected.unit_errors.push(err),
            }
        }
        epd.specs = product_specs(reader, langs)?;

        let scenarios = reader.scenarios(langs);
        let scope_sets = reader.scope_sets();
        epd.impacts = indicator_set(
            IndicatorGroup::Impacts,
            scope_sets.lcia_results()?,
            &scenarios,
            &units,
            &mut collected,
        );
        epd.resource_uses = indicator_set(
            IndicatorGroup::ResourceUses,
            scope_sets.exchanges(IndicatorGroup::ResourceUses)?,
            &scenarios,
            &units,
            &mut collected,
        );
        epd.output_flows = indicator_set(
            IndicatorGroup::OutputFlows,
            scope_sets.exchanges(IndicatorGroup::OutputFlows)?,
            &scenarios,
            &units,
            &mut collected,
        );

        ext.derived_fields = collected.derived;
        epd.ext.insert(EXTENSION_NAME.to_string(), ext);

        let mut missing_fields = Vec::new();
        if epd.name.is_none() {
            missing_fields.push(REQUIRED_FIELDS[0].to_string());
        }
        if epd.declared_unit.is_none() {
            missing_fields.push(REQUIRED_FIELDS[1].to_string());
        }
        if missing_fields.is_empty() && collected.unit_errors.is_empty() {
            debug!("conversion complete");
            return Ok(ConversionOutcome::Complete(epd));
        }
        warn!(
            missing = ?missing_fields,
            unit_errors = collected.unit_errors.len(),
            "conversion incomplete"
        );
        Ok(ConversionOutcome::MappingIncomplete {
            epd,
            missing_fields,
            unit_errors: collected.unit_errors,
        })
    }
}

fn dataset_type(reader: &EpdReader<'_>) -> &'static str {
    if reader.is_industry_epd() {
        "industry EPD"
    } else if reader.is_epd() {
        "EPD"
    } else {
        "process"
    }
}

/// `product_class` entries. Every classification contributes an `ilcd`
/// entry (`<leaf id> <path>`, last system wins); OEKOBAU.DAT and IBU
/// classifications get their own keys.
pub fn render_product_classes(
    classifications: &[(String, Vec<ProductClass>)],
    rule: ClassRule,
) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for (system, classes) in classifications {
        let Some(leaf) = classes.last() else {
            continue;
        };
        let names: Vec<&str> = classes
            .iter()
            .filter_map(|class| class.name.as_deref())
            .collect();
        let leaf_id = leaf.id.as_deref().unwrap_or_default();
        match system.to_lowercase().as_str() {
            "oekobau.dat" => {
                let value = match rule {
                    ClassRule::IdAndName => {
                        format!("{leaf_id} {}", leaf.name.as_deref().unwrap_or_default())
                    }
                    ClassRule::Generic => leaf_id.to_string(),
                };
                let value = value.trim();
                if !value.is_empty() {
                    result.insert("oekobau.dat".to_string(), value.to_string());
                }
            }
            "ibucategories" => {
                result.insert("IBU".to_string(), names.join(" >> "));
            }
            _ => {}
        }
        let ilcd = format!("{leaf_id} {}", names.join(" / "));
        result.insert(EXTENSION_NAME.to_string(), ilcd.trim().to_string());
    }
    result
}

/// `specs.ext.ilcd`: MatML properties and further flow properties as
/// `<value> <unit>` strings.
fn product_specs(reader: &EpdReader<'_>, langs: &LangPreference) -> Result<Option<Specs>> {
    let mut properties = BTreeMap::new();
    if let Some(material) = reader.material()? {
        for (name, property) in &material.properties {
            properties.insert(name.clone(), property.to_unit_string());
        }
    }
    for (name, quantity) in reader.product_flow_properties(langs)? {
        properties.insert(name, format!("{} {}", quantity.value, quantity.unit).trim().to_string());
    }
    if properties.is_empty() {
        return Ok(None);
    }
    let mut specs = Specs::default();
    specs.ext.insert(EXTENSION_NAME.to_string(), properties);
    Ok(Some(specs))
}

fn indicator_set(
    group: IndicatorGroup,
    raw: Vec<RawIndicator>,
    scenarios: &BTreeMap<String, String>,
    units: &UnitConverter,
    collected: &mut Collected,
) -> Option<IndicatorSet> {
    let mut set = IndicatorSet::default();
    for indicator in raw {
        let field = format!("{}.{}", group.name(), indicator.name.as_str());
        let canonical = match units.canonical(&indicator.unit) {
            Some(canonical) => canonical,
            None => {
                collected.unit_errors.push(UnitMappingError {
                    field,
                    unit: indicator.unit,
                });
                continue;
            }
        };
        let scope_set = scope_set(&indicator, canonical.factor, canonical.symbol, scenarios);
        if scope_set.is_empty() {
            continue;
        }
        let target = match &indicator.name {
            IndicatorName::Known(name) => set.indicators.entry((*name).to_string()),
            IndicatorName::Other(name) => set.ext.entry(name.clone()),
        };
        match target {
            Entry::Vacant(entry) => {
                entry.insert(scope_set);
            }
            Entry::Occupied(_) => {
                debug!(indicator = %field, "duplicate indicator ignored");
            }
        }
    }

    for (name, scope_set) in &mut set.indicators {
        if derive_total(scope_set) {
            collected
                .derived
                .push(format!("{}.{name}.{TOTAL_STAGE}", group.name()));
        }
    }

    (!set.is_empty()).then_some(set)
}

/// Splits amounts into stages, end-of-life scenarios and extension values.
/// Scenario amounts count only for end-of-life stages of a declared
/// scenario; other scenario amounts go to `ext` as `<stage>/<scenario>`.
fn scope_set(
    indicator: &RawIndicator,
    factor: f64,
    unit: &str,
    scenarios: &BTreeMap<String, String>,
) -> ScopeSet {
    let mut scope_set = ScopeSet::default();
    let mut by_scenario: BTreeMap<&str, BTreeMap<String, Measurement>> = BTreeMap::new();
    for amount in &indicator.amounts {
        let measurement = Measurement {
            mean: amount.value * factor,
            unit: unit.to_string(),
        };
        match amount.scenario.as_deref() {
            Some(scenario)
                if SCENARIO_STAGES.contains(&amount.stage.as_str())
                    && scenarios.contains_key(scenario) =>
            {
                by_scenario
                    .entry(scenario)
                    .or_default()
                    .insert(amount.stage.clone(), measurement);
            }
            Some(scenario) => {
                scope_set
                    .ext
                    .insert(format!("{}/{scenario}", amount.stage), measurement);
            }
            None if STAGES.contains(&amount.stage.as_str()) => {
                scope_set.stages.insert(amount.stage.clone(), measurement);
            }
            None => {
                scope_set.ext.insert(amount.stage.clone(), measurement);
            }
        }
    }
    scope_set.scenarios = by_scenario
        .into_iter()
        .map(|(scenario, stages)| EolScenario {
            name: scenarios
                .get(scenario)
                .cloned()
                .unwrap_or_else(|| scenario.to_string()),
            stages,
        })
        .collect();
    scope_set
}

/// Adds `A1A2A3 = A1 + A2 + A3` when the total is absent and all parts
/// share one unit.
fn derive_total(scope_set: &mut ScopeSet) -> bool {
    if scope_set.stages.contains_key(TOTAL_STAGE) {
        return false;
    }
    let parts: Option<Vec<&Measurement>> = TOTAL_PARTS
        .iter()
        .map(|stage| scope_set.stages.get(*stage))
        .collect();
    let Some(parts) = parts else {
        return false;
    };
    let unit = parts[0].unit.clone();
    if parts.iter().any(|part| part.unit != unit) {
        return false;
    }
    let mean: f64 = parts.iter().map(|part| part.mean).sum();
    scope_set
        .stages
        .insert(TOTAL_STAGE.to_string(), Measurement { mean, unit });
    true
}
