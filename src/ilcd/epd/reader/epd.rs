//! Reader for ILCD+EPD process datasets.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::ilcd::epd::dialect::rules::{
    DateRule, Field, LanguageRule, RuleSet, ScenarioRule, UrlRule,
};
use crate::ilcd::epd::error::{IlcdError, Result};
use crate::ilcd::epd::medium::Attachment;
use crate::ilcd::epd::model::openepd::Validation;
use crate::ilcd::epd::model::{DatasetRef, DatasetType, Lang, LangPreference, ProductClass, Quantity};
use crate::ilcd::epd::reader::contact::ContactReader;
use crate::ilcd::epd::reader::flow::FlowReader;
use crate::ilcd::epd::reader::material::MatMlMaterial;
use crate::ilcd::epd::reader::scope_set::ScopeSetReader;
use crate::ilcd::epd::reader::source::{ComplianceReader, PcrReader, SourceReader};
use crate::ilcd::epd::reader::{Dataset, ReaderContext, parse_text};

const DATA_SET_INFO: &str = "process:processInformation/process:dataSetInformation";
const TIME: &str = "process:processInformation/process:time";
const PUBLICATION: &str = "process:administrativeInformation/process:publicationAndOwnership";
const LCI_METHOD: &str = "process:modellingAndValidation/process:LCIMethodAndAllocation";
const DATA_SOURCES: &str =
    "process:modellingAndValidation/process:dataSourcesTreatmentAndRepresentativeness";
const REVIEW: &str = "process:modellingAndValidation/process:validation/process:review";
const PUBLICATION_DATE: &str = "process:processInformation/process:time/common:other/epd2019:publicationDateOfEPD";
const TIME_DESCRIPTION_DELIMITER: &str = "\r\n";

/// The reference exchange of the process with its flow.
#[derive(Clone)]
pub struct ProductFlow<'c> {
    pub mean_amount: Option<f64>,
    pub flow: FlowReader<'c>,
}

/// Typed accessors over one EPD process dataset, with the extraction rules
/// of the effective dialect.
pub struct EpdReader<'c> {
    dataset: Dataset<'c>,
    rules: RuleSet,
}

impl<'c> EpdReader<'c> {
    pub fn new(dataset: Dataset<'c>, rules: RuleSet) -> Self {
        Self { dataset, rules }
    }

    /// Opens `reference`, or the medium's default process when `None`: the
    /// process a remote pointer names, else the first listed process.
    pub fn open(
        context: &'c ReaderContext,
        reference: Option<&DatasetRef>,
        rules: RuleSet,
    ) -> Result<Self> {
        let reference = match reference {
            Some(reference) => reference.clone(),
            None => default_process(context)?,
        };
        Ok(Self::new(context.open_root(&reference)?, rules))
    }

    pub fn dataset(&self) -> &Dataset<'c> {
        &self.dataset
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Languages of the product name, in document order.
    pub fn supported_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = Vec::new();
        for language in self
            .dataset
            .root()
            .find_localized(&format!("{DATA_SET_INFO}/process:name/process:baseName"))
            .languages()
        {
            if !languages.iter().any(|known| known == language) {
                languages.push(language.to_string());
            }
        }
        languages
    }

    /// Preference list for a conversion. A requested language must be
    /// supported by the document. Without a request the first supported
    /// language is used, with English ahead of it when available.
    pub fn language_preference(&self, requested: Option<&str>) -> Result<LangPreference> {
        let supported = self.supported_languages();
        if let Some(requested) = requested {
            let requested = requested.trim().to_ascii_lowercase();
            if !supported.is_empty() && !supported.contains(&requested) {
                return Err(IlcdError::UnsupportedLanguage {
                    requested,
                    available: supported,
                });
            }
            return Ok(LangPreference::prefer(&requested));
        }
        let Some(first) = supported.first() else {
            return Ok(LangPreference::any());
        };
        let mut langs = Vec::new();
        if first != "en" && supported.iter().any(|lang| lang == "en") {
            langs.push(Lang::Code("en".to_string()));
        }
        langs.push(Lang::Code(first.clone()));
        langs.push(Lang::Any);
        Ok(LangPreference::new(langs))
    }

    pub fn uuid(&self) -> Option<String> {
        self.dataset.text(&format!("{DATA_SET_INFO}/common:UUID"))
    }

    pub fn version(&self) -> Option<String> {
        self.dataset
            .text(&format!("{PUBLICATION}/common:dataSetVersion"))
    }

    pub fn own_reference(&self) -> DatasetRef {
        match self.uuid() {
            Some(uuid) => DatasetRef::process(uuid, self.version()),
            None => self.dataset.reference().clone(),
        }
    }

    pub fn permanent_uri(&self) -> Option<String> {
        self.dataset
            .text(&format!("{PUBLICATION}/common:permanentDataSetURI"))
    }

    pub fn is_epd(&self) -> bool {
        self.dataset
            .text(&format!("{LCI_METHOD}/process:typeOfDataSet"))
            .is_some_and(|kind| kind == "EPD")
    }

    pub fn is_industry_epd(&self) -> bool {
        self.dataset
            .text(&format!("{LCI_METHOD}/common:other/epd2013:subType"))
            .is_some_and(|kind| kind == "average dataset")
    }

    pub fn product_name(&self, langs: &LangPreference) -> Option<String> {
        self.dataset
            .localized(self.rules.path(Field::ProductName), langs)
    }

    pub fn quantitative_properties(&self, langs: &LangPreference) -> Option<String> {
        self.dataset
            .localized(self.rules.path(Field::QuantitativeProperties), langs)
    }

    pub fn description(&self, langs: &LangPreference) -> Option<String> {
        self.dataset
            .localized(self.rules.path(Field::Description), langs)
    }

    pub fn program_operator_doc_id(&self) -> Option<String> {
        self.dataset
            .text(self.rules.path(Field::ProgramOperatorDocId))
    }

    pub fn publication_date(&self) -> Result<Option<NaiveDate>> {
        self.date_by_rule(Field::PublicationDate, DateRule::Publication)
    }

    pub fn valid_until(&self) -> Result<Option<NaiveDate>> {
        self.date_by_rule(Field::ValidUntil, DateRule::ValidUntil)
    }

    fn date_by_rule(&self, field: Field, standard: DateRule) -> Result<Option<NaiveDate>> {
        if let DateRule::TimeDescriptionLine(line) = self.rules.date(field) {
            if let Some(date) = self.time_description_date(line) {
                return Ok(Some(date));
            }
            debug!(%field, line, "no date in time description, using standard rule");
        }
        match standard {
            DateRule::ValidUntil => self.standard_valid_until(),
            _ => self.standard_publication_date(),
        }
    }

    fn standard_publication_date(&self) -> Result<Option<NaiveDate>> {
        if let Some(date) = self.dataset.date(PUBLICATION_DATE)? {
            return Ok(Some(date));
        }
        let year = self
            .dataset
            .parse::<i32>(&format!("{TIME}/common:referenceYear"))?;
        Ok(year.and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)))
    }

    fn standard_valid_until(&self) -> Result<Option<NaiveDate>> {
        let Some(year) = self
            .dataset
            .parse::<i32>(&format!("{TIME}/common:dataSetValidUntil"))?
        else {
            return Ok(None);
        };
        let published = self.dataset.date(PUBLICATION_DATE)?;
        Ok(published
            .and_then(|date| date.with_year(year))
            .or_else(|| NaiveDate::from_ymd_opt(year, 1, 1)))
    }

    /// Last token of one line of the time representativeness description,
    /// e.g. `Valid until: 2027-05-01`.
    fn time_description_date(&self, line: usize) -> Option<NaiveDate> {
        let description = self.dataset.localized(
            &format!("{TIME}/common:timeRepresentativenessDescription"),
            &LangPreference::prefer("en"),
        )?;
        if !description.contains(TIME_DESCRIPTION_DELIMITER) {
            return None;
        }
        let segment = description.split(TIME_DESCRIPTION_DELIMITER).nth(line)?;
        let token = segment.trim().rsplit(' ').next()?.trim();
        NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
    }

    fn contact_at(&self, path: &str) -> Result<Option<ContactReader<'c>>> {
        Ok(self.dataset.resolve_at(path)?.map(ContactReader::new))
    }

    pub fn manufacturer(&self) -> Result<Option<ContactReader<'c>>> {
        self.contact_at(&format!("{PUBLICATION}/common:referenceToOwnershipOfDataSet"))
    }

    pub fn program_operator(&self) -> Result<Option<ContactReader<'c>>> {
        self.contact_at(&format!("{PUBLICATION}/common:referenceToRegistrationAuthority"))
    }

    /// Short description of the registration authority reference, English
    /// first.
    pub fn program_operator_name(&self) -> Option<String> {
        self.dataset.localized(
            &format!("{PUBLICATION}/common:referenceToRegistrationAuthority/common:shortDescription"),
            &LangPreference::prefer("en"),
        )
    }

    /// Language of the declaration according to the dialect's rule.
    pub fn document_language(&self, langs: &LangPreference) -> Option<String> {
        if let LanguageRule::OriginalEpdSuffix(code) = self.rules.language() {
            let title = self.dataset.localized(
                &format!("{DATA_SOURCES}/common:other/epd2019:referenceToOriginalEPD/common:shortDescription"),
                &LangPreference::prefer("en"),
            );
            let suffix = format!("-{code}");
            if title.is_some_and(|title| title.trim().to_lowercase().ends_with(&suffix)) {
                return Some(code.to_string());
            }
        }
        langs.primary().map(str::to_string)
    }

    /// First reviewer of the dataset.
    pub fn verifier(&self) -> Result<Option<ContactReader<'c>>> {
        self.contact_at(&format!("{REVIEW}/common:referenceToNameOfReviewerAndInstitution"))
    }

    pub fn pcr(&self) -> Result<Option<PcrReader<'c>>> {
        Ok(self
            .dataset
            .resolve_at(&format!("{LCI_METHOD}/process:referenceToLCAMethodDetails"))?
            .map(PcrReader::new))
    }

    /// Compliance systems the dataset declares, in document order.
    pub fn compliance(&self) -> Result<Vec<ComplianceReader<'c>>> {
        let mut result = Vec::new();
        for element in self.dataset.root().find_all(
            "process:modellingAndValidation/process:complianceDeclarations/process:compliance/common:referenceToComplianceSystem",
        ) {
            if let Some(dataset) = self.dataset.resolve(element)? {
                result.push(ComplianceReader::new(dataset));
            }
        }
        Ok(result)
    }

    /// Reviews with a resolvable reviewer, as openEPD validations.
    pub fn validations(
        &self,
        langs: &LangPreference,
        base_url: Option<&str>,
        provider: &str,
    ) -> Result<Vec<Validation>> {
        let mut result = Vec::new();
        for review in self.dataset.root().find_all(REVIEW) {
            let Some(reviewer) = review.find("common:referenceToNameOfReviewerAndInstitution")
            else {
                continue;
            };
            let Some(dataset) = self.dataset.resolve(reviewer)? else {
                continue;
            };
            result.push(Validation {
                validation_type: review.attr("type").map(str::to_string),
                org: ContactReader::new(dataset).to_org(langs, base_url, provider),
            });
        }
        Ok(result)
    }

    /// Classification systems with their class paths, in document order.
    pub fn product_classes(&self) -> Vec<(String, Vec<ProductClass>)> {
        self.dataset
            .root()
            .find_all(&format!(
                "{DATA_SET_INFO}/process:classificationInformation/common:classification"
            ))
            .into_iter()
            .map(|classification| {
                let system = classification.attr("name").unwrap_or("unknown").to_string();
                let classes = classification
                    .find_all("common:class")
                    .into_iter()
                    .map(|class| ProductClass {
                        id: class
                            .attr("classId")
                            .map(str::trim)
                            .filter(|id| !id.is_empty())
                            .map(str::to_string),
                        name: class.text().map(str::to_string),
                    })
                    .collect();
                (system, classes)
            })
            .collect()
    }

    /// Exchange named by `referenceToReferenceFlow`.
    pub fn product_flow(&self) -> Result<Option<ProductFlow<'c>>> {
        let Some(id) = self.dataset.parse::<u32>(
            "process:processInformation/process:quantitativeReference/process:referenceToReferenceFlow",
        )?
        else {
            return Ok(None);
        };
        let path = format!("process:exchanges/process:exchange[@dataSetInternalID='{id}']");
        let Some(exchange) = self.dataset.root().find(&path) else {
            return Ok(None);
        };
        let Some(reference) = exchange.find("process:referenceToFlowDataSet") else {
            return Ok(None);
        };
        let references = self.rules.flow_references();
        let Some(flow) = self.dataset.resolve_with(reference, references)? else {
            return Ok(None);
        };
        let mean_amount = parse_text::<f64>(
            exchange.find("process:meanAmount"),
            "process:exchange/process:meanAmount",
            self.dataset.reference(),
        )?;
        Ok(Some(ProductFlow {
            mean_amount,
            flow: FlowReader::new(flow).with_references(references),
        }))
    }

    /// Exchange amount × flow property mean value × unit mean value, in the
    /// reference unit of the reference flow property.
    pub fn declared_unit(&self) -> Result<Option<Quantity>> {
        let Some(product) = self.product_flow()? else {
            return Ok(None);
        };
        let Some(property) = product.flow.reference_property()? else {
            return Ok(None);
        };
        let Some(unit_group) = property.reader.unit_group()? else {
            return Ok(None);
        };
        let Some(unit) = unit_group.reference_unit(true)? else {
            return Ok(None);
        };
        Ok(Some(Quantity {
            value: product.mean_amount.unwrap_or(1.0)
                * property.mean_value.unwrap_or(1.0)
                * unit.mean_value,
            unit: unit.name,
        }))
    }

    /// Flow properties other than the reference one, keyed by lower-cased
    /// property name.
    pub fn product_flow_properties(
        &self,
        langs: &LangPreference,
    ) -> Result<BTreeMap<String, Quantity>> {
        let mut result = BTreeMap::new();
        let Some(product) = self.product_flow()? else {
            return Ok(result);
        };
        for property in product.flow.other_properties()? {
            let Some(unit_group) = property.reader.unit_group()? else {
                continue;
            };
            let Some(unit) = unit_group.reference_unit(false)? else {
                continue;
            };
            let Some(name) = property.reader.name(langs) else {
                continue;
            };
            result.insert(
                name.to_lowercase(),
                Quantity {
                    value: product.mean_amount.unwrap_or(1.0)
                        * property.mean_value.unwrap_or(1.0)
                        * unit.mean_value,
                    unit: unit.name,
                },
            );
        }
        Ok(result)
    }

    /// MatML document of the product flow.
    pub fn material(&self) -> Result<Option<MatMlMaterial>> {
        Ok(self
            .product_flow()?
            .and_then(|product| product.flow.material()))
    }

    /// Scenario names with their descriptions; a scenario without a
    /// description, or any scenario under [`ScenarioRule::NameOnly`], maps to
    /// its own name.
    pub fn scenarios(&self, langs: &LangPreference) -> BTreeMap<String, String> {
        let rule = self.rules.scenarios();
        self.dataset
            .root()
            .find_all(&format!(
                "{DATA_SET_INFO}/common:other/epd2013:scenarios/epd2013:scenario"
            ))
            .into_iter()
            .filter_map(|scenario| {
                let name = scenario.attr("epd2013:name")?.trim();
                if name.is_empty() {
                    return None;
                }
                if rule == ScenarioRule::NameOnly {
                    return Some((name.to_string(), name.to_string()));
                }
                let description = scenario
                    .find_localized("epd2013:description")
                    .resolve(langs)
                    .map(str::to_string)
                    .unwrap_or_else(|| name.to_string());
                Some((name.to_string(), description))
            })
            .collect()
    }

    /// LCIA results and exchanges of the process.
    pub fn scope_sets(&self) -> ScopeSetReader<'c> {
        ScopeSetReader::new(self.dataset.clone())
    }

    /// Source dataset holding the EPD document.
    pub fn original_epd(&self) -> Result<Option<SourceReader<'c>>> {
        Ok(self
            .dataset
            .resolve_at(&format!("{DATA_SOURCES}/common:other/epd2019:referenceToOriginalEPD"))?
            .map(SourceReader::new))
    }

    /// Bytes of the EPD document: the digital file of the original EPD
    /// source, else whatever the medium serves for the process.
    pub fn epd_document(&self) -> Result<Option<Vec<u8>>> {
        let medium = self.dataset.context().medium();
        if let Some(source) = self.original_epd()? {
            let reference = source.own_reference();
            for file in source.digital_files() {
                match medium.open_attachment(&reference, &Attachment::DigitalFile(file)) {
                    Ok(bytes) => return Ok(Some(bytes)),
                    Err(err) if err.is_not_found() => continue,
                    Err(err) => return Err(err),
                }
            }
        }
        match medium.open_attachment(&self.own_reference(), &Attachment::EpdDocument) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Declaration URL according to the dialect's rule; falls back to the
    /// dataset URL on `base_url`.
    pub fn declaration_url(
        &self,
        langs: &LangPreference,
        base_url: Option<&str>,
    ) -> Result<Option<String>> {
        if let UrlRule::DataSourceDescription(marker) = self.rules.declaration_url() {
            for element in self
                .dataset
                .root()
                .find_all(&format!("{DATA_SOURCES}/process:referenceToDataSource"))
            {
                let Some(source) = self.dataset.resolve(element)? else {
                    continue;
                };
                let description = SourceReader::new(source).description(langs);
                if let Some(url) = description.filter(|text| text.contains(marker)) {
                    return Ok(Some(url.trim().to_string()));
                }
            }
        }
        Ok(base_url.map(|base_url| self.own_reference().to_url(Some(base_url))))
    }
}

fn default_process(context: &ReaderContext) -> Result<DatasetRef> {
    let medium = context.medium();
    if let Some(reference) = medium.default_process() {
        return Ok(reference);
    }
    medium
        .list(DatasetType::Process)?
        .into_iter()
        .next()
        .ok_or_else(|| IlcdError::NotFound(format!("no process dataset in {}", medium.describe())))
}
