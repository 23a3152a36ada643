//! Extraction rules as a capability table.
//!
//! Every overridable field has exactly one rule in the base table. A dialect
//! supplies replacements for some fields; a replacement must be of the same
//! [`RuleKind`] as the rule it replaces, so the accessor contract of the
//! reader never changes.

use std::collections::BTreeMap;
use std::fmt;

use crate::ilcd::epd::error::{IlcdError, Result};

/// Fields whose extraction a dialect may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    ProductName,
    QuantitativeProperties,
    Description,
    PublicationDate,
    ValidUntil,
    ProgramOperatorDocId,
    ProductClass,
    CategoryCode,
    Verifier,
    DeclarationUrl,
    UnitSpellings,
    ProgramOperator,
    DocumentLanguage,
    FlowReferences,
    Scenarios,
}

impl Field {
    pub const ALL: [Field; 15] = [
        Field::ProductName,
        Field::QuantitativeProperties,
        Field::Description,
        Field::PublicationDate,
        Field::ValidUntil,
        Field::ProgramOperatorDocId,
        Field::ProductClass,
        Field::CategoryCode,
        Field::Verifier,
        Field::DeclarationUrl,
        Field::UnitSpellings,
        Field::ProgramOperator,
        Field::DocumentLanguage,
        Field::FlowReferences,
        Field::Scenarios,
    ];

    /// Kind of rule the field is extracted with.
    pub fn kind(self) -> RuleKind {
        match self {
            Field::ProductName
            | Field::QuantitativeProperties
            | Field::Description
            | Field::ProgramOperatorDocId => RuleKind::Path,
            Field::PublicationDate | Field::ValidUntil => RuleKind::Date,
            Field::ProductClass => RuleKind::ClassRendering,
            Field::CategoryCode => RuleKind::CategoryVocabulary,
            Field::Verifier => RuleKind::VerifierRendering,
            Field::DeclarationUrl => RuleKind::Url,
            Field::UnitSpellings => RuleKind::UnitTable,
            Field::ProgramOperator => RuleKind::Organisation,
            Field::DocumentLanguage => RuleKind::Language,
            Field::FlowReferences => RuleKind::Reference,
            Field::Scenarios => RuleKind::Scenario,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::ProductName => "product_name",
            Field::QuantitativeProperties => "quantitative_properties",
            Field::Description => "description",
            Field::PublicationDate => "publication_date",
            Field::ValidUntil => "valid_until",
            Field::ProgramOperatorDocId => "program_operator_doc_id",
            Field::ProductClass => "product_class",
            Field::CategoryCode => "category_code",
            Field::Verifier => "verifier",
            Field::DeclarationUrl => "declaration_url",
            Field::UnitSpellings => "unit_spellings",
            Field::ProgramOperator => "program_operator",
            Field::DocumentLanguage => "document_language",
            Field::FlowReferences => "flow_references",
            Field::Scenarios => "scenarios",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Path,
    Date,
    UnitTable,
    CategoryVocabulary,
    VerifierRendering,
    ClassRendering,
    Url,
    Organisation,
    Language,
    Reference,
    Scenario,
}

/// How a date is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRule {
    /// `epd2019:publicationDateOfEPD`, else `common:referenceYear` as 1 January.
    Publication,
    /// `common:dataSetValidUntil` combined with the publication month and day.
    ValidUntil,
    /// Last token of one CRLF separated line of the time representativeness
    /// description; falls back to the standard rule of the field.
    TimeDescriptionLine(usize),
}

/// How classification codes are read before the category lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryRule {
    Verbatim,
    /// For the named classification system, codes written as `<code> <name>`
    /// are reduced to `<code>`.
    LeadingToken(&'static str),
}

/// How the third party verifier is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierRule {
    Organisation,
    /// The reviewer contact is a person; its e-mail is emitted as well.
    PersonEmail,
}

/// How `product_class` entries are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRule {
    Generic,
    /// The OEKOBAU.DAT entry becomes `<id> <name>` of the leaf class.
    IdAndName,
}

/// Where the declaration URL comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlRule {
    /// URL of the dataset itself on the medium.
    OwnReference,
    /// Description of the referenced data source, when it contains `marker`.
    DataSourceDescription(&'static str),
}

/// How the program operator is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorRule {
    /// The registration authority contact.
    Contact,
    /// Without a resolvable contact, the `shortDescription` of the
    /// registration authority reference names the operator.
    ShortDescriptionFallback,
}

/// How the `language` of the declaration is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageRule {
    /// First language of the preference list.
    Preference,
    /// The given code when the original EPD reference's short description
    /// ends in `-<code>`.
    OriginalEpdSuffix(&'static str),
}

/// How the references of the product flow are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceRule {
    /// `refObjectId`, with the `uri` file name as fallback.
    ObjectId,
    /// The `uri` file name, with `refObjectId` as fallback.
    Uri,
}

/// What a scenario maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioRule {
    /// Its description, else its name.
    Description,
    /// Its name.
    NameOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Path(&'static str),
    Date(DateRule),
    /// Provider spelling to canonical unit symbol.
    Units(&'static [(&'static str, &'static str)]),
    Categories(CategoryRule),
    Verifier(VerifierRule),
    ProductClass(ClassRule),
    Url(UrlRule),
    Operator(OperatorRule),
    Language(LanguageRule),
    References(ReferenceRule),
    Scenarios(ScenarioRule),
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Path(_) => RuleKind::Path,
            Rule::Date(_) => RuleKind::Date,
            Rule::Units(_) => RuleKind::UnitTable,
            Rule::Categories(_) => RuleKind::CategoryVocabulary,
            Rule::Verifier(_) => RuleKind::VerifierRendering,
            Rule::ProductClass(_) => RuleKind::ClassRendering,
            Rule::Url(_) => RuleKind::Url,
            Rule::Operator(_) => RuleKind::Organisation,
            Rule::Language(_) => RuleKind::Language,
            Rule::References(_) => RuleKind::Reference,
            Rule::Scenarios(_) => RuleKind::Scenario,
        }
    }
}

pub const PRODUCT_NAME_PATH: &str =
    "process:processInformation/process:dataSetInformation/process:name/process:baseName";
pub const QUANTITATIVE_PROPERTIES_PATH: &str = "process:processInformation/process:dataSetInformation/process:name/process:functionalUnitFlowProperties";
pub const DESCRIPTION_PATH: &str =
    "process:processInformation/process:dataSetInformation/common:generalComment";
pub const REGISTRATION_NUMBER_PATH: &str =
    "process:administrativeInformation/process:publicationAndOwnership/common:registrationNumber";

fn base_rule(field: Field) -> Rule {
    match field {
        Field::ProductName => Rule::Path(PRODUCT_NAME_PATH),
        Field::QuantitativeProperties => Rule::Path(QUANTITATIVE_PROPERTIES_PATH),
        Field::Description => Rule::Path(DESCRIPTION_PATH),
        Field::PublicationDate => Rule::Date(DateRule::Publication),
        Field::ValidUntil => Rule::Date(DateRule::ValidUntil),
        Field::ProgramOperatorDocId => Rule::Path(REGISTRATION_NUMBER_PATH),
        Field::ProductClass => Rule::ProductClass(ClassRule::Generic),
        Field::CategoryCode => Rule::Categories(CategoryRule::Verbatim),
        Field::Verifier => Rule::Verifier(VerifierRule::Organisation),
        Field::DeclarationUrl => Rule::Url(UrlRule::OwnReference),
        Field::UnitSpellings => Rule::Units(&[]),
        Field::ProgramOperator => Rule::Operator(OperatorRule::Contact),
        Field::DocumentLanguage => Rule::Language(LanguageRule::Preference),
        Field::FlowReferences => Rule::References(ReferenceRule::ObjectId),
        Field::Scenarios => Rule::Scenarios(ScenarioRule::Description),
    }
}

/// Effective rules of one reader: the base table with a dialect's
/// overrides applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<Field, Rule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::base()
    }
}

impl RuleSet {
    pub fn base() -> Self {
        let rules = Field::ALL
            .iter()
            .map(|field| (*field, base_rule(*field)))
            .collect();
        Self { rules }
    }

    /// Applies overrides, rejecting any whose kind differs from the field's.
    pub fn with_overrides(dialect: &str, overrides: &[(Field, Rule)]) -> Result<Self> {
        let mut set = Self::base();
        for (field, rule) in overrides {
            if rule.kind() != field.kind() {
                return Err(IlcdError::InvalidOverride {
                    dialect: dialect.to_string(),
                    field: field.to_string(),
                });
            }
            set.rules.insert(*field, *rule);
        }
        Ok(set)
    }

    pub fn get(&self, field: Field) -> Rule {
        self.rules
            .get(&field)
            .copied()
            .unwrap_or_else(|| base_rule(field))
    }

    /// Path rule of a field, falling back to the base path.
    pub fn path(&self, field: Field) -> &'static str {
        match (self.get(field), base_rule(field)) {
            (Rule::Path(path), _) | (_, Rule::Path(path)) => path,
            _ => "",
        }
    }

    pub fn date(&self, field: Field) -> DateRule {
        match self.get(field) {
            Rule::Date(rule) => rule,
            _ => DateRule::Publication,
        }
    }

    pub fn category(&self) -> CategoryRule {
        match self.get(Field::CategoryCode) {
            Rule::Categories(rule) => rule,
            _ => CategoryRule::Verbatim,
        }
    }

    pub fn verifier(&self) -> VerifierRule {
        match self.get(Field::Verifier) {
            Rule::Verifier(rule) => rule,
            _ => VerifierRule::Organisation,
        }
    }

    pub fn product_class(&self) -> ClassRule {
        match self.get(Field::ProductClass) {
            Rule::ProductClass(rule) => rule,
            _ => ClassRule::Generic,
        }
    }

    pub fn declaration_url(&self) -> UrlRule {
        match self.get(Field::DeclarationUrl) {
            Rule::Url(rule) => rule,
            _ => UrlRule::OwnReference,
        }
    }

    pub fn unit_spellings(&self) -> &'static [(&'static str, &'static str)] {
        match self.get(Field::UnitSpellings) {
            Rule::Units(table) => table,
            _ => &[],
        }
    }

    pub fn operator(&self) -> OperatorRule {
        match self.get(Field::ProgramOperator) {
            Rule::Operator(rule) => rule,
            _ => OperatorRule::Contact,
        }
    }

    pub fn language(&self) -> LanguageRule {
        match self.get(Field::DocumentLanguage) {
            Rule::Language(rule) => rule,
            _ => LanguageRule::Preference,
        }
    }

    pub fn flow_references(&self) -> ReferenceRule {
        match self.get(Field::FlowReferences) {
            Rule::References(rule) => rule,
            _ => ReferenceRule::ObjectId,
        }
    }

    pub fn scenarios(&self) -> ScenarioRule {
        match self.get(Field::Scenarios) {
            Rule::Scenarios(rule) => rule,
            _ => ScenarioRule::Description,
        }
    }

    /// Fields whose rule differs from the base table.
    pub fn overridden(&self) -> Vec<Field> {
        self.rules
            .iter()
            .filter(|(field, rule)| **rule != base_rule(**field))
            .map(|(field, _)| *field)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_table_covers_every_field_with_matching_kinds() {
        let set = RuleSet::base();
        for field in Field::ALL {
            assert_eq!(set.get(field).kind(), field.kind(), "{field}");
        }
        assert!(set.overridden().is_empty());
    }

    #[test]
    fn overrides_replace_rules_of_the_same_kind() {
        let set = RuleSet::with_overrides(
            "custom",
            &[(Field::PublicationDate, Rule::Date(DateRule::TimeDescriptionLine(0)))],
        )
        .expect("override accepted");
        assert_eq!(
            set.date(Field::PublicationDate),
            DateRule::TimeDescriptionLine(0)
        );
        assert_eq!(set.date(Field::ValidUntil), DateRule::ValidUntil);
        assert_eq!(set.overridden(), vec![Field::PublicationDate]);
    }

    #[test]
    fn overrides_of_another_kind_are_rejected() {
        let err = RuleSet::with_overrides("broken", &[(Field::ProductName, Rule::Date(DateRule::Publication))])
            .expect_err("override rejected");
        assert!(matches!(
            err,
            IlcdError::InvalidOverride { ref dialect, ref field } if dialect == "broken" && field == "product_name"
        ));
    }
}
