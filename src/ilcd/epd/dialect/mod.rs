//! Provider dialects of ILCD+EPD and their detection.
//!
//! A dialect is a name, a recognition predicate and a set of rule
//! overrides. The registry resolves the overrides into an effective
//! [`RuleSet`] when a dialect is registered, so invalid overrides are
//! rejected before any document is read.

pub mod rules;

use serde::Serialize;
use tracing::debug;

use crate::ilcd::epd::error::{IlcdError, Result};
use rules::{
    CategoryRule, ClassRule, DateRule, Field, LanguageRule, OperatorRule, ReferenceRule, Rule,
    RuleSet, ScenarioRule, UrlRule, VerifierRule,
};

/// Name reported when no dialect matches.
pub const GENERIC: &str = "generic";

/// A provider specific variant of ILCD+EPD.
#[derive(Debug, Clone)]
pub struct Dialect {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    /// Case-insensitive substrings of source URLs and permanent dataset
    /// URIs that identify the provider.
    pub url_markers: &'static [&'static str],
    /// Classification system names only this provider uses.
    pub classification_systems: &'static [&'static str],
    pub overrides: Vec<(Field, Rule)>,
}

impl Dialect {
    pub fn environdec() -> Self {
        Self {
            name: "environdec",
            aliases: &["international-epd", "epd-international"],
            description: "International EPD System",
            url_markers: &["environdec"],
            classification_systems: &[],
            overrides: vec![
                (Field::PublicationDate, Rule::Date(DateRule::TimeDescriptionLine(0))),
                (Field::ValidUntil, Rule::Date(DateRule::TimeDescriptionLine(1))),
                (
                    Field::DeclarationUrl,
                    Rule::Url(UrlRule::DataSourceDescription("environdec.com")),
                ),
            ],
        }
    }

    pub fn epdnorge() -> Self {
        Self {
            name: "epdnorge",
            aliases: &["epd-norge"],
            description: "EPD-Norge",
            url_markers: &["epdnorway", "digi-norge"],
            classification_systems: &["epdnorge"],
            overrides: vec![(
                Field::CategoryCode,
                Rule::Categories(CategoryRule::LeadingToken("epdnorge")),
            )],
        }
    }

    pub fn oekobaudat() -> Self {
        Self {
            name: "oekobaudat",
            aliases: &["oekobau.dat"],
            description: "ÖKOBAUDAT",
            url_markers: &["oekobaudat"],
            classification_systems: &[],
            overrides: vec![(Field::ProductClass, Rule::ProductClass(ClassRule::IdAndName))],
        }
    }

    /// InData nodes write the `epd2019` extensions in the InData namespace,
    /// which the standard rules already read.
    pub fn indata() -> Self {
        Self {
            name: "indata",
            aliases: &[],
            description: "InData network nodes",
            url_markers: &["indata"],
            classification_systems: &[],
            overrides: Vec::new(),
        }
    }

    pub fn epditaly() -> Self {
        Self {
            name: "epditaly",
            aliases: &["epd-italy"],
            description: "EPDItaly",
            url_markers: &["epditaly"],
            classification_systems: &[],
            overrides: vec![(Field::Scenarios, Rule::Scenarios(ScenarioRule::NameOnly))],
        }
    }

    /// EPD Danmark datasets are served from shared hosting, so only the
    /// operator's own domain identifies them.
    pub fn epddenmark() -> Self {
        Self {
            name: "epddenmark",
            aliases: &["epd-denmark", "epddanmark"],
            description: "EPD Danmark",
            url_markers: &["epddanmark"],
            classification_systems: &[],
            overrides: vec![
                (
                    Field::ProgramOperator,
                    Rule::Operator(OperatorRule::ShortDescriptionFallback),
                ),
                (
                    Field::DocumentLanguage,
                    Rule::Language(LanguageRule::OriginalEpdSuffix("da")),
                ),
                (Field::FlowReferences, Rule::References(ReferenceRule::Uri)),
            ],
        }
    }

    pub fn itb() -> Self {
        Self {
            name: "itb",
            aliases: &[],
            description: "Instytut Techniki Budowlanej",
            url_markers: &["itb"],
            classification_systems: &[],
            overrides: vec![(Field::Verifier, Rule::Verifier(VerifierRule::PersonEmail))],
        }
    }

    fn generic() -> Self {
        Self {
            name: GENERIC,
            aliases: &["default"],
            description: "Plain ILCD+EPD",
            url_markers: &[],
            classification_systems: &[],
            overrides: Vec::new(),
        }
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
    }
}

/// What detection looks at.
#[derive(Debug, Clone, Default)]
pub struct DetectionInput {
    pub url: Option<String>,
    pub permanent_uri: Option<String>,
    pub classification_systems: Vec<String>,
}

impl DetectionInput {
    fn matches(&self, dialect: &Dialect) -> bool {
        let marked = |text: &Option<String>| {
            text.as_deref().is_some_and(|text| {
                let text = text.to_lowercase();
                dialect.url_markers.iter().any(|marker| text.contains(marker))
            })
        };
        marked(&self.url)
            || marked(&self.permanent_uri)
            || self.classification_systems.iter().any(|system| {
                dialect
                    .classification_systems
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(system))
            })
    }
}

/// A dialect with its resolved rules.
#[derive(Debug, Clone)]
pub struct RegisteredDialect {
    pub dialect: Dialect,
    pub rules: RuleSet,
}

impl RegisteredDialect {
    pub fn name(&self) -> &'static str {
        self.dialect.name
    }
}

/// Row of `dialects` output.
#[derive(Debug, Clone, Serialize)]
pub struct DialectSummary {
    pub name: &'static str,
    pub aliases: Vec<&'static str>,
    pub description: &'static str,
    pub overrides: Vec<&'static str>,
}

/// Ordered set of dialects. Detection tries them in registration order.
#[derive(Debug, Clone)]
pub struct DialectRegistry {
    generic: RegisteredDialect,
    dialects: Vec<RegisteredDialect>,
}

impl DialectRegistry {
    /// A registry with no dialect but the generic one.
    pub fn empty() -> Self {
        Self {
            generic: RegisteredDialect {
                dialect: Dialect::generic(),
                rules: RuleSet::base(),
            },
            dialects: Vec::new(),
        }
    }

    /// The built-in dialects. `itb` goes last since its marker is the
    /// least specific.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::empty();
        for dialect in [
            Dialect::environdec(),
            Dialect::epdnorge(),
            Dialect::oekobaudat(),
            Dialect::indata(),
            Dialect::epditaly(),
            Dialect::epddenmark(),
            Dialect::itb(),
        ] {
            registry.register(dialect)?;
        }
        Ok(registry)
    }

    /// Adds a dialect after resolving its overrides.
    pub fn register(&mut self, dialect: Dialect) -> Result<()> {
        let taken = std::iter::once(dialect.name)
            .chain(dialect.aliases.iter().copied())
            .find(|name| self.find(name).is_some());
        if let Some(name) = taken {
            return Err(IlcdError::Config(format!(
                "dialect name '{name}' is already registered"
            )));
        }
        let rules = RuleSet::with_overrides(dialect.name, &dialect.overrides)?;
        self.dialects.push(RegisteredDialect { dialect, rules });
        Ok(())
    }

    fn find(&self, name: &str) -> Option<&RegisteredDialect> {
        let name = name.trim();
        if self.generic.dialect.answers_to(name) {
            return Some(&self.generic);
        }
        self.dialects
            .iter()
            .find(|registered| registered.dialect.answers_to(name))
    }

    /// Looks a dialect up by name or alias, ignoring case.
    pub fn by_name(&self, name: &str) -> Result<&RegisteredDialect> {
        self.find(name)
            .ok_or_else(|| IlcdError::UnknownDialect(name.to_string()))
    }

    /// First registered dialect recognising the input, else generic.
    pub fn detect(&self, input: &DetectionInput) -> &RegisteredDialect {
        let detected = self
            .dialects
            .iter()
            .find(|registered| input.matches(&registered.dialect))
            .unwrap_or(&self.generic);
        debug!(dialect = detected.name(), ?input, "dialect detected");
        detected
    }

    pub fn generic(&self) -> &RegisteredDialect {
        &self.generic
    }

    pub fn summaries(&self) -> Vec<DialectSummary> {
        std::iter::once(&self.generic)
            .chain(self.dialects.iter())
            .map(|registered| DialectSummary {
                name: registered.dialect.name,
                aliases: registered.dialect.aliases.to_vec(),
                description: registered.dialect.description,
                overrides: registered
                    .rules
                    .overridden()
                    .into_iter()
                    .map(Field::name)
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DialectRegistry {
        DialectRegistry::builtin().expect("builtin dialects are valid")
    }

    fn url(url: &str) -> DetectionInput {
        DetectionInput {
            url: Some(url.to_string()),
            ..DetectionInput::default()
        }
    }

    #[test]
    fn names_and_aliases_ignore_case() {
        let registry = registry();
        assert_eq!(registry.by_name("OEKOBAU.DAT").expect("alias").name(), "oekobaudat");
        assert_eq!(registry.by_name("EPD-Norge").expect("alias").name(), "epdnorge");
        assert_eq!(registry.by_name("EPD-Denmark").expect("alias").name(), "epddenmark");
        assert_eq!(registry.by_name("epd-italy").expect("alias").name(), "epditaly");
        assert_eq!(registry.by_name("generic").expect("generic").name(), GENERIC);
        let err = registry.by_name("ibu").expect_err("not registered");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn detects_by_url_in_registration_order() {
        let registry = registry();
        assert_eq!(
            registry
                .detect(&url("https://data.environdec.com/resource/processes/x"))
                .name(),
            "environdec"
        );
        assert_eq!(
            registry
                .detect(&url("https://epdnorway.lca-data.com/resource/processes/x"))
                .name(),
            "epdnorge"
        );
        assert_eq!(
            registry
                .detect(&url("https://oekobaudat.de/OEKOBAU.DAT/resource/processes/x"))
                .name(),
            "oekobaudat"
        );
        assert_eq!(
            registry
                .detect(&url("https://epditaly.lca-data.com/resource/processes/x"))
                .name(),
            "epditaly"
        );
        assert_eq!(
            registry
                .detect(&url("https://www.epddanmark.dk/ilcd/processes/x"))
                .name(),
            "epddenmark"
        );
        assert_eq!(
            registry
                .detect(&url("https://ecosmdp.eco-platform.org/resource/processes/x"))
                .name(),
            GENERIC
        );
        // environdec is registered before itb
        assert_eq!(
            registry
                .detect(&url("https://itb.environdec.com/processes/x"))
                .name(),
            "environdec"
        );
    }

    #[test]
    fn detects_by_document_signature() {
        let registry = registry();
        let input = DetectionInput {
            url: None,
            permanent_uri: Some("https://digi-norge.example/resource/processes/x".into()),
            classification_systems: Vec::new(),
        };
        assert_eq!(registry.detect(&input).name(), "epdnorge");

        let input = DetectionInput {
            classification_systems: vec!["EPDNorge".into()],
            ..DetectionInput::default()
        };
        assert_eq!(registry.detect(&input).name(), "epdnorge");
    }

    #[test]
    fn unrecognised_input_is_generic() {
        let registry = registry();
        let input = url("/tmp/archive.zip");
        assert_eq!(registry.detect(&input).name(), GENERIC);
        assert_eq!(registry.detect(&input).name(), GENERIC);
        assert!(registry.detect(&input).rules.overridden().is_empty());
    }

    #[test]
    fn rejects_bad_registrations() {
        let mut registry = registry();
        let err = registry
            .register(Dialect {
                name: "Environdec",
                ..Dialect::itb()
            })
            .expect_err("duplicate name");
        assert!(matches!(err, IlcdError::Config(_)));

        let err = registry
            .register(Dialect {
                name: "broken",
                aliases: &[],
                overrides: vec![(Field::Description, Rule::Units(&[]))],
                ..Dialect::itb()
            })
            .expect_err("kind mismatch");
        assert!(matches!(err, IlcdError::InvalidOverride { .. }));
    }

    #[test]
    fn summaries_list_overridden_fields() {
        let summaries = registry().summaries();
        let names: Vec<&str> = summaries.iter().map(|summary| summary.name).collect();
        assert_eq!(
            names,
            vec![
                GENERIC,
                "environdec",
                "epdnorge",
                "oekobaudat",
                "indata",
                "epditaly",
                "epddenmark",
                "itb"
            ]
        );
        assert_eq!(
            summaries[1].overrides,
            vec!["publication_date", "valid_until", "declaration_url"]
        );
        assert!(summaries[4].overrides.is_empty());
        assert_eq!(summaries[5].overrides, vec!["scenarios"]);
        assert_eq!(
            summaries[6].overrides,
            vec!["program_operator", "document_language", "flow_references"]
        );
    }
}
