pub mod openepd;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of ILCD dataset. Each kind lives in its own folder of an ILCD
/// archive and has its own resource path on a soda4LCA server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    Process,
    Contact,
    Flow,
    FlowProperty,
    UnitGroup,
    Source,
    LciaMethod,
    ExternalDocument,
}

impl DatasetType {
    /// All dataset kinds that carry XML.
    pub const XML_TYPES: [DatasetType; 7] = [
        DatasetType::Process,
        DatasetType::Contact,
        DatasetType::Flow,
        DatasetType::FlowProperty,
        DatasetType::UnitGroup,
        DatasetType::Source,
        DatasetType::LciaMethod,
    ];

    /// Folder name inside an ILCD archive, also the soda4LCA resource name.
    pub fn folder(self) -> &'static str {
        match self {
            DatasetType::Process => "processes",
            DatasetType::Contact => "contacts",
            DatasetType::Flow => "flows",
            DatasetType::FlowProperty => "flowproperties",
            DatasetType::UnitGroup => "unitgroups",
            DatasetType::Source => "sources",
            DatasetType::LciaMethod => "lciamethods",
            DatasetType::ExternalDocument => "external_docs",
        }
    }

    /// Parses a folder or resource name such as `processes` or `process`.
    pub fn from_folder(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "processes" | "process" | "showprocess" => Some(DatasetType::Process),
            "contacts" | "contact" => Some(DatasetType::Contact),
            "flows" | "flow" => Some(DatasetType::Flow),
            "flowproperties" | "flowproperty" => Some(DatasetType::FlowProperty),
            "unitgroups" | "unitgroup" => Some(DatasetType::UnitGroup),
            "sources" | "source" => Some(DatasetType::Source),
            "lciamethods" | "lciamethod" => Some(DatasetType::LciaMethod),
            "external_docs" => Some(DatasetType::ExternalDocument),
            _ => None,
        }
    }

    /// Parses the `type` attribute of an ILCD global reference, e.g.
    /// `contact data set`.
    pub fn from_reference_type(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "process data set" => Some(DatasetType::Process),
            "contact data set" => Some(DatasetType::Contact),
            "flow data set" => Some(DatasetType::Flow),
            "flow property data set" => Some(DatasetType::FlowProperty),
            "unit group data set" => Some(DatasetType::UnitGroup),
            "source data set" => Some(DatasetType::Source),
            "lcia method data set" => Some(DatasetType::LciaMethod),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder())
    }
}

/// Address of one dataset inside a medium.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    pub dataset_type: DatasetType,
    /// Dataset UUID as written in the source, or a bare file name for
    /// external documents.
    pub id: String,
    /// Dataset version (`00.01.000`); `None` addresses any version.
    pub version: Option<String>,
}

impl DatasetRef {
    pub fn new(dataset_type: DatasetType, id: impl Into<String>, version: Option<String>) -> Self {
        Self {
            dataset_type,
            id: id.into(),
            version: version.filter(|v| !v.trim().is_empty()),
        }
    }

    /// Shorthand for a process reference.
    pub fn process(id: impl Into<String>, version: Option<String>) -> Self {
        Self::new(DatasetType::Process, id, version)
    }

    /// Returns `true` when the identifier is a well-formed UUID.
    pub fn has_uuid(&self) -> bool {
        uuid::Uuid::parse_str(&self.id).is_ok()
    }

    /// soda4LCA style resource URL of this dataset.
    pub fn to_url(&self, base_url: Option<&str>) -> String {
        let prefix = base_url.unwrap_or("https://unknown.tld").trim_end_matches('/');
        let prefix = prefix.strip_suffix("/resource").unwrap_or(prefix);
        format!(
            "{prefix}/resource/{}/{}?version={}",
            self.dataset_type.folder(),
            self.id,
            self.version.as_deref().unwrap_or("")
        )
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{} ({version})", self.dataset_type, self.id),
            None => write!(f, "{}/{}", self.dataset_type, self.id),
        }
    }
}

/// One entry of a language preference list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lang {
    /// A concrete language code such as `en`.
    Code(String),
    /// Any available language.
    Any,
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lang::Code(code) => f.write_str(code),
            Lang::Any => f.write_str("any other"),
        }
    }
}

/// Ordered language preferences used when resolving localized strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LangPreference(Vec<Lang>);

impl LangPreference {
    pub fn new(langs: Vec<Lang>) -> Self {
        Self(langs)
    }

    /// `[code, any]`.
    pub fn prefer(code: &str) -> Self {
        Self(vec![Lang::Code(code.to_ascii_lowercase()), Lang::Any])
    }

    /// `[any]`.
    pub fn any() -> Self {
        Self(vec![Lang::Any])
    }

    /// Parses a comma separated list; `*` or `any` stands for the wildcard.
    pub fn parse(list: &str) -> Self {
        let langs = list
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| match code {
                "*" | "any" => Lang::Any,
                other => Lang::Code(other.to_ascii_lowercase()),
            })
            .collect();
        Self(langs)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lang> {
        self.0.iter()
    }

    /// First concrete language code, used as the document language.
    pub fn primary(&self) -> Option<&str> {
        self.0.iter().find_map(|lang| match lang {
            Lang::Code(code) => Some(code.as_str()),
            Lang::Any => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LangPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Lang::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

/// Texts of one element in several languages, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalizedText {
    entries: Vec<(Option<String>, String)>,
}

impl LocalizedText {
    pub fn push(&mut self, lang: Option<&str>, text: impl Into<String>) {
        self.entries
            .push((lang.map(str::to_ascii_lowercase), text.into()));
    }

    /// Resolves the text for the first matching preference. Empty texts
    /// never match.
    pub fn resolve(&self, preference: &LangPreference) -> Option<&str> {
        for lang in preference.iter() {
            let found = match lang {
                Lang::Code(code) => self
                    .entries
                    .iter()
                    .find(|(entry_lang, text)| entry_lang.as_deref() == Some(code) && !text.is_empty()),
                Lang::Any => self.entries.iter().find(|(_, text)| !text.is_empty()),
            };
            if let Some((_, text)) = found {
                return Some(text);
            }
        }
        None
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|(lang, _)| lang.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One class of a classification path, e.g. `3.3.02 Parkett`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductClass {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Reference unit of a unit group.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDef {
    pub name: String,
    pub mean_value: f64,
}

/// Raw quantity read from a dataset, before unit normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

/// Result of a soda4LCA process search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessBasicInfo {
    pub uuid: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub class_id: Option<String>,
    pub class_name: Option<String>,
    pub classification_system: Option<String>,
    #[serde(rename = "type")]
    pub process_type: Option<String>,
    pub sub_type: Option<String>,
}

impl ProcessBasicInfo {
    pub fn to_ref(&self) -> DatasetRef {
        DatasetRef::process(self.uuid.clone(), self.version.clone())
    }
}

/// A category of a soda4LCA category system, flattened out of its tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: Option<String>,
    pub name: String,
    pub parent_id: Option<String>,
    /// Names from the top level category down to this one.
    pub full_path: Vec<String>,
}

/// Paging metadata of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct ListResponseMeta {
    pub offset: usize,
    pub page_size: usize,
    pub total_items_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LocalizedText {
        let mut text = LocalizedText::default();
        text.push(Some("de"), "Zweischichtparkett");
        text.push(Some("EN"), "2-layer parquet");
        text.push(Some("fr"), "");
        text
    }

    #[test]
    fn resolves_first_listed_language() {
        let text = sample();
        let pref = LangPreference::new(vec![Lang::Code("en".into()), Lang::Code("de".into())]);
        assert_eq!(text.resolve(&pref), Some("2-layer parquet"));
        let pref = LangPreference::new(vec![Lang::Code("de".into()), Lang::Code("en".into())]);
        assert_eq!(text.resolve(&pref), Some("Zweischichtparkett"));
    }

    #[test]
    fn wildcard_falls_back_to_any_text() {
        let text = sample();
        assert_eq!(text.resolve(&LangPreference::prefer("it")), Some("Zweischichtparkett"));
        assert_eq!(text.resolve(&LangPreference::prefer("fr")), Some("Zweischichtparkett"));
    }

    #[test]
    fn absent_without_match() {
        let text = sample();
        let pref = LangPreference::new(vec![Lang::Code("it".into())]);
        assert_eq!(text.resolve(&pref), None);
        assert_eq!(LocalizedText::default().resolve(&LangPreference::any()), None);
    }

    #[test]
    fn parses_preference_lists() {
        let pref = LangPreference::parse("EN, de,*");
        assert_eq!(pref.to_string(), "en,de,any other");
        assert_eq!(pref.primary(), Some("en"));
    }

    #[test]
    fn builds_resource_urls() {
        let reference = DatasetRef::process("2eb4", Some("00.01.000".into()));
        assert_eq!(
            reference.to_url(Some("https://host.tld/resource/")),
            "https://host.tld/resource/processes/2eb4?version=00.01.000"
        );
    }
}
