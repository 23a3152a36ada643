//! Owned XML element tree with a small, namespace aware path language.
//!
//! Documents are parsed with `roxmltree` and copied into [`Element`] values
//! so that parsed datasets can be cached and shared between readers without
//! borrowing the source text.
//!
//! Paths are `/` separated steps of the form `prefix:local` with an optional
//! attribute predicate, for example
//! `process:exchanges/process:exchange[@dataSetInternalID='0']`. Prefixes
//! resolve through [`NAMESPACES`].

use crate::ilcd::epd::error::{IlcdError, Result};
use crate::ilcd::epd::model::LocalizedText;

pub const NS_PROCESS: &str = "http://lca.jrc.it/ILCD/Process";
pub const NS_COMMON: &str = "http://lca.jrc.it/ILCD/Common";
pub const NS_FLOW: &str = "http://lca.jrc.it/ILCD/Flow";
pub const NS_FLOW_PROPERTY: &str = "http://lca.jrc.it/ILCD/FlowProperty";
pub const NS_UNIT_GROUP: &str = "http://lca.jrc.it/ILCD/UnitGroup";
pub const NS_CONTACT: &str = "http://lca.jrc.it/ILCD/Contact";
pub const NS_SOURCE: &str = "http://lca.jrc.it/ILCD/Source";
pub const NS_LCIA_METHOD: &str = "http://lca.jrc.it/ILCD/LCIAMethod";
pub const NS_EPD_2013: &str = "http://www.iai.kit.edu/EPD/2013";
pub const NS_EPD_2019: &str = "http://www.indata.network/EPD/2019";
pub const NS_MATML: &str = "http://www.matml.org/";
pub const NS_SERVICE_API: &str = "http://www.ilcd-network.org/ILCD/ServiceAPI";
pub const NS_SERVICE_API_PROCESS: &str = "http://www.ilcd-network.org/ILCD/ServiceAPI/Process";
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// Prefixes usable in paths.
pub const NAMESPACES: [(&str, &str); 15] = [
    ("process", NS_PROCESS),
    ("common", NS_COMMON),
    ("flow", NS_FLOW),
    ("fp", NS_FLOW_PROPERTY),
    ("ug", NS_UNIT_GROUP),
    ("contact", NS_CONTACT),
    ("source", NS_SOURCE),
    ("lciamethod", NS_LCIA_METHOD),
    ("epd2013", NS_EPD_2013),
    ("epd", NS_EPD_2013),
    ("epd2019", NS_EPD_2019),
    ("mm", NS_MATML),
    ("sapi", NS_SERVICE_API),
    ("p", NS_SERVICE_API_PROCESS),
    ("xml", NS_XML),
];

fn namespace_for(prefix: &str) -> Option<&'static str> {
    NAMESPACES
        .iter()
        .find(|(candidate, _)| *candidate == prefix)
        .map(|(_, uri)| *uri)
}

/// Expanded element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// One element with its attributes, direct text and child elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    /// Concatenated direct text children, untrimmed.
    pub text: String,
    pub children: Vec<Element>,
}

/// Parses an XML document into an owned tree. `label` names the document in
/// error messages.
pub fn parse_document(bytes: &[u8], label: &str) -> Result<Element> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| IlcdError::malformed(label, format!("not UTF-8: {err}")))?;
    let text = text.trim_start_matches('\u{feff}');
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let document = roxmltree::Document::parse_with_options(text, options)
        .map_err(|err| IlcdError::malformed(label, err.to_string()))?;
    Ok(Element::from_node(document.root_element()))
}

impl Element {
    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let tag = node.tag_name();
        let attributes = node
            .attributes()
            .map(|attr| Attribute {
                name: QName {
                    namespace: attr.namespace().map(str::to_string),
                    local: attr.name().to_string(),
                },
                value: attr.value().to_string(),
            })
            .collect();
        let mut text = String::new();
        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(Element::from_node(child));
            } else if child.is_text() {
                if let Some(value) = child.text() {
                    text.push_str(value);
                }
            }
        }
        Element {
            name: QName {
                namespace: tag.namespace().map(str::to_string),
                local: tag.name().to_string(),
            },
            attributes,
            text,
            children,
        }
    }

    /// Local name of the element.
    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    /// Trimmed direct text, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }

    /// Looks up an attribute by `name` or `prefix:name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        let (namespace, local) = match name.split_once(':') {
            Some((prefix, local)) => (namespace_for(prefix), local),
            None => (None, name),
        };
        self.attributes
            .iter()
            .find(|attr| attr.name.local == local && attr.name.namespace.as_deref() == namespace)
            .map(|attr| attr.value.as_str())
    }

    /// First element matching `path`.
    pub fn find(&self, path: &str) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }

    /// All elements matching `path`, in document order.
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        let parsed = XmlPath::parse(path);
        let mut current: Vec<&Element> = vec![self];
        for step in &parsed.steps {
            current = current
                .into_iter()
                .flat_map(move |element| {
                    element.children.iter().filter(move |child| step.matches(child))
                })
                .collect();
            if current.is_empty() {
                break;
            }
        }
        current
    }

    /// Trimmed text of the first element matching `path`.
    pub fn find_text(&self, path: &str) -> Option<&str> {
        self.find_all(path).into_iter().find_map(Element::text)
    }

    /// Collects `xml:lang` tagged texts of every element matching `path`.
    pub fn find_localized(&self, path: &str) -> LocalizedText {
        let mut result = LocalizedText::default();
        for element in self.find_all(path) {
            if let Some(text) = element.text() {
                result.push(element.attr("xml:lang"), text);
            }
        }
        result
    }
}

#[derive(Debug, Clone)]
struct Step {
    namespace: Option<&'static str>,
    /// `false` when the prefix is unknown; such a step never matches.
    resolved: bool,
    local: String,
    predicate: Option<(String, String)>,
}

impl Step {
    fn matches(&self, element: &Element) -> bool {
        if !self.resolved
            || element.name.local != self.local
            || element.name.namespace.as_deref() != self.namespace
        {
            return false;
        }
        match &self.predicate {
            Some((attr, value)) => element.attr(attr) == Some(value.as_str()),
            None => true,
        }
    }
}

/// Parsed path expression.
#[derive(Debug, Clone)]
pub struct XmlPath {
    steps: Vec<Step>,
}

impl XmlPath {
    pub fn parse(path: &str) -> Self {
        let steps = path
            .split('/')
            .filter(|step| !step.is_empty())
            .map(|raw| {
                let (name, predicate) = match raw.split_once('[') {
                    Some((name, rest)) => (name, parse_predicate(rest)),
                    None => (raw, None),
                };
                let (namespace, resolved, local) = match name.split_once(':') {
                    Some((prefix, local)) => {
                        let namespace = namespace_for(prefix);
                        (namespace, namespace.is_some(), local)
                    }
                    None => (None, true, name),
                };
                Step {
                    namespace,
                    resolved,
                    local: local.to_string(),
                    predicate,
                }
            })
            .collect();
        XmlPath { steps }
    }
}

fn parse_predicate(rest: &str) -> Option<(String, String)> {
    let body = rest.strip_suffix(']')?.strip_prefix('@')?;
    let (attr, value) = body.split_once('=')?;
    let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
    Some((attr.trim().to_string(), value.to_string()))
}
