//! Typed accessors over parsed ILCD datasets.
//!
//! A [`ReaderContext`] binds a medium to one conversion: every referenced
//! dataset is parsed at most once and kept until the context is dropped.
//! Readers borrow the context and hand out [`Dataset`] views; accessors
//! return `Ok(None)` for absent values and reserve errors for documents
//! that are present but unusable.

pub mod contact;
pub mod epd;
pub mod flow;
pub mod material;
pub mod scope_set;
pub mod source;
pub mod unit;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::ilcd::epd::dialect::rules::ReferenceRule;
use crate::ilcd::epd::error::{IlcdError, Result};
use crate::ilcd::epd::medium::Medium;
use crate::ilcd::epd::model::{DatasetRef, DatasetType, LangPreference};
use crate::ilcd::epd::xml::{self, Element};

pub use contact::ContactReader;
pub use epd::EpdReader;
pub use flow::{FlowPropertyReader, FlowReader};
pub use material::{MatMlMaterial, MaterialProperty, PropertyValue};
pub use scope_set::ScopeSetReader;
pub use source::{ComplianceReader, PcrReader, SourceReader};
pub use unit::UnitGroupReader;

/// Deepest chain of references followed from the root dataset.
pub const MAX_REFERENCE_DEPTH: usize = 8;

/// Per-conversion state shared by all readers of one dataset graph.
pub struct ReaderContext {
    medium: Arc<dyn Medium>,
    reference_data: Option<Arc<dyn Medium>>,
    cache: RefCell<HashMap<DatasetRef, Option<Rc<Element>>>>,
}

impl ReaderContext {
    pub fn new(medium: Arc<dyn Medium>) -> Self {
        Self {
            medium,
            reference_data: None,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Adds a medium consulted when the primary one lacks a dataset.
    pub fn with_reference_data(mut self, reference_data: Option<Arc<dyn Medium>>) -> Self {
        self.reference_data = reference_data;
        self
    }

    pub fn medium(&self) -> &dyn Medium {
        self.medium.as_ref()
    }

    /// Opens the root dataset of a conversion. Unlike references, a missing
    /// root dataset is an error.
    pub fn open_root(&self, reference: &DatasetRef) -> Result<Dataset<'_>> {
        self.load(reference, 0)?
            .ok_or_else(|| IlcdError::NotFound(format!("{reference} in {}", self.medium.describe())))
    }

    /// Number of distinct datasets looked up so far.
    pub fn cached_datasets(&self) -> usize {
        self.cache.borrow().len()
    }

    fn load(&self, reference: &DatasetRef, depth: usize) -> Result<Option<Dataset<'_>>> {
        if let Some(cached) = self.cache.borrow().get(reference) {
            return Ok(cached.clone().map(|root| Dataset {
                context: self,
                reference: reference.clone(),
                root,
                depth,
            }));
        }

        let root = match self.fetch(reference)? {
            Some(bytes) => Some(Rc::new(xml::parse_document(&bytes, &reference.to_string())?)),
            None => None,
        };
        self.cache
            .borrow_mut()
            .insert(reference.clone(), root.clone());
        Ok(root.map(|root| Dataset {
            context: self,
            reference: reference.clone(),
            root,
            depth,
        }))
    }

    fn fetch(&self, reference: &DatasetRef) -> Result<Option<Vec<u8>>> {
        match self.medium.open(reference) {
            Ok(bytes) => return Ok(Some(bytes)),
            Err(err) if err.is_not_found() => {
                debug!(%reference, "dataset not found in primary medium");
            }
            Err(err) => return Err(err),
        }
        let Some(reference_data) = &self.reference_data else {
            return Ok(None);
        };
        match reference_data.open(reference) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// A parsed dataset bound to its context.
#[derive(Clone)]
pub struct Dataset<'c> {
    context: &'c ReaderContext,
    reference: DatasetRef,
    root: Rc<Element>,
    depth: usize,
}

impl<'c> Dataset<'c> {
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Reference the dataset was loaded under.
    pub fn reference(&self) -> &DatasetRef {
        &self.reference
    }

    pub fn context(&self) -> &'c ReaderContext {
        self.context
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.root.find_text(path).map(str::to_string)
    }

    pub fn localized(&self, path: &str, langs: &LangPreference) -> Option<String> {
        self.root
            .find_localized(path)
            .resolve(langs)
            .map(str::to_string)
    }

    /// Parses the text at `path`; present but unparsable text is malformed.
    pub fn parse<T: FromStr>(&self, path: &str) -> Result<Option<T>> {
        parse_text(self.root.find(path), path, &self.reference)
    }

    pub fn date(&self, path: &str) -> Result<Option<NaiveDate>> {
        match self.root.find_text(path) {
            None => Ok(None),
            Some(text) => parse_date(text).map(Some).ok_or_else(|| {
                IlcdError::malformed(
                    self.reference.to_string(),
                    format!("invalid date '{text}' at {path}"),
                )
            }),
        }
    }

    /// Follows the global reference at `path`.
    pub fn resolve_at(&self, path: &str) -> Result<Option<Dataset<'c>>> {
        match self.root.find(path) {
            Some(element) => self.resolve(element),
            None => Ok(None),
        }
    }

    /// Follows a global reference element. Missing targets, references
    /// without an identifier and references beyond the depth cap resolve to
    /// `None`.
    pub fn resolve(&self, element: &Element) -> Result<Option<Dataset<'c>>> {
        self.resolve_with(element, ReferenceRule::ObjectId)
    }

    /// Like [`Dataset::resolve`], reading the identifier as `rule` says.
    pub fn resolve_with(&self, element: &Element, rule: ReferenceRule) -> Result<Option<Dataset<'c>>> {
        let reference = match rule {
            ReferenceRule::ObjectId => reference_from_element(element),
            ReferenceRule::Uri => reference_from_uri(element),
        };
        let Some(reference) = reference else {
            return Ok(None);
        };
        if self.depth + 1 > MAX_REFERENCE_DEPTH {
            warn!(%reference, depth = self.depth, "reference depth limit reached");
            return Ok(None);
        }
        let resolved = self.context.load(&reference, self.depth + 1)?;
        if resolved.is_none() {
            debug!(%reference, from = %self.reference, "referenced dataset is absent");
        }
        Ok(resolved)
    }
}

/// Parses the trimmed text of an optional element.
pub(crate) fn parse_text<T: FromStr>(
    element: Option<&Element>,
    what: &str,
    document: &DatasetRef,
) -> Result<Option<T>> {
    let Some(text) = element.and_then(Element::text) else {
        return Ok(None);
    };
    text.parse::<T>().map(Some).map_err(|_| {
        IlcdError::malformed(
            document.to_string(),
            format!("cannot parse '{text}' at {what}"),
        )
    })
}

/// Accepts `YYYY-MM-DD` with an optional time or zone suffix.
pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let head = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Reads `refObjectId`, `version`, `type` and `uri` of a global reference.
pub fn reference_from_element(element: &Element) -> Option<DatasetRef> {
    let uri = element.attr("uri").map(str::trim).filter(|uri| !uri.is_empty());
    let (uri_type, uri_id) = match uri {
        Some(uri) => split_reference_uri(uri),
        None => (None, None),
    };
    let id = element
        .attr("refObjectId")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or(uri_id)?;
    let dataset_type = element
        .attr("type")
        .and_then(DatasetType::from_reference_type)
        .or(uri_type)?;
    let version = element.attr("version").map(|v| v.trim().to_string());
    Some(DatasetRef::new(dataset_type, id, version))
}

/// Reads a global reference from its `uri` file name, falling back to
/// `refObjectId` when the `uri` names no dataset.
pub fn reference_from_uri(element: &Element) -> Option<DatasetRef> {
    let Some((uri_type, Some(id))) = element
        .attr("uri")
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .map(split_reference_uri)
    else {
        return reference_from_element(element);
    };
    let dataset_type = element
        .attr("type")
        .and_then(DatasetType::from_reference_type)
        .or(uri_type)?;
    let version = element.attr("uri").and_then(uri_version);
    Some(DatasetRef::new(dataset_type, id, version))
}

/// Version part of `<uuid>_<version>.xml`.
fn uri_version(uri: &str) -> Option<String> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let file = path.rsplit('/').find(|segment| !segment.is_empty())?;
    let stem = file.strip_suffix(".xml").unwrap_or(file);
    stem.split_once('_').map(|(_, version)| version.to_string())
}

/// `../contacts/<uuid>_<version>.xml` into the folder type and identifier.
fn split_reference_uri(uri: &str) -> (Option<DatasetType>, Option<String>) {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let mut segments = path.rsplit('/').filter(|segment| !segment.is_empty());
    let file = segments.next();
    let folder = segments.next().and_then(DatasetType::from_folder);
    let id = file.map(|file| {
        let stem = file.strip_suffix(".xml").unwrap_or(file);
        stem.split('_').next().unwrap_or(stem).to_string()
    });
    (folder, id.filter(|id| !id.is_empty()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::ilcd::epd::error::Result;
    use crate::ilcd::epd::medium::{Attachment, Medium, not_found};
    use crate::ilcd::epd::model::{DatasetRef, DatasetType};

    /// In-memory medium keyed by dataset type and identifier.
    #[derive(Default)]
    pub struct MemoryMedium {
        pub datasets: BTreeMap<(DatasetType, String), String>,
    }

    impl MemoryMedium {
        pub fn with(mut self, dataset_type: DatasetType, id: &str, xml: &str) -> Self {
            self.datasets
                .insert((dataset_type, id.to_string()), xml.to_string());
            self
        }

        pub fn shared(self) -> Arc<dyn Medium> {
            Arc::new(self)
        }
    }

    impl Medium for MemoryMedium {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        fn open(&self, reference: &DatasetRef) -> Result<Vec<u8>> {
            self.datasets
                .get(&(reference.dataset_type, reference.id.clone()))
                .map(|xml| xml.as_bytes().to_vec())
                .ok_or_else(|| not_found("memory", reference))
        }

        fn open_attachment(&self, reference: &DatasetRef, _: &Attachment) -> Result<Vec<u8>> {
            Err(not_found("memory", reference))
        }

        fn list(&self, dataset_type: DatasetType) -> Result<Vec<DatasetRef>> {
            Ok(self
                .datasets
                .keys()
                .filter(|(kind, _)| *kind == dataset_type)
                .map(|(kind, id)| DatasetRef::new(*kind, id.clone(), None))
                .collect())
        }
    }
}
