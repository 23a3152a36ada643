//! Sources of raw dataset bytes.

pub mod archive;
pub mod directory;
pub mod http;
pub mod soda4lca;

use crate::ilcd::epd::error::{IlcdError, Result};
use crate::ilcd::epd::model::{DatasetRef, DatasetType};

pub use archive::ZipMedium;
pub use directory::{DirectoryMedium, SingleFileMedium};
pub use soda4lca::Soda4LcaMedium;

/// Binary attachment of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// A file referenced from a source dataset via `referenceToDigitalFile`.
    DigitalFile(String),
    /// The EPD document published alongside a process.
    EpdDocument,
}

/// A place datasets can be read from.
///
/// Implementations are shared between batch workers, so they must be
/// `Send + Sync`; interior state (archive handles, HTTP clients) is
/// synchronised internally.
pub trait Medium: Send + Sync {
    /// Human readable description used in logs.
    fn describe(&self) -> String;

    /// Raw XML of a dataset.
    fn open(&self, reference: &DatasetRef) -> Result<Vec<u8>>;

    /// Raw bytes of an attachment.
    fn open_attachment(&self, reference: &DatasetRef, attachment: &Attachment) -> Result<Vec<u8>>;

    fn exists(&self, reference: &DatasetRef) -> bool {
        self.open(reference).is_ok()
    }

    /// Every dataset of the given type.
    fn list(&self, dataset_type: DatasetType) -> Result<Vec<DatasetRef>>;

    /// Public URL of a dataset or one of its digital files.
    fn resolve_url(&self, _reference: &DatasetRef, _digital_file: Option<&str>) -> Option<String> {
        None
    }

    /// URL the medium was opened from, used for dialect detection.
    fn source_url(&self) -> Option<&str> {
        None
    }

    /// Process the medium was opened for, if it carries one.
    fn default_process(&self) -> Option<DatasetRef> {
        None
    }
}

/// Name of the file an ILCD archive stores a dataset under.
pub(crate) fn dataset_file_name(reference: &DatasetRef) -> String {
    if reference.dataset_type == DatasetType::ExternalDocument {
        return reference.id.clone();
    }
    match &reference.version {
        Some(version) => format!("{}_{version}.xml", reference.id),
        None => format!("{}.xml", reference.id),
    }
}

/// Picks the file of `reference` among the file names of its type folder.
///
/// The exact `<uuid>_<version>.xml` (or `<uuid>.xml`) wins; otherwise the
/// greatest `<uuid>*.xml` name is taken, which is the latest version for
/// the usual `00.00.000` version layout.
pub(crate) fn select_dataset_file<'a>(
    reference: &DatasetRef,
    names: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let wanted = dataset_file_name(reference).to_ascii_lowercase();
    let prefix = reference.id.to_ascii_lowercase();
    let mut fallback: Option<&'a str> = None;
    for name in names {
        let lower = name.to_ascii_lowercase();
        if lower == wanted {
            return Some(name);
        }
        if reference.dataset_type != DatasetType::ExternalDocument
            && lower.starts_with(&prefix)
            && lower.ends_with(".xml")
            && fallback.is_none_or(|current| name > current)
        {
            fallback = Some(name);
        }
    }
    fallback
}

/// Parses `<uuid>_<version>.xml` into a reference.
pub(crate) fn parse_dataset_file_name(dataset_type: DatasetType, name: &str) -> Option<DatasetRef> {
    if dataset_type == DatasetType::ExternalDocument {
        return Some(DatasetRef::new(dataset_type, name, None));
    }
    let stem = name.strip_suffix(".xml").or_else(|| name.strip_suffix(".XML"))?;
    let (id, version) = match stem.split_once('_') {
        Some((id, version)) => (id, Some(version.to_string())),
        None => (stem, None),
    };
    if id.is_empty() {
        return None;
    }
    Some(DatasetRef::new(dataset_type, id, version))
}

/// Last path segment of a digital file reference such as
/// `../external_docs/report.pdf`.
pub(crate) fn digital_file_name(uri: &str) -> &str {
    uri.rsplit(['/', '\\']).next().unwrap_or(uri)
}

pub(crate) fn not_found(medium: &str, reference: &DatasetRef) -> IlcdError {
    IlcdError::NotFound(format!("{reference} in {medium}"))
}
