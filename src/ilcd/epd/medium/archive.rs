use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Mutex;

use tracing::debug;
use zip::ZipArchive;

use crate::ilcd::epd::error::{IlcdError, Result};
use crate::ilcd::epd::medium::{
    Attachment, Medium, digital_file_name, not_found, parse_dataset_file_name,
    select_dataset_file,
};
use crate::ilcd::epd::model::{DatasetRef, DatasetType};

const ROOT: &str = "ILCD/";

/// ILCD archive held in memory.
///
/// The entry index is built when the archive is opened, lookups only take
/// the archive lock to decompress the selected entry.
pub struct ZipMedium {
    label: String,
    archive: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
    /// File names per type folder, relative to the folder.
    index: BTreeMap<DatasetType, Vec<String>>,
    source_url: Option<String>,
    default_process: Option<DatasetRef>,
}

impl std::fmt::Debug for ZipMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipMedium")
            .field("label", &self.label)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl ZipMedium {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IlcdError::MissingInput(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes, path.display().to_string())
    }

    /// Indexes an archive already in memory. Fails when the bytes are not a
    /// zip file or the archive has no `ILCD/` root folder.
    pub fn from_bytes(bytes: Vec<u8>, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|err| IlcdError::InvalidContainer(format!("{label}: {err}")))?;

        let mut index: BTreeMap<DatasetType, Vec<String>> = BTreeMap::new();
        let mut has_root = false;
        for name in archive.file_names() {
            let Some(relative) = name.strip_prefix(ROOT) else {
                continue;
            };
            has_root = true;
            let Some((folder, file)) = relative.split_once('/') else {
                continue;
            };
            if file.is_empty() || file.contains('/') {
                continue;
            }
            if let Some(dataset_type) = DatasetType::from_folder(folder) {
                index.entry(dataset_type).or_default().push(file.to_string());
            }
        }
        if !has_root {
            return Err(IlcdError::InvalidContainer(format!(
                "{label}: archive has no {ROOT} folder"
            )));
        }
        for files in index.values_mut() {
            files.sort();
        }
        debug!(
            archive = %label,
            folders = index.len(),
            "indexed ILCD archive"
        );

        Ok(Self {
            label,
            archive: Mutex::new(archive),
            index,
            source_url: None,
            default_process: None,
        })
    }

    /// Records where the archive was downloaded from.
    pub fn with_source(mut self, url: Option<String>, process: Option<DatasetRef>) -> Self {
        self.source_url = url;
        self.default_process = process;
        self
    }

    /// Archive path of the entry holding `reference`, if any.
    fn entry_for(&self, reference: &DatasetRef) -> Option<String> {
        let files = self.index.get(&reference.dataset_type)?;
        let file = select_dataset_file(reference, files.iter().map(String::as_str))?;
        Some(format!(
            "{ROOT}{}/{file}",
            reference.dataset_type.folder()
        ))
    }

    fn read_entry(&self, entry: &str) -> Result<Vec<u8>> {
        let mut archive = self
            .archive
            .lock()
            .map_err(|_| IlcdError::Transport(format!("{}: archive lock poisoned", self.label)))?;
        let mut file = archive.by_name(entry)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Returns `true` when the archive carries the external document.
    pub fn has_external_doc(&self, name: &str) -> bool {
        let name = digital_file_name(name);
        self.index
            .get(&DatasetType::ExternalDocument)
            .is_some_and(|files| files.iter().any(|file| file == name))
    }
}

impl Medium for ZipMedium {
    fn describe(&self) -> String {
        format!("zip archive {}", self.label)
    }

    fn open(&self, reference: &DatasetRef) -> Result<Vec<u8>> {
        let entry = self
            .entry_for(reference)
            .ok_or_else(|| not_found(&self.label, reference))?;
        self.read_entry(&entry)
    }

    fn open_attachment(&self, reference: &DatasetRef, attachment: &Attachment) -> Result<Vec<u8>> {
        match attachment {
            Attachment::DigitalFile(uri) => {
                let document =
                    DatasetRef::new(DatasetType::ExternalDocument, digital_file_name(uri), None);
                self.open(&document)
            }
            Attachment::EpdDocument => Err(IlcdError::NotFound(format!(
                "EPD document of {reference} in {}",
                self.label
            ))),
        }
    }

    fn exists(&self, reference: &DatasetRef) -> bool {
        self.entry_for(reference).is_some()
    }

    fn list(&self, dataset_type: DatasetType) -> Result<Vec<DatasetRef>> {
        Ok(self
            .index
            .get(&dataset_type)
            .map(|files| {
                files
                    .iter()
                    .filter_map(|file| parse_dataset_file_name(dataset_type, file))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn resolve_url(&self, reference: &DatasetRef, digital_file: Option<&str>) -> Option<String> {
        let base = self.source_url.as_deref()?;
        let url = reference.to_url(Some(base));
        Some(match digital_file {
            Some(file) => {
                let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
                format!("{path}/{}?{query}", digital_file_name(file))
            }
            None => url,
        })
    }

    fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    fn default_process(&self) -> Option<DatasetRef> {
        self.default_process.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(content.as_bytes()).expect("write entry");
        }
        writer.finish().expect("finish archive").into_inner()
    }

    #[test]
    fn opens_datasets_by_reference() {
        let bytes = archive(&[
            ("ILCD/processes/p1_00.01.000.xml", "<process/>"),
            ("ILCD/contacts/c1_01.00.000.xml", "<contact/>"),
            ("ILCD/external_docs/report.pdf", "%PDF"),
        ]);
        let medium = ZipMedium::from_bytes(bytes, "test.zip").expect("archive indexed");

        let process = DatasetRef::process("p1", Some("00.01.000".into()));
        assert_eq!(medium.open(&process).expect("process read"), b"<process/>");

        let contact = DatasetRef::new(DatasetType::Contact, "c1", None);
        assert!(medium.exists(&contact));

        let pdf = medium
            .open_attachment(
                &process,
                &Attachment::DigitalFile("../external_docs/report.pdf".into()),
            )
            .expect("attachment read");
        assert_eq!(pdf, b"%PDF");

        let listed = medium.list(DatasetType::Process).expect("listing");
        assert_eq!(listed, vec![process]);
    }

    #[test]
    fn missing_dataset_is_not_found() {
        let bytes = archive(&[("ILCD/processes/p1_00.01.000.xml", "<process/>")]);
        let medium = ZipMedium::from_bytes(bytes, "test.zip").expect("archive indexed");
        let err = medium
            .open(&DatasetRef::new(DatasetType::Flow, "f1", None))
            .expect_err("flow missing");
        assert!(err.is_not_found());
        let err = medium
            .open_attachment(&DatasetRef::process("p1", None), &Attachment::EpdDocument)
            .expect_err("no EPD document in archives");
        assert!(err.is_not_found());
    }

    #[test]
    fn exported_archives_carry_their_origin() {
        let bytes = archive(&[
            ("ILCD/processes/p1_00.01.000.xml", "<process/>"),
            ("ILCD/processes/p2_00.01.000.xml", "<process/>"),
        ]);
        let plain = ZipMedium::from_bytes(bytes.clone(), "test.zip").expect("archive indexed");
        let process = DatasetRef::process("p2", Some("00.01.000".into()));
        assert_eq!(plain.source_url(), None);
        assert_eq!(plain.default_process(), None);
        assert_eq!(plain.resolve_url(&process, None), None);

        let exported = ZipMedium::from_bytes(bytes, "export.zip")
            .expect("archive indexed")
            .with_source(
                Some("https://host.tld/resource".into()),
                Some(process.clone()),
            );
        assert_eq!(exported.source_url(), Some("https://host.tld/resource"));
        assert_eq!(exported.default_process(), Some(process.clone()));
        assert_eq!(
            exported.resolve_url(&process, None).as_deref(),
            Some("https://host.tld/resource/processes/p2?version=00.01.000")
        );
        assert_eq!(
            exported
                .resolve_url(&process, Some("../external_docs/epd.pdf"))
                .as_deref(),
            Some("https://host.tld/resource/processes/p2/epd.pdf?version=00.01.000")
        );
    }

    #[test]
    fn rejects_non_ilcd_containers() {
        let err = ZipMedium::from_bytes(b"not a zip".to_vec(), "junk").expect_err("not a zip");
        assert!(matches!(err, IlcdError::InvalidContainer(_)));

        let bytes = archive(&[("data/processes/p1.xml", "<process/>")]);
        let err = ZipMedium::from_bytes(bytes, "other.zip").expect_err("no ILCD root");
        assert!(matches!(err, IlcdError::InvalidContainer(_)));
    }
}
