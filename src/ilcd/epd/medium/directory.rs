use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ilcd::epd::error::{IlcdError, Result};
use crate::ilcd::epd::medium::{
    Attachment, Medium, digital_file_name, not_found, parse_dataset_file_name,
    select_dataset_file,
};
use crate::ilcd::epd::model::{DatasetRef, DatasetType};
use crate::ilcd::epd::xml;

/// An unpacked ILCD archive. `root` is either the `ILCD` folder itself or a
/// folder containing it.
#[derive(Debug)]
pub struct DirectoryMedium {
    root: PathBuf,
    index: BTreeMap<DatasetType, Vec<String>>,
}

impl DirectoryMedium {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(IlcdError::MissingInput(path.to_path_buf()));
        }
        let nested = path.join("ILCD");
        let root = if nested.is_dir() { nested } else { path.to_path_buf() };

        let mut index: BTreeMap<DatasetType, Vec<String>> = BTreeMap::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let folder = entry.file_name().to_string_lossy().to_string();
            let Some(dataset_type) = DatasetType::from_folder(&folder) else {
                continue;
            };
            let mut files = Vec::new();
            for file in fs::read_dir(entry.path())? {
                let file = file?;
                if file.file_type()?.is_file() {
                    files.push(file.file_name().to_string_lossy().to_string());
                }
            }
            files.sort();
            index.insert(dataset_type, files);
        }
        if index.is_empty() {
            return Err(IlcdError::InvalidContainer(format!(
                "{}: no ILCD dataset folders",
                path.display()
            )));
        }
        debug!(root = %root.display(), folders = index.len(), "indexed ILCD directory");
        Ok(Self { root, index })
    }

    fn path_for(&self, reference: &DatasetRef) -> Option<PathBuf> {
        let files = self.index.get(&reference.dataset_type)?;
        let file = select_dataset_file(reference, files.iter().map(String::as_str))?;
        Some(self.root.join(reference.dataset_type.folder()).join(file))
    }
}

impl Medium for DirectoryMedium {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    fn open(&self, reference: &DatasetRef) -> Result<Vec<u8>> {
        let path = self
            .path_for(reference)
            .ok_or_else(|| not_found(&self.root.display().to_string(), reference))?;
        Ok(fs::read(path)?)
    }

    fn open_attachment(&self, reference: &DatasetRef, attachment: &Attachment) -> Result<Vec<u8>> {
        match attachment {
            Attachment::DigitalFile(uri) => self.open(&DatasetRef::new(
                DatasetType::ExternalDocument,
                digital_file_name(uri),
                None,
            )),
            Attachment::EpdDocument => Err(IlcdError::NotFound(format!(
                "EPD document of {reference} in {}",
                self.root.display()
            ))),
        }
    }

    fn exists(&self, reference: &DatasetRef) -> bool {
        self.path_for(reference).is_some()
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
}

/// A lone process XML file. Every other dataset is reported missing, so
/// references resolve to absent values (or to reference data, if given).
#[derive(Debug)]
pub struct SingleFileMedium {
    path: PathBuf,
    process: DatasetRef,
    bytes: Vec<u8>,
}

impl SingleFileMedium {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(IlcdError::MissingInput(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let label = path.display().to_string();
        let root = xml::parse_document(&bytes, &label)?;
        let id = root
            .find_text("process:processInformation/process:dataSetInformation/common:UUID")
            .map(str::to_string)
            .or_else(|| {
                let name = path.file_name()?.to_string_lossy().to_string();
                parse_dataset_file_name(DatasetType::Process, &name).map(|parsed| parsed.id)
            })
            .ok_or_else(|| IlcdError::malformed(label.clone(), "process UUID missing"))?;
        let version = root
            .find_text("process:administrativeInformation/process:publicationAndOwnership/common:dataSetVersion")
            .map(str::to_string);
        Ok(Self {
            path: path.to_path_buf(),
            process: DatasetRef::process(id, version),
            bytes,
        })
    }

    fn matches(&self, reference: &DatasetRef) -> bool {
        reference.dataset_type == DatasetType::Process
            && reference.id.eq_ignore_ascii_case(&self.process.id)
    }
}

impl Medium for SingleFileMedium {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn open(&self, reference: &DatasetRef) -> Result<Vec<u8>> {
        if self.matches(reference) {
            Ok(self.bytes.clone())
        } else {
            Err(not_found(&self.path.display().to_string(), reference))
        }
    }

    fn open_attachment(&self, reference: &DatasetRef, _attachment: &Attachment) -> Result<Vec<u8>> {
        Err(not_found(&self.path.display().to_string(), reference))
    }

    fn exists(&self, reference: &DatasetRef) -> bool {
        self.matches(reference)
    }

    fn list(&self, dataset_type: DatasetType) -> Result<Vec<DatasetRef>> {
        if dataset_type == DatasetType::Process {
            Ok(vec![self.process.clone()])
        } else {
            Ok(Vec::new())
        }
    }

    fn default_process(&self) -> Option<DatasetRef> {
        Some(self.process.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROCESS: &str = r#"<processDataSet xmlns="http://lca.jrc.it/ILCD/Process"
        xmlns:common="http://lca.jrc.it/ILCD/Common">
      <processInformation><dataSetInformation>
        <common:UUID>11111111-2222-4333-8444-555555555555</common:UUID>
      </dataSetInformation></processInformation>
      <administrativeInformation><publicationAndOwnership>
        <common:dataSetVersion>00.01.000</common:dataSetVersion>
      </publicationAndOwnership></administrativeInformation>
    </processDataSet>"#;

    #[test]
    fn directory_serves_datasets_and_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ilcd = dir.path().join("ILCD");
        fs::create_dir_all(ilcd.join("processes")).expect("processes folder");
        fs::create_dir_all(ilcd.join("external_docs")).expect("docs folder");
        fs::write(ilcd.join("processes/p1_00.01.000.xml"), PROCESS).expect("process written");
        fs::write(ilcd.join("external_docs/epd.pdf"), b"%PDF").expect("pdf written");

        let medium = DirectoryMedium::open(dir.path()).expect("directory opened");
        let listed = medium.list(DatasetType::Process).expect("listed");
        assert_eq!(listed, vec![DatasetRef::process("p1", Some("00.01.000".into()))]);
        assert!(medium.exists(&DatasetRef::process("p1", None)));
        let pdf = medium
            .open_attachment(
                &listed[0],
                &Attachment::DigitalFile("../external_docs/epd.pdf".into()),
            )
            .expect("document read");
        assert_eq!(pdf, b"%PDF");
        let err = medium
            .open(&DatasetRef::new(DatasetType::Contact, "c1", None))
            .expect_err("no contacts folder");
        assert!(err.is_not_found());
    }

    #[test]
    fn directory_without_dataset_folders_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = DirectoryMedium::open(dir.path()).expect_err("empty directory");
        assert!(matches!(err, IlcdError::InvalidContainer(_)));
    }

    #[test]
    fn single_file_serves_only_its_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("epd.xml");
        fs::write(&path, PROCESS).expect("process written");

        let medium = SingleFileMedium::open(&path).expect("file opened");
        let process = medium.default_process().expect("process known");
        assert_eq!(process.id, "11111111-2222-4333-8444-555555555555");
        assert_eq!(process.version.as_deref(), Some("00.01.000"));
        assert!(medium.open(&process).is_ok());
        assert!(
            medium
                .open(&DatasetRef::new(DatasetType::Flow, "f", None))
                .expect_err("flows are not served")
                .is_not_found()
        );
    }
}
