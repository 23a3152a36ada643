use crate::ilcd::epd::error::Result;
use crate::ilcd::epd::model::openepd::{Compliance, ILCD_ATTACHMENT, PDF_ATTACHMENT, Pcr};
use crate::ilcd::epd::model::{DatasetRef, DatasetType, LangPreference};
use crate::ilcd::epd::reader::Dataset;
use crate::ilcd::epd::reader::contact::ContactReader;

const INFO: &str = "source:sourceInformation/source:dataSetInformation";

/// Reader for source datasets.
#[derive(Clone)]
pub struct SourceReader<'c> {
    dataset: Dataset<'c>,
}

impl<'c> SourceReader<'c> {
    pub fn new(dataset: Dataset<'c>) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Dataset<'c> {
        &self.dataset
    }

    pub fn uuid(&self) -> Option<String> {
        self.dataset.text(&format!("{INFO}/common:UUID"))
    }

    pub fn version(&self) -> Option<String> {
        self.dataset.text(
            "source:administrativeInformation/source:publicationAndOwnership/common:dataSetVersion",
        )
    }

    pub fn own_reference(&self) -> DatasetRef {
        match self.uuid() {
            Some(uuid) => DatasetRef::new(DatasetType::Source, uuid, self.version()),
            None => self.dataset.reference().clone(),
        }
    }

    pub fn short_name(&self, langs: &LangPreference) -> Option<String> {
        self.dataset
            .localized(&format!("{INFO}/common:shortName"), langs)
    }

    /// `sourceDescriptionOrComment`, which most providers use as the full
    /// name of the source.
    pub fn description(&self, langs: &LangPreference) -> Option<String> {
        self.dataset
            .localized(&format!("{INFO}/source:sourceDescriptionOrComment"), langs)
    }

    /// `uri` attributes of all digital file references.
    pub fn digital_files(&self) -> Vec<String> {
        self.dataset
            .root()
            .find_all(&format!("{INFO}/source:referenceToDigitalFile"))
            .into_iter()
            .filter_map(|element| element.attr("uri"))
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn contact(&self) -> Result<Option<ContactReader<'c>>> {
        Ok(self
            .dataset
            .resolve_at(&format!("{INFO}/source:referenceToContact"))?
            .map(ContactReader::new))
    }
}

/// Source dataset describing product category rules.
#[derive(Clone)]
pub struct PcrReader<'c> {
    source: SourceReader<'c>,
}

impl<'c> PcrReader<'c> {
    pub fn new(dataset: Dataset<'c>) -> Self {
        Self {
            source: SourceReader::new(dataset),
        }
    }

    pub fn source(&self) -> &SourceReader<'c> {
        &self.source
    }

    pub fn to_pcr(&self, langs: &LangPreference, base_url: Option<&str>, provider: &str) -> Result<Pcr> {
        let issuer = self
            .source
            .contact()?
            .map(|contact| contact.to_org(langs, None, ILCD_ATTACHMENT));
        let reference = self.source.own_reference();
        let mut pcr = Pcr {
            name: self.source.short_name(langs),
            issuer,
            ..Pcr::default()
        };
        if let Some(base_url) = base_url {
            pcr.attachments
                .insert(ILCD_ATTACHMENT.to_string(), reference.to_url(Some(base_url)));
        }
        if let Some(file) = self.source.digital_files().first() {
            let medium = self.source.dataset().context().medium();
            if let Some(url) = medium.resolve_url(&reference, Some(file)) {
                pcr.attachments.insert(PDF_ATTACHMENT.to_string(), url);
            }
        }
        if let Some(uuid) = self.source.uuid() {
            pcr.alt_ids.insert(provider.to_string(), uuid);
        }
        Ok(pcr)
    }
}

/// Source dataset naming a standard the EPD complies with.
#[derive(Clone)]
pub struct ComplianceReader<'c> {
    source: SourceReader<'c>,
}

impl<'c> ComplianceReader<'c> {
    pub fn new(dataset: Dataset<'c>) -> Self {
        Self {
            source: SourceReader::new(dataset),
        }
    }

    pub fn to_compliance(&self, langs: &LangPreference, base_url: Option<&str>) -> Compliance {
        let reference = self.source.own_reference();
        Compliance {
            uuid: reference.id.clone(),
            short_name: self.source.short_name(langs),
            name: self.source.description(langs),
            link: base_url.map(|base_url| reference.to_url(Some(base_url))),
        }
    }
}
