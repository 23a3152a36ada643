use serde_json::json;

use crate::ilcd::epd::mapping::sanitize::{cleanup_phone, cleanup_website, domain_from_url};
use crate::ilcd::epd::model::openepd::{ContactInfo, EXTENSION_NAME, ILCD_ATTACHMENT, Location, Org};
use crate::ilcd::epd::model::{DatasetRef, DatasetType, LangPreference};
use crate::ilcd::epd::reader::Dataset;

const INFO: &str = "contact:contactInformation/contact:dataSetInformation";

/// Reader for contact datasets.
#[derive(Clone)]
pub struct ContactReader<'c> {
    dataset: Dataset<'c>,
}

impl<'c> ContactReader<'c> {
    pub fn new(dataset: Dataset<'c>) -> Self {
        Self { dataset }
    }

    fn info(&self, field: &str) -> Option<String> {
        self.dataset.text(&format!("{INFO}/{field}"))
    }

    pub fn uuid(&self) -> Option<String> {
        self.info("common:UUID")
    }

    pub fn version(&self) -> Option<String> {
        self.dataset.text(
            "contact:administrativeInformation/contact:publicationAndOwnership/common:dataSetVersion",
        )
    }

    /// Reference to this dataset, falling back to the reference it was
    /// loaded under when the UUID is missing.
    pub fn own_reference(&self) -> DatasetRef {
        match self.uuid() {
            Some(uuid) => DatasetRef::new(DatasetType::Contact, uuid, self.version()),
            None => self.dataset.reference().clone(),
        }
    }

    pub fn name(&self, langs: &LangPreference) -> Option<String> {
        self.dataset.localized(&format!("{INFO}/common:name"), langs)
    }

    pub fn short_name(&self, langs: &LangPreference) -> Option<String> {
        self.dataset
            .localized(&format!("{INFO}/common:shortName"), langs)
    }

    /// Level 0 class, e.g. `Organisations` or `Persons`.
    pub fn contact_class(&self) -> Option<String> {
        self.info("contact:classificationInformation/common:classification/common:class[@level='0']")
    }

    pub fn email(&self) -> Option<String> {
        self.info("contact:email")
    }

    pub fn phone(&self) -> Option<String> {
        self.info("contact:telephone")
    }

    pub fn website(&self) -> Option<String> {
        self.info("contact:WWWAddress")
    }

    pub fn address(&self) -> Option<String> {
        self.info("contact:contactAddress")
    }

    /// Sanitised contact details.
    pub fn contact_info(&self) -> ContactInfo {
        ContactInfo {
            contact_person: None,
            email: self.email(),
            phone: self.phone().map(|phone| cleanup_phone(&phone)),
            website: self.website().map(|website| cleanup_website(&website)),
            address: self.address(),
        }
    }

    /// Converts the contact into an openEPD organisation. `base_url` adds
    /// an ILCD attachment; `provider` keys the UUID in `alt_ids`.
    pub fn to_org(&self, langs: &LangPreference, base_url: Option<&str>, provider: &str) -> Org {
        let contact = self.contact_info();
        let mut org = Org {
            name: self.name(langs).or_else(|| self.short_name(langs)),
            web_domain: self.website().and_then(|website| domain_from_url(&website)),
            ..Org::default()
        };
        if let Some(base_url) = base_url {
            org.attachments.insert(
                ILCD_ATTACHMENT.to_string(),
                self.own_reference().to_url(Some(base_url)),
            );
        }
        if let Some(address) = &contact.address {
            org.hq_location = Some(Location {
                address: address.clone(),
            });
        }
        if let Some(uuid) = self.uuid() {
            org.alt_ids.insert(provider.to_string(), uuid);
        }
        if contact.has_values() {
            org.ext
                .insert(EXTENSION_NAME.to_string(), json!({ "contact": contact }));
        }
        org
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ilcd::epd::reader::ReaderContext;
    use crate::ilcd::epd::reader::test_support::MemoryMedium;

    const CONTACT: &str = r#"<contactDataSet xmlns="http://lca.jrc.it/ILCD/Contact"
        xmlns:common="http://lca.jrc.it/ILCD/Common">
      <contactInformation>
        <dataSetInformation>
          <common:UUID>d1b2c3a4-0000-4000-8000-000000000001</common:UUID>
          <common:shortName xml:lang="en">Parkett GmbH</common:shortName>
          <common:name xml:lang="de">Parkett Herstellung GmbH</common:name>
          <common:name xml:lang="en">Parquet Manufacturing Ltd</common:name>
          <classificationInformation>
            <common:classification><common:class level="0">Organisations</common:class></common:classification>
          </classificationInformation>
          <contactAddress>Hauptstr. 1, 10115 Berlin</contactAddress>
          <telephone>Tel: +49 (0) 30 1234567</telephone>
          <email>info@parkett.example</email>
          <WWWAddress>www.parkett.example</WWWAddress>
        </dataSetInformation>
      </contactInformation>
      <administrativeInformation>
        <publicationAndOwnership><common:dataSetVersion>01.02.000</common:dataSetVersion></publicationAndOwnership>
      </administrativeInformation>
    </contactDataSet>"#;

    #[test]
    fn converts_to_org() {
        let context = ReaderContext::new(
            MemoryMedium::default()
                .with(DatasetType::Contact, "c1", CONTACT)
                .shared(),
        );
        let reader = ContactReader::new(
            context
                .open_root(&DatasetRef::new(DatasetType::Contact, "c1", None))
                .expect("contact opened"),
        );
        assert_eq!(reader.contact_class().as_deref(), Some("Organisations"));

        let org = reader.to_org(
            &LangPreference::prefer("en"),
            Some("https://data.example/resource"),
            "data.example",
        );
        assert_eq!(org.name.as_deref(), Some("Parquet Manufacturing Ltd"));
        assert_eq!(org.web_domain.as_deref(), Some("parkett.example"));
        assert_eq!(
            org.alt_ids.get("data.example").map(String::as_str),
            Some("d1b2c3a4-0000-4000-8000-000000000001")
        );
        assert_eq!(
            org.attachments.get("ILCD").map(String::as_str),
            Some(
                "https://data.example/resource/contacts/d1b2c3a4-0000-4000-8000-000000000001?version=01.02.000"
            )
        );
        assert_eq!(
            org.hq_location.map(|location| location.address).as_deref(),
            Some("Hauptstr. 1, 10115 Berlin")
        );
        let contact = &org.ext["ilcd"]["contact"];
        assert_eq!(contact["phone"], "+49 (0) 30 1234567");
        assert_eq!(contact["website"], "https://www.parkett.example/");
    }
}
