use crate::ilcd::epd::dialect::rules::ReferenceRule;
use crate::ilcd::epd::error::Result;
use crate::ilcd::epd::mapping::identifiers::{self, FLOW_PROPERTIES};
use crate::ilcd::epd::model::LangPreference;
use crate::ilcd::epd::reader::material::{MatMlMaterial, read_material};
use crate::ilcd::epd::reader::unit::UnitGroupReader;
use crate::ilcd::epd::reader::{Dataset, parse_text};

/// Reader for flow property datasets.
#[derive(Clone)]
pub struct FlowPropertyReader<'c> {
    dataset: Dataset<'c>,
    references: ReferenceRule,
}

impl<'c> FlowPropertyReader<'c> {
    pub fn new(dataset: Dataset<'c>) -> Self {
        Self {
            dataset,
            references: ReferenceRule::ObjectId,
        }
    }

    pub fn with_references(mut self, references: ReferenceRule) -> Self {
        self.references = references;
        self
    }

    pub fn uuid(&self) -> Option<String> {
        self.dataset
            .text("fp:flowPropertiesInformation/fp:dataSetInformation/common:UUID")
    }

    /// Property name; well-known properties get their standard name.
    pub fn name(&self, langs: &LangPreference) -> Option<String> {
        if let Some(mapped) = self
            .uuid()
            .and_then(|uuid| identifiers::lookup(FLOW_PROPERTIES, &uuid))
        {
            return Some(mapped.to_string());
        }
        self.dataset.localized(
            "fp:flowPropertiesInformation/fp:dataSetInformation/common:name",
            langs,
        )
    }

    pub fn unit_group(&self) -> Result<Option<UnitGroupReader<'c>>> {
        let Some(element) = self.dataset.root().find(
            "fp:flowPropertiesInformation/fp:quantitativeReference/fp:referenceToReferenceUnitGroup",
        ) else {
            return Ok(None);
        };
        Ok(self
            .dataset
            .resolve_with(element, self.references)?
            .map(UnitGroupReader::new))
    }
}

/// A flow property of a flow with its conversion factor.
#[derive(Clone)]
pub struct FlowPropertyEntry<'c> {
    pub internal_id: Option<String>,
    pub reader: FlowPropertyReader<'c>,
    pub mean_value: Option<f64>,
}

/// Reader for flow datasets.
#[derive(Clone)]
pub struct FlowReader<'c> {
    dataset: Dataset<'c>,
    references: ReferenceRule,
}

impl<'c> FlowReader<'c> {
    pub fn new(dataset: Dataset<'c>) -> Self {
        Self {
            dataset,
            references: ReferenceRule::ObjectId,
        }
    }

    /// Follows flow property and unit group references as `references` says.
    pub fn with_references(mut self, references: ReferenceRule) -> Self {
        self.references = references;
        self
    }

    pub fn uuid(&self) -> Option<String> {
        self.dataset
            .text("flow:flowInformation/flow:dataSetInformation/common:UUID")
    }

    pub fn name(&self, langs: &LangPreference) -> Option<String> {
        self.dataset.localized(
            "flow:flowInformation/flow:dataSetInformation/flow:name/flow:baseName",
            langs,
        )
    }

    fn reference_property_id(&self) -> Result<Option<u32>> {
        self.dataset.parse::<u32>(
            "flow:flowInformation/flow:quantitativeReference/flow:referenceToReferenceFlowProperty",
        )
    }

    /// The flow property the flow's amounts are expressed in.
    pub fn reference_property(&self) -> Result<Option<FlowPropertyEntry<'c>>> {
        let Some(id) = self.reference_property_id()? else {
            return Ok(None);
        };
        let id = id.to_string();
        Ok(self
            .properties()?
            .into_iter()
            .find(|entry| entry.internal_id.as_deref() == Some(id.as_str())))
    }

    /// Flow properties other than the reference one.
    pub fn other_properties(&self) -> Result<Vec<FlowPropertyEntry<'c>>> {
        let reference = self.reference_property_id()?.map(|id| id.to_string());
        Ok(self
            .properties()?
            .into_iter()
            .filter(|entry| reference.is_none() || entry.internal_id != reference)
            .collect())
    }

    fn properties(&self) -> Result<Vec<FlowPropertyEntry<'c>>> {
        let mut result = Vec::new();
        for element in self
            .dataset
            .root()
            .find_all("flow:flowProperties/flow:flowProperty")
        {
            let Some(target) = element.find("flow:referenceToFlowPropertyDataSet") else {
                continue;
            };
            let Some(dataset) = self.dataset.resolve_with(target, self.references)? else {
                continue;
            };
            result.push(FlowPropertyEntry {
                internal_id: element.attr("dataSetInternalID").map(str::to_string),
                reader: FlowPropertyReader::new(dataset).with_references(self.references),
                mean_value: parse_text::<f64>(
                    element.find("flow:meanValue"),
                    "flow:flowProperty/flow:meanValue",
                    self.dataset.reference(),
                )?,
            });
        }
        Ok(result)
    }

    /// MatML document embedded in the flow, if any.
    pub fn material(&self) -> Option<MatMlMaterial> {
        self.dataset
            .root()
            .find("flow:flowInformation/flow:dataSetInformation/common:other/mm:MatML_Doc")
            .and_then(read_material)
    }
}
