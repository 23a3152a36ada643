//! LCIA results and exchanges as per-stage indicator values.
//!
//! Values are returned as written, with the unit of the referenced unit
//! group; unit normalisation and the split into openEPD fields happen in
//! the mapper.

use tracing::{debug, warn};

use crate::ilcd::epd::error::Result;
use crate::ilcd::epd::mapping::identifiers::{self, IMPACTS, OUTPUT_FLOWS, RESOURCE_USES};
use crate::ilcd::epd::model::LangPreference;
use crate::ilcd::epd::reader::Dataset;
use crate::ilcd::epd::reader::unit::UnitGroupReader;
use crate::ilcd::epd::xml::Element;

/// Which indicator family a value list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorGroup {
    Impacts,
    ResourceUses,
    OutputFlows,
}

impl IndicatorGroup {
    fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            IndicatorGroup::Impacts => IMPACTS,
            IndicatorGroup::ResourceUses => RESOURCE_USES,
            IndicatorGroup::OutputFlows => OUTPUT_FLOWS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IndicatorGroup::Impacts => "impacts",
            IndicatorGroup::ResourceUses => "resource_uses",
            IndicatorGroup::OutputFlows => "output_flows",
        }
    }
}

/// Indicator name: an openEPD name found through the UUID tables, or the
/// short description of the referenced dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorName {
    Known(&'static str),
    Other(String),
}

impl IndicatorName {
    pub fn as_str(&self) -> &str {
        match self {
            IndicatorName::Known(name) => name,
            IndicatorName::Other(name) => name,
        }
    }
}

/// One `epd2013:amount`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAmount {
    /// Module with `A1-A3` read as `A1A2A3`.
    pub stage: String,
    pub scenario: Option<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawIndicator {
    pub name: IndicatorName,
    pub unit: String,
    pub amounts: Vec<RawAmount>,
}

/// Reads indicator values of a process dataset.
#[derive(Clone)]
pub struct ScopeSetReader<'c> {
    dataset: Dataset<'c>,
}

impl<'c> ScopeSetReader<'c> {
    pub fn new(dataset: Dataset<'c>) -> Self {
        Self { dataset }
    }

    /// Entries of `process:LCIAResults`.
    pub fn lcia_results(&self) -> Result<Vec<RawIndicator>> {
        let mut result = Vec::new();
        for element in self
            .dataset
            .root()
            .find_all("process:LCIAResults/process:LCIAResult")
        {
            if let Some(indicator) = self.read_indicator(
                element,
                "process:referenceToLCIAMethodDataSet",
                IndicatorGroup::Impacts,
            )? {
                result.push(indicator);
            }
        }
        Ok(result)
    }

    /// Input exchanges as resource uses, output exchanges as output flows.
    /// The reference product flow has no module amounts and drops out.
    pub fn exchanges(&self, group: IndicatorGroup) -> Result<Vec<RawIndicator>> {
        let direction = match group {
            IndicatorGroup::ResourceUses => "Input",
            IndicatorGroup::OutputFlows => "Output",
            IndicatorGroup::Impacts => return Ok(Vec::new()),
        };
        let mut result = Vec::new();
        for element in self
            .dataset
            .root()
            .find_all("process:exchanges/process:exchange")
        {
            if element.find_text("process:exchangeDirection") != Some(direction) {
                continue;
            }
            if let Some(indicator) =
                self.read_indicator(element, "process:referenceToFlowDataSet", group)?
            {
                result.push(indicator);
            }
        }
        Ok(result)
    }

    fn read_indicator(
        &self,
        element: &Element,
        reference_path: &str,
        group: IndicatorGroup,
    ) -> Result<Option<RawIndicator>> {
        let Some(reference) = element.find(reference_path) else {
            return Ok(None);
        };
        let Some(uuid) = reference.attr("refObjectId") else {
            return Ok(None);
        };
        let name = match identifiers::lookup(group.table(), uuid) {
            Some(known) => IndicatorName::Known(known),
            None => {
                match reference
                    .find_localized("common:shortDescription")
                    .resolve(&LangPreference::prefer("en"))
                {
                    Some(description) => IndicatorName::Other(description.to_string()),
                    None => return Ok(None),
                }
            }
        };

        let Some(unit) = self.unit_of(element)? else {
            debug!(indicator = name.as_str(), "indicator without unit skipped");
            return Ok(None);
        };

        let mut amounts = Vec::new();
        for amount in element.find_all("common:other/epd2013:amount") {
            let Some(module) = amount.attr("epd2013:module") else {
                continue;
            };
            let Some(text) = amount.text() else {
                continue;
            };
            let Ok(value) = text.parse::<f64>() else {
                warn!(
                    indicator = name.as_str(),
                    module,
                    value = text,
                    "unparsable amount skipped"
                );
                continue;
            };
            let stage = if module == "A1-A3" {
                "A1A2A3".to_string()
            } else {
                module.to_string()
            };
            amounts.push(RawAmount {
                stage,
                scenario: amount.attr("epd2013:scenario").map(str::to_string),
                value,
            });
        }
        Ok(Some(RawIndicator {
            name,
            unit,
            amounts,
        }))
    }

    /// Reference unit of the referenced unit group, else the reference's
    /// short description.
    fn unit_of(&self, element: &Element) -> Result<Option<String>> {
        let Some(reference) = element.find("common:other/epd2013:referenceToUnitGroupDataSet") else {
            return Ok(None);
        };
        if let Some(dataset) = self.dataset.resolve(reference)? {
            if let Some(unit) = UnitGroupReader::new(dataset).reference_unit(true)? {
                return Ok(Some(unit.name));
            }
        }
        Ok(reference
            .find_text("common:shortDescription")
            .map(str::to_string))
    }
}
