use crate::ilcd::epd::error::Result;
use crate::ilcd::epd::mapping::identifiers::{self, UNIT_GROUPS};
use crate::ilcd::epd::model::{LangPreference, UnitDef};
use crate::ilcd::epd::reader::{Dataset, parse_text};

/// Reader for unit group datasets.
#[derive(Clone)]
pub struct UnitGroupReader<'c> {
    dataset: Dataset<'c>,
}

impl<'c> UnitGroupReader<'c> {
    pub fn new(dataset: Dataset<'c>) -> Self {
        Self { dataset }
    }

    pub fn uuid(&self) -> Option<String> {
        self.dataset
            .text("ug:unitGroupInformation/ug:dataSetInformation/common:UUID")
    }

    pub fn version(&self) -> Option<String> {
        self.dataset
            .text("ug:administrativeInformation/ug:publicationAndOwnership/common:dataSetVersion")
    }

    pub fn name(&self, langs: &LangPreference) -> Option<String> {
        self.dataset.localized(
            "ug:unitGroupInformation/ug:dataSetInformation/common:name",
            langs,
        )
    }

    /// Reference unit of the group. With `map_by_uuid` the name of a
    /// well-known unit group replaces the written unit name.
    pub fn reference_unit(&self, map_by_uuid: bool) -> Result<Option<UnitDef>> {
        let Some(internal_id) = self.dataset.parse::<u32>(
            "ug:unitGroupInformation/ug:quantitativeReference/ug:referenceToReferenceUnit",
        )?
        else {
            return Ok(None);
        };
        let path = format!("ug:units/ug:unit[@dataSetInternalID='{internal_id}']");
        let Some(unit) = self.dataset.root().find(&path) else {
            return Ok(None);
        };
        let Some(mut name) = unit.find_text("ug:name").map(str::to_string) else {
            return Ok(None);
        };
        if map_by_uuid {
            let mapped = self
                .uuid()
                .and_then(|uuid| identifiers::lookup(UNIT_GROUPS, &uuid));
            if let Some(mapped) = mapped {
                name = mapped.to_string();
            }
        }
        let mean_value = parse_text::<f64>(
            unit.find("ug:meanValue"),
            "ug:units/ug:unit/ug:meanValue",
            self.dataset.reference(),
        )?
        .unwrap_or(1.0);
        Ok(Some(UnitDef { name, mean_value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ilcd::epd::model::{DatasetRef, DatasetType};
    use crate::ilcd::epd::reader::ReaderContext;
    use crate::ilcd::epd::reader::test_support::MemoryMedium;

    const MASS: &str = r#"<unitGroupDataSet xmlns="http://lca.jrc.it/ILCD/UnitGroup"
        xmlns:common="http://lca.jrc.it/ILCD/Common">
      <unitGroupInformation>
        <dataSetInformation>
          <common:UUID>ad38d542-3fe9-439d-9b95-2f5f7752acaf</common:UUID>
          <common:name xml:lang="en">Units of mass</common:name>
        </dataSetInformation>
        <quantitativeReference><referenceToReferenceUnit>1</referenceToReferenceUnit></quantitativeReference>
      </unitGroupInformation>
      <units>
        <unit dataSetInternalID="0"><name>g</name><meanValue>0.001</meanValue></unit>
        <unit dataSetInternalID="1"><name>kg</name><meanValue>1.0</meanValue></unit>
      </units>
    </unitGroupDataSet>"#;

    const GWP: &str = r#"<unitGroupDataSet xmlns="http://lca.jrc.it/ILCD/UnitGroup"
        xmlns:common="http://lca.jrc.it/ILCD/Common">
      <unitGroupInformation>
        <dataSetInformation><common:UUID>1ebf3012-d0db-4de2-aefd-ef30cedb0be1</common:UUID></dataSetInformation>
        <quantitativeReference><referenceToReferenceUnit>0</referenceToReferenceUnit></quantitativeReference>
      </unitGroupInformation>
      <units><unit dataSetInternalID="0"><name>kg CO2-Äqv.</name><meanValue>1</meanValue></unit></units>
    </unitGroupDataSet>"#;

    fn context() -> ReaderContext {
        ReaderContext::new(
            MemoryMedium::default()
                .with(DatasetType::UnitGroup, "mass", MASS)
                .with(DatasetType::UnitGroup, "gwp", GWP)
                .shared(),
        )
    }

    #[test]
    fn reads_reference_unit() {
        let context = context();
        let reader = UnitGroupReader::new(
            context
                .open_root(&DatasetRef::new(DatasetType::UnitGroup, "mass", None))
                .expect("unit group opened"),
        );
        let unit = reader
            .reference_unit(true)
            .expect("readable")
            .expect("present");
        assert_eq!(unit.name, "kg");
        assert_eq!(unit.mean_value, 1.0);
        assert_eq!(
            reader.name(&LangPreference::prefer("en")).as_deref(),
            Some("Units of mass")
        );
    }

    #[test]
    fn maps_well_known_groups_by_uuid() {
        let context = context();
        let reader = UnitGroupReader::new(
            context
                .open_root(&DatasetRef::new(DatasetType::UnitGroup, "gwp", None))
                .expect("unit group opened"),
        );
        let mapped = reader.reference_unit(true).expect("readable").expect("present");
        assert_eq!(mapped.name, "kgCO2e");
        let raw = reader.reference_unit(false).expect("readable").expect("present");
        assert_eq!(raw.name, "kg CO2-Äqv.");
    }
}
