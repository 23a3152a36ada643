use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ilcd_epd_tools::config::Config;
use ilcd_epd_tools::convert::{self, ConversionRequest, Converter, Input, Output};
use ilcd_epd_tools::dialect::DialectRegistry;
use ilcd_epd_tools::mapping::ConversionOutcome;
use serde_json::Value;
use tempfile::tempdir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

const PROCESS_UUID: &str = "5e2c1a7b-0000-4000-8000-0000000000aa";

const PROCESS: &str = r#"<processDataSet xmlns="http://lca.jrc.it/ILCD/Process"
    xmlns:common="http://lca.jrc.it/ILCD/Common"
    xmlns:epd="http://www.iai.kit.edu/EPD/2013">
  <processInformation>
    <dataSetInformation>
      <common:UUID>5e2c1a7b-0000-4000-8000-0000000000aa</common:UUID>
      <name><baseName xml:lang="en">Clay brick</baseName></name>
      <classificationInformation>
        <common:classification name="{SYSTEM}">
          <common:class level="0" classId="M">Masonry units</common:class>
          <common:class level="1" classId="M.2">Fired clay</common:class>
        </common:classification>
      </classificationInformation>
    </dataSetInformation>
    <quantitativeReference><referenceToReferenceFlow>0</referenceToReferenceFlow></quantitativeReference>
  </processInformation>
  <modellingAndValidation>
    <LCIMethodAndAllocation><typeOfDataSet>EPD</typeOfDataSet></LCIMethodAndAllocation>
  </modellingAndValidation>
  <administrativeInformation>
    <publicationAndOwnership>
      <common:dataSetVersion>01.00.000</common:dataSetVersion>
      <common:permanentDataSetURI>{URI}</common:permanentDataSetURI>
      <common:referenceToOwnershipOfDataSet type="contact data set" refObjectId="absent-owner"/>
      <common:referenceToRegistrationAuthority type="contact data set" refObjectId="{OPERATOR}">
        <common:shortDescription xml:lang="en">EPD Denmark</common:shortDescription>
      </common:referenceToRegistrationAuthority>
    </publicationAndOwnership>
  </administrativeInformation>
  <exchanges>
    <exchange dataSetInternalID="0">
      <referenceToFlowDataSet type="flow data set" refObjectId="product"/>
      <exchangeDirection>Output</exchangeDirection>
      <meanAmount>1</meanAmount>
    </exchange>
  </exchanges>
  <LCIAResults>
    <LCIAResult>
      <referenceToLCIAMethodDataSet type="LCIA method data set" refObjectId="77e416eb-a363-4258-a04e-171d843a6460"/>
      <common:other>
        <epd:referenceToUnitGroupDataSet type="unit group data set" refObjectId="{GWP_UNITS}"/>
        <epd:amount epd:module="A1-A3">1500</epd:amount>
      </common:other>
    </LCIAResult>
  </LCIAResults>
</processDataSet>"#;

const FLOW: &str = r#"<flowDataSet xmlns="http://lca.jrc.it/ILCD/Flow"
    xmlns:common="http://lca.jrc.it/ILCD/Common">
  <flowInformation>
    <quantitativeReference><referenceToReferenceFlowProperty>0</referenceToReferenceFlowProperty></quantitativeReference>
  </flowInformation>
  <flowProperties>
    <flowProperty dataSetInternalID="0">
      <referenceToFlowPropertyDataSet type="flow property data set" refObjectId="mass"/>
      <meanValue>1</meanValue>
    </flowProperty>
  </flowProperties>
</flowDataSet>"#;

const MASS: &str = r#"<flowPropertyDataSet xmlns="http://lca.jrc.it/ILCD/FlowProperty"
    xmlns:common="http://lca.jrc.it/ILCD/Common">
  <flowPropertiesInformation>
    <dataSetInformation><common:name xml:lang="en">Mass</common:name></dataSetInformation>
    <quantitativeReference>
      <referenceToReferenceUnitGroup type="unit group data set" refObjectId="mass-units"/>
    </quantitativeReference>
  </flowPropertiesInformation>
</flowPropertyDataSet>"#;

const OPERATOR: &str = r#"<contactDataSet xmlns="http://lca.jrc.it/ILCD/Contact"
    xmlns:common="http://lca.jrc.it/ILCD/Common">
  <contactInformation><dataSetInformation>
    <common:UUID>c0000000-0000-4000-8000-0000000000c1</common:UUID>
    <common:name xml:lang="en">Brick Programme</common:name>
  </dataSetInformation></contactInformation>
</contactDataSet>"#;

fn unit_group(unit: &str) -> String {
    format!(
        r#"<unitGroupDataSet xmlns="http://lca.jrc.it/ILCD/UnitGroup"
    xmlns:common="http://lca.jrc.it/ILCD/Common">
  <unitGroupInformation>
    <quantitativeReference><referenceToReferenceUnit>0</referenceToReferenceUnit></quantitativeReference>
  </unitGroupInformation>
  <units><unit dataSetInternalID="0"><name>{unit}</name><meanValue>1</meanValue></unit></units>
</unitGroupDataSet>"#
    )
}

struct Fixture {
    system: &'static str,
    uri: &'static str,
    gwp_units: &'static str,
    operator: &'static str,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            system: "Custom",
            uri: "https://data.example.org/resource/processes/5e2c1a7b",
            gwp_units: "gwp-units",
            operator: "operator",
        }
    }
}

impl Fixture {
    fn entries(&self) -> Vec<(String, String)> {
        let process = PROCESS
            .replace("{SYSTEM}", self.system)
            .replace("{URI}", self.uri)
            .replace("{GWP_UNITS}", self.gwp_units)
            .replace("{OPERATOR}", self.operator);
        vec![
            (format!("ILCD/processes/{PROCESS_UUID}_01.00.000.xml"), process),
            ("ILCD/flows/product.xml".to_string(), FLOW.to_string()),
            ("ILCD/flowproperties/mass.xml".to_string(), MASS.to_string()),
            ("ILCD/unitgroups/mass-units.xml".to_string(), unit_group("kg")),
            ("ILCD/unitgroups/gwp-units.xml".to_string(), unit_group("g CO2 eq.")),
            ("ILCD/unitgroups/odd-units.xml".to_string(), unit_group("bananas")),
            ("ILCD/contacts/operator.xml".to_string(), OPERATOR.to_string()),
        ]
    }

    fn write_zip(&self, dir: &Path) -> PathBuf {
        fs::create_dir_all(dir).expect("create archive folder");
        let path = dir.join("epd.zip");
        let file = fs::File::create(&path).expect("create archive");
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in self.entries() {
            writer.start_file(name, options).expect("start entry");
            writer
                .write_all(content.as_bytes())
                .expect("write entry");
        }
        writer.finish().expect("finish archive");
        path
    }

    fn write_dir(&self, dir: &Path) -> PathBuf {
        for (name, content) in self.entries() {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().expect("entry has a folder")).expect("create folder");
            fs::write(path, content).expect("write dataset");
        }
        dir.to_path_buf()
    }
}

fn registry() -> DialectRegistry {
    DialectRegistry::builtin().expect("builtin dialects")
}

fn convert_path(path: &Path, request: &ConversionRequest) -> convert::Conversion {
    let config = Config::default();
    let registry = registry();
    let medium =
        convert::open_medium(&Input::Path(path.to_path_buf()), &config).expect("medium opened");
    Converter::new(&config, &registry, request)
        .convert(medium, None)
        .expect("dataset converted")
}

#[test]
fn converts_archive_into_openepd() {
    let dir = tempdir().expect("tempdir");
    let archive = Fixture::default().write_zip(dir.path());

    let conversion = convert_path(&archive, &ConversionRequest::default());
    assert!(conversion.outcome.is_complete(), "{:?}", conversion.outcome.problems());
    assert_eq!(conversion.dialect, "generic");
    assert_eq!(conversion.file_name(), format!("{PROCESS_UUID}.json"));

    let json: Value =
        serde_json::from_str(&conversion.to_json(false).expect("json")).expect("valid json");
    assert_eq!(json["doctype"], "openEPD");
    assert_eq!(json["name"], "Clay brick");
    assert_eq!(json["declared_unit"]["qty"], 1.0);
    assert_eq!(json["declared_unit"]["unit"], "kg");

    let gwp = &json["impacts"]["gwp"]["A1A2A3"];
    assert_eq!(gwp["unit"], "kgCO2e");
    assert!((gwp["mean"].as_f64().expect("number") - 1.5).abs() < 1e-9);

    assert!(json.get("manufacturer").is_none());
    assert_eq!(json["program_operator"]["name"], "Brick Programme");

    let unknown = &json["ext"]["ilcd"]["unknown_classification"][0];
    assert_eq!(unknown["system"], "Custom");
    assert_eq!(unknown["code"], "M.2");
    assert_eq!(unknown["path"], "Masonry units / Fired clay");
    assert_eq!(json["ext"]["ilcd"]["dataset_type"], "EPD");
}

#[test]
fn directory_and_archive_agree() {
    let zipped = tempdir().expect("tempdir");
    let unpacked = tempdir().expect("tempdir");
    let fixture = Fixture::default();
    let request = ConversionRequest::default();

    let from_zip = convert_path(&fixture.write_zip(zipped.path()), &request);
    let from_dir = convert_path(&fixture.write_dir(unpacked.path()), &request);
    assert_eq!(
        from_zip.to_json(false).expect("json"),
        from_dir.to_json(false).expect("json")
    );
}

#[test]
fn output_is_byte_identical_across_runs() {
    let dir = tempdir().expect("tempdir");
    let archive = Fixture::default().write_zip(dir.path());
    let request = ConversionRequest::default();

    let first = convert_path(&archive, &request).to_json(false).expect("json");
    let second = convert_path(&archive, &request).to_json(false).expect("json");
    assert_eq!(first, second);
}

#[test]
fn unknown_indicator_unit_makes_mapping_incomplete() {
    let dir = tempdir().expect("tempdir");
    let fixture = Fixture {
        gwp_units: "odd-units",
        ..Fixture::default()
    };
    let archive = fixture.write_zip(dir.path());

    let conversion = convert_path(&archive, &ConversionRequest::default());
    match &conversion.outcome {
        ConversionOutcome::MappingIncomplete {
            missing_fields,
            unit_errors,
            ..
        } => {
            assert!(missing_fields.is_empty());
            assert_eq!(unit_errors.len(), 1);
            assert_eq!(unit_errors[0].unit, "bananas");
        }
        ConversionOutcome::Complete(_) => panic!("unit 'bananas' must not map"),
    }
    assert!(conversion.outcome.epd().impacts.is_none());

    let err = conversion.to_json(false).expect_err("incomplete is refused");
    assert!(err.to_string().contains("bananas"));
    assert!(conversion.to_json(true).is_ok());
}

#[test]
fn dialect_detection_is_deterministic() {
    let dir = tempdir().expect("tempdir");
    let request = ConversionRequest::default();

    let norway = Fixture {
        system: "EPDNorge",
        ..Fixture::default()
    }
    .write_zip(&dir.path().join("norway"));
    let environdec = Fixture {
        uri: "https://data.environdec.com/resource/processes/5e2c1a7b",
        ..Fixture::default()
    }
    .write_zip(&dir.path().join("environdec"));

    for _ in 0..3 {
        assert_eq!(convert_path(&norway, &request).dialect, "epdnorge");
        assert_eq!(convert_path(&environdec, &request).dialect, "environdec");
    }

    let explicit = ConversionRequest {
        dialect: Some("OEKOBAUDAT".into()),
        ..ConversionRequest::default()
    };
    assert_eq!(convert_path(&environdec, &explicit).dialect, "oekobaudat");
}

#[test]
fn danish_operator_falls_back_to_reference_description() {
    let dir = tempdir().expect("tempdir");
    let archive = Fixture {
        operator: "unpublished",
        ..Fixture::default()
    }
    .write_zip(dir.path());

    let generic = convert_path(&archive, &ConversionRequest::default());
    assert!(generic.outcome.epd().program_operator.is_none());

    let request = ConversionRequest {
        dialect: Some("epd-denmark".into()),
        ..ConversionRequest::default()
    };
    let danish = convert_path(&archive, &request);
    assert_eq!(danish.dialect, "epddenmark");
    let json: Value =
        serde_json::from_str(&danish.to_json(false).expect("json")).expect("valid json");
    assert_eq!(json["program_operator"], serde_json::json!({"name": "EPD Denmark"}));
    assert_eq!(json["language"], "en");
}

#[test]
fn convert_epd_writes_into_target_directory() {
    let dir = tempdir().expect("tempdir");
    let archive = Fixture::default().write_zip(dir.path());
    let target = dir.path().join("out");

    let written = convert::convert_epd(
        &Input::Path(archive),
        &Output::Directory(target.clone()),
        &Config::default(),
        &registry(),
        &ConversionRequest::default(),
    )
    .expect("conversion succeeds")
    .expect("file written");

    assert_eq!(written, target.join(format!("{PROCESS_UUID}.json")));
    let json: Value =
        serde_json::from_str(&fs::read_to_string(&written).expect("read output")).expect("json");
    assert_eq!(json["name"], "Clay brick");
}

#[test]
fn unknown_language_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let archive = Fixture::default().write_zip(dir.path());
    let config = Config::default();
    let registry = registry();
    let request = ConversionRequest {
        language: Some("fr".into()),
        ..ConversionRequest::default()
    };
    let medium = convert::open_medium(&Input::Path(archive), &config).expect("medium opened");
    let err = Converter::new(&config, &registry, &request)
        .convert(medium, None)
        .expect_err("french is not offered");
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn reference_data_fills_missing_datasets() {
    let input = tempdir().expect("tempdir");
    let reference = tempdir().expect("tempdir");
    for (name, content) in Fixture::default().entries() {
        let target = if name.ends_with("mass-units.xml") {
            reference.path().join(name)
        } else {
            input.path().join(name)
        };
        fs::create_dir_all(target.parent().expect("entry has a folder")).expect("create folder");
        fs::write(target, content).expect("write dataset");
    }
    let config = Config::default();
    let registry = registry();
    let request = ConversionRequest::default();
    let open = |path: &Path| {
        convert::open_medium(&Input::Path(path.to_path_buf()), &config).expect("medium opened")
    };

    let without = Converter::new(&config, &registry, &request)
        .convert(open(input.path()), None)
        .expect("dataset converted");
    assert_eq!(without.outcome.problems(), vec!["missing declared_unit"]);

    let with = Converter::new(&config, &registry, &request)
        .with_reference_data(Some(open(reference.path())))
        .convert(open(input.path()), None)
        .expect("dataset converted");
    assert!(with.outcome.is_complete());
    let declared = with.outcome.epd().declared_unit.as_ref().expect("declared unit");
    assert_eq!(declared.unit, "kg");
}
