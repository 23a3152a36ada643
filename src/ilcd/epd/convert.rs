//! Conversion orchestration: medium selection, dialect choice, language
//! preference, mapping and output.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::ilcd::epd::config::Config;
use crate::ilcd::epd::dialect::{DetectionInput, DialectRegistry, RegisteredDialect};
use crate::ilcd::epd::dialect::rules::RuleSet;
use crate::ilcd::epd::error::{IlcdError, Result};
use crate::ilcd::epd::mapping::{ConversionOptions, ConversionOutcome, Mapper};
use crate::ilcd::epd::medium::soda4lca::RemotePointer;
use crate::ilcd::epd::medium::{
    DirectoryMedium, Medium, SingleFileMedium, Soda4LcaMedium, ZipMedium,
};
use crate::ilcd::epd::model::DatasetRef;
use crate::ilcd::epd::reader::{EpdReader, ReaderContext};

/// Input and output format names accepted by `convert-epd`.
pub const INPUT_FORMAT: &str = "ilcd+epd";
pub const OUTPUT_FORMAT: &str = "openepd";

/// Where datasets are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Path(PathBuf),
    Url(String),
}

impl Input {
    /// Interprets a command line argument. `provider:uuid` shorthand of
    /// configured providers expands to a URL.
    pub fn parse(raw: &str, config: &Config) -> Self {
        let raw = raw.trim();
        if let Some(url) = config.expand_provider_reference(raw) {
            return Input::Url(url);
        }
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Input::Url(raw.to_string())
        } else {
            Input::Path(PathBuf::from(raw))
        }
    }

    fn label(&self) -> String {
        match self {
            Input::Path(path) => path.display().to_string(),
            Input::Url(url) => url.clone(),
        }
    }
}

/// Opens the medium behind an input: a directory, a single XML file, a zip
/// archive, or a soda4LCA process URL.
#[instrument(level = "debug", skip(config))]
pub fn open_medium(input: &Input, config: &Config) -> Result<Arc<dyn Medium>> {
    let medium: Arc<dyn Medium> = match input {
        Input::Url(url) => Arc::new(Soda4LcaMedium::open(url, &config.http)?),
        Input::Path(path) if path.is_dir() => Arc::new(DirectoryMedium::open(path)?),
        Input::Path(path) if !path.exists() => {
            return Err(IlcdError::MissingInput(path.clone()));
        }
        Input::Path(path) if has_extension(path, "xml") => Arc::new(SingleFileMedium::open(path)?),
        Input::Path(path) => Arc::new(ZipMedium::open(path)?),
    };
    debug!(medium = %medium.describe(), "medium opened");
    Ok(medium)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Opens the configured reference data medium, if any.
pub fn open_reference_data(config: &Config) -> Result<Option<Arc<dyn Medium>>> {
    match &config.conversion.reference_data {
        Some(path) => Ok(Some(open_medium(&Input::Path(path.clone()), config)?)),
        None => Ok(None),
    }
}

/// Per-run choices shared by every dataset of a run.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    /// Explicit dialect name; detection is used when absent.
    pub dialect: Option<String>,
    /// Requested document language; must be offered by the dataset.
    pub language: Option<String>,
    /// Write partial declarations instead of failing.
    pub allow_incomplete: bool,
}

/// A finished conversion of one dataset.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub reference: DatasetRef,
    pub dialect: &'static str,
    pub outcome: ConversionOutcome,
}

impl Conversion {
    /// Pretty JSON of the declaration. An incomplete declaration is an
    /// error unless `allow_incomplete` is set.
    pub fn to_json(&self, allow_incomplete: bool) -> Result<String> {
        if !self.outcome.is_complete() && !allow_incomplete {
            return Err(IlcdError::malformed(
                self.reference.to_string(),
                format!("incomplete declaration: {}", self.outcome.problems().join(", ")),
            ));
        }
        Ok(self.outcome.epd().to_json_pretty()?)
    }

    /// File name the declaration is stored under in a target directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.reference.id)
    }
}

/// Everything a conversion of one dataset needs besides the medium.
#[derive(Clone)]
pub struct Converter<'a> {
    pub config: &'a Config,
    pub registry: &'a DialectRegistry,
    pub request: &'a ConversionRequest,
    reference_data: Option<Arc<dyn Medium>>,
}

impl<'a> Converter<'a> {
    pub fn new(config: &'a Config, registry: &'a DialectRegistry, request: &'a ConversionRequest) -> Self {
        Self {
            config,
            registry,
            request,
            reference_data: None,
        }
    }

    /// Datasets missing from converted media are looked up here.
    pub fn with_reference_data(mut self, reference_data: Option<Arc<dyn Medium>>) -> Self {
        self.reference_data = reference_data;
        self
    }

    /// Converts one process of `medium`; `None` converts the medium's
    /// default process.
    #[instrument(level = "info", skip_all, fields(medium = %medium.describe(), dataset = ?reference))]
    pub fn convert(
        &self,
        medium: Arc<dyn Medium>,
        reference: Option<&DatasetRef>,
    ) -> Result<Conversion> {
        let context =
            ReaderContext::new(Arc::clone(&medium)).with_reference_data(self.reference_data.clone());
        let base_reader = EpdReader::open(&context, reference, RuleSet::base())?;
        let dialect = self.select_dialect(medium.as_ref(), &base_reader)?;
        let reader = EpdReader::new(base_reader.dataset().clone(), dialect.rules.clone());

        let langs = match (&self.request.language, self.config.conversion.language_preference()) {
            (Some(language), _) => reader.language_preference(Some(language.as_str()))?,
            (None, Some(configured)) => configured,
            (None, None) => reader.language_preference(None)?,
        };
        let base_url = self.config.conversion.base_url.clone().or_else(|| {
            medium
                .source_url()
                .and_then(|url| RemotePointer::parse(url).ok())
                .map(|pointer| pointer.base_url)
        });
        let mapper = Mapper::new(ConversionOptions::new(base_url, dialect.name()));
        let outcome = mapper.convert(&reader, &langs)?;
        let reference = reader.own_reference();
        info!(
            dataset = %reference,
            dialect = dialect.name(),
            languages = %langs,
            complete = outcome.is_complete(),
            datasets_read = context.cached_datasets(),
            "dataset converted"
        );
        Ok(Conversion {
            reference,
            dialect: dialect.name(),
            outcome,
        })
    }

    fn select_dialect(&self, medium: &dyn Medium, reader: &EpdReader<'_>) -> Result<&'a RegisteredDialect> {
        if let Some(name) = &self.request.dialect {
            return self.registry.by_name(name);
        }
        if let Some(name) = medium
            .source_url()
            .and_then(|url| self.config.provider_dialect(url))
        {
            return self.registry.by_name(name);
        }
        let input = DetectionInput {
            url: medium.source_url().map(str::to_string),
            permanent_uri: reader.permanent_uri(),
            classification_systems: reader
                .product_classes()
                .into_iter()
                .map(|(system, _)| system)
                .collect(),
        };
        Ok(self.registry.detect(&input))
    }
}

/// Where `convert-epd` writes its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Stdout,
    Directory(PathBuf),
}

/// Converts the default process of `input` and writes the declaration.
/// Returns the path written, `None` for stdout.
#[instrument(level = "info", skip_all, fields(input = %input.label()))]
pub fn convert_epd(
    input: &Input,
    output: &Output,
    config: &Config,
    registry: &DialectRegistry,
    request: &ConversionRequest,
) -> Result<Option<PathBuf>> {
    let medium = open_medium(input, config)?;
    let conversion = Converter::new(config, registry, request)
        .with_reference_data(open_reference_data(config)?)
        .convert(medium, None)?;
    if !conversion.outcome.is_complete() {
        for problem in conversion.outcome.problems() {
            warn!(dataset = %conversion.reference, problem, "incomplete declaration");
        }
    }
    let json = conversion.to_json(request.allow_incomplete)?;
    match output {
        Output::Stdout => {
            println!("{json}");
            Ok(None)
        }
        Output::Directory(dir) => {
            let path = write_output(dir, &conversion.file_name(), json.as_bytes())?;
            Ok(Some(path))
        }
    }
}

/// Writes `bytes` to `dir/name`, creating the directory.
pub fn write_output(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "output written");
    Ok(path)
}

/// Checks the `-i`/`-o` format pair.
pub fn check_formats(from: &str, to: &str) -> Result<()> {
    if from.eq_ignore_ascii_case(INPUT_FORMAT) && to.eq_ignore_ascii_case(OUTPUT_FORMAT) {
        Ok(())
    } else {
        Err(IlcdError::UnsupportedConversion {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
