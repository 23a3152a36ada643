//! Parallel conversion of many processes into a target directory.
//!
//! Every dataset gets its own reader context and output; a failing dataset
//! is recorded in the summary and never stops the others.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::ilcd::epd::config::Config;
use crate::ilcd::epd::convert::{Conversion, Converter, write_output};
use crate::ilcd::epd::dialect::rules::RuleSet;
use crate::ilcd::epd::error::Result;
use crate::ilcd::epd::medium::soda4lca::{ProcessQuery, Soda4LcaClient};
use crate::ilcd::epd::medium::{Medium, Soda4LcaMedium};
use crate::ilcd::epd::model::{DatasetRef, DatasetType};
use crate::ilcd::epd::reader::{EpdReader, ReaderContext};

/// Page size used when walking search results.
pub const SEARCH_PAGE_SIZE: usize = 100;

/// Datasets of a batch run.
pub enum BatchSource {
    /// Every process of an opened archive or directory.
    Local(Arc<dyn Medium>),
    /// Processes found on a soda4LCA server; each one is exported on its own.
    Remote {
        client: Soda4LcaClient,
        processes: Vec<DatasetRef>,
    },
}

impl BatchSource {
    /// Collects the processes of a soda4LCA search.
    #[instrument(level = "info", skip_all, fields(base_url = %client.base_url()))]
    pub fn search(client: Soda4LcaClient, query: &ProcessQuery, limit: Option<usize>) -> Result<Self> {
        let mut processes = Vec::new();
        for item in client.processes(query, SEARCH_PAGE_SIZE) {
            processes.push(item?.to_ref());
            if limit.is_some_and(|limit| processes.len() >= limit) {
                break;
            }
        }
        info!(found = processes.len(), "search finished");
        Ok(BatchSource::Remote { client, processes })
    }

    fn references(&self) -> Result<Vec<DatasetRef>> {
        match self {
            BatchSource::Local(medium) => medium.list(DatasetType::Process),
            BatchSource::Remote { processes, .. } => Ok(processes.clone()),
        }
    }

    fn medium_for(&self, reference: &DatasetRef, config: &Config) -> Result<Arc<dyn Medium>> {
        match self {
            BatchSource::Local(medium) => Ok(Arc::clone(medium)),
            BatchSource::Remote { client, .. } => {
                let endpoint = client.entity_url(reference, None);
                Ok(Arc::new(Soda4LcaMedium::open(&endpoint, &config.http)?))
            }
        }
    }
}

/// Options of a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub target_dir: PathBuf,
    /// Also store the EPD document of each process as `<uuid>.pdf`.
    pub download_documents: bool,
}

/// What happened to one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatasetReport {
    Converted {
        dataset: String,
        dialect: &'static str,
        output: PathBuf,
        document: Option<PathBuf>,
    },
    Incomplete {
        dataset: String,
        problems: Vec<String>,
    },
    Failed {
        dataset: String,
        error: String,
    },
}

/// Result of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub reports: Vec<DatasetReport>,
}

impl BatchSummary {
    pub fn converted(&self) -> usize {
        self.count(|report| matches!(report, DatasetReport::Converted { .. }))
    }

    pub fn incomplete(&self) -> usize {
        self.count(|report| matches!(report, DatasetReport::Incomplete { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|report| matches!(report, DatasetReport::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&DatasetReport) -> bool) -> usize {
        self.reports.iter().filter(|report| predicate(report)).count()
    }
}

/// Converts every dataset of `source` in parallel. Reports keep the order
/// of the source listing.
#[instrument(level = "info", skip_all, fields(target = %options.target_dir.display()))]
pub fn convert_all(
    source: &BatchSource,
    converter: &Converter<'_>,
    options: &BatchOptions,
) -> Result<BatchSummary> {
    let references = source.references()?;
    info!(datasets = references.len(), "batch started");
    let reports: Vec<DatasetReport> = references
        .par_iter()
        .map(|reference| convert_one(source, converter, options, reference))
        .collect();
    let summary = BatchSummary { reports };
    info!(
        converted = summary.converted(),
        incomplete = summary.incomplete(),
        failed = summary.failed(),
        "batch finished"
    );
    Ok(summary)
}

fn convert_one(
    source: &BatchSource,
    converter: &Converter<'_>,
    options: &BatchOptions,
    reference: &DatasetRef,
) -> DatasetReport {
    let dataset = reference.to_string();
    let result = source
        .medium_for(reference, converter.config)
        .and_then(|medium| {
            let conversion = converter.convert(Arc::clone(&medium), Some(reference))?;
            Ok((medium, conversion))
        });
    let (medium, conversion) = match result {
        Ok(converted) => converted,
        Err(err) => {
            warn!(%dataset, error = %err, "dataset failed");
            return DatasetReport::Failed {
                dataset,
                error: err.to_string(),
            };
        }
    };
    if !conversion.outcome.is_complete() && !converter.request.allow_incomplete {
        let problems = conversion.outcome.problems();
        warn!(%dataset, ?problems, "dataset incomplete, not written");
        return DatasetReport::Incomplete { dataset, problems };
    }
    match store(&conversion, medium, reference, options) {
        Ok((output, document)) => DatasetReport::Converted {
            dataset,
            dialect: conversion.dialect,
            output,
            document,
        },
        Err(err) => {
            warn!(%dataset, error = %err, "writing output failed");
            DatasetReport::Failed {
                dataset,
                error: err.to_string(),
            }
        }
    }
}

fn store(
    conversion: &Conversion,
    medium: Arc<dyn Medium>,
    reference: &DatasetRef,
    options: &BatchOptions,
) -> Result<(PathBuf, Option<PathBuf>)> {
    let json = conversion.to_json(true)?;
    let output = write_output(&options.target_dir, &conversion.file_name(), json.as_bytes())?;
    let document = if options.download_documents {
        store_document(medium, reference, &options.target_dir, &conversion.reference.id)
    } else {
        None
    };
    Ok((output, document))
}

/// A missing or unreadable EPD document is logged and skipped.
fn store_document(
    medium: Arc<dyn Medium>,
    reference: &DatasetRef,
    target_dir: &Path,
    id: &str,
) -> Option<PathBuf> {
    let context = ReaderContext::new(medium);
    let document = EpdReader::open(&context, Some(reference), RuleSet::base())
        .and_then(|reader| reader.epd_document());
    match document {
        Ok(Some(bytes)) => match write_output(target_dir, &format!("{id}.pdf"), &bytes) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(dataset = %reference, error = %err, "EPD document not written");
                None
            }
        },
        Ok(None) => {
            warn!(dataset = %reference, "no EPD document, skipped");
            None
        }
        Err(err) => {
            warn!(dataset = %reference, error = %err, "EPD document unavailable, skipped");
            None
        }
    }
}
