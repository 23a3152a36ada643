use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ilcd_epd_tools::batch::{self, BatchOptions, BatchSource};
use ilcd_epd_tools::config::Config;
use ilcd_epd_tools::convert::{
    self, ConversionRequest, Converter, INPUT_FORMAT, Input, OUTPUT_FORMAT, Output,
};
use ilcd_epd_tools::dialect::DialectRegistry;
use ilcd_epd_tools::medium::soda4lca::{ProcessQuery, Soda4LcaClient};
use ilcd_epd_tools::{IlcdError, Result};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(error.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    init_logging(cli.debug, &config.logging.level)?;
    let registry = DialectRegistry::builtin()?;

    match cli.command {
        Command::ConvertEpd(args) => execute_convert(args, &config, &registry),
        Command::Batch(args) => execute_batch(args, &config, &registry),
        Command::Search(args) => execute_search(args, &config),
        Command::Categories(args) => execute_categories(args, &config),
        Command::Dialects => list_dialects(&registry),
    }
}

/// `RUST_LOG` wins over `--debug`, which wins over the configured level.
fn init_logging(debug: bool, level: &str) -> Result<()> {
    let fallback = if debug { "debug" } else { level };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(fallback).map_err(|err| IlcdError::Logging(err.to_string()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| IlcdError::Logging(err.to_string()))
}

fn execute_convert(args: ConvertArgs, config: &Config, registry: &DialectRegistry) -> Result<()> {
    convert::check_formats(&args.input_format, &args.output_format)?;
    let input = Input::parse(&args.source, config);
    let request = ConversionRequest {
        dialect: args.dialect,
        language: args.lang,
        allow_incomplete: args.allow_incomplete || config.conversion.allow_incomplete,
    };
    let output = match args.target_dir {
        Some(dir) => Output::Directory(dir),
        None => Output::Stdout,
    };
    if let Some(path) = convert::convert_epd(&input, &output, config, registry, &request)? {
        eprintln!("written {}", path.display());
    }
    Ok(())
}

fn execute_batch(args: BatchArgs, config: &Config, registry: &DialectRegistry) -> Result<()> {
    let source = match Input::parse(&resolve_server(&args.source, config), config) {
        Input::Url(url) => {
            let client = Soda4LcaClient::new(&url, &config.http)?;
            let query = process_query(args.lang.clone(), &args.params)?;
            BatchSource::search(client, &query, args.limit)?
        }
        input @ Input::Path(_) => BatchSource::Local(convert::open_medium(&input, config)?),
    };
    let request = ConversionRequest {
        dialect: args.dialect,
        language: args.lang,
        allow_incomplete: args.allow_incomplete || config.conversion.allow_incomplete,
    };
    let converter = Converter::new(config, registry, &request)
        .with_reference_data(convert::open_reference_data(config)?);
    let options = BatchOptions {
        target_dir: args.target_dir,
        download_documents: args.pdf,
    };
    let summary = batch::convert_all(&source, &converter, &options)?;
    let mut stdout = std::io::stdout().lock();
    for report in &summary.reports {
        writeln!(stdout, "{}", serde_json::to_string(report)?)?;
    }
    eprintln!(
        "converted {}, incomplete {}, failed {}",
        summary.converted(),
        summary.incomplete(),
        summary.failed()
    );
    Ok(())
}

fn execute_search(args: SearchArgs, config: &Config) -> Result<()> {
    let base_url = resolve_server(&args.server, config);
    let client = Soda4LcaClient::new(&base_url, &config.http)?;
    let query = process_query(args.lang, &args.params)?;
    let mut stdout = std::io::stdout().lock();
    for (index, item) in client.processes(&query, batch::SEARCH_PAGE_SIZE).enumerate() {
        if args.limit.is_some_and(|limit| index >= limit) {
            break;
        }
        writeln!(stdout, "{}", serde_json::to_string(&item?)?)?;
    }
    Ok(())
}

fn execute_categories(args: CategoriesArgs, config: &Config) -> Result<()> {
    let base_url = resolve_server(&args.server, config);
    let client = Soda4LcaClient::new(&base_url, &config.http)?;
    let mut stdout = std::io::stdout().lock();
    for category in client.list_categories(&args.system, &args.lang)? {
        writeln!(stdout, "{}", serde_json::to_string(&category)?)?;
    }
    Ok(())
}

fn list_dialects(registry: &DialectRegistry) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for summary in registry.summaries() {
        writeln!(stdout, "{}", serde_json::to_string(&summary)?)?;
    }
    Ok(())
}

/// A configured provider name stands for its base URL.
fn resolve_server(server: &str, config: &Config) -> String {
    config
        .providers
        .get(server)
        .map(|provider| provider.base_url.clone())
        .unwrap_or_else(|| server.to_string())
}

fn process_query(lang: Option<String>, params: &[String]) -> Result<ProcessQuery> {
    let params = params
        .iter()
        .map(|param| {
            param
                .split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .ok_or_else(|| IlcdError::Config(format!("search parameter '{param}' is not key=value")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ProcessQuery { lang, params })
}

#[derive(Parser)]
#[command(
    name = "ilcd-epd",
    author,
    version,
    about = "Convert ILCD+EPD datasets into openEPD declarations."
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert one EPD from a file, directory, zip archive or soda4LCA URL.
    ConvertEpd(ConvertArgs),
    /// Convert every EPD of an archive, directory or soda4LCA search.
    Batch(BatchArgs),
    /// Search processes on a soda4LCA server; prints JSON lines.
    Search(SearchArgs),
    /// List the process categories of a soda4LCA server; prints JSON lines.
    Categories(CategoriesArgs),
    /// List the registered dialects.
    Dialects,
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Input format.
    #[arg(short = 'i', long = "input-format", default_value = INPUT_FORMAT)]
    input_format: String,

    /// Output format.
    #[arg(short = 'o', long = "output-format", default_value = OUTPUT_FORMAT)]
    output_format: String,

    /// Dialect name; detected from the input when omitted.
    #[arg(short = 'd', long)]
    dialect: Option<String>,

    /// Document language.
    #[arg(short = 'l', long)]
    lang: Option<String>,

    /// Directory to write `<uuid>.json` into instead of stdout.
    #[arg(long)]
    target_dir: Option<PathBuf>,

    /// Write declarations that lack required fields.
    #[arg(long)]
    allow_incomplete: bool,

    /// Path, soda4LCA URL or `provider:uuid[@version]`.
    source: String,
}

#[derive(clap::Args)]
struct BatchArgs {
    /// Archive, directory, soda4LCA base URL or configured provider name.
    source: String,

    /// Output directory.
    #[arg(long)]
    target_dir: PathBuf,

    #[arg(short = 'd', long)]
    dialect: Option<String>,

    #[arg(short = 'l', long)]
    lang: Option<String>,

    /// Search parameter `key=value` for remote sources; repeatable.
    #[arg(long = "param")]
    params: Vec<String>,

    /// Maximum number of remote processes.
    #[arg(long)]
    limit: Option<usize>,

    /// Also download the EPD document of each process.
    #[arg(long)]
    pdf: bool,

    #[arg(long)]
    allow_incomplete: bool,
}

#[derive(clap::Args)]
struct SearchArgs {
    /// soda4LCA base URL or configured provider name.
    server: String,

    #[arg(short = 'l', long)]
    lang: Option<String>,

    /// Search parameter `key=value`; repeatable.
    #[arg(long = "param")]
    params: Vec<String>,

    #[arg(long)]
    limit: Option<usize>,
}

#[derive(clap::Args)]
struct CategoriesArgs {
    /// soda4LCA base URL or configured provider name.
    server: String,

    /// Category system.
    #[arg(long, default_value = "OEKOBAU.DAT")]
    system: String,

    #[arg(short = 'l', long, default_value = "en")]
    lang: String,
}
