use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use mtemp_core::carts::CartId;
use mtemp_core::loaders::decode_text;
use mtemp_core::outputs::{write_report, OutputFormat};
use mtemp_core::pipeline::PipelineReport;
use mtemp_core::{run, FieldTest, PipelineOptions, Settings};
use mtemp_parser::formats::schema::TIMESTAMP_COLUMN;
use mtemp_parser::{parse_daq_file, parse_gps_file, FileMetadata};
use polars::prelude::{DataFrame, DataType};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "M-TEMP field-test processing", long_about = None)]
struct Cli {
    /// Settings file; defaults to $MTEMP_CONFIG, then built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one field test from explicit file paths
    Process(ProcessArgs),
    /// Process field tests registered in the settings file
    Test(TestArgs),
    /// Detect the format of raw files and summarise them
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Directory the processed tables are written to
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = FormatArg::Parquet)]
    format: FormatArg,

    /// IANA zone for GPS timestamps, overriding the settings file
    #[arg(long)]
    gps_timezone: Option<String>,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    #[arg(long)]
    temperature: Option<PathBuf>,

    #[arg(long)]
    irrh: Option<PathBuf>,

    #[arg(long)]
    gps: Option<PathBuf>,

    /// Cart number (1 or 2); overrides serial numbers in the files
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    cart: Option<u8>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Registered test numbers
    #[arg(required = true)]
    numbers: Vec<u32>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// File paths or glob patterns
    #[arg(required = true)]
    patterns: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Parquet,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Parquet => OutputFormat::Parquet,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Process(args) => {
            let settings = Settings::resolve(cli.config.as_deref())?;
            let cart = args.cart.and_then(CartId::from_number);
            let test = FieldTest {
                temperature: args.temperature,
                irrh: args.irrh,
                gps: args.gps,
                cart,
            };
            if test.temperature.is_none() && test.irrh.is_none() && test.gps.is_none() {
                bail!("nothing to process: pass at least one of --temperature, --irrh or --gps");
            }
            let options = pipeline_options(&settings, &args.output)?;
            process(&test, &options, &args.output, &args.output.output_dir)
        }
        Command::Test(args) => {
            let settings = Settings::resolve(cli.config.as_deref())?;
            let options = pipeline_options(&settings, &args.output)?;
            for number in args.numbers {
                let test = settings
                    .field_test(number)
                    .with_context(|| format!("cannot run field test {number}"))?;
                info!(test = number, "Processing registered field test");
                let dir = args.output.output_dir.join(format!("test_{number}"));
                process(&test, &options, &args.output, &dir)
                    .with_context(|| format!("field test {number} failed"))?;
            }
            Ok(())
        }
        Command::Inspect(args) => inspect(&args.patterns),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn pipeline_options(settings: &Settings, output: &OutputArgs) -> Result<PipelineOptions> {
    let mut options = settings
        .pipeline_options()
        .context("invalid settings")?;
    if let Some(zone) = &output.gps_timezone {
        options.loader = options.loader.with_gps_timezone(zone)?;
    }
    Ok(options)
}

fn process(test: &FieldTest, options: &PipelineOptions, output: &OutputArgs, dir: &Path) -> Result<()> {
    let report = run(test, options)?;
    print_failures(&report);

    let written = write_report(&report, dir, output.format.into())
        .with_context(|| format!("failed to write outputs to {}", dir.display()))?;
    print_summary(&report);
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn print_failures(report: &PipelineReport) {
    if report.failures.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec!["Instrument", "File", "Error"]);
    for failure in &report.failures {
        table.add_row(vec![
            failure.instrument.to_string(),
            failure.path.display().to_string(),
            failure.error.to_string(),
        ]);
    }
    eprintln!("{table}");
}

fn print_summary(report: &PipelineReport) {
    let mut table = Table::new();
    table.set_header(vec!["Dataset", "Rows", "Columns", "Start", "End"]);
    for row in report.summary() {
        table.add_row(vec![
            row.name,
            row.rows.to_string(),
            row.columns.to_string(),
            row.start.map(|t| t.to_string()).unwrap_or_default(),
            row.end.map(|t| t.to_string()).unwrap_or_default(),
        ]);
    }
    println!("{table}");
}

struct Inspection {
    format: &'static str,
    metadata: FileMetadata,
    rows: usize,
    columns: Vec<String>,
    range: Option<(String, String)>,
}

fn inspect(patterns: &[String]) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["File", "Format", "Serial", "Rows", "Columns", "Start", "End", "BLAKE3"]);
    let mut metadata_blocks = Vec::new();
    let mut matched = 0usize;

    for pattern in patterns {
        let entries = glob::glob(pattern).with_context(|| format!("invalid glob pattern '{pattern}'"))?;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!(%err, "Could not read path from glob pattern");
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            matched += 1;

            let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let hash = blake3::hash(&bytes).to_hex().to_string();
            match inspect_content(&decode_text(bytes)) {
                Ok(found) => {
                    table.add_row(vec![
                        path.display().to_string(),
                        found.format.to_string(),
                        found.metadata.serial_number().unwrap_or("-").to_string(),
                        found.rows.to_string(),
                        found.columns.join(", "),
                        found.range.as_ref().map(|r| r.0.clone()).unwrap_or_default(),
                        found.range.as_ref().map(|r| r.1.clone()).unwrap_or_default(),
                        hash,
                    ]);
                    if !found.metadata.is_empty() {
                        metadata_blocks.push((path, found.metadata));
                    }
                }
                Err(err) => {
                    table.add_row(vec![
                        path.display().to_string(),
                        format!("unrecognised: {err}"),
                        String::new(),
                        String::new(),
                        String::new(),
                        String::new(),
                        String::new(),
                        hash,
                    ]);
                }
            }
        }
    }

    if matched == 0 {
        bail!("no files matched {}", patterns.join(" "));
    }

    println!("{table}");
    for (path, metadata) in metadata_blocks {
        let mut block = Table::new();
        block.set_header(vec![path.display().to_string(), String::new()]);
        for (key, value) in metadata.iter() {
            block.add_row(vec![key, value]);
        }
        println!("{block}");
    }
    Ok(())
}

fn inspect_content(content: &str) -> Result<Inspection> {
    match parse_daq_file(content) {
        Ok(parsed) => Ok(Inspection {
            format: parsed.parser,
            rows: parsed.row_count(),
            columns: parsed.channel_labels(),
            range: timestamp_range(&parsed.df),
            metadata: parsed.file_metadata,
        }),
        Err(daq_err) => {
            let parsed = parse_gps_file(content)
                .with_context(|| format!("not a DAQ file ({daq_err})"))?;
            Ok(Inspection {
                format: parsed.parser,
                rows: parsed.row_count(),
                columns: parsed
                    .df
                    .get_column_names()
                    .into_iter()
                    .filter(|name| name.as_str() != TIMESTAMP_COLUMN)
                    .map(|name| name.to_string())
                    .collect(),
                range: timestamp_range(&parsed.df),
                metadata: FileMetadata::new(),
            })
        }
    }
}

fn timestamp_range(df: &DataFrame) -> Option<(String, String)> {
    let micros = df.column(TIMESTAMP_COLUMN).ok()?.cast(&DataType::Int64).ok()?;
    let values: Vec<i64> = micros.i64().ok()?.into_iter().flatten().collect();
    let format = |value: i64| {
        DateTime::from_timestamp_micros(value).map(|dt| dt.naive_utc().to_string())
    };
    let first = values.iter().min().copied()?;
    let last = values.iter().max().copied()?;
    Some((format(first)?, format(last)?))
}
