//! schema-refs CLI
//!
//! Command-line interface for resolving, bundling and dereferencing `$ref`
//! pointers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use schema_refs::{CircularPolicy, Options, RefError, Settings};

#[derive(Parser)]
#[command(name = "schema-refs")]
#[command(about = "Resolve, bundle and dereference JSON Reference ($ref) pointers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the root document without processing references
    Parse {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Fetch every referenced file and list them
    Resolve {
        #[command(flatten)]
        common: CommonArgs,

        /// Print a JSON summary instead of one path per line
        #[arg(long)]
        json: bool,
    },

    /// Inline external references, leaving only internal $refs
    Bundle {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Replace every $ref with the value it points to
    Dereference {
        #[command(flatten)]
        common: CommonArgs,

        /// What to do with circular references: true, false or ignore
        #[arg(long)]
        circular: Option<CircularPolicy>,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Root document: file path or URL (http:// or https://)
    source: String,

    /// Settings file (YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Collect all errors and report them together
    #[arg(long)]
    continue_on_error: bool,

    /// Do not fetch external files; external $refs are left untouched
    #[arg(long)]
    no_external: bool,

    /// Output file (stdout if not specified)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schema_refs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { common } => run_parse(common).await,
        Commands::Resolve { common, json } => run_resolve(common, json).await,
        Commands::Bundle { common } => run_bundle(common).await,
        Commands::Dereference { common, circular } => run_dereference(common, circular).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

async fn run_parse(args: CommonArgs) -> Result<(), u8> {
    let options = build_options(&args, None)?;
    let value = schema_refs::parse(args.source.as_str(), &options)
        .await
        .map_err(report)?;
    write_output(&value, &args)
}

async fn run_resolve(args: CommonArgs, json_output: bool) -> Result<(), u8> {
    let options = build_options(&args, None)?;
    let refs = schema_refs::resolve(args.source.as_str(), &options)
        .await
        .map_err(report)?;

    let paths = refs.paths(&[]);
    if json_output {
        let summary = json!({
            "circular": refs.circular(),
            "files": paths,
        });
        write_output(&summary, &args)
    } else {
        write_text(&paths.join("\n"), &args)
    }
}

async fn run_bundle(args: CommonArgs) -> Result<(), u8> {
    let options = build_options(&args, None)?;
    let document = schema_refs::bundle(args.source.as_str(), &options)
        .await
        .map_err(report)?;
    let value = document.to_value().map_err(report)?;
    write_output(&value, &args)
}

async fn run_dereference(args: CommonArgs, circular: Option<CircularPolicy>) -> Result<(), u8> {
    let options = build_options(&args, circular)?;
    let document = schema_refs::dereference(args.source.as_str(), &options)
        .await
        .map_err(report)?;
    let value = document.to_value().map_err(report)?;
    write_output(&value, &args)
}

/// Settings file first, then command-line flags on top.
fn build_options(args: &CommonArgs, circular: Option<CircularPolicy>) -> Result<Options, u8> {
    let mut options = match &args.config {
        Some(path) => Settings::load(path)
            .and_then(Settings::into_options)
            .map_err(report)?,
        None => Options::new(),
    };

    if args.continue_on_error {
        options = options.continue_on_error(true);
    }
    if args.no_external {
        options = options.external(false);
    }
    if let Some(policy) = circular {
        options = options.circular(policy);
    }
    Ok(options)
}

fn report(e: RefError) -> u8 {
    eprintln!("Error: {}", e);
    if let RefError::Aggregate { errors, .. } = &e {
        for error in errors {
            eprintln!("  {}", error);
        }
    }
    e.exit_code() as u8
}

fn write_output(value: &Value, args: &CommonArgs) -> Result<(), u8> {
    let text = match args.format {
        Format::Json if args.pretty => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        Format::Json => serde_json::to_string(value).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    write_text(text.trim_end(), args)
}

fn write_text(text: &str, args: &CommonArgs) -> Result<(), u8> {
    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", text)).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", text);
        }
    }
    Ok(())
}
