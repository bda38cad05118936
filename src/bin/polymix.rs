use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use polymix::app::{Uploader, check_rows};
use polymix::config::{Config, ConfigLoader};
use polymix::cript::HttpStore;
use polymix::error::PolymixError;
use polymix::error_log::ErrorLog;
use polymix::output::{ConsoleOutput, JsonOutput, OutputMode};
use polymix::prompt::{Prompt, TerminalPrompt};
use polymix::resolver::{PolymerKeyPolicy, Session};
use polymix::rows::RowReader;

#[derive(Parser)]
#[command(name = "polymix")]
#[command(about = "Upload polymer/solvent cloud-point data from CSV into a CRIPT repository")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Upload every row of a CSV file")]
    Upload(UploadArgs),
    #[command(about = "Parse a CSV file and report incomplete rows, without uploading")]
    Check(CheckArgs),
}

#[derive(Args, Clone)]
struct UploadArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    csv: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    group: Option<String>,

    #[arg(long)]
    collection: Option<String>,

    #[arg(long)]
    inventory: Option<String>,

    #[arg(long)]
    solvent_group: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, value_enum)]
    polymer_key: Option<PolymerKeyPolicy>,

    #[arg(long)]
    error_log: Option<String>,

    #[arg(long, help = "Talk to the host over plain http")]
    insecure: bool,
}

impl UploadArgs {
    fn overrides(&self) -> Config {
        Config {
            host: self.host.clone(),
            token: None,
            group: self.group.clone(),
            collection: self.collection.clone(),
            inventory: self.inventory.clone(),
            path: self.csv.clone(),
            solvent_group: self.solvent_group.clone(),
            workers: self.workers,
            polymer_key: self.polymer_key,
            error_log: self.error_log.clone(),
            tls: self.insecure.then_some(false),
        }
    }
}

#[derive(Args)]
struct CheckArgs {
    #[arg(long)]
    csv: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PolymixError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PolymixError) -> u8 {
    match error {
        PolymixError::MissingConfigField(_)
        | PolymixError::InvalidConfig { .. }
        | PolymixError::ConfigRead(_)
        | PolymixError::ConfigParse(_) => 2,
        PolymixError::StoreHttp(_)
        | PolymixError::StoreStatus { .. }
        | PolymixError::StoreDecode(_)
        | PolymixError::NotFound { .. }
        | PolymixError::Duplicate { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Upload(args) => run_upload(args, output_mode),
        Commands::Check(args) => run_check(args, output_mode),
    }
}

fn run_upload(args: UploadArgs, output_mode: OutputMode) -> miette::Result<()> {
    let file = ConfigLoader::load(args.config.as_deref())?;
    let layers = vec![args.overrides(), ConfigLoader::from_env(), file];

    let mut terminal = TerminalPrompt;
    let prompt: Option<&mut dyn Prompt> = match output_mode {
        OutputMode::Interactive => Some(&mut terminal),
        OutputMode::NonInteractive => None,
    };
    let config = ConfigLoader::resolve(layers, prompt)?;

    let rows = RowReader::read_path(&config.path)?;
    let store = HttpStore::connect(&config.host, &config.token, config.tls)?;
    let session = Session::open(store, &config.session_settings())?;
    let uploader = Uploader::new(
        session,
        &config.inventory,
        ErrorLog::new(config.error_log.clone()),
    );

    match output_mode {
        OutputMode::NonInteractive => {
            let summary = uploader.run(&rows, config.workers, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let summary = uploader.run(&rows, config.workers, &ConsoleOutput)?;
            ConsoleOutput::print_summary(&summary);
        }
    }
    Ok(())
}

fn run_check(args: CheckArgs, output_mode: OutputMode) -> miette::Result<()> {
    let path = Utf8PathBuf::from(args.csv.trim_matches(['"', '\'']));
    let rows = RowReader::read_path(&path)?;
    let result = check_rows(&rows);
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_check(&result).into_diagnostic()?,
        OutputMode::Interactive => ConsoleOutput::print_check(&result),
    }
    Ok(())
}
