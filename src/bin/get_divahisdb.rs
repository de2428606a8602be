use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use diva_hisdb::config::DatasetProfile;
use diva_hisdb::error::HisdbError;
use diva_hisdb::fetch::HttpFetcher;
use diva_hisdb::output::{LogSink, print_summary};
use diva_hisdb::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "get-divahisdb")]
#[command(about = "Download DIVA-HisDB and prepare it as <collection>/<partition>/{data,gt}")]
#[command(version)]
struct Cli {
    /// Path to where the dataset should be generated.
    #[arg(long, value_name = "PATH")]
    output_folder: PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<HisdbError>() {
            return ExitCode::from(err.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let fetcher = HttpFetcher::new()?;
    let pipeline = Pipeline::new(DatasetProfile::hisdb(), fetcher);
    let report = pipeline.run(&cli.output_folder, &LogSink)?;
    print_summary(&report);
    Ok(())
}
