use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use diva_hisdb::error::HisdbError;
use diva_hisdb::stats;

#[derive(Parser)]
#[command(name = "hisdb-summary")]
#[command(about = "Aggregate per-run CSV results into summary.csv")]
#[command(version)]
struct Cli {
    /// Folder holding one CSV file per run.
    #[arg(long, value_name = "PATH")]
    runs_folder: PathBuf,
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
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = stats::write_stats(&cli.runs_folder, &[])?;
    match &outcome.summary {
        Some(path) => println!(
            "{} rows from {} files -> {}",
            outcome.rows,
            outcome.files,
            path.display()
        ),
        None => println!("no results found in {}", cli.runs_folder.display()),
    }
    Ok(())
}
