use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use diva_hisdb::error::HisdbError;
use diva_hisdb::viz;

#[derive(Parser)]
#[command(name = "hisdb-viz")]
#[command(about = "Colourize a HisDB ground-truth image into ./images")]
#[command(version)]
struct Cli {
    /// Pixel-level ground-truth image to colourize.
    #[arg(long, value_name = "PATH")]
    img: PathBuf,
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
    let out_dir = std::env::current_dir().into_diagnostic()?.join("images");
    let output = viz::visualize(&cli.img, &out_dir)?;
    println!("{}", output.image.display());
    Ok(())
}
