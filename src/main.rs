extern crate lesa;

use anyhow::anyhow;
use clap::Parser;
use lesa::output::FileOutput;
use lesa::run_project;
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Default, Debug)]
#[clap(author, version, about, long_about = None)]
struct LesaArgs {
    input_file: PathBuf,
    /// directory for the results, defaults to `<input stem>__results` beside the input
    #[arg(long, short)]
    output_dir: Option<PathBuf>,
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = LesaArgs::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let input_stem = args
        .input_file
        .file_stem()
        .ok_or_else(|| anyhow!("Could not determine input file name"))?
        .to_string_lossy()
        .to_string();
    let output_path = args.output_dir.unwrap_or_else(|| {
        args.input_file
            .with_file_name(format!("{input_stem}__results"))
    });
    fs::create_dir_all(&output_path)?;

    let file_output = FileOutput::new(output_path.clone(), format!("{input_stem}__{{}}.csv"));

    match run_project(BufReader::new(File::open(&args.input_file)?), &file_output) {
        Ok(results) => {
            info!(
                hours = results.len(),
                output = %output_path.display(),
                "Run complete"
            );
            Ok(())
        }
        Err(err) => {
            error!("{err}");
            Err(err.into())
        }
    }
}
