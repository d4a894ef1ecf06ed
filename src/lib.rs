#![allow(clippy::too_many_arguments)]

mod compare_floats;
pub mod core;
pub mod corpus;
pub mod errors;
pub mod input;
pub mod output;
mod simulation_time;

#[macro_use]
extern crate is_close;

pub use crate::core::controls::timestep_result::TimestepResult;
use crate::corpus::Corpus;
pub use crate::errors::LesaError;
use crate::errors::PostprocessingError;
use crate::input::ingest_for_processing;
use crate::output::Output;
use csv::WriterBuilder;
use serde_json::Value;
use std::io::Read;
use tracing::info;

/// Read a JSON input, simulate the configured window and write the hourly results
/// under the key "results".
pub fn run_project(
    input: impl Read,
    output: impl Output,
) -> Result<Vec<TimestepResult>, LesaError> {
    let input = ingest_for_processing(input)?;

    let mut corpus = Corpus::from_inputs(&input)?;
    let results = corpus.run()?;

    if !output.is_noop() {
        write_results_file(&output, "results", &results)
            .map_err(|err| LesaError::ErrorInPostprocessing(PostprocessingError::new(err)))?;
    }

    Ok(results)
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        Value::Null => String::new(),
        value => value.to_string(),
    }
}

/// Write one row per hour, with a header row of flattened result names.
pub fn write_results_file(
    output: &impl Output,
    output_key: &str,
    results: &[TimestepResult],
) -> anyhow::Result<()> {
    info!(output_key, rows = results.len(), "Writing results");
    let writer = output.writer_for_location_key(output_key)?;
    let mut writer = WriterBuilder::new().from_writer(writer);

    let rows = results
        .iter()
        .map(TimestepResult::flatten)
        .collect::<anyhow::Result<Vec<_>>>()?;

    if let Some(first_row) = rows.first() {
        writer.write_record(first_row.keys())?;
    }
    for row in &rows {
        writer.write_record(row.values().map(csv_cell))?;
    }

    writer.flush()?;

    Ok(())
}
