use std::io;
use std::path::Path;

use thiserror::Error;

use crate::sample::Sample;
use crate::units::Units;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Export I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// One table row, scaled to the display unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportRow {
    pub index: usize,
    pub measured: f64,
    pub residual: f64,
    pub shim: f64,
    pub scrape: f64,
}

pub fn export_rows(samples: &[Sample], units: Units) -> Vec<ExportRow> {
    samples
        .iter()
        .map(|sample| ExportRow {
            index: sample.x,
            measured: units.scale(sample.y),
            residual: units.scale(sample.lin_y_error),
            shim: units.scale(sample.shim),
            scrape: units.scale(sample.scrape),
        })
        .collect()
}

pub fn header(units: Units) -> [String; 5] {
    let label = units.ascii_label();
    [
        "Sample".to_string(),
        format!("Measured ({label})"),
        format!("Flattened ({label})"),
        format!("Below Max ({label})"),
        format!("Above Min ({label})"),
    ]
}

pub fn write_csv<W: io::Write>(
    writer: W,
    samples: &[Sample],
    units: Units,
) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header(units))?;

    let decimals = units.decimals();
    for row in export_rows(samples, units) {
        wtr.write_record(&[
            row.index.to_string(),
            format!("{:.*}", decimals, row.measured),
            format!("{:.*}", decimals, row.residual),
            format!("{:.*}", decimals, row.shim),
            format!("{:.*}", decimals, row.scrape),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_csv_file(path: &Path, samples: &[Sample], units: Units) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_csv(io::BufWriter::new(file), samples, units)
}
