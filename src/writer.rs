use std::{io, path::Path};

use anyhow::Context;
use tracing::info;

use crate::{Result, Row};

pub fn write_orders<P: AsRef<Path>>(file_path: P, rows: &[Row]) -> Result<()> {
    let file_path = file_path.as_ref();
    let mut wtr = csv::Writer::from_path(file_path)
        .with_context(|| format!("cannot create '{}'", file_path.to_string_lossy()))?;
    write_records(&mut wtr, rows)
        .with_context(|| format!("cannot write '{}'", file_path.to_string_lossy()))?;
    info!(
        "wrote {} rows to {}",
        rows.len(),
        file_path.to_string_lossy()
    );
    Ok(())
}

/// Writes comma-separated rows to any sink, flushing at the end.
pub fn write_orders_to<W: io::Write>(writer: W, rows: &[Row]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    write_records(&mut wtr, rows)
}

fn write_records<W: io::Write>(wtr: &mut csv::Writer<W>, rows: &[Row]) -> Result<()> {
    for r in rows {
        wtr.write_record(r)?;
    }
    wtr.flush()?;
    Ok(())
}
