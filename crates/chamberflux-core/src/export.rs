use crate::flux::FluxResult;

use serde::Serialize;
use std::io::Write;

/// One row per result with a header line, columns named like the struct fields.
pub fn write_fluxes_csv<W: Write>(writer: W, results: &[FluxResult]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for r in results {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<W: Write, T: Serialize + ?Sized>(
    writer: W,
    value: &T,
) -> Result<(), serde_json::Error> {
    serde_json::to_writer_pretty(writer, value)
}
