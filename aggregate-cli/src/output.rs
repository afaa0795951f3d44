//! FILENAME: aggregate-cli/src/output.rs

use std::io::{self, Write};

use aggregate_engine::ResultTable;

/// Writes the header (if any) and data rows as delimited lines.
pub fn write_table<W: Write>(out: &mut W, table: &ResultTable, delimiter: &[u8]) -> io::Result<()> {
    for line in table.lines() {
        for (i, cell) in line.iter().enumerate() {
            if i > 0 {
                out.write_all(delimiter)?;
            }
            out.write_all(cell.as_bytes())?;
        }
        out.write_all(b"\n")?;
    }
    Ok(())
}
