//! FILENAME: aggregate-cli/src/main.rs
//! `aggregate` - group-by/pivot over delimited text from a file or stdin.

mod args;
mod input;
mod output;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use aggregate_engine::{AggregationSpec, GroupEngine, HeaderMap};
use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::info;

use crate::args::Args;
use crate::input::{header_map, RecordReader};
use crate::output::write_table;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    run(&args)
}

fn run(args: &Args) -> Result<()> {
    ensure!(!args.delimiter.is_empty(), "field delimiter must not be empty");
    let config = args.aggregation_config()?;
    let delimiter = args.delimiter.as_bytes();

    let source: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let mut records = RecordReader::new(source, delimiter);

    let headers = if args.no_header {
        HeaderMap::default()
    } else {
        match records.next_record().context("failed to read header row")? {
            Some(fields) => header_map(&fields),
            None => HeaderMap::default(),
        }
    };

    let spec = AggregationSpec::build(&config, &headers)?;
    info!(
        "grouping by {:?}, pivoting on {:?}, {} aggregate columns",
        spec.keys(),
        spec.pivots(),
        spec.value_fields().len()
    );

    let mut engine = GroupEngine::new(spec, args.engine_options());
    while let Some(fields) = records.next_record().context("failed to read input")? {
        engine.process_row(&fields[..])?;
    }

    let table = engine.finalize();
    info!(
        "{} rows in, {} groups out",
        table.stats.rows_seen, table.stats.groups
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    write_table(&mut out, &table, delimiter).context("failed to write output")?;
    out.flush().context("failed to write output")?;
    Ok(())
}
