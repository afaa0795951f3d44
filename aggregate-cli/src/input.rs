//! FILENAME: aggregate-cli/src/input.rs
//! Line reading and field splitting for delimited text.
//!
//! No quoting rules: a delimiter inside a field always splits it.

use std::io::{self, BufRead};

use aggregate_engine::HeaderMap;

/// Splits one line on a (possibly multi-byte) delimiter.
pub fn split_fields<'a>(line: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    if let [single] = delimiter {
        return line.split(|b| b == single).collect();
    }

    let mut fields = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while pos + delimiter.len() <= line.len() {
        if &line[pos..pos + delimiter.len()] == delimiter {
            fields.push(&line[start..pos]);
            pos += delimiter.len();
            start = pos;
        } else {
            pos += 1;
        }
    }
    fields.push(&line[start..]);
    fields
}

/// Builds the name lookup from a header record.
pub fn header_map(fields: &[&[u8]]) -> HeaderMap {
    let mut map = HeaderMap::default();
    for (index, name) in fields.iter().enumerate() {
        // First occurrence wins for duplicated names.
        map.entry(String::from_utf8_lossy(name).into_owned())
            .or_insert(index);
    }
    map
}

/// Reads newline-terminated records, reusing one line buffer.
pub struct RecordReader<R> {
    reader: R,
    delimiter: Vec<u8>,
    line: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    /// `delimiter` must not be empty.
    pub fn new(reader: R, delimiter: &[u8]) -> Self {
        RecordReader {
            reader,
            delimiter: delimiter.to_vec(),
            line: Vec::new(),
        }
    }

    /// Next record split into fields, or `None` at end of input.
    pub fn next_record(&mut self) -> io::Result<Option<Vec<&[u8]>>> {
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line)? == 0 {
            return Ok(None);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        }
        Ok(Some(split_fields(&self.line, &self.delimiter)))
    }
}
