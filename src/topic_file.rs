//! Topic-name persistence.
//!
//! A plain newline-delimited text file of topic names, written by the
//! producer run and read by the consumer run — the only durable artifact
//! and the sole coupling between the two processes.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Write one topic name per line, replacing any existing file.
pub fn write_topic_names(path: impl AsRef<Path>, names: &[String]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::io(path.display().to_string(), e))?;
    let mut writer = BufWriter::new(file);
    for name in names {
        writeln!(writer, "{name}").map_err(|e| Error::io(path.display().to_string(), e))?;
    }
    writer
        .flush()
        .map_err(|e| Error::io(path.display().to_string(), e))
}

/// Read topic names, one per line, skipping blank lines.
pub fn read_topic_names(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path.display().to_string(), e))?;
    let reader = BufReader::new(file);

    let mut names = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| Error::io(path.display().to_string(), e))?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            names.push(trimmed.to_string());
        }
    }
    Ok(names)
}
