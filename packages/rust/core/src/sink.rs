//! Incremental CSV output sink.
//!
//! Every row is flushed as soon as it is written so an interrupted run leaves
//! a valid checkpoint behind.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use siren_enrich_input::has_existing_output;
use siren_enrich_shared::{CompanyRecord, EnrichError, OUTPUT_COLUMNS, Result};

/// Append-only CSV writer for [`CompanyRecord`] rows.
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl CsvSink {
    /// Open the output artifact.
    ///
    /// With `append` and a non-empty existing file, rows are appended without a
    /// header; the file's header must match [`OUTPUT_COLUMNS`]. Otherwise the
    /// file is created (or truncated) and the header is written immediately.
    pub fn open(path: &Path, append: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EnrichError::io(parent, e))?;
        }

        let append = append && has_existing_output(path);
        let mut file = if append {
            OpenOptions::new()
                .read(true)
                .append(true)
                .open(path)
                .map_err(|e| EnrichError::io(path, e))?
        } else {
            File::create(path).map_err(|e| EnrichError::io(path, e))?
        };

        if append && !has_output_header(&mut file).map_err(|e| EnrichError::io(path, e))? {
            return Err(EnrichError::validation(format!(
                "{} does not have the expected header ({}); refusing to append",
                path.display(),
                OUTPUT_COLUMNS.join(",")
            )));
        }

        if append && !ends_with_newline(&mut file).map_err(|e| EnrichError::io(path, e))? {
            // A previous run died mid-row; start on a fresh line.
            file.write_all(b"\n").map_err(|e| EnrichError::io(path, e))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if !append {
            writer
                .write_record(OUTPUT_COLUMNS)
                .map_err(|e| EnrichError::csv(path, e))?;
            writer.flush().map_err(|e| EnrichError::io(path, e))?;
        }

        info!(path = %path.display(), append, "output opened");

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    /// Write one row and flush it to disk.
    pub fn write(&mut self, record: &CompanyRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .map_err(|e| EnrichError::csv(&self.path, e))?;
        self.writer
            .flush()
            .map_err(|e| EnrichError::io(&self.path, e))?;
        self.rows += 1;
        debug!(siren = %record.siren, rows = self.rows, "row written");
        Ok(())
    }

    /// Rows written through this sink (excluding the header).
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close.
    pub fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| EnrichError::io(&self.path, e))
    }
}

fn has_output_header(file: &mut File) -> std::io::Result<bool> {
    file.seek(SeekFrom::Start(0))?;
    let mut first = String::new();
    BufReader::new(&mut *file).read_line(&mut first)?;
    Ok(first
        .trim_end_matches(['\r', '\n'])
        .split(',')
        .map(str::trim)
        .eq(OUTPUT_COLUMNS))
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
