//! Sinks that persist crawl results to disk.
//!
//! Every sink writes to a temporary file in the destination directory and
//! renames it into place, so an interrupted run never leaves a half-written
//! export behind.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::Result;
use crate::models::Post;

/// File stem of group crawl exports.
pub const GROUP_EXPORT: &str = "posts";
/// File stem of web page crawl exports.
pub const WEB_EXPORT: &str = "web_posts";

/// A destination for normalized records.
pub trait Sink {
    /// File extension, without the dot.
    fn extension(&self) -> &'static str;

    /// Write `records` to `destination`, replacing any previous file.
    fn write(&self, records: &[Post], destination: &Path) -> Result<()>;
}

/// Open a temp file next to `destination`.
fn staging_file(destination: &Path) -> Result<NamedTempFile> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(NamedTempFile::new_in(dir)?)
}

fn commit(staged: NamedTempFile, destination: &Path) -> Result<()> {
    staged.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

/// JSON array of posts, pretty-printed, UTF-8 with non-ASCII unescaped.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSink;

impl Sink for JsonSink {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn write(&self, records: &[Post], destination: &Path) -> Result<()> {
        let mut staged = staging_file(destination)?;
        serde_json::to_writer_pretty(&mut staged, records)?;
        staged.write_all(b"\n")?;
        staged.flush()?;
        commit(staged, destination)?;
        info!("Wrote {} posts to {}", records.len(), destination.display());
        Ok(())
    }
}

/// Flat CSV with a `title,content` header row.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvSink;

impl Sink for CsvSink {
    fn extension(&self) -> &'static str {
        "csv"
    }

    fn write(&self, records: &[Post], destination: &Path) -> Result<()> {
        let staged = staging_file(destination)?;
        let mut writer = csv::Writer::from_writer(staged);
        writer.write_record(["title", "content"])?;
        for post in records {
            writer.write_record([post.title.as_str(), post.content.as_str()])?;
        }
        writer.flush()?;
        let staged = writer.into_inner().map_err(|e| e.into_error())?;
        commit(staged, destination)?;
        info!("Wrote {} rows to {}", records.len(), destination.display());
        Ok(())
    }
}

/// Read back a JSON export.
pub fn read_json(path: &Path) -> Result<Vec<Post>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Which exports to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Both,
}

impl OutputFormat {
    pub fn sinks(self) -> Vec<Box<dyn Sink>> {
        match self {
            OutputFormat::Json => vec![Box::new(JsonSink)],
            OutputFormat::Csv => vec![Box::new(CsvSink)],
            OutputFormat::Both => vec![Box::new(JsonSink), Box::new(CsvSink)],
        }
    }
}

/// Write `records` into `output_dir` as `{stem}.{ext}` in every requested format.
///
/// Returns the files written.
pub fn export(
    records: &[Post],
    output_dir: &Path,
    stem: &str,
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    format
        .sinks()
        .into_iter()
        .map(|sink| -> Result<PathBuf> {
            let path = output_dir.join(format!("{}.{}", stem, sink.extension()));
            sink.write(records, &path)?;
            Ok(path)
        })
        .collect()
}
