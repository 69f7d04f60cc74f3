//! Streaming record sinks
//!
//! Collectors and the enrichment dispatcher hand records to a sink one at
//! a time and the sink flushes incrementally, so a consumer tailing the
//! artifact sees partial results and peak memory stays bounded to one
//! page. The JSON array writer keeps its own "has written any record"
//! state so the output is a well-formed delimited sequence even for zero
//! records.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;

/// Sink accepting one record at a time.
#[async_trait]
pub trait RecordSink<T: Send + Sync>: Send {
    async fn write(&mut self, record: &T) -> Result<()>;
}

/// Streamed JSON array file: `[` then comma-newline-separated objects,
/// then `]`. `finish` must be called to close the array.
pub struct JsonArrayWriter {
    writer: BufWriter<File>,
    wrote_any: bool,
    finished: bool,
}

impl JsonArrayWriter {
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"[\n").await?;
        writer.flush().await?;
        Ok(Self {
            writer,
            wrote_any: false,
            finished: false,
        })
    }

    pub async fn write_next<T: Serialize>(&mut self, record: &T) -> Result<()> {
        if self.wrote_any {
            self.writer.write_all(b",\n").await?;
        }
        let json = serde_json::to_string_pretty(record)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;
        self.wrote_any = true;
        Ok(())
    }

    /// Closes the array. Idempotent.
    pub async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.writer.write_all(b"\n]").await?;
        self.writer.flush().await?;
        self.finished = true;
        Ok(())
    }

    pub fn wrote_any(&self) -> bool {
        self.wrote_any
    }
}

#[async_trait]
impl<T: Serialize + Send + Sync> RecordSink<T> for JsonArrayWriter {
    async fn write(&mut self, record: &T) -> Result<()> {
        self.write_next(record).await
    }
}

/// Newline-delimited list file (handles, post ids, `alias:id` pairs).
pub struct LineWriter {
    writer: BufWriter<File>,
    lines: usize,
}

impl LineWriter {
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(path).await?;
        Ok(Self {
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }
}

#[async_trait]
impl RecordSink<String> for LineWriter {
    async fn write(&mut self, record: &String) -> Result<()> {
        self.write_line(record).await
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct VecSink<T> {
    pub records: Vec<T>,
}

impl<T> VecSink<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> RecordSink<T> for VecSink<T> {
    async fn write(&mut self, record: &T) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}
