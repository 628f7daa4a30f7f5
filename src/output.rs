use crate::runner::ResultRecord;
use crate::util::ensure_parent_dir;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const HEADER: [&str; 7] = [
    "target_type",
    "attribute_type",
    "target_word_name",
    "attribute_word_name",
    "target_word",
    "attribute_word",
    "score",
];

/// CSV sink for sweep results. Opened before the sweep so an unwritable destination
/// fails the run before any request is made.
pub struct ResultWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl ResultWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent_dir(path)?;
        let file = File::create(path)
            .with_context(|| format!("failed opening {} for writing", path.display()))?;
        Ok(Self::from_writer(file))
    }
}

impl<W: Write> ResultWriter<W> {
    pub fn from_writer(inner: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(inner);
        Self { writer }
    }

    /// Header plus one row per result, in the order given. Returns the row count.
    pub fn write_results(&mut self, results: &[ResultRecord]) -> Result<usize> {
        self.writer
            .write_record(HEADER)
            .context("failed writing CSV header")?;
        for result in results {
            let params = &result.params;
            let score = result.score_cell();
            self.writer
                .write_record([
                    params.target_type.as_str(),
                    params.attribute_type.as_str(),
                    params.target_word_name.as_str(),
                    params.attribute_word_name.as_str(),
                    params.target_word.as_str(),
                    params.attribute_word.as_str(),
                    score.as_str(),
                ])
                .context("failed writing CSV row")?;
        }
        self.writer.flush().context("failed flushing CSV output")?;
        Ok(results.len())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("failed flushing CSV output: {}", err.error()))
    }
}
