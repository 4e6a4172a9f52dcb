//! Conversion pipeline: trace reader → normalizer → HAR writer.

mod cancel;

pub use cancel::CancellationToken;

use crate::config::ConvertConfig;
use crate::har::{Creator, EntryOptions, HarWriter, build_entry};
use crate::normalize::Normalizer;
use crate::trace::{RecordSource, TraceReader};
use crate::warning::ConversionWarning;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Where a conversion is in its lifecycle. `Flushed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionState {
    Idle,
    Reading,
    Normalizing,
    Encoding,
    Flushed,
    Failed,
}

/// How a successful conversion went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every record converted without loss.
    Clean,
    /// Output is complete but some records or fields were degraded.
    Degraded,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionSummary {
    pub records_read: usize,
    pub entries_written: usize,
    /// Records that produced at least one warning while being normalized.
    pub records_with_warnings: usize,
    pub bytes_written: u64,
    pub warnings: Vec<ConversionWarning>,
}

impl ConversionSummary {
    pub fn outcome(&self) -> Outcome {
        if self.warnings.is_empty() {
            Outcome::Clean
        } else {
            Outcome::Degraded
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ConversionWarning::TruncatedInput { .. }))
    }
}

/// Drives one conversion at a time. Instances share nothing, so separate
/// files can be converted on separate threads with separate converters.
pub struct Converter {
    normalizer: Normalizer,
    creator: Creator,
    entry_options: EntryOptions,
    cancel: CancellationToken,
    state: ConversionState,
}

impl Converter {
    pub fn new(config: &ConvertConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            normalizer: Normalizer::new(config.normalizer_config()?),
            creator: Creator::new(config.creator_name.clone()),
            entry_options: EntryOptions {
                body_threshold: config.body_threshold,
            },
            cancel: CancellationToken::new(),
            state: ConversionState::Idle,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// State reached by the most recent conversion.
    pub fn state(&self) -> ConversionState {
        self.state
    }

    /// Convert a trace file into a HAR file.
    ///
    /// The document is written to a temporary file next to `output` and
    /// renamed into place only once complete. On any error the temporary
    /// file is removed and an existing `output` is left as it was.
    pub fn convert_file(&mut self, input: &Path, output: &Path) -> Result<ConversionSummary> {
        tracing::info!("Converting {} -> {}", input.display(), output.display());

        self.state = ConversionState::Idle;
        let result = self.run_file(input, output);
        if let Err(e) = &result {
            tracing::debug!("Conversion of {} failed: {}", input.display(), e);
            self.state = ConversionState::Failed;
        }
        result
    }

    fn run_file(&mut self, input: &Path, output: &Path) -> Result<ConversionSummary> {
        self.transition(ConversionState::Reading);
        let mut reader = TraceReader::open(input)?;

        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut builder = tempfile::Builder::new();
        builder.prefix(".trace2har-").suffix(".har.tmp");
        // Same mode a plain create would give, before the umask applies.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(fs::Permissions::from_mode(0o666));
        }
        let temp = builder.tempfile_in(dir)?;

        let (writer, summary) = self.run(&mut reader, BufWriter::new(temp))?;
        let temp = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        if let Ok(existing) = fs::metadata(output) {
            temp.as_file().set_permissions(existing.permissions())?;
        }
        temp.as_file().sync_all()?;
        temp.persist(output).map_err(|e| Error::Io(e.error))?;

        tracing::info!(
            "Wrote {} entries ({} bytes) to {}",
            summary.entries_written,
            summary.bytes_written,
            output.display()
        );

        Ok(summary)
    }

    /// Convert records from any source into any writer. There is no
    /// atomicity here: on error, `out` may hold a partial document.
    pub fn convert_stream<S: RecordSource, W: Write>(
        &mut self,
        source: &mut S,
        out: W,
    ) -> Result<(W, ConversionSummary)> {
        self.state = ConversionState::Idle;
        let result = self.run(source, out);
        if result.is_err() {
            self.state = ConversionState::Failed;
        }
        result
    }

    fn run<S: RecordSource, W: Write>(
        &mut self,
        source: &mut S,
        out: W,
    ) -> Result<(W, ConversionSummary)> {
        let mut har = HarWriter::begin(out, &self.creator)?;
        let mut summary = ConversionSummary::default();
        let mut degraded_entries = BTreeSet::new();

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    "Conversion cancelled after {} records",
                    summary.records_read
                );
                return Err(Error::Cancelled);
            }

            self.transition(ConversionState::Reading);
            let record = source.next_record();
            summary.warnings.extend(source.take_warnings());
            let Some(record) = record? else {
                break;
            };
            summary.records_read += 1;

            self.transition(ConversionState::Normalizing);
            let index = summary.entries_written;
            let normalized = self.normalizer.normalize(index, record);
            for warning in normalized.warnings {
                if let Some(entry) = warning.entry_index() {
                    degraded_entries.insert(entry);
                }
                summary.warnings.push(warning);
            }

            self.transition(ConversionState::Encoding);
            let entry = build_entry(&normalized.transaction, &self.entry_options);
            har.write_entry(&entry)?;
            summary.entries_written += 1;

            tracing::debug!(
                "Entry {}: {} {} -> {}",
                index,
                entry.request.method,
                entry.request.url,
                entry.response.status
            );
        }

        let (out, bytes) = har.finish()?;
        summary.bytes_written = bytes;
        summary.records_with_warnings = degraded_entries.len();
        self.transition(ConversionState::Flushed);

        if !summary.warnings.is_empty() {
            tracing::info!(
                "Conversion finished with {} warnings",
                summary.warnings.len()
            );
        }

        Ok((out, summary))
    }

    fn transition(&mut self, next: ConversionState) {
        if self.state != next {
            tracing::trace!("Conversion state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
