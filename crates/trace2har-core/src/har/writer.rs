use super::types::{Creator, Entry, HAR_VERSION};
use crate::Result;
use std::io::{self, Write};

/// Streams a HAR document one entry at a time.
///
/// The layout is fixed: an opening `log` object, one compact entry per
/// line, and the closing brackets written by [`HarWriter::finish`]. Nothing
/// in it depends on wall-clock time, so equal input gives equal bytes.
pub struct HarWriter<W: Write> {
    out: CountingWriter<W>,
    entries: usize,
}

impl<W: Write> HarWriter<W> {
    /// Write the document preamble up to the opening of `entries`.
    pub fn begin(out: W, creator: &Creator) -> Result<Self> {
        let mut out = CountingWriter::new(out);

        tracing::debug!("Starting HAR document for {} {}", creator.name, creator.version);

        write!(out, "{{\"log\":{{\"version\":")?;
        serde_json::to_writer(&mut out, HAR_VERSION)?;
        write!(out, ",\"creator\":")?;
        serde_json::to_writer(&mut out, creator)?;
        write!(out, ",\"entries\":[")?;

        Ok(Self { out, entries: 0 })
    }

    pub fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        let separator = if self.entries == 0 { "\n" } else { ",\n" };
        self.out.write_all(separator.as_bytes())?;
        serde_json::to_writer(&mut self.out, entry)?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries_written(&self) -> usize {
        self.entries
    }

    pub fn bytes_written(&self) -> u64 {
        self.out.count
    }

    /// Close the document, flush, and return the writer with the byte count.
    pub fn finish(mut self) -> Result<(W, u64)> {
        if self.entries > 0 {
            self.out.write_all(b"\n")?;
        }
        self.out.write_all(b"]}}\n")?;
        self.out.flush()?;

        tracing::debug!(
            "Finished HAR document: {} entries, {} bytes",
            self.entries,
            self.out.count
        );

        Ok((self.out.inner, self.out.count))
    }
}

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
