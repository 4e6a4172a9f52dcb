//! Content-coding registry and decoders.

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::fmt;
use std::io::{self, Read};

/// Content codings the normalizer knows how to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCodec {
    Identity,
    Gzip,
    /// zlib-wrapped deflate, falling back to raw deflate streams
    Deflate,
}

impl ContentCodec {
    /// Map a coding token to its decoder, ignoring case.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "identity" => Some(ContentCodec::Identity),
            "gzip" | "x-gzip" => Some(ContentCodec::Gzip),
            "deflate" => Some(ContentCodec::Deflate),
            _ => None,
        }
    }

    /// Undo this coding. Output larger than `limit` bytes is an error, so a
    /// small compressed body cannot expand without bound.
    pub fn decode(&self, data: &[u8], limit: usize) -> io::Result<Vec<u8>> {
        match self {
            ContentCodec::Identity => read_all(data, limit),
            ContentCodec::Gzip => read_all(GzDecoder::new(data), limit),
            ContentCodec::Deflate => {
                read_all(ZlibDecoder::new(data), limit).or_else(|e| {
                    if e.kind() == io::ErrorKind::FileTooLarge {
                        Err(e)
                    } else {
                        read_all(DeflateDecoder::new(data), limit)
                    }
                })
            }
        }
    }
}

impl fmt::Display for ContentCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentCodec::Identity => write!(f, "identity"),
            ContentCodec::Gzip => write!(f, "gzip"),
            ContentCodec::Deflate => write!(f, "deflate"),
        }
    }
}

fn read_all(decoder: impl Read, limit: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    decoder.take(cap).read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(io::Error::new(
            io::ErrorKind::FileTooLarge,
            format!("decoded body exceeds {} bytes", limit),
        ));
    }
    Ok(out)
}

/// Immutable token → codec table handed to the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecRegistry {
    entries: Vec<(String, ContentCodec)>,
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Return a registry that also maps `token` to `codec`.
    pub fn with(mut self, token: &str, codec: ContentCodec) -> Self {
        let token = token.trim().to_ascii_lowercase();
        self.entries.retain(|(existing, _)| *existing != token);
        self.entries.push((token, codec));
        self
    }

    pub fn get(&self, token: &str) -> Option<ContentCodec> {
        let token = token.trim();
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, codec)| *codec)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::empty()
            .with("gzip", ContentCodec::Gzip)
            .with("x-gzip", ContentCodec::Gzip)
            .with("deflate", ContentCodec::Deflate)
            .with("identity", ContentCodec::Identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use std::io::Write;

    const LIMIT: usize = 1024 * 1024;

    #[test]
    fn test_gzip_decode() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"compressed text").unwrap();
        let data = encoder.finish().unwrap();

        assert_eq!(
            ContentCodec::Gzip.decode(&data, LIMIT).unwrap(),
            b"compressed text"
        );
    }

    #[test]
    fn test_deflate_accepts_zlib_and_raw() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(b"zlib body").unwrap();
        let zlib = zlib.finish().unwrap();

        let mut raw = DeflateEncoder::new(Vec::new(), Compression::default());
        raw.write_all(b"raw body").unwrap();
        let raw = raw.finish().unwrap();

        assert_eq!(ContentCodec::Deflate.decode(&zlib, LIMIT).unwrap(), b"zlib body");
        assert_eq!(ContentCodec::Deflate.decode(&raw, LIMIT).unwrap(), b"raw body");
    }

    #[test]
    fn test_corrupt_gzip_fails() {
        assert!(
            ContentCodec::Gzip
                .decode(b"\x1f\x8b\x08\x00garbage", LIMIT)
                .is_err()
        );
    }

    #[test]
    fn test_output_over_limit_fails() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![0u8; 1024 * 1024]).unwrap();
        let bomb = encoder.finish().unwrap();
        assert!(bomb.len() < 4096);

        let err = ContentCodec::Gzip.decode(&bomb, 64 * 1024).unwrap_err();
        assert!(err.to_string().contains("exceeds 65536 bytes"));

        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::best());
        zlib.write_all(&vec![0u8; 1024 * 1024]).unwrap();
        let zlib = zlib.finish().unwrap();
        let err = ContentCodec::Deflate.decode(&zlib, 64 * 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::FileTooLarge);
    }

    #[test]
    fn test_output_at_limit_is_kept() {
        let data = vec![7u8; 100];
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data).unwrap();
        let data_gz = encoder.finish().unwrap();

        assert_eq!(ContentCodec::Gzip.decode(&data_gz, 100).unwrap(), data);
        assert!(ContentCodec::Identity.decode(&data, 99).is_err());
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = CodecRegistry::default();
        assert_eq!(registry.get("GZIP"), Some(ContentCodec::Gzip));
        assert_eq!(registry.get(" X-Gzip "), Some(ContentCodec::Gzip));
        assert_eq!(registry.get("br"), None);
    }
}
