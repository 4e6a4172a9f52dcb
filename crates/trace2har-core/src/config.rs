use crate::normalize::{CodecRegistry, ContentCodec, NormalizerConfig};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Bodies above this size are always base64-encoded.
pub const DEFAULT_BODY_THRESHOLD: usize = 1024 * 1024;

pub const DEFAULT_CREATOR_NAME: &str = "trace2har";

/// Largest body the normalizer will produce when undoing a coding.
pub const DEFAULT_MAX_DECODED_SIZE: usize = 256 * 1024 * 1024;

/// Conversion settings, typically loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Body size in bytes above which content is stored as base64.
    pub body_threshold: usize,
    /// `log.creator.name` of produced documents.
    pub creator_name: String,
    /// Content codings the normalizer may undo.
    pub codecs: Vec<String>,
    /// Decoded bodies larger than this are kept raw with a decoding warning.
    pub max_decoded_size: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            body_threshold: DEFAULT_BODY_THRESHOLD,
            creator_name: DEFAULT_CREATOR_NAME.to_string(),
            codecs: CodecRegistry::default()
                .tokens()
                .map(str::to_string)
                .collect(),
            max_decoded_size: DEFAULT_MAX_DECODED_SIZE,
        }
    }
}

impl ConvertConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ConvertConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!("Loading config from: {}", path.display());

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.body_threshold == 0 {
            return Err(Error::Config(
                "body_threshold must be greater than zero".to_string(),
            ));
        }
        if self.max_decoded_size == 0 {
            return Err(Error::Config(
                "max_decoded_size must be greater than zero".to_string(),
            ));
        }
        if self.creator_name.trim().is_empty() {
            return Err(Error::Config("creator_name must not be empty".to_string()));
        }
        self.codec_registry()?;
        Ok(())
    }

    /// Build the immutable codec registry named by `codecs`.
    pub fn codec_registry(&self) -> Result<CodecRegistry> {
        let mut registry = CodecRegistry::empty();
        for token in &self.codecs {
            let codec = ContentCodec::from_token(token)
                .ok_or_else(|| Error::Config(format!("unknown content coding '{}'", token)))?;
            registry = registry.with(token, codec);
        }
        Ok(registry)
    }

    pub fn normalizer_config(&self) -> Result<NormalizerConfig> {
        Ok(NormalizerConfig::new(self.codec_registry()?)
            .with_max_decoded_size(self.max_decoded_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ConvertConfig::from_toml_str("").unwrap();
        assert_eq!(config, ConvertConfig::default());
        assert_eq!(config.body_threshold, 1024 * 1024);
    }

    #[test]
    fn test_overrides_threshold() {
        let config = ConvertConfig::from_toml_str("body_threshold = 4096\n").unwrap();
        assert_eq!(config.body_threshold, 4096);
        assert_eq!(config.creator_name, "trace2har");
    }

    #[test]
    fn test_rejects_unknown_codec() {
        let result = ConvertConfig::from_toml_str("codecs = [\"gzip\", \"br\"]\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let result = ConvertConfig::from_toml_str("threshold = 1\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_max_decoded_size() {
        let config = ConvertConfig::from_toml_str("max_decoded_size = 2048\n").unwrap();
        assert_eq!(config.normalizer_config().unwrap().max_decoded_size(), 2048);

        let result = ConvertConfig::from_toml_str("max_decoded_size = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_restricted_codecs() {
        let config = ConvertConfig::from_toml_str("codecs = [\"identity\"]\n").unwrap();
        let registry = config.codec_registry().unwrap();
        assert!(registry.get("identity").is_some());
        assert!(registry.get("gzip").is_none());
    }
}
