//! Configuration management for the `pfordelta` binary
use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Deserializer;
use std::num::NonZeroUsize;
use std::path::Path;

use crate::codec::check_block_size;
use crate::codec::PForDelta;
use crate::codec::WidthPolicy;
use crate::Error;

/// Default number of values per block.
pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// Default number of elements between two skip index marks.
pub const DEFAULT_MARK_INTERVAL: usize = 128;

/// Top-level configuration
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    /// Block codec configuration
    pub codec: CodecConfig,
    /// Skip index configuration
    pub index: IndexConfig,
}

/// How blocks are compressed.
#[derive(Deserialize, Clone, Debug)]
pub struct CodecConfig {
    /// Values per block; a multiple of 32.
    pub block_size: usize,
    /// Bit width selection, one of `optimal`, `covering` or `fixed:<bits>`.
    #[serde(deserialize_with = "width_policy_deserializer")]
    pub width_policy: WidthPolicy,
}

/// How often marks are recorded.
#[derive(Deserialize, Clone, Debug)]
pub struct IndexConfig {
    /// Elements between two consecutive marks.
    pub mark_interval: NonZeroUsize,
}

/// A deserializer for [`WidthPolicy`] from its string form.
pub fn width_policy_deserializer<'de, D>(deserializer: D) -> Result<WidthPolicy, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer)?
        .parse()
        .map_err(serde::de::Error::custom)
}

impl Settings {
    /// Loads the configuration from defaults, then the optional file at
    /// `config_path`, then environment variables.
    ///
    /// The environment variables are prefixed with `PFORDELTA_` and the
    /// nested fields are separated with double underscores, so
    /// `codec.block_size` is read from `PFORDELTA_CODEC__BLOCK_SIZE`.
    pub fn new(config_path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        let env = Environment::with_prefix("PFORDELTA")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);

        let mut cfg_builder = Self::defaults()?;
        if let Some(path) = config_path {
            cfg_builder = cfg_builder.add_source(File::from(path.as_ref()));
        }
        cfg_builder = cfg_builder.add_source(env);

        Self::build(cfg_builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("codec.block_size", DEFAULT_BLOCK_SIZE as u64)?
            .set_default("codec.width_policy", WidthPolicy::Optimal.to_string())?
            .set_default("index.mark_interval", DEFAULT_MARK_INTERVAL as u64)
    }

    fn build(cfg_builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = cfg_builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Perform validation on the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        check_block_size(self.codec.block_size as u64)
            .map_err(|err| ConfigError::Message(format!("[codec.block_size] {err}")))?;
        Ok(())
    }

    /// The block codec described by the codec section.
    pub fn codec(&self) -> Result<PForDelta, Error> {
        PForDelta::new(self.codec.block_size, self.codec.width_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BitWidth;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        Settings::build(Settings::defaults()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings.codec.block_size, 128);
        assert_eq!(settings.codec.width_policy, WidthPolicy::Optimal);
        assert_eq!(settings.index.mark_interval.get(), 128);

        let codec = settings.codec().unwrap();
        assert_eq!(codec.block_size(), 128);
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = from_toml(
            r#"
            [codec]
            block_size = 256
            width_policy = "fixed:20"

            [index]
            mark_interval = 16
            "#,
        )
        .unwrap();

        assert_eq!(settings.codec.block_size, 256);
        assert_eq!(
            settings.codec.width_policy,
            WidthPolicy::Fixed(BitWidth::new(20).unwrap())
        );
        assert_eq!(settings.index.mark_interval.get(), 16);
    }

    #[test]
    fn bad_block_size_fails_validation() {
        let err = from_toml("[codec]\nblock_size = 100").unwrap_err();
        assert!(
            matches!(err, ConfigError::Message(ref msg) if msg.contains("codec.block_size")),
            "{err}"
        );
    }

    #[test]
    fn bad_width_policy_fails_deserialization() {
        let err = from_toml("[codec]\nwidth_policy = \"fixed:14\"").unwrap_err();
        assert!(err.to_string().contains("unsupported bit width: 14"), "{err}");

        assert!(from_toml("[codec]\nwidth_policy = \"widest\"").is_err());
    }

    #[test]
    fn zero_mark_interval_is_rejected() {
        assert!(from_toml("[index]\nmark_interval = 0").is_err());
    }
}
