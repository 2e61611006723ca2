use crate::transport::TlsClientConfig;
use anyhow::Context;
use serde_derive::Deserialize;
use std::{
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Validated relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// `Some` selects the TLS transport.
    pub tls: Option<TlsClientConfig>,
    /// `None` disables the idle timeout.
    pub idle_timeout: Option<Duration>,
}

/// Settings as read from a config file or the command line, every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirtyRelayConfig {
    pub tls: Option<bool>,
    pub insecure: Option<bool>,
    pub ca_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl DirtyRelayConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open config file: {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("failed to deserialize config file: {}", path.display()))
    }

    /// Values set in `self` win over `defaults`.
    pub fn or(self, defaults: DirtyRelayConfig) -> Self {
        Self {
            tls: self.tls.or(defaults.tls),
            insecure: self.insecure.or(defaults.insecure),
            ca_file: self.ca_file.or(defaults.ca_file),
            timeout_secs: self.timeout_secs.or(defaults.timeout_secs),
        }
    }
}

impl TryFrom<DirtyRelayConfig> for RelayConfig {
    type Error = anyhow::Error;

    fn try_from(dirty: DirtyRelayConfig) -> Result<Self, Self::Error> {
        let tls_enabled = dirty.tls.unwrap_or(false);
        let insecure = dirty.insecure.unwrap_or(false);

        if !tls_enabled && (insecure || dirty.ca_file.is_some()) {
            anyhow::bail!("'insecure' and 'ca_file' require 'tls' to be enabled");
        }
        if insecure && dirty.ca_file.is_some() {
            anyhow::bail!("'ca_file' has no effect when 'insecure' is set");
        }

        let tls = tls_enabled.then(|| TlsClientConfig {
            insecure,
            ca_file: dirty.ca_file,
        });
        let idle_timeout = match dirty.timeout_secs {
            None => Some(DEFAULT_IDLE_TIMEOUT),
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        };

        Ok(Self { tls, idle_timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_plain_with_idle_timeout() {
        let config = RelayConfig::try_from(DirtyRelayConfig::default()).unwrap();
        assert_eq!(config.tls, None);
        assert_eq!(config.idle_timeout, Some(DEFAULT_IDLE_TIMEOUT));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let dirty = DirtyRelayConfig {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(RelayConfig::try_from(dirty).unwrap().idle_timeout, None);
    }

    #[test]
    fn command_line_overrides_file() {
        let file: DirtyRelayConfig =
            serde_json::from_str(r#"{"tls": true, "timeout_secs": 30, "ca_file": "/etc/ca.pem"}"#)
                .unwrap();
        let cli = DirtyRelayConfig {
            timeout_secs: Some(2),
            ..Default::default()
        };

        let config = RelayConfig::try_from(cli.or(file)).unwrap();
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(2)));
        assert_eq!(
            config.tls,
            Some(TlsClientConfig {
                insecure: false,
                ca_file: Some(PathBuf::from("/etc/ca.pem")),
            })
        );
    }

    #[test]
    fn insecure_requires_tls() {
        let dirty = DirtyRelayConfig {
            insecure: Some(true),
            ..Default::default()
        };
        assert!(RelayConfig::try_from(dirty).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<DirtyRelayConfig>(r#"{"verify": false}"#);
        assert!(result.is_err());
    }
}
