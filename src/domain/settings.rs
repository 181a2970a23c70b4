//! Typed settings read from the INI configuration.
//!
//! Every key is optional; invalid values are rejected up front with
//! `ConfigInvalid` rather than silently replaced by defaults.

use std::net::SocketAddr;

use crate::domain::error::IndexwatchError;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
pub const DEFAULT_EXTENSIONS: &[&str] = &["csv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalMatch {
    /// "high" / "low" anywhere in the description.
    #[default]
    Substring,
    /// Only the full "new 52-week high" / "new 52-week low" phrases.
    Phrase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    /// Lowercase extensions without the dot; `*` accepts anything.
    pub extensions: Vec<String>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl UploadSettings {
    pub fn accepts(&self, filename: &str) -> bool {
        if self.extensions.iter().any(|e| e == "*") {
            return true;
        }
        let ext = match filename.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => return false,
        };
        self.extensions.iter().any(|e| *e == ext)
    }

    pub fn expected(&self) -> String {
        self.extensions
            .iter()
            .map(|e| format!(".{}", e))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlertSettings {
    pub signal_match: SignalMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSettings {
    pub listen: SocketAddr,
    /// Empty or containing `*` means any origin.
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub upload: UploadSettings,
    pub alerts: AlertSettings,
    pub web: WebSettings,
}

impl Settings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, IndexwatchError> {
        Ok(Self {
            upload: upload_settings(config)?,
            alerts: alert_settings(config)?,
            web: web_settings(config)?,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload: UploadSettings::default(),
            alerts: AlertSettings::default(),
            web: WebSettings {
                listen: SocketAddr::from(([127, 0, 0, 1], 8000)),
                cors_origins: Vec::new(),
            },
        }
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> IndexwatchError {
    IndexwatchError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn upload_settings(config: &dyn ConfigPort) -> Result<UploadSettings, IndexwatchError> {
    let extensions = match config.get_list("upload", "extensions") {
        Some(list) => list
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect::<Vec<_>>(),
        None => return Ok(UploadSettings::default()),
    };
    if extensions.is_empty() {
        return Err(invalid(
            "upload",
            "extensions",
            "at least one extension is required",
        ));
    }
    Ok(UploadSettings { extensions })
}

fn alert_settings(config: &dyn ConfigPort) -> Result<AlertSettings, IndexwatchError> {
    let signal_match = match config.get_string("alerts", "signal_match") {
        None => SignalMatch::default(),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "substring" => SignalMatch::Substring,
            "phrase" => SignalMatch::Phrase,
            other => {
                return Err(invalid(
                    "alerts",
                    "signal_match",
                    format!("expected 'substring' or 'phrase', got '{}'", other),
                ));
            }
        },
    };
    Ok(AlertSettings { signal_match })
}

fn web_settings(config: &dyn ConfigPort) -> Result<WebSettings, IndexwatchError> {
    let raw = config
        .get_string("web", "listen")
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    let listen = raw
        .trim()
        .parse()
        .map_err(|_| invalid("web", "listen", format!("'{}' is not a socket address", raw)))?;
    let cors_origins = config.get_list("web", "cors_origins").unwrap_or_default();
    Ok(WebSettings {
        listen,
        cors_origins,
    })
}
