//! Configuration file for diagnostics.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use ahash::RandomState;
use serde::Deserialize;

use crate::error::{Category, PlError, Severity};

/// Struct for deserializing from a config TOML
#[derive(Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Checker behaviour switches.
    pub checker: CheckerOptions,

    // diagnostic configuration
    display: WarningDisplay,
    diagnostics: HashMap<String, WarningLevel, RandomState>,
}

/// General error display options
#[derive(Deserialize, Default, Debug, Clone)]
pub struct WarningDisplay {
    #[serde(default)]
    error_level: WarningLevel,
}

/// The category gates and behaviour switches recognized by the checker.
///
/// Every gate is also independently overridable per block by an in-source
/// directive, so the walker keeps its own working copy of these.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct CheckerOptions {
    /// Stop on the first error instead of accumulating diagnostics.
    pub fatal_errors: bool,
    pub other_warnings: bool,
    pub extra_warnings: bool,
    pub performance_warnings: bool,
    pub security_warnings: bool,
    pub compatibility_warnings: bool,
    /// Enables the literal-value propagation used by the taint and
    /// format-string checks.
    pub constants_tracing: bool,
}

impl Default for CheckerOptions {
    fn default() -> CheckerOptions {
        CheckerOptions {
            fatal_errors: false,
            other_warnings: true,
            extra_warnings: false,
            performance_warnings: false,
            security_warnings: false,
            compatibility_warnings: false,
            constants_tracing: true,
        }
    }
}

impl CheckerOptions {
    pub fn category_enabled(&self, category: Category) -> bool {
        match category {
            Category::Other => self.other_warnings,
            Category::Extra => self.extra_warnings,
            Category::Performance => self.performance_warnings,
            Category::Security => self.security_warnings,
            Category::Compatibility => self.compatibility_warnings,
        }
    }

    pub fn set_category(&mut self, category: Category, enable: bool) {
        match category {
            Category::Other => self.other_warnings = enable,
            Category::Extra => self.extra_warnings = enable,
            Category::Performance => self.performance_warnings = enable,
            Category::Security => self.security_warnings = enable,
            Category::Compatibility => self.compatibility_warnings = enable,
        }
    }
}

/// Severity overrides from configuration
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all(deserialize = "lowercase"))]
pub enum WarningLevel {
    #[serde(alias = "errors")]
    Error = 1,
    #[serde(alias = "warnings")]
    Warning = 2,
    #[serde(alias = "infos")]
    Info = 3,
    #[serde(alias = "false", alias = "off")]
    Disabled = 4,
    Unset = 5,
}

impl Config {
    /// Read a config TOML and generate a [`Config`] struct
    ///
    /// [`Config`]: struct.Config.html
    pub fn read_toml(path: &Path) -> Result<Config, Error> {
        let mut file = File::open(path)?;
        let mut config_toml = String::new();
        file.read_to_string(&mut config_toml)?;
        Ok(toml::from_str(&config_toml)?)
    }

    /// Override one diagnostic's level, as the `[diagnostics]` TOML table
    /// would.
    pub fn set_diagnostic<S: Into<String>>(&mut self, errortype: S, level: WarningLevel) {
        self.diagnostics.insert(errortype.into(), level);
    }

    fn config_warninglevel(&self, error: &PlError) -> Option<&WarningLevel> {
        if let Some(errortype) = error.errortype() {
            return self.diagnostics.get(errortype);
        }
        None
    }

    /// Return a new [`PlError`] with the configured [`Severity`] or [`None`] if disabled
    ///
    /// [`PlError`]: ../struct.PlError.html
    /// [`Severity`]: ../enum.Severity.html
    /// [`None`]: ../../std/option/enum.Option.html#variant.None
    pub fn set_configured_severity(&self, error: PlError) -> Option<PlError> {
        Some(match self.config_warninglevel(&error) {
            Some(WarningLevel::Error) => error.set_severity(Severity::Error),
            Some(WarningLevel::Warning) => error.set_severity(Severity::Warning),
            Some(WarningLevel::Info) => error.set_severity(Severity::Info),
            Some(WarningLevel::Disabled) => return None,
            Some(WarningLevel::Unset) | None => error,
        })
    }

    /// Test the error against the configured error level threshold
    pub fn registerable_error(&self, error: &PlError) -> bool {
        self.display.error_level.applies_to(error.severity())
    }
}

impl WarningLevel {
    fn applies_to(self, severity: Severity) -> bool {
        match self {
            WarningLevel::Disabled => false,
            WarningLevel::Error => severity <= Severity::Error,
            WarningLevel::Warning => severity <= Severity::Warning,
            WarningLevel::Info => severity <= Severity::Info,
            WarningLevel::Unset => true,
        }
    }
}

impl Default for WarningLevel {
    fn default() -> WarningLevel {
        WarningLevel::Unset
    }
}

impl From<Severity> for WarningLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => WarningLevel::Error,
            Severity::Warning => WarningLevel::Warning,
            Severity::Info => WarningLevel::Info,
        }
    }
}

impl PartialEq<Severity> for WarningLevel {
    fn eq(&self, other: &Severity) -> bool {
        matches!(
            (self, other),
            (WarningLevel::Error, Severity::Error)
                | (WarningLevel::Warning, Severity::Warning)
                | (WarningLevel::Info, Severity::Info)
        )
    }
}

/// Config parse error
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Toml(toml::de::Error),
}

impl Error {
    pub fn into_boxed_error(self) -> Box<dyn std::error::Error + Send + Sync> {
        match self {
            Error::Io(err) => Box::new(err),
            Error::Toml(err) => Box::new(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Error {
        Error::Toml(err)
    }
}
