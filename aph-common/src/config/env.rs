//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for `APH_*` overrides with validation,
//! error collection, and source tracking.

use super::source::Sourced;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    lookup: Lookup,
    errors: Vec<EnvError>,
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvParser {
    /// Create a parser over the process environment with the APH_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "APH_",
            lookup: Box::new(|name| std::env::var(name).ok()),
            errors: Vec::new(),
        }
    }

    /// Create a parser over a fixed set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            prefix: "APH_",
            lookup: Box::new(move |name| vars.get(name).cloned()),
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Get the full variable name with prefix.
    pub fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, name: &str) -> Option<(String, String)> {
        let var_name = self.var_name(name);
        (self.lookup)(&var_name).map(|value| (var_name, value))
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        self.get_opt_string(name)
            .unwrap_or_else(|| Sourced::default_value(default.to_string()))
    }

    /// Get a string value if the variable is set.
    pub fn get_opt_string(&mut self, name: &str) -> Option<Sourced<String>> {
        self.raw(name)
            .map(|(var_name, value)| Sourced::from_env(value, var_name))
    }

    /// Get a path value if the variable is set and non-empty.
    pub fn get_path(&mut self, name: &str) -> Option<Sourced<PathBuf>> {
        self.raw(name)
            .filter(|(_, value)| !value.is_empty())
            .map(|(var_name, value)| Sourced::from_env(PathBuf::from(value), var_name))
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        match self.raw(name) {
            Some((var_name, value)) => {
                let parsed = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        self.errors.push(EnvError::InvalidValue {
                            var: var_name.clone(),
                            expected: "boolean (true/false/1/0/yes/no)".to_string(),
                            value: value.clone(),
                        });
                        default
                    }
                };
                Sourced::from_env(parsed, var_name)
            }
            None => Sourced::default_value(default),
        }
    }

    /// Get a value parsed with `FromStr`, recording an error when it does
    /// not parse.
    pub fn get_parsed<T: FromStr>(&mut self, name: &str, expected: &str) -> Option<Sourced<T>> {
        let (var_name, value) = self.raw(name)?;
        match value.trim().parse::<T>() {
            Ok(parsed) => Some(Sourced::from_env(parsed, var_name)),
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: expected.to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get a command line split on whitespace. An empty value yields an
    /// empty list.
    pub fn get_command(&mut self, name: &str) -> Option<Sourced<Vec<String>>> {
        self.raw(name).map(|(var_name, value)| {
            let words = value.split_whitespace().map(str::to_string).collect();
            Sourced::from_env(words, var_name)
        })
    }

    /// Get a tracing level filter.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        match self.raw(name) {
            Some((var_name, value)) => {
                let level = value.to_lowercase();
                if matches!(
                    level.as_str(),
                    "trace" | "debug" | "info" | "warn" | "error" | "off"
                ) {
                    Sourced::from_env(level, var_name)
                } else {
                    self.errors.push(EnvError::InvalidLogLevel {
                        var: var_name.clone(),
                        value,
                    });
                    Sourced::default_value(default.to_string())
                }
            }
            None => Sourced::default_value(default.to_string()),
        }
    }
}
