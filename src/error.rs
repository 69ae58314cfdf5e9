//! Error types for the wrapping pipeline
//!
//! Every failure is terminal for the run: the tool is a batch converter and
//! partial success is not a supported mode. Errors therefore carry enough
//! context (paths, hosts, offending formula source) to be printed once at the
//! top level before exiting.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while building a GIFT file
#[derive(Debug, Clone, PartialEq)]
pub enum WrapError {
    /// A LaTeX formula did not compile; carries the naked formula source
    NotCompliantFormula(String),
    /// Odd number of `$` delimiters in a text fragment
    UnbalancedFormula(String),
    /// Input validation failure (duplicate names, malformed fields)
    Validation(String),
    /// A required external program is not installed
    MissingTool(String),
    /// `pdflatex` exited with a nonzero status
    CompilationFailed { path: PathBuf, status: Option<i32> },
    /// `pdflatex` did not finish within the allotted time
    CompilationTimeout { path: PathBuf, seconds: u64 },
    /// `pdf2svg` exited with a nonzero status
    ConversionFailed { path: PathBuf },
    /// A referenced local file does not exist
    MissingFile(PathBuf),
    /// Transfer to the remote host failed
    Upload { host: String, message: String },
    /// Mutually exclusive authentication settings were misused
    AuthConfig(String),
    /// Underlying I/O failure
    Io(String),
    /// Malformed YAML input
    Yaml(String),
}

impl fmt::Display for WrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrapError::NotCompliantFormula(formula) => {
                write!(f, "cannot compile LaTeX formula: {}", formula)
            }
            WrapError::UnbalancedFormula(text) => {
                write!(f, "unbalanced formula delimiters in: {}", text)
            }
            WrapError::Validation(msg) => write!(f, "validation error: {}", msg),
            WrapError::MissingTool(tool) => write!(f, "cannot find {}", tool),
            WrapError::CompilationFailed { path, status } => match status {
                Some(code) => write!(
                    f,
                    "errors were found while compiling {} (exit status {})",
                    path.display(),
                    code
                ),
                None => write!(f, "errors were found while compiling {}", path.display()),
            },
            WrapError::CompilationTimeout { path, seconds } => write!(
                f,
                "could not compile {} in {} seconds",
                path.display(),
                seconds
            ),
            WrapError::ConversionFailed { path } => {
                write!(f, "could not convert {} to svg", path.display())
            }
            WrapError::MissingFile(path) => write!(f, "file {} does not exist", path.display()),
            WrapError::Upload { host, message } => {
                write!(f, "transfer to {} failed: {}", host, message)
            }
            WrapError::AuthConfig(msg) => write!(f, "{}", msg),
            WrapError::Io(msg) => write!(f, "I/O error: {}", msg),
            WrapError::Yaml(msg) => write!(f, "cannot parse YAML: {}", msg),
        }
    }
}

impl std::error::Error for WrapError {}

impl From<std::io::Error> for WrapError {
    fn from(err: std::io::Error) -> Self {
        WrapError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for WrapError {
    fn from(err: serde_yaml::Error) -> Self {
        WrapError::Yaml(err.to_string())
    }
}
