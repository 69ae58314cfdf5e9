//! Run parameters
//!
//! The parameters file is a small YAML document describing where images are
//! hosted: SSH credentials, the host and its public filesystem root, and the
//! public URL the uploaded files become reachable under. The file is
//! optional; without it every image is embedded instead of uploaded.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::WrapError;

/// Top level of the parameters file
#[derive(Debug, Clone, Deserialize)]
pub struct Parameters {
    #[serde(rename = "images hosting")]
    pub images_hosting: ImagesHosting,
}

/// Where and how images are made publicly reachable
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesHosting {
    pub ssh: SshSettings,
    pub copy: CopySettings,
    /// URL prefix the copied files are served under
    #[serde(rename = "public URL")]
    pub public_url: String,
}

/// Credentials for the upload connection. Exactly one of `password` and
/// `public_key` must be set; [`crate::remote::Auth`] enforces that.
#[derive(Debug, Clone, Deserialize)]
pub struct SshSettings {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

/// Destination of the copied files
#[derive(Debug, Clone, Deserialize)]
pub struct CopySettings {
    pub host: String,
    /// Directory on the host mapped to the public URL
    #[serde(rename = "public filesystem root")]
    pub public_filesystem_root: String,
}

impl Parameters {
    /// Reads the parameters file; `Ok(None)` when it doesn't exist, so the
    /// caller can fall back to embedding images.
    pub fn load(path: &Path) -> Result<Option<Parameters>, WrapError> {
        if !path.exists() {
            return Ok(None);
        }
        let source = fs::read_to_string(path)?;
        Ok(Some(serde_yaml::from_str(&source)?))
    }
}
