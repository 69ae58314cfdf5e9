//! Upload collaborators
//!
//! Images hosted remotely are pushed over SSH through the system `ssh` and
//! `scp` binaries, located through `which` like the other external tools.
//! Local runs swap in [`FakeConnection`], which records what would have been
//! transferred instead of touching the network.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::SshSettings;
use crate::error::WrapError;

/// One recorded (or performed) file transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub source: PathBuf,
    pub remote_directory: PathBuf,
}

/// A destination files can be copied to
pub trait Connection {
    fn host(&self) -> &str;

    /// Copies `source` into `remote_directory`, creating it if needed.
    fn copy(&mut self, source: &Path, remote_directory: &Path) -> Result<(), WrapError>;

    /// Transfers recorded but not performed. Real connections have none.
    fn pending_transfers(&self) -> &[Transfer] {
        &[]
    }
}

/// How to authenticate against the remote host. Exactly one mechanism must
/// be configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Password(String),
    PublicKey(PathBuf),
}

impl Auth {
    pub fn from_settings(settings: &SshSettings) -> Result<Auth, WrapError> {
        match (&settings.password, &settings.public_key) {
            (Some(_), Some(_)) => Err(WrapError::AuthConfig(
                "both a password and a public key were provided".to_string(),
            )),
            (None, None) => Err(WrapError::AuthConfig(
                "neither a password nor a public key was provided".to_string(),
            )),
            (Some(password), None) => Ok(Auth::Password(password.clone())),
            (None, Some(key)) => {
                let key = expand_tilde(key);
                if !key.exists() {
                    return Err(WrapError::MissingFile(key));
                }
                Ok(Auth::PublicKey(key))
            }
        }
    }
}

/// `~/…` resolved against the `HOME` environment variable.
fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match std::env::var_os("HOME") {
            Some(home) => Path::new(&home).join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// An SSH connection shelling out to `ssh`/`scp`. Password authentication
/// additionally requires `sshpass`.
pub struct SshConnection {
    host: String,
    user: String,
    auth: Auth,
}

impl SshConnection {
    /// Locates the required binaries and probes the host with a no-op
    /// command. A failed probe is fatal: the caller must not silently fall
    /// back to embedding.
    pub fn connect(host: &str, user: &str, auth: Auth) -> Result<SshConnection, WrapError> {
        for tool in ["ssh", "scp"] {
            which::which(tool).map_err(|_| WrapError::MissingTool(tool.to_string()))?;
        }
        if matches!(auth, Auth::Password(_)) {
            which::which("sshpass").map_err(|_| WrapError::MissingTool("sshpass".to_string()))?;
        }

        let connection = SshConnection {
            host: host.to_string(),
            user: user.to_string(),
            auth,
        };
        connection.run_remote("true")?;
        Ok(connection)
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Builds the base command, wrapping it in `sshpass` when a password is
    /// used and passing the identity file otherwise.
    fn command_for(&self, program: &str) -> Command {
        match &self.auth {
            Auth::Password(password) => {
                let mut command = Command::new("sshpass");
                command.arg("-p").arg(password).arg(program);
                command
            }
            Auth::PublicKey(key) => {
                let mut command = Command::new(program);
                command.arg("-i").arg(key);
                command
            }
        }
    }

    fn run_remote(&self, remote_command: &str) -> Result<(), WrapError> {
        let mut command = self.command_for("ssh");
        // password auth cannot run in batch mode
        if matches!(self.auth, Auth::PublicKey(_)) {
            command.arg("-o").arg("BatchMode=yes");
        }
        command
            .arg(self.destination())
            .arg(remote_command)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        check_status(command.status()?, &self.host, remote_command)
    }
}

fn check_status(
    status: std::process::ExitStatus,
    host: &str,
    what: &str,
) -> Result<(), WrapError> {
    if !status.success() {
        return Err(WrapError::Upload {
            host: host.to_string(),
            message: format!("`{}` exited with {:?}", what, status.code()),
        });
    }
    Ok(())
}

impl Connection for SshConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn copy(&mut self, source: &Path, remote_directory: &Path) -> Result<(), WrapError> {
        if !source.exists() {
            return Err(WrapError::MissingFile(source.to_path_buf()));
        }
        self.run_remote(&format!("mkdir -p {}", remote_directory.display()))?;

        let mut command = self.command_for("scp");
        command
            .arg(source)
            .arg(format!(
                "{}:{}/",
                self.destination(),
                remote_directory.display()
            ))
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        check_status(
            command.status()?,
            &self.host,
            &format!("scp {}", source.display()),
        )
    }
}

/// A connection that only keeps track of what it was asked to copy. Repeated
/// requests for the same (source, destination) pair are collapsed.
pub struct FakeConnection {
    host: String,
    seen: HashSet<(PathBuf, PathBuf)>,
    transfers: Vec<Transfer>,
}

impl FakeConnection {
    pub fn new(host: &str) -> FakeConnection {
        FakeConnection {
            host: host.to_string(),
            seen: HashSet::new(),
            transfers: Vec::new(),
        }
    }
}

impl Connection for FakeConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn copy(&mut self, source: &Path, remote_directory: &Path) -> Result<(), WrapError> {
        let key = (source.to_path_buf(), remote_directory.to_path_buf());
        if self.seen.insert(key) {
            self.transfers.push(Transfer {
                source: source.to_path_buf(),
                remote_directory: remote_directory.to_path_buf(),
            });
        }
        Ok(())
    }

    fn pending_transfers(&self) -> &[Transfer] {
        &self.transfers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(password: Option<&str>, public_key: Option<&str>) -> SshSettings {
        SshSettings {
            user: "uploader".to_string(),
            password: password.map(str::to_string),
            public_key: public_key.map(str::to_string),
        }
    }

    #[test]
    fn password_alone_is_accepted() {
        let auth = Auth::from_settings(&settings(Some("hunter2"), None)).unwrap();
        assert_eq!(auth, Auth::Password("hunter2".to_string()));
    }

    #[test]
    fn both_mechanisms_are_rejected() {
        let err = Auth::from_settings(&settings(Some("hunter2"), Some("~/.ssh/id_rsa"))).unwrap_err();
        assert!(matches!(err, WrapError::AuthConfig(_)));
    }

    #[test]
    fn neither_mechanism_is_rejected() {
        let err = Auth::from_settings(&settings(None, None)).unwrap_err();
        assert!(matches!(err, WrapError::AuthConfig(_)));
    }

    #[test]
    fn missing_key_file_is_reported() {
        let err = Auth::from_settings(&settings(None, Some("/no/such/key"))).unwrap_err();
        assert_eq!(err, WrapError::MissingFile(PathBuf::from("/no/such/key")));
    }

    #[test]
    fn tilde_expands_against_home() {
        let home = std::env::var("HOME").unwrap();
        assert_eq!(
            expand_tilde("~/keys/id_rsa"),
            Path::new(&home).join("keys/id_rsa")
        );
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn fake_connection_collapses_repeated_copies() {
        let mut connection = FakeConnection::new("moodle.example.com");
        connection
            .copy(Path::new("a.svg"), Path::new("/var/www/pics"))
            .unwrap();
        connection
            .copy(Path::new("a.svg"), Path::new("/var/www/pics"))
            .unwrap();
        connection
            .copy(Path::new("b.svg"), Path::new("/var/www/pics"))
            .unwrap();

        let transfers = connection.pending_transfers();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].source, PathBuf::from("a.svg"));
        assert_eq!(transfers[1].source, PathBuf::from("b.svg"));
    }
}
