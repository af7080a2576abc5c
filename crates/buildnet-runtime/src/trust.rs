//! SSH trust material
//!
//! One key pair is shared by the whole cluster: the private half is mounted
//! read-only into workers and registered as the coordinator's credential, the
//! public half is handed to each worker's SSH daemon.

use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, instrument};

use crate::error::{TrustError, TrustResult};

/// File name of the private key inside the key directory
pub const PRIVATE_KEY_NAME: &str = "jenkins_agent";

/// File name of the public key inside the key directory
pub const PUBLIC_KEY_NAME: &str = "jenkins_agent.pub";

/// Comment embedded in generated keys
pub const KEY_COMMENT: &str = "jenkins-agent@local";

/// Read access to an existing key pair
#[async_trait]
pub trait TrustMaterial: Send + Sync {
    /// Both halves of the pair are present
    fn exists(&self) -> bool;

    /// Public key in OpenSSH format, trimmed
    async fn public_key_content(&self) -> TrustResult<String>;

    fn private_key_path(&self) -> &Path;
}

/// Key pair stored as two files in one directory
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
    private_key: PathBuf,
    public_key: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            private_key: dir.join(PRIVATE_KEY_NAME),
            public_key: dir.join(PUBLIC_KEY_NAME),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn public_key_path(&self) -> &Path {
        &self.public_key
    }

    /// Generate a 4096-bit RSA pair with `ssh-keygen`
    ///
    /// Refuses to overwrite an existing pair unless `force` is set.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn generate(&self, force: bool) -> TrustResult<()> {
        if self.exists() && !force {
            return Err(TrustError::AlreadyExists(self.private_key.clone()));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        for path in [&self.private_key, &self.public_key] {
            if path.exists() {
                tokio::fs::remove_file(path).await?;
            }
        }

        let output = Command::new("ssh-keygen")
            .args(["-t", "rsa", "-b", "4096", "-C", KEY_COMMENT, "-N", "", "-q", "-f"])
            .arg(&self.private_key)
            .output()
            .await
            .map_err(|e| TrustError::Generation(format!("failed to run ssh-keygen: {}", e)))?;

        if !output.status.success() {
            return Err(TrustError::Generation(buildnet_types::truncate_diagnostic(
                &String::from_utf8_lossy(&output.stderr),
            )));
        }

        set_mode(&self.private_key, 0o600).await?;
        set_mode(&self.public_key, 0o644).await?;

        info!(path = %self.private_key.display(), "Generated SSH key pair");
        Ok(())
    }

    /// Copy the pair into `backup/` with a timestamp suffix
    ///
    /// Returns the backup paths of the private and public key.
    pub async fn backup(&self) -> TrustResult<(PathBuf, PathBuf)> {
        if !self.exists() {
            return Err(TrustError::Missing(self.private_key.clone()));
        }

        let backup_dir = self.dir.join("backup");
        tokio::fs::create_dir_all(&backup_dir).await?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let private_copy = backup_dir.join(format!("{}_{}", PRIVATE_KEY_NAME, stamp));
        let public_copy = backup_dir.join(format!("{}_{}.pub", PRIVATE_KEY_NAME, stamp));

        tokio::fs::copy(&self.private_key, &private_copy).await?;
        tokio::fs::copy(&self.public_key, &public_copy).await?;
        set_mode(&private_copy, 0o600).await?;

        info!(backup = %private_copy.display(), "Backed up SSH key pair");
        Ok((private_copy, public_copy))
    }
}

#[async_trait]
impl TrustMaterial for KeyStore {
    fn exists(&self) -> bool {
        self.private_key.is_file() && self.public_key.is_file()
    }

    async fn public_key_content(&self) -> TrustResult<String> {
        if !self.public_key.is_file() {
            return Err(TrustError::Missing(self.public_key.clone()));
        }
        let content = tokio::fs::read_to_string(&self.public_key).await?;
        Ok(content.trim().to_string())
    }

    fn private_key_path(&self) -> &Path {
        &self.private_key
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> TrustResult<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> TrustResult<()> {
    Ok(())
}
