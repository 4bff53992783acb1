//! Filesystem credential store.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! └── <scope>/
//!     └── <name>/
//!         ├── tls.key
//!         └── token
//! ```
//!
//! Each file in a credential directory is one slot; the file name is the
//! slot key. Directories are created 0700 and files 0600 on Unix.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace};

use super::{Credential, CredentialError, CredentialStore};

/// Credential store reading from a directory tree.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    root: PathBuf,
}

impl FileCredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn credential_dir(&self, scope: &str, name: &str) -> Result<PathBuf, CredentialError> {
        validate_component(scope)?;
        validate_component(name)?;
        Ok(self.root.join(scope).join(name))
    }

    /// Write a credential, replacing any slots with the same keys.
    pub async fn put(
        &self,
        scope: &str,
        name: &str,
        credential: &Credential,
    ) -> Result<(), CredentialError> {
        let dir = self.credential_dir(scope, name)?;
        fs::create_dir_all(&dir).await.map_err(|source| io_error(&dir, source))?;
        restrict(&dir, 0o700).await?;

        for key in credential.keys() {
            validate_component(key)?;
            let path = dir.join(key);
            let value = credential.get(key).unwrap_or_default();
            fs::write(&path, value).await.map_err(|source| io_error(&path, source))?;
            restrict(&path, 0o600).await?;
        }

        debug!(scope = %scope, name = %name, path = %dir.display(), "Stored credential");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, scope: &str, name: &str) -> Result<Option<Credential>, CredentialError> {
        let dir = self.credential_dir(scope, name)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %dir.display(), "Credential directory not found");
                return Ok(None);
            }
            Err(source) => return Err(io_error(&dir, source)),
        };

        let mut credential = Credential::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&dir, source))?
        {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map_err(|source| io_error(&path, source))?
                .is_file();
            if !is_file {
                continue;
            }
            let Some(key) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let value = fs::read(&path).await.map_err(|source| io_error(&path, source))?;
            credential.insert(key, value);
        }

        Ok(Some(credential))
    }
}

fn validate_component(component: &str) -> Result<(), CredentialError> {
    let valid = !component.is_empty()
        && component != "."
        && component != ".."
        && !component.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(CredentialError::InvalidName(component.to_string()))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CredentialError {
    CredentialError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
async fn restrict(path: &Path, mode: u32) -> Result<(), CredentialError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|source| io_error(path, source))
}

#[cfg(not(unix))]
async fn restrict(_path: &Path, _mode: u32) -> Result<(), CredentialError> {
    Ok(())
}
