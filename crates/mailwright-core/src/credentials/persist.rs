use std::convert::Infallible;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use super::credential::Credential;

/// Durable home of the credential between process runs.
#[async_trait]
pub trait TokenStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn load_tokens(&self) -> Result<Option<Credential>, Self::Error>;

    async fn save_tokens(&self, credential: &Credential) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum TokenFileError {
    #[error("token file io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("token file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("token file writer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TokenFileError {
    /// True when the file exists but holds something other than a credential.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, TokenFileError::Json { .. })
    }
}

/// Stores the credential as a JSON document.
///
/// Writes land in a sibling temp file that is renamed over the target, so a
/// reader never observes a half-written token.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    type Error = TokenFileError;

    async fn load_tokens(&self) -> Result<Option<Credential>, Self::Error> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TokenFileError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| TokenFileError::Json {
                path: self.path.clone(),
                source,
            })
    }

    async fn save_tokens(&self, credential: &Credential) -> Result<(), Self::Error> {
        let serialized =
            serde_json::to_vec_pretty(credential).map_err(|source| TokenFileError::Json {
                path: self.path.clone(),
                source,
            })?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &serialized)).await?
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), TokenFileError> {
    let io_err = |source: io::Error| TokenFileError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(io_err)?;
    }
    temp.write_all(contents).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}

/// Keeps the credential in memory, recording every save.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    initial: Mutex<Option<Credential>>,
    saved: Mutex<Vec<Credential>>,
}

impl MemoryTokenStore {
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            initial: Mutex::new(Some(credential)),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub async fn saved(&self) -> Vec<Credential> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    type Error = Infallible;

    async fn load_tokens(&self) -> Result<Option<Credential>, Self::Error> {
        if let Some(latest) = self.saved.lock().await.last() {
            return Ok(Some(latest.clone()));
        }
        Ok(self.initial.lock().await.clone())
    }

    async fn save_tokens(&self, credential: &Credential) -> Result<(), Self::Error> {
        self.saved.lock().await.push(credential.clone());
        Ok(())
    }
}
