//! Document provider over a local directory of already-downloaded files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{CollaboratorError, Document, DocumentProvider};

const SERVICE: &str = "document provider";

/// Serves `<root>/<opportunity_ref>/*`, sorted by file name.
///
/// A missing opportunity directory yields an empty list; an unreadable root
/// is an outage.
#[derive(Debug, Clone)]
pub struct FilesystemDocumentProvider {
    root: PathBuf,
}

impl FilesystemDocumentProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn opportunity_dir(&self, opportunity_ref: &str) -> Result<PathBuf, CollaboratorError> {
        let is_plain = !opportunity_ref.is_empty()
            && Path::new(opportunity_ref)
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)))
            && !opportunity_ref.contains(['/', '\\']);
        if !is_plain {
            return Err(CollaboratorError::Rejected {
                service: SERVICE,
                status: 400,
                body: format!("invalid opportunity reference '{}'", opportunity_ref),
            });
        }
        Ok(self.root.join(opportunity_ref))
    }
}

async fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl DocumentProvider for FilesystemDocumentProvider {
    async fn documents(&self, opportunity_ref: &str) -> Result<Vec<Document>, CollaboratorError> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Err(CollaboratorError::Unavailable {
                service: SERVICE,
                reason: format!("document root '{}' is not accessible", self.root.display()),
            });
        }

        let dir = self.opportunity_dir(opportunity_ref)?;
        let files = match read_dir_sorted(&dir).await {
            Ok(files) => files,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No documents directory for {}", opportunity_ref);
                return Ok(Vec::new());
            }
            Err(e) => return Err(CollaboratorError::Io { path: dir, source: e }),
        };

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| CollaboratorError::Io {
                    path: path.clone(),
                    source: e,
                })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mime_type = mime_guess::from_path(&path)
                .first_or_octet_stream()
                .essence_str()
                .to_string();
            documents.push(Document {
                name,
                mime_type,
                bytes,
            });
        }

        log::debug!(
            "Loaded {} document(s) for {}",
            documents.len(),
            opportunity_ref
        );
        Ok(documents)
    }
}
