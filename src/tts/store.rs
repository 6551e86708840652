//! On-disk storage for synthesized audio

use std::path::{Path, PathBuf};

use super::AudioArtifact;
use crate::{Error, Result};

const PARTIAL_SUFFIX: &str = ".part";

/// Directory of write-once audio artifacts
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    /// Open a store rooted at `dir`, creating it if needed.
    ///
    /// Partial files left by interrupted writes are removed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or listed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut swept = 0usize;
        for entry in std::fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            let partial = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(PARTIAL_SUFFIX));
            if !partial {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => swept += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove partial audio");
                }
            }
        }

        tracing::debug!(path = %dir.display(), swept, "audio store ready");
        Ok(Self { dir })
    }

    /// Directory artifacts are written to
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a new artifact under a fresh `reply_<uuid>.wav` name.
    ///
    /// Bytes land in a `.part` file first and are renamed into place.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub async fn write(&self, bytes: &[u8]) -> Result<AudioArtifact> {
        let filename = format!("reply_{}.wav", uuid::Uuid::new_v4().simple());
        let path = self.dir.join(&filename);
        let partial = self.dir.join(format!("{filename}{PARTIAL_SUFFIX}"));

        if let Err(e) = tokio::fs::write(&partial, bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        tokio::fs::rename(&partial, &path).await?;

        Ok(AudioArtifact { filename, path })
    }

    /// Read an artifact by file name
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown, partial or path-like names
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.resolve(filename).ok_or_else(|| Error::NotFound(filename.to_string()))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(filename.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal
    pub async fn remove(&self, artifact: &AudioArtifact) {
        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            tracing::debug!(file = %artifact.filename, error = %e, "failed to remove audio artifact");
        }
    }

    /// Map a served file name to a path inside the store
    fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let valid = !filename.is_empty()
            && !filename.starts_with('.')
            && !filename.ends_with(PARTIAL_SUFFIX)
            && filename
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        valid.then(|| self.dir.join(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();

        let artifact = store.write(b"RIFF").await.unwrap();
        assert!(artifact.filename.starts_with("reply_"));
        assert!(artifact.filename.ends_with(".wav"));
        assert_eq!(store.read(&artifact.filename).await.unwrap(), b"RIFF");

        // Nothing partial is left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn open_sweeps_interrupted_writes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("reply_old.wav.part"), "half").unwrap();
        std::fs::write(dir.path().join("reply_done.wav"), "RIFF").unwrap();

        let store = AudioStore::open(dir.path()).unwrap();

        assert!(!store.dir().join("reply_old.wav.part").exists());
        assert!(store.dir().join("reply_done.wav").exists());
    }

    #[tokio::test]
    async fn names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let a = store.write(b"a").await.unwrap();
        let b = store.write(b"b").await.unwrap();
        assert_ne!(a.filename, b.filename);
    }

    #[tokio::test]
    async fn rejects_traversal_and_partial_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path().join("tts")).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "x").unwrap();
        std::fs::write(store.dir().join("reply_x.wav.part"), "x").unwrap();

        for name in ["../secret.txt", "..", "", ".hidden", "a/b.wav", "reply_x.wav.part"] {
            assert!(matches!(store.read(name).await, Err(Error::NotFound(_))), "{name}");
        }
    }

    #[tokio::test]
    async fn remove_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let artifact = store.write(b"x").await.unwrap();

        store.remove(&artifact).await;
        assert!(!artifact.path.exists());
        // Second removal is silently ignored
        store.remove(&artifact).await;
    }
}
