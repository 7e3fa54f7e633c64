//! On-disk cache of synthesized audio, keyed by request fingerprint.
//!
//! One file per key, named `<hex-digest>.<ext>`. The in-memory index is only
//! a shortcut; on a miss the directory is probed, so entries written by an
//! earlier run are found without any startup scan.

mod key;

pub use key::{CacheKey, canonical_request};

use speech_client::{AudioBytes, audio};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Extension used for new entries.
const CANONICAL_EXT: &str = "pcm";

/// Extensions probed on a cold lookup, in order.
const PROBE_EXTS: &[&str] = &["pcm", "wav", "raw"];

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Could not determine a cache directory")]
    NoCacheDir,

    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt cache entry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Default cache location: `<data-local-dir>/readalong/synthesis-cache`.
pub fn default_cache_dir() -> Result<PathBuf, CacheError> {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join("readalong").join("synthesis-cache"))
        .ok_or(CacheError::NoCacheDir)
}

#[derive(Debug)]
pub struct SynthesisCache {
    dir: PathBuf,
    index: HashMap<CacheKey, PathBuf>,
}

impl SynthesisCache {
    /// Open (and create if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(Self {
            dir,
            index: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Audio stored under `key`, as PCM16 bytes.
    pub fn lookup(&mut self, key: &CacheKey) -> Result<Option<AudioBytes>, CacheError> {
        if let Some(path) = self.index.get(key).cloned() {
            match read_entry(&path)? {
                Some(bytes) => return Ok(Some(bytes)),
                // Deleted behind our back
                None => {
                    self.index.remove(key);
                }
            }
        }

        for ext in PROBE_EXTS {
            let path = self.entry_path(key, ext);
            if let Some(bytes) = read_entry(&path)? {
                self.index.insert(key.clone(), path);
                return Ok(Some(bytes));
            }
        }

        Ok(None)
    }

    /// Store audio under `key`. The file appears atomically.
    pub fn store(&mut self, key: &CacheKey, audio: &[u8]) -> Result<PathBuf, CacheError> {
        let path = self.entry_path(key, CANONICAL_EXT);

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        tmp.write_all(audio).map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;

        self.index.insert(key.clone(), path.clone());
        Ok(path)
    }

    /// Drop the entry for `key`, whatever its extension.
    pub fn remove(&mut self, key: &CacheKey) -> Result<(), CacheError> {
        self.index.remove(key);
        for ext in PROBE_EXTS {
            let path = self.entry_path(key, ext);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(&path, e)),
            }
        }
        Ok(())
    }

    /// Remove every entry. Returns how many files were deleted.
    pub fn clear(&mut self) -> Result<usize, CacheError> {
        self.index.clear();

        let mut removed = 0;
        let entries = fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&self.dir, e))?.path();
            if is_entry_file(&path) {
                fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    fn entry_path(&self, key: &CacheKey, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key.as_str(), ext))
    }
}

fn is_entry_file(path: &Path) -> bool {
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PROBE_EXTS.contains(&e));
    let stem_ok = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()));
    ext_ok && stem_ok
}

/// Read an entry, `None` if it does not exist. WAV entries are unwrapped.
fn read_entry(path: &Path) -> Result<Option<AudioBytes>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };

    if audio::is_wav(&bytes) {
        let (pcm, _rate) = audio::wav_to_pcm16(&bytes).map_err(|e| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        return Ok(Some(pcm));
    }

    if bytes.len() % 2 != 0 {
        return Err(CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("odd byte count {}", bytes.len()),
        });
    }

    Ok(Some(bytes))
}
