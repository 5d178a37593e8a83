//! De-duplicating zip writer.

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{IoResultExt, MaestroError, Result};

/// Writes unique archive members; the first writer of a path wins.
pub(crate) struct ArchiveWriter {
    path: PathBuf,
    zip: ZipWriter<File>,
    options: SimpleFileOptions,
    names: HashSet<String>,
    entries: Vec<String>,
    hasher: blake3::Hasher,
}

impl ArchiveWriter {
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).at_path("Failed to create bundle:", path)?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());
        Ok(Self {
            path: path.to_path_buf(),
            zip: ZipWriter::new(file),
            options,
            names: HashSet::new(),
            entries: Vec::new(),
            hasher: blake3::Hasher::new(),
        })
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Add `bytes` under `name`. Returns `false` if the name was taken.
    pub(crate) fn add_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<bool> {
        if self.contains(name) {
            return Ok(false);
        }
        self.zip
            .start_file(name, self.options)
            .map_err(|e| zip_error(&self.path, e))?;
        self.zip
            .write_all(bytes)
            .at_path("Failed to write bundle:", &self.path)?;

        self.hasher.update(name.as_bytes());
        self.hasher.update(&[0]);
        self.hasher.update(bytes);
        self.names.insert(name.to_string());
        self.entries.push(name.to_string());
        Ok(true)
    }

    /// Add the file at `source` under `name`. Returns `false` if the name was taken.
    pub(crate) fn add_file(&mut self, name: &str, source: &Path) -> Result<bool> {
        if self.contains(name) {
            return Ok(false);
        }
        let bytes = std::fs::read(source).at_path("Failed to read", source)?;
        self.add_bytes(name, &bytes)
    }

    /// Finalize the archive, returning member paths in write order and a content digest.
    pub(crate) fn finish(self) -> Result<(Vec<String>, String)> {
        let path = self.path;
        let mut file = self.zip.finish().map_err(|e| zip_error(&path, e))?;
        file.flush().at_path("Failed to flush bundle:", &path)?;
        Ok((self.entries, self.hasher.finalize().to_hex().to_string()))
    }
}

fn zip_error(path: &Path, e: zip::result::ZipError) -> MaestroError {
    MaestroError::io_at(
        "Failed to write bundle:",
        path,
        std::io::Error::other(e),
    )
}
