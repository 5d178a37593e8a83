//! Source and staging tree walks.
//!
//! Both walks are sorted by file name so the same tree always yields the
//! same member order.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{MaestroError, Result};

/// Directories never shipped in a bundle.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    ".pytest_cache",
    "node_modules",
    ".venv",
    "venv",
];

/// Dotfiles that are shipped anyway.
pub const ALLOWED_DOTFILES: &[&str] = &[".env.example"];

/// Compiled Python artifacts.
const COMPILED_EXTENSIONS: &[&str] = &["pyc", "pyo", "pyd"];

/// Suffixes of installer metadata directories.
const INSTALLER_METADATA_SUFFIXES: &[&str] = &[".dist-info", ".egg-info"];

/// Requirements file written into the staging directory for the installer.
pub const STAGED_REQUIREMENTS_FILE: &str = "temp_requirements.txt";

/// A file to add, keyed by its archive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    pub archive_path: String,
    pub path: PathBuf,
}

/// Files of a source tree that belong in a bundle.
pub fn source_files(root: &Path) -> Result<Vec<TreeFile>> {
    collect(root, |entry| {
        !(entry.file_type().is_dir() && EXCLUDED_DIRS.contains(&file_name(entry)))
    })
    .map(|files| {
        files
            .into_iter()
            .filter(|file| {
                let name = file.archive_path.rsplit('/').next().unwrap_or_default();
                (!name.starts_with('.') || ALLOWED_DOTFILES.contains(&name)) && !is_compiled(name)
            })
            .collect()
    })
}

/// Files a dependency install produced, minus installer metadata.
pub fn staged_files(root: &Path) -> Result<Vec<TreeFile>> {
    collect(root, |entry| {
        if !entry.file_type().is_dir() {
            return true;
        }
        let name = file_name(entry);
        name != "__pycache__"
            && !INSTALLER_METADATA_SUFFIXES
                .iter()
                .any(|suffix| name.ends_with(suffix))
    })
    .map(|files| {
        files
            .into_iter()
            .filter(|file| {
                let name = file.archive_path.rsplit('/').next().unwrap_or_default();
                file.archive_path != STAGED_REQUIREMENTS_FILE && !is_compiled(name)
            })
            .collect()
    })
}

fn collect<P>(root: &Path, keep: P) -> Result<Vec<TreeFile>>
where
    P: FnMut(&DirEntry) -> bool,
{
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep);

    for entry in walker {
        let entry = entry.map_err(|e| {
            let context = format!("Failed to walk {}", root.display());
            MaestroError::io(context, std::io::Error::from(e))
        })?;
        // Symlinked directories are not descended into, matching a plain walk.
        if entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir()) {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push(TreeFile {
            archive_path: archive_path(relative),
            path: entry.path().to_path_buf(),
        });
    }

    Ok(files)
}

/// Forward-slash archive path for a relative filesystem path.
pub fn archive_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn file_name(entry: &DirEntry) -> &str {
    entry.file_name().to_str().unwrap_or_default()
}

fn is_compiled(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| COMPILED_EXTENSIONS.contains(&e))
}
