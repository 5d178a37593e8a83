//! Bundle packaging for directory deployments.
//!
//! [`BundlePackager`] turns a source directory into one zip archive:
//! source files (minus caches, virtualenvs and dotfiles), an optional
//! dependency closure installed into a staging directory, and a
//! `maestro.yaml` manifest. Archive members are unique and the source tree
//! always wins a path collision. A failed dependency install degrades to
//! shipping `requirements.txt` and is reported as a warning.

mod archive;
pub mod installer;
pub mod manifest;
pub mod requirements;
pub mod walk;

pub use installer::{DEFAULT_INSTALL_TIMEOUT, DependencyInstaller, InstallError, PipInstaller};
pub use manifest::BundleManifest;
pub use requirements::{Requirements, RequirementsSource};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{IoResultExt, MaestroError, Result};

use archive::ArchiveWriter;
use requirements::REQUIREMENTS_FILE;
use walk::STAGED_REQUIREMENTS_FILE;

pub const DEFAULT_ENTRYPOINT: &str = "main.py";
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_DESCRIPTION: &str = "Agent bundle";

/// File name of archives written to a fresh temporary directory.
pub const BUNDLE_FILE_NAME: &str = "agent_bundle.zip";

/// Options for one packaging run.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    output: Option<PathBuf>,
    install_dependencies: bool,
    include_requirements: bool,
    manifest: BundleManifest,
    staging_root: Option<PathBuf>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            output: None,
            install_dependencies: true,
            include_requirements: true,
            manifest: BundleManifest::default(),
            staging_root: None,
        }
    }
}

impl BundleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the archive here instead of a fresh temporary directory.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_install_dependencies(mut self, install: bool) -> Self {
        self.install_dependencies = install;
        self
    }

    /// Ship the discovered dependency listing as `requirements.txt` when
    /// dependencies are not installed.
    pub fn with_include_requirements(mut self, include: bool) -> Self {
        self.include_requirements = include;
        self
    }

    /// Manifest synthesized when the source tree has none.
    pub fn with_manifest(mut self, manifest: BundleManifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Parent directory for the dependency staging directory.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn install_dependencies(&self) -> bool {
        self.install_dependencies
    }
}

/// What happened to the declared dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyOutcome {
    /// Nothing declared.
    None,
    /// Listing shipped as `requirements.txt` (or already present in the source).
    Listed,
    /// Installed into the archive.
    Installed { files: usize },
    /// Install failed; the listing was shipped instead.
    Fallback { reason: String },
}

impl fmt::Display for DependencyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none declared"),
            Self::Listed => write!(f, "listed in {}", REQUIREMENTS_FILE),
            Self::Installed { files } => write!(f, "installed ({} files)", files),
            Self::Fallback { reason } => {
                write!(f, "listed in {} after install failure: {}", REQUIREMENTS_FILE, reason)
            }
        }
    }
}

/// Result of a packaging run.
#[derive(Debug, Clone)]
pub struct BundleReport {
    pub path: PathBuf,
    /// Archive member paths in write order.
    pub entries: Vec<String>,
    /// Discovered dependency lines.
    pub requirements: Vec<String>,
    pub dependencies: DependencyOutcome,
    /// Whether the manifest came from the source tree.
    pub manifest_preserved: bool,
    pub warnings: Vec<String>,
    /// blake3 over member names and contents.
    pub digest: String,
    owned_dir: Option<PathBuf>,
}

impl BundleReport {
    /// Remove the archive, and its temporary directory if the packager created one.
    pub fn cleanup(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "Failed to remove bundle");
        }
        if let Some(dir) = &self.owned_dir {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                tracing::debug!(path = %dir.display(), error = %e, "Failed to remove bundle dir");
            }
        }
    }
}

/// Builds bundle archives from source directories.
#[derive(Clone)]
pub struct BundlePackager {
    installer: Arc<dyn DependencyInstaller>,
}

impl fmt::Debug for BundlePackager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundlePackager").finish_non_exhaustive()
    }
}

impl Default for BundlePackager {
    fn default() -> Self {
        Self::new(Arc::new(PipInstaller::default()))
    }
}

impl BundlePackager {
    pub fn new(installer: Arc<dyn DependencyInstaller>) -> Self {
        Self { installer }
    }

    /// Package `source_dir` into a zip archive.
    ///
    /// On error the partially written archive is removed; the dependency
    /// staging directory is removed on every path.
    pub async fn package(&self, source_dir: &Path, options: &BundleOptions) -> Result<BundleReport> {
        if !source_dir.is_dir() {
            return Err(MaestroError::invalid_input(format!(
                "Source directory '{}' does not exist or is not a directory",
                source_dir.display()
            )));
        }

        let (output, owned_dir) = output_path(options)?;
        match self.assemble(source_dir, &output, options).await {
            Ok(mut report) => {
                report.owned_dir = owned_dir;
                tracing::info!(
                    path = %report.path.display(),
                    entries = report.entries.len(),
                    dependencies = %report.dependencies,
                    "Created bundle"
                );
                Ok(report)
            }
            Err(e) => {
                remove_partial(&output, owned_dir.as_deref());
                Err(e)
            }
        }
    }

    async fn assemble(
        &self,
        source_dir: &Path,
        output: &Path,
        options: &BundleOptions,
    ) -> Result<BundleReport> {
        // Dropped on every exit path, which removes the staging tree.
        let staging = if options.install_dependencies {
            Some(staging_dir(options)?)
        } else {
            None
        };

        let requirements = requirements::discover(source_dir)?;
        let mut archive = ArchiveWriter::create(output)?;
        // The archive itself may live inside the source tree, spelled differently.
        let output_real = output
            .canonicalize()
            .at_path("Failed to resolve bundle path", output)?;
        let mut manifest_preserved = false;
        for file in walk::source_files(source_dir)? {
            if is_same_file(&file.path, output, &output_real) {
                continue;
            }
            if archive.add_file(&file.archive_path, &file.path)? {
                manifest_preserved |= manifest::is_manifest(&file.archive_path);
            }
        }

        let mut warnings = Vec::new();
        let dependencies = match (&requirements, &staging) {
            (None, _) => DependencyOutcome::None,
            (Some(reqs), Some(staging)) => {
                match self.install_into(&mut archive, reqs, staging.path()).await? {
                    Ok(files) => DependencyOutcome::Installed { files },
                    Err(e) => {
                        let reason = e.to_string();
                        tracing::warn!(
                            error = %reason,
                            "Dependency installation failed, including {} instead",
                            REQUIREMENTS_FILE
                        );
                        warnings.push(format!(
                            "Dependency installation failed ({}); included {} instead",
                            reason, REQUIREMENTS_FILE
                        ));
                        archive.add_bytes(REQUIREMENTS_FILE, reqs.content().as_bytes())?;
                        DependencyOutcome::Fallback { reason }
                    }
                }
            }
            (Some(reqs), None) => {
                if options.include_requirements {
                    archive.add_bytes(REQUIREMENTS_FILE, reqs.content().as_bytes())?;
                }
                DependencyOutcome::Listed
            }
        };

        if !manifest_preserved {
            archive.add_bytes(manifest::MANIFEST_FILES[0], options.manifest.to_yaml()?.as_bytes())?;
        }

        let (entries, digest) = archive.finish()?;
        Ok(BundleReport {
            path: output.to_path_buf(),
            entries,
            requirements: requirements.map(|r| r.lines()).unwrap_or_default(),
            dependencies,
            manifest_preserved,
            warnings,
            digest,
            owned_dir: None,
        })
    }

    /// Install `reqs` into `staging` and add what landed there.
    ///
    /// The outer error is a fatal archive failure; the inner one is an
    /// install failure the caller degrades from.
    async fn install_into(
        &self,
        archive: &mut ArchiveWriter,
        reqs: &Requirements,
        staging: &Path,
    ) -> Result<std::result::Result<usize, InstallError>> {
        let req_file = staging.join(STAGED_REQUIREMENTS_FILE);
        if let Err(e) = std::fs::write(&req_file, reqs.content()) {
            return Ok(Err(InstallError::Io(e)));
        }
        if let Err(e) = self.installer.install(&req_file, staging).await {
            return Ok(Err(e));
        }

        let mut added = 0;
        for file in walk::staged_files(staging)? {
            if archive.add_file(&file.archive_path, &file.path)? {
                added += 1;
            }
        }
        tracing::info!(files = added, "Dependencies installed into bundle");
        Ok(Ok(added))
    }
}

fn output_path(options: &BundleOptions) -> Result<(PathBuf, Option<PathBuf>)> {
    if let Some(output) = &options.output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).at_path("Failed to create directory:", parent)?;
        }
        return Ok((output.clone(), None));
    }
    let dir = tempfile::Builder::new()
        .prefix("maestro_bundle_")
        .tempdir()
        .at_path("Failed to create bundle dir in", std::env::temp_dir())?
        .keep();
    Ok((dir.join(BUNDLE_FILE_NAME), Some(dir)))
}

fn is_same_file(candidate: &Path, output: &Path, output_real: &Path) -> bool {
    if candidate == output {
        return true;
    }
    if candidate.file_name() != output.file_name() {
        return false;
    }
    candidate
        .canonicalize()
        .is_ok_and(|real| real == output_real)
}

fn staging_dir(options: &BundleOptions) -> Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("maestro_deps_");
    match &options.staging_root {
        Some(root) => {
            std::fs::create_dir_all(root).at_path("Failed to create directory:", root)?;
            builder.tempdir_in(root).at_path("Failed to create staging dir in", root)
        }
        None => builder
            .tempdir()
            .at_path("Failed to create staging dir in", std::env::temp_dir()),
    }
}

/// Best-effort removal after a failed run; never masks the original error.
fn remove_partial(output: &Path, owned_dir: Option<&Path>) {
    if output.exists() {
        if let Err(e) = std::fs::remove_file(output) {
            tracing::warn!(path = %output.display(), error = %e, "Failed to remove partial bundle");
        }
    }
    if let Some(dir) = owned_dir {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to remove bundle dir");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct TimeoutInstaller;

    #[async_trait::async_trait]
    impl DependencyInstaller for TimeoutInstaller {
        async fn install(
            &self,
            _requirements: &Path,
            _target: &Path,
        ) -> std::result::Result<(), InstallError> {
            Err(InstallError::TimedOut(Duration::from_secs(900)))
        }
    }

    fn source_tree() -> TempDir {
        let temp = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp.path().join("main.py"), "print('hi')\n").unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests==2.31.0\n").unwrap();
        temp
    }

    #[tokio::test]
    async fn no_install_synthesizes_manifest() {
        let src = source_tree();
        let out = TempDir::new().expect("Failed to create temp dir");
        let options = BundleOptions::new()
            .with_install_dependencies(false)
            .with_output(out.path().join("b.zip"));

        let report = BundlePackager::default()
            .package(src.path(), &options)
            .await
            .unwrap();
        assert_eq!(report.entries, vec!["main.py", "requirements.txt", "maestro.yaml"]);
        assert_eq!(report.requirements, vec!["requests==2.31.0"]);
        assert_eq!(report.dependencies, DependencyOutcome::Listed);
        assert!(!report.manifest_preserved);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn fallback_is_reported() {
        let src = source_tree();
        fs::remove_file(src.path().join("requirements.txt")).unwrap();
        fs::write(
            src.path().join("pyproject.toml"),
            "[project]\ndependencies = [\"httpx\"]\n",
        )
        .unwrap();
        let out = TempDir::new().expect("Failed to create temp dir");
        let options = BundleOptions::new()
            .with_output(out.path().join("b.zip"))
            .with_staging_root(out.path().join("staging"));

        let report = BundlePackager::new(Arc::new(TimeoutInstaller))
            .package(src.path(), &options)
            .await
            .unwrap();
        assert!(report.entries.contains(&"requirements.txt".to_string()));
        assert!(matches!(report.dependencies, DependencyOutcome::Fallback { .. }));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("timed out"));
        assert_eq!(fs::read_dir(out.path().join("staging")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_source_dir_is_invalid_input() {
        let err = BundlePackager::default()
            .package(Path::new("/nonexistent/maestro-src"), &BundleOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn default_output_is_owned_temp_dir() {
        let src = source_tree();
        let options = BundleOptions::new().with_install_dependencies(false);
        let report = BundlePackager::default()
            .package(src.path(), &options)
            .await
            .unwrap();

        assert!(report.path.ends_with(BUNDLE_FILE_NAME));
        let dir = report.path.parent().unwrap().to_path_buf();
        assert!(
            dir.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("maestro_bundle_")
        );
        report.cleanup();
        assert!(!dir.exists());
    }
}
