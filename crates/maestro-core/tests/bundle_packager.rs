use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use maestro_core::bundle::{
    BundleManifest, BundleOptions, BundlePackager, DependencyInstaller, DependencyOutcome,
    InstallError,
};
use tempfile::TempDir;

/// Writes a fixed set of files into the target, like a successful pip run.
struct FakeInstaller;

#[async_trait]
impl DependencyInstaller for FakeInstaller {
    async fn install(&self, requirements: &Path, target: &Path) -> Result<(), InstallError> {
        assert!(requirements.is_file());
        fs::write(target.join("main.py"), "shadowed = True\n")?;
        fs::create_dir_all(target.join("requests"))?;
        fs::write(target.join("requests").join("__init__.py"), "VERSION = '2.31.0'\n")?;
        fs::create_dir_all(target.join("requests-2.31.0.dist-info"))?;
        fs::write(target.join("requests-2.31.0.dist-info").join("RECORD"), "x")?;
        fs::create_dir_all(target.join("bin"))?;
        fs::write(target.join("bin").join("normalizer"), "#!/bin/sh\n")?;
        Ok(())
    }
}

struct TimeoutInstaller;

#[async_trait]
impl DependencyInstaller for TimeoutInstaller {
    async fn install(&self, _requirements: &Path, _target: &Path) -> Result<(), InstallError> {
        Err(InstallError::TimedOut(Duration::from_secs(900)))
    }
}

fn source_tree() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let root = temp.path();
    fs::write(root.join("main.py"), "print('hi')\n").unwrap();
    fs::write(root.join("requirements.txt"), "# pinned\nrequests==2.31.0\n").unwrap();
    fs::write(root.join(".env"), "SECRET=1\n").unwrap();
    fs::write(root.join(".env.example"), "SECRET=\n").unwrap();
    for dir in ["venv", ".git", "node_modules", "__pycache__"] {
        fs::create_dir_all(root.join(dir)).unwrap();
        fs::write(root.join(dir).join("junk.py"), "x").unwrap();
    }
    fs::create_dir_all(root.join("pkg")).unwrap();
    fs::write(root.join("pkg").join("tool.py"), "def f(): pass\n").unwrap();
    fs::write(root.join("pkg").join("tool.pyc"), "x").unwrap();
    temp
}

fn read_member(archive: &Path, name: &str) -> String {
    let file = fs::File::open(archive).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let mut member = zip.by_name(name).unwrap();
    let mut out = String::new();
    member.read_to_string(&mut out).unwrap();
    out
}

fn unique(entries: &[String]) -> bool {
    let mut sorted = entries.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted.len() == entries.len()
}

#[tokio::test]
async fn source_filters_apply() {
    let src = source_tree();
    let out = TempDir::new().expect("Failed to create temp dir");
    let options = BundleOptions::new()
        .with_install_dependencies(false)
        .with_output(out.path().join("bundle.zip"));

    let report = BundlePackager::default()
        .package(src.path(), &options)
        .await
        .unwrap();

    assert_eq!(
        report.entries,
        vec![
            ".env.example",
            "main.py",
            "pkg/tool.py",
            "requirements.txt",
            "maestro.yaml"
        ]
    );
    assert!(out.path().join("bundle.zip").is_file());
}

#[tokio::test]
async fn packaging_is_deterministic() {
    let src = source_tree();
    let out = TempDir::new().expect("Failed to create temp dir");
    let packager = BundlePackager::new(Arc::new(FakeInstaller));
    let first = packager
        .package(src.path(), &BundleOptions::new().with_output(out.path().join("a.zip")))
        .await
        .unwrap();
    let second = packager
        .package(src.path(), &BundleOptions::new().with_output(out.path().join("b.zip")))
        .await
        .unwrap();

    assert_eq!(first.entries, second.entries);
    assert_eq!(first.digest, second.digest);
}

#[tokio::test]
async fn source_wins_over_installed_files() {
    let src = source_tree();
    let out = TempDir::new().expect("Failed to create temp dir");
    let archive = out.path().join("bundle.zip");

    let report = BundlePackager::new(Arc::new(FakeInstaller))
        .package(
            src.path(),
            &BundleOptions::new()
                .with_output(&archive)
                .with_staging_root(out.path().join("staging")),
        )
        .await
        .unwrap();

    assert!(unique(&report.entries));
    assert!(report.entries.contains(&"requests/__init__.py".to_string()));
    assert!(report.entries.contains(&"bin/normalizer".to_string()));
    assert!(!report.entries.iter().any(|e| e.contains(".dist-info")));
    assert!(!report.entries.iter().any(|e| e.ends_with("temp_requirements.txt")));
    assert_eq!(read_member(&archive, "main.py"), "print('hi')\n");
    assert_eq!(report.dependencies, DependencyOutcome::Installed { files: 2 });
    assert_eq!(report.requirements, vec!["requests==2.31.0"]);
    assert_eq!(fs::read_dir(out.path().join("staging")).unwrap().count(), 0);
}

#[tokio::test]
async fn install_timeout_falls_back_to_listing() {
    let src = source_tree();
    fs::remove_file(src.path().join("requirements.txt")).unwrap();
    fs::write(
        src.path().join("pyproject.toml"),
        "[project]\nname = \"demo\"\ndependencies = [\"httpx>=0.27\", \"rich\"]\n",
    )
    .unwrap();
    let out = TempDir::new().expect("Failed to create temp dir");
    let archive = out.path().join("bundle.zip");

    let report = BundlePackager::new(Arc::new(TimeoutInstaller))
        .package(src.path(), &BundleOptions::new().with_output(&archive))
        .await
        .unwrap();

    assert!(matches!(report.dependencies, DependencyOutcome::Fallback { .. }));
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(read_member(&archive, "requirements.txt"), "httpx>=0.27\nrich");
    assert!(report.entries.contains(&"pyproject.toml".to_string()));
}

#[tokio::test]
async fn shipped_manifest_is_kept_verbatim() {
    let src = source_tree();
    let manifest = "# hand written\nentrypoint: pkg/tool.py\nversion: 3.1.0\n";
    fs::write(src.path().join("maestro.yaml"), manifest).unwrap();
    let out = TempDir::new().expect("Failed to create temp dir");
    let archive = out.path().join("bundle.zip");

    let report = BundlePackager::default()
        .package(
            src.path(),
            &BundleOptions::new()
                .with_install_dependencies(false)
                .with_output(&archive)
                .with_manifest(BundleManifest::default().with_entrypoint("other.py")),
        )
        .await
        .unwrap();

    assert!(report.manifest_preserved);
    assert_eq!(
        report.entries.iter().filter(|e| e.as_str() == "maestro.yaml").count(),
        1
    );
    assert_eq!(read_member(&archive, "maestro.yaml"), manifest);
}

#[tokio::test]
async fn synthesized_manifest_uses_options() {
    let src = source_tree();
    let out = TempDir::new().expect("Failed to create temp dir");
    let archive = out.path().join("bundle.zip");

    BundlePackager::default()
        .package(
            src.path(),
            &BundleOptions::new()
                .with_install_dependencies(false)
                .with_include_requirements(false)
                .with_output(&archive)
                .with_manifest(
                    BundleManifest::default()
                        .with_entrypoint("pkg/tool.py")
                        .with_version("0.2.0"),
                ),
        )
        .await
        .unwrap();

    let parsed: BundleManifest =
        serde_yaml::from_str(&read_member(&archive, "maestro.yaml")).unwrap();
    assert_eq!(parsed.entrypoint, "pkg/tool.py");
    assert_eq!(parsed.version, "0.2.0");
}

#[tokio::test]
async fn output_inside_source_is_not_archived() {
    let src = source_tree();
    let archive = src.path().join("dist").join("bundle.zip");

    let report = BundlePackager::default()
        .package(
            src.path(),
            &BundleOptions::new()
                .with_install_dependencies(false)
                .with_output(&archive),
        )
        .await
        .unwrap();

    assert!(archive.is_file());
    assert!(!report.entries.iter().any(|e| e.ends_with("bundle.zip")));
}

#[cfg(unix)]
#[tokio::test]
async fn failure_removes_partial_output_and_staging() {
    let src = source_tree();
    std::os::unix::fs::symlink(src.path().join("missing.py"), src.path().join("zz_broken.py"))
        .unwrap();
    let out = TempDir::new().expect("Failed to create temp dir");
    let archive = out.path().join("bundle.zip");
    let staging = out.path().join("staging");

    let result = BundlePackager::new(Arc::new(FakeInstaller))
        .package(
            src.path(),
            &BundleOptions::new()
                .with_output(&archive)
                .with_staging_root(&staging),
        )
        .await;

    assert!(result.is_err());
    assert!(!archive.exists());
    assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
}

#[tokio::test]
async fn output_spelled_differently_is_not_archived() {
    let src = source_tree();
    let source_dir = src.path().join(".");
    let archive = src.path().join("dist").join("..").join("agent.zip");

    let report = BundlePackager::default()
        .package(
            &source_dir,
            &BundleOptions::new()
                .with_install_dependencies(false)
                .with_output(&archive),
        )
        .await
        .unwrap();

    assert!(src.path().join("agent.zip").is_file());
    assert!(!report.entries.iter().any(|e| e.ends_with("agent.zip")));
}
