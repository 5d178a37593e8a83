//! Packaging with paths relative to the working directory, as `maestro bundle .`
//! does. Kept in its own test binary because it changes the process cwd.

use std::fs;
use std::path::Path;

use maestro_core::bundle::{BundleOptions, BundlePackager};
use tempfile::TempDir;

#[tokio::test]
async fn relative_output_inside_relative_source_is_not_archived() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp.path().join("main.py"), "print('hi')\n").unwrap();
    std::env::set_current_dir(temp.path()).unwrap();

    let report = BundlePackager::default()
        .package(
            Path::new("."),
            &BundleOptions::new()
                .with_install_dependencies(false)
                .with_output("agent.zip"),
        )
        .await
        .unwrap();

    assert_eq!(report.entries, vec!["main.py", "maestro.yaml"]);
    assert!(temp.path().join("agent.zip").is_file());
}
