//! End-to-end ingest scenarios against the public API.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use frameflow::ingest::index::AssetIndex;
use frameflow::{ContentHasher, IngestConfig, IntakeController, Manifest};

fn base_config(root: &TempDir) -> IngestConfig {
    let source_dir = root.path().join("media/videos");
    fs::create_dir_all(&source_dir).unwrap();
    IngestConfig {
        source_dir,
        target_dir: root.path().join("site/assets/videos"),
        manifest_path: root.path().join("state/manifest.json"),
        settle_ms: 10,
        poll_interval_secs: 1,
        ..Default::default()
    }
}

fn render(config: &IngestConfig, rel: &str, content: &[u8]) -> PathBuf {
    let path = config.source_dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn dest_files(config: &IngestConfig) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(&config.target_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn read_index(config: &IngestConfig) -> AssetIndex {
    let bytes = fs::read(config.target_dir.join(&config.index_filename)).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn single_render_scan_scenario() {
    let root = TempDir::new().unwrap();
    let config = base_config(&root);
    let payload = vec![0x42u8; 10 * 1024];
    let source = render(&config, "720p30/Intro.mp4", &payload);

    let controller = IntakeController::new(config.clone()).unwrap();
    let report = controller.scan_once().await.unwrap();
    assert_eq!(report.discovered, 1);
    assert_eq!(report.ingested, 1);

    // Destination holds exactly the published copy, its alias, and the index.
    let names = dest_files(&config);
    let published = names
        .iter()
        .find(|n| n.starts_with("Intro_720p30_") && n.ends_with(".mp4"))
        .expect("published asset present");
    assert!(names.contains(&"Intro_latest.mp4".to_string()));
    assert!(names.contains(&config.index_filename));
    assert_eq!(names.len(), 3);

    // Byte-identical copy.
    let copied = fs::read(config.target_dir.join(published)).unwrap();
    assert_eq!(copied, payload);

    // Alias points at the published asset.
    #[cfg(unix)]
    {
        let target = fs::read_link(config.target_dir.join("Intro_latest.mp4")).unwrap();
        assert_eq!(target, PathBuf::from(published));
    }

    // Manifest keyed by the absolute source path with the correct hash.
    let manifest = Manifest::new(&config.manifest_path).read();
    assert_eq!(manifest.len(), 1);
    let key = fs::canonicalize(&source).unwrap().to_string_lossy().into_owned();
    let entry = manifest.get(&key).expect("entry keyed by absolute source path");
    let expected = ContentHasher::default().fingerprint(&source).unwrap();
    assert_eq!(entry.content_hash, expected.hex);
    assert_eq!(entry.hash_algorithm, expected.algorithm);
    assert_eq!(entry.scene_name, "Intro");
    assert_eq!(entry.quality_label, "720p30");
    assert_eq!(entry.size_bytes, payload.len() as u64);

    // Index lists exactly the published asset.
    let index = read_index(&config);
    assert_eq!(index.count, 1);
    assert_eq!(index.videos[0].filename, *published);
    assert_eq!(index.videos[0].size, payload.len() as u64);
    assert_eq!(index.videos[0].path, format!("videos/{published}"));
}

#[tokio::test]
async fn rescan_without_changes_is_idempotent() {
    let root = TempDir::new().unwrap();
    let config = base_config(&root);
    render(&config, "720p30/Intro.mp4", b"stable content");

    let controller = IntakeController::new(config.clone()).unwrap();
    controller.scan_once().await.unwrap();
    let first_files = dest_files(&config);
    let first_manifest = Manifest::new(&config.manifest_path).read();

    let report = controller.scan_once().await.unwrap();
    assert_eq!(report.ingested, 0);
    assert_eq!(report.unchanged, 1);
    assert_eq!(dest_files(&config), first_files);
    assert_eq!(Manifest::new(&config.manifest_path).read(), first_manifest);
}

#[tokio::test]
async fn fresh_controller_instance_respects_existing_manifest() {
    let root = TempDir::new().unwrap();
    let config = base_config(&root);
    render(&config, "720p30/Intro.mp4", b"durable state");

    IntakeController::new(config.clone())
        .unwrap()
        .scan_once()
        .await
        .unwrap();

    // New process, same manifest: nothing to do.
    let report = IntakeController::new(config.clone())
        .unwrap()
        .scan_once()
        .await
        .unwrap();
    assert_eq!(report.ingested, 0);
    assert_eq!(report.unchanged, 1);
}

#[tokio::test]
async fn corrupt_manifest_recovers_and_reprocesses() {
    let root = TempDir::new().unwrap();
    let config = base_config(&root);
    render(&config, "720p30/Intro.mp4", b"render bytes");

    IntakeController::new(config.clone())
        .unwrap()
        .scan_once()
        .await
        .unwrap();

    fs::write(&config.manifest_path, b"\x00\x01 definitely not json").unwrap();

    // Reprocessing is wasteful but harmless: a second copy appears, the
    // manifest heals, and the corrupt document is quarantined.
    let report = IntakeController::new(config.clone())
        .unwrap()
        .scan_once()
        .await
        .unwrap();
    assert_eq!(report.ingested, 1);

    let manifest = Manifest::new(&config.manifest_path).read();
    assert_eq!(manifest.len(), 1);

    let quarantined = fs::read_dir(config.manifest_path.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().contains("corrupt"));
    assert!(quarantined);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_files_are_not_ingested() {
    let root = TempDir::new().unwrap();
    let config = base_config(&root);

    // A symlink inside the source tree pointing at a file outside it.
    let outside = TempDir::new().unwrap();
    let victim = outside.path().join("secret.mp4");
    fs::write(&victim, b"outside data").unwrap();
    let quality_dir = config.source_dir.join("720p30");
    fs::create_dir_all(&quality_dir).unwrap();
    std::os::unix::fs::symlink(&victim, quality_dir.join("Sneaky.mp4")).unwrap();

    let controller = IntakeController::new(config.clone()).unwrap();
    let report = controller.scan_once().await.unwrap();
    assert_eq!(report.ingested, 0);
    assert!(Manifest::new(&config.manifest_path).read().is_empty());
}

#[tokio::test]
async fn index_reflects_multiple_batches() {
    let root = TempDir::new().unwrap();
    let config = base_config(&root);
    render(&config, "720p30/A.mp4", b"aaa");

    let controller = IntakeController::new(config.clone()).unwrap();
    controller.scan_once().await.unwrap();
    assert_eq!(read_index(&config).count, 1);

    render(&config, "1080p60/B.mp4", b"bbb");
    controller.scan_once().await.unwrap();

    // Union of previously existing and newly copied assets.
    let index = read_index(&config);
    assert_eq!(index.count, 2);
    let mut filenames: Vec<_> = index.videos.iter().map(|v| v.filename.clone()).collect();
    filenames.sort();
    assert!(filenames[0].starts_with("A_720p30_"));
    assert!(filenames[1].starts_with("B_1080p60_"));
}
