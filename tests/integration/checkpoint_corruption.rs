//! Corrupt checkpoints are surfaced, never silently replaced.

use crate::integration::test_utils::{plan, test_engine};
use genloom::error::EngineError;
use std::fs;
use tempfile::TempDir;

const PLAN: &str = r#"
name = "Fragile"
template = "fragile {x}"

[variables]
x = ["a", "b"]
"#;

#[test]
fn tampered_checkpoint_is_reported_and_kept() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});
    let session = engine.plan(&plan(PLAN), "fragile.toml").unwrap();
    let path = engine.checkpoints().save(&session).unwrap();

    // Change a prompt without updating the digest.
    let text = fs::read_to_string(&path).unwrap();
    fs::write(&path, text.replace("fragile a", "fragile z")).unwrap();

    match engine.prepare(&plan(PLAN), "fragile.toml", None, false) {
        Err(EngineError::CheckpointCorruption { session_id, .. }) => {
            assert_eq!(session_id, session.id)
        }
        other => panic!("expected corruption, got {:?}", other.map(|p| p.resumed)),
    }
    assert!(path.exists());

    let listed = engine.checkpoints().list().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].problem.is_some());
}

#[test]
fn truncated_checkpoint_is_corruption_not_missing() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});
    let session = engine.plan(&plan(PLAN), "fragile.toml").unwrap();
    let path = engine.checkpoints().save(&session).unwrap();
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(matches!(
        engine.load_session(&session.id),
        Err(EngineError::CheckpointCorruption { .. })
    ));
    assert!(matches!(
        engine.load_session("never-saved"),
        Err(EngineError::CheckpointNotFound(_))
    ));
}

#[test]
fn fresh_start_sets_corrupt_checkpoint_aside() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});
    let session = engine.plan(&plan(PLAN), "fragile.toml").unwrap();
    let path = engine.checkpoints().save(&session).unwrap();
    fs::write(&path, b"garbage").unwrap();

    let prepared = engine.prepare(&plan(PLAN), "fragile.toml", None, true).unwrap();
    assert!(!prepared.resumed);
    assert_eq!(prepared.session.jobs.len(), 2);
    assert!(!path.exists());
    assert_eq!(
        fs::read(path.with_extension("json.bak")).unwrap(),
        b"garbage".to_vec()
    );
}
