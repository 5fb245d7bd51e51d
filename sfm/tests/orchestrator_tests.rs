use recon_runtime::{CommandRunner, StageCommand, WorkspaceLayout};
use recon_sfm::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Stands in for the COLMAP executable: records each call and leaves the
/// declared outputs of the stage behind.
struct FakeColmap {
    images: PathBuf,
    layout: WorkspaceLayout,
    fail_stage: Option<(&'static str, i32)>,
    skip_outputs_of: Option<&'static str>,
    calls: Mutex<Vec<StageCommand>>,
}

impl FakeColmap {
    fn new(images: &Path, layout: &WorkspaceLayout) -> Self {
        Self {
            images: images.to_path_buf(),
            layout: layout.clone(),
            fail_stage: None,
            skip_outputs_of: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn stages(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.args[0].clone())
            .collect()
    }
}

impl CommandRunner for FakeColmap {
    fn run(&self, stage: &str, command: &StageCommand) -> recon_runtime::Result<()> {
        self.calls.lock().unwrap().push(command.clone());
        if let Some((name, code)) = self.fail_stage {
            if name == stage {
                return Err(recon_runtime::Error::StageFailed {
                    stage: stage.to_string(),
                    command: command.to_string(),
                    status: Some(code),
                });
            }
        }
        if self.skip_outputs_of == Some(stage) {
            return Ok(());
        }
        let spec = COLMAP_STAGES.iter().find(|s| s.name == stage).unwrap();
        for path in spec.output_paths(&self.images, &self.layout) {
            if path.extension().is_some() {
                std::fs::write(&path, b"ply\n").unwrap();
            } else {
                std::fs::create_dir_all(&path).unwrap();
            }
        }
        Ok(())
    }
}

fn setup() -> (tempfile::TempDir, PathBuf, WorkspaceLayout) {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir(&images).unwrap();
    for i in 0..3 {
        std::fs::write(images.join(format!("IMG_{:04}.JPG", i)), vec![0u8; 16 + i]).unwrap();
    }
    let layout = WorkspaceLayout::ensure(dir.path().join("ws")).unwrap();
    (dir, images, layout)
}

const ALL_STAGES: [&str; 6] = [
    "feature_extractor",
    "exhaustive_matcher",
    "mapper",
    "image_undistorter",
    "patch_match_stereo",
    "stereo_fusion",
];

#[test]
fn test_full_run_invokes_six_stages_in_order() {
    let (_dir, images, layout) = setup();
    let fake = FakeColmap::new(&images, &layout);

    let outcome = SfmOrchestrator::default()
        .run(&images, &layout, &fake)
        .unwrap();

    assert!(!outcome.reused);
    assert_eq!(outcome.fused_cloud, layout.fused_cloud_path());
    assert_eq!(fake.stages(), ALL_STAGES);
    assert_eq!(outcome.commands, *fake.calls.lock().unwrap());
    assert!(CacheKey::sidecar(&outcome.fused_cloud).exists());

    let calls = fake.calls.lock().unwrap();
    let db = layout.database_path().display().to_string();
    let dense = layout.dense_dir().display().to_string();
    assert_eq!(calls[0].program, "colmap");
    assert_eq!(
        calls[0].args,
        vec![
            "feature_extractor".to_string(),
            "--database_path".to_string(),
            db.clone(),
            "--image_path".to_string(),
            images.display().to_string(),
        ]
    );
    assert_eq!(
        calls[1].args,
        vec!["exhaustive_matcher".to_string(), "--database_path".to_string(), db]
    );
    assert_eq!(
        calls[3].args[4],
        layout.sparse_dir().join("0").display().to_string()
    );
    assert_eq!(
        calls[5].args.last().unwrap(),
        &layout.fused_cloud_path().display().to_string()
    );
    assert!(calls[4].args.contains(&dense));
}

#[test]
fn test_presence_reuse_skips_engine() {
    let (_dir, images, layout) = setup();
    std::fs::write(layout.fused_cloud_path(), b"ply\n").unwrap();
    let fake = FakeColmap::new(&images, &layout);

    let outcome = SfmOrchestrator::new("colmap", ReusePolicy::Presence)
        .run(&images, &layout, &fake)
        .unwrap();
    assert!(outcome.reused);
    assert!(outcome.commands.is_empty());
    assert!(fake.stages().is_empty());
}

#[test]
fn test_without_reuse_existing_cloud_is_rebuilt() {
    let (_dir, images, layout) = setup();
    std::fs::write(layout.fused_cloud_path(), b"old").unwrap();
    let fake = FakeColmap::new(&images, &layout);

    let outcome = SfmOrchestrator::default()
        .run(&images, &layout, &fake)
        .unwrap();
    assert!(!outcome.reused);
    assert_eq!(fake.stages().len(), 6);
}

#[test]
fn test_fingerprint_reuse_tracks_inputs() {
    let (_dir, images, layout) = setup();
    let strict = SfmOrchestrator::new("colmap", ReusePolicy::Fingerprint);

    let first = FakeColmap::new(&images, &layout);
    strict.run(&images, &layout, &first).unwrap();
    assert_eq!(first.stages().len(), 6);

    let second = FakeColmap::new(&images, &layout);
    assert!(strict.run(&images, &layout, &second).unwrap().reused);
    assert!(second.stages().is_empty());

    std::fs::write(images.join("IMG_9999.png"), b"new view").unwrap();
    let third = FakeColmap::new(&images, &layout);
    assert!(!strict.run(&images, &layout, &third).unwrap().reused);
    assert_eq!(third.stages().len(), 6);

    // Presence reuse ignores the changed key.
    std::fs::write(images.join("IMG_9998.png"), b"another").unwrap();
    let fourth = FakeColmap::new(&images, &layout);
    let lenient = SfmOrchestrator::new("colmap", ReusePolicy::Presence);
    assert!(lenient.run(&images, &layout, &fourth).unwrap().reused);
}

#[test]
fn test_stage_failure_aborts_remaining_stages() {
    let (_dir, images, layout) = setup();
    let mut fake = FakeColmap::new(&images, &layout);
    fake.fail_stage = Some(("mapper", 3));

    let err = SfmOrchestrator::default()
        .run(&images, &layout, &fake)
        .unwrap_err();
    match &err {
        Error::Stage(inner) => {
            assert_eq!(inner.exit_status(), Some(3));
            assert_eq!(inner.stage(), Some("mapper"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(fake.stages(), ALL_STAGES[..3]);
    assert!(!layout.fused_cloud_path().exists());
}

#[test]
fn test_stage_without_output_is_an_error() {
    let (_dir, images, layout) = setup();
    let mut fake = FakeColmap::new(&images, &layout);
    fake.skip_outputs_of = Some("stereo_fusion");

    let err = SfmOrchestrator::default()
        .run(&images, &layout, &fake)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Stage(recon_runtime::Error::MissingOutput { .. })
    ));
}

#[test]
fn test_bad_image_folder_runs_nothing() {
    let (dir, _images, layout) = setup();
    let empty = dir.path().join("empty");
    std::fs::create_dir(&empty).unwrap();
    let fake = FakeColmap::new(&empty, &layout);

    let err = SfmOrchestrator::default()
        .run(&empty, &layout, &fake)
        .unwrap_err();
    assert!(matches!(err, Error::NoImages(_)));

    let err = SfmOrchestrator::default()
        .run(&dir.path().join("missing"), &layout, &fake)
        .unwrap_err();
    assert!(matches!(err, Error::ImagesNotFound(_)));
    assert!(fake.stages().is_empty());
}

#[test]
fn test_caller_key_survives_rewritten_images() {
    let (dir, images, layout) = setup();
    let clip = dir.path().join("clip.mp4");
    std::fs::write(&clip, b"video bytes").unwrap();
    let strict = SfmOrchestrator::new("colmap", ReusePolicy::Fingerprint);
    let key = strict.cache_key(&InputFingerprint::Video {
        file: describe_file(&clip).unwrap(),
        sampling: "fps=2".into(),
    });

    let first = FakeColmap::new(&images, &layout);
    strict.run_keyed(&images, key.clone(), &layout, &first).unwrap();
    assert_eq!(first.stages().len(), 6);
    assert!(strict.reusable(&layout, &key).is_some());

    // Same frames written again: different mtimes, same supplied key.
    std::thread::sleep(std::time::Duration::from_millis(20));
    for i in 0..3 {
        std::fs::write(images.join(format!("IMG_{:04}.JPG", i)), vec![0u8; 16 + i]).unwrap();
    }
    let second = FakeColmap::new(&images, &layout);
    let outcome = strict.run_keyed(&images, key.clone(), &layout, &second).unwrap();
    assert!(outcome.reused);
    assert_eq!(outcome.cache_key, key);
    assert!(second.stages().is_empty());

    let resampled = strict.cache_key(&InputFingerprint::Video {
        file: describe_file(&clip).unwrap(),
        sampling: "fps=1".into(),
    });
    assert!(strict.reusable(&layout, &resampled).is_none());
}
