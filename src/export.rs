//! Handing the mesh to the web viewer

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Copy `glb` to `target`, creating parent directories.
pub fn copy_public(glb: &Path, target: &Path) -> Result<PathBuf> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(from = %glb.display(), to = %target.display(), "[export] copy GLB");
    std::fs::copy(glb, target)?;
    Ok(target.to_path_buf())
}

/// A viewer build bundled with one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedViewer {
    pub dir: PathBuf,
    pub glb: PathBuf,
    pub hint_file: PathBuf,
}

/// Instructions written next to a packaged viewer.
pub fn viewer_hint(model_name: &str) -> String {
    format!(
        "Open index.html with query: index.html?model=./models/{name}\n\
         Example (python): python -m http.server 8000\n\
         Then open http://localhost:8000/index.html?model=./models/{name}\n",
        name = model_name
    )
}

/// Copy the viewer build in `dist_dir` into `output_dir`, place the mesh at
/// `models/<model_name>` and write `viewer-url.txt`.
///
/// Existing files in `output_dir` are overwritten, others are kept.
pub fn package_viewer(
    glb: &Path,
    output_dir: &Path,
    dist_dir: &Path,
    model_name: &str,
) -> Result<PackagedViewer> {
    if !glb.is_file() {
        return Err(Error::InvalidInput(format!("GLB not found: {}", glb.display())));
    }
    if !dist_dir.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Viewer build not found: {}. Build the viewer first.",
            dist_dir.display()
        )));
    }
    std::fs::create_dir_all(output_dir)?;

    tracing::info!(
        from = %dist_dir.display(),
        to = %output_dir.display(),
        "[package] copy viewer assets"
    );
    let mut copied = 0usize;
    for entry in WalkDir::new(dist_dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            Error::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, msg)),
            )
        })?;
        let relative = entry
            .path()
            .strip_prefix(dist_dir)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let target = output_dir.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    tracing::debug!(files = copied, "viewer assets copied");

    let target_glb = output_dir.join("models").join(model_name);
    tracing::info!(to = %target_glb.display(), "[package] copy model");
    copy_public(glb, &target_glb)?;

    let hint_file = output_dir.join("viewer-url.txt");
    std::fs::write(&hint_file, viewer_hint(model_name))?;

    Ok(PackagedViewer {
        dir: output_dir.to_path_buf(),
        glb: target_glb,
        hint_file,
    })
}
