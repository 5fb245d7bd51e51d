//! COLMAP stage templates
//!
//! Each stage is described once as an argument template over named
//! workspace slots. The same template renders the command line, declares
//! the files the stage reads and writes, and feeds the cache key.

use recon_runtime::{StageCommand, StageNode, WorkspaceLayout};
use std::path::{Path, PathBuf};

/// Workspace locations referenced by the templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Images,
    Database,
    Sparse,
    SparseModel,
    Dense,
    DenseStereo,
    FusedCloud,
}

impl Slot {
    fn placeholder(self) -> &'static str {
        match self {
            Slot::Images => "{images}",
            Slot::Database => "{database}",
            Slot::Sparse => "{sparse}",
            Slot::SparseModel => "{sparse}/0",
            Slot::Dense => "{dense}",
            Slot::DenseStereo => "{dense}/stereo",
            Slot::FusedCloud => "{dense}/fused.ply",
        }
    }

    fn resolve(self, images: &Path, layout: &WorkspaceLayout) -> PathBuf {
        match self {
            Slot::Images => images.to_path_buf(),
            Slot::Database => layout.database_path(),
            Slot::Sparse => layout.sparse_dir(),
            Slot::SparseModel => layout.sparse_dir().join("0"),
            Slot::Dense => layout.dense_dir(),
            Slot::DenseStereo => layout.dense_dir().join("stereo"),
            Slot::FusedCloud => layout.fused_cloud_path(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Arg {
    Lit(&'static str),
    Path(Slot),
}

use Arg::{Lit, Path as P};

#[derive(Debug, Clone, Copy)]
pub struct ColmapStage {
    pub name: &'static str,
    pub args: &'static [Arg],
    pub inputs: &'static [Slot],
    pub outputs: &'static [Slot],
}

/// The six sparse-to-dense stages, in execution order.
pub const COLMAP_STAGES: [ColmapStage; 6] = [
    ColmapStage {
        name: "feature_extractor",
        args: &[
            Lit("feature_extractor"),
            Lit("--database_path"),
            P(Slot::Database),
            Lit("--image_path"),
            P(Slot::Images),
        ],
        inputs: &[Slot::Images],
        outputs: &[Slot::Database],
    },
    ColmapStage {
        name: "exhaustive_matcher",
        args: &[
            Lit("exhaustive_matcher"),
            Lit("--database_path"),
            P(Slot::Database),
        ],
        inputs: &[Slot::Database],
        outputs: &[Slot::Database],
    },
    ColmapStage {
        name: "mapper",
        args: &[
            Lit("mapper"),
            Lit("--database_path"),
            P(Slot::Database),
            Lit("--image_path"),
            P(Slot::Images),
            Lit("--output_path"),
            P(Slot::Sparse),
        ],
        inputs: &[Slot::Database, Slot::Images],
        outputs: &[Slot::SparseModel],
    },
    ColmapStage {
        name: "image_undistorter",
        args: &[
            Lit("image_undistorter"),
            Lit("--image_path"),
            P(Slot::Images),
            Lit("--input_path"),
            P(Slot::SparseModel),
            Lit("--output_path"),
            P(Slot::Dense),
        ],
        inputs: &[Slot::Images, Slot::SparseModel],
        outputs: &[Slot::DenseStereo],
    },
    ColmapStage {
        name: "patch_match_stereo",
        args: &[
            Lit("patch_match_stereo"),
            Lit("--workspace_path"),
            P(Slot::Dense),
            Lit("--workspace_format"),
            Lit("COLMAP"),
            Lit("--PatchMatchStereo.geom_consistency"),
            Lit("true"),
        ],
        inputs: &[Slot::DenseStereo],
        outputs: &[Slot::DenseStereo],
    },
    ColmapStage {
        name: "stereo_fusion",
        args: &[
            Lit("stereo_fusion"),
            Lit("--workspace_path"),
            P(Slot::Dense),
            Lit("--workspace_format"),
            Lit("COLMAP"),
            Lit("--input_type"),
            Lit("geometric"),
            Lit("--output_path"),
            P(Slot::FusedCloud),
        ],
        inputs: &[Slot::DenseStereo],
        outputs: &[Slot::FusedCloud],
    },
];

impl ColmapStage {
    /// Arguments with placeholders instead of concrete paths.
    pub fn template(&self) -> String {
        self.args
            .iter()
            .map(|a| match a {
                Lit(s) => *s,
                P(slot) => slot.placeholder(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn command(&self, colmap_bin: &str, images: &Path, layout: &WorkspaceLayout) -> StageCommand {
        StageCommand::new(colmap_bin).args(self.args.iter().map(|a| match a {
            Lit(s) => s.to_string(),
            P(slot) => slot.resolve(images, layout).display().to_string(),
        }))
    }

    pub fn node(&self, colmap_bin: &str, images: &Path, layout: &WorkspaceLayout) -> StageNode {
        let mut node = StageNode::new(self.name, self.command(colmap_bin, images, layout));
        node.inputs = self
            .inputs
            .iter()
            .map(|s| s.resolve(images, layout))
            .collect();
        node.outputs = self
            .outputs
            .iter()
            .map(|s| s.resolve(images, layout))
            .collect();
        node
    }

    /// Paths this stage is expected to leave behind.
    pub fn output_paths(&self, images: &Path, layout: &WorkspaceLayout) -> Vec<PathBuf> {
        self.outputs
            .iter()
            .map(|s| s.resolve(images, layout))
            .collect()
    }
}

/// Stage nodes for a full run, in execution order.
pub fn plan(colmap_bin: &str, images: &Path, layout: &WorkspaceLayout) -> Vec<StageNode> {
    COLMAP_STAGES
        .iter()
        .map(|s| s.node(colmap_bin, images, layout))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_match_colmap_cli() {
        let templates: Vec<String> = COLMAP_STAGES.iter().map(|s| s.template()).collect();
        assert_eq!(
            templates,
            vec![
                "feature_extractor --database_path {database} --image_path {images}",
                "exhaustive_matcher --database_path {database}",
                "mapper --database_path {database} --image_path {images} --output_path {sparse}",
                "image_undistorter --image_path {images} --input_path {sparse}/0 --output_path {dense}",
                "patch_match_stereo --workspace_path {dense} --workspace_format COLMAP --PatchMatchStereo.geom_consistency true",
                "stereo_fusion --workspace_path {dense} --workspace_format COLMAP --input_type geometric --output_path {dense}/fused.ply",
            ]
        );
    }

    #[test]
    fn test_rendered_commands_use_workspace_paths() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::ensure(dir.path()).unwrap();
        let images = dir.path().join("imgs");
        let nodes = plan("colmap", &images, &layout);

        assert_eq!(nodes.len(), 6);
        let mapper = &nodes[2].command;
        assert_eq!(mapper.program, "colmap");
        assert_eq!(
            mapper.args,
            vec![
                "mapper".to_string(),
                "--database_path".to_string(),
                layout.database_path().display().to_string(),
                "--image_path".to_string(),
                images.display().to_string(),
                "--output_path".to_string(),
                layout.sparse_dir().display().to_string(),
            ]
        );
        assert_eq!(nodes[2].outputs, vec![layout.sparse_dir().join("0")]);
        assert_eq!(nodes[5].outputs, vec![layout.fused_cloud_path()]);
    }
}
