use crate::invoker::{CommandRunner, StageCommand};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// One external stage and the files it consumes and produces.
#[derive(Debug, Clone)]
pub struct StageNode {
    pub name: String,
    pub command: StageCommand,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl StageNode {
    pub fn new(name: impl Into<String>, command: StageCommand) -> Self {
        Self {
            name: name.into(),
            command,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct StageDependency {
    pub from: NodeId,
    pub to: NodeId,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StageGraph {
    nodes: Vec<StageNode>,
    dependencies: Vec<StageDependency>,
    topology_order: Vec<NodeId>,
}

impl StageGraph {
    /// Derive dependencies from the declared files and order the stages.
    ///
    /// An input is bound to the last earlier stage declaring it as an
    /// output; failing that, to the first later one. Inputs nobody produces
    /// are external and only checked for existence at run time.
    pub fn build(nodes: Vec<StageNode>) -> Result<Self> {
        let mut producers: HashMap<&PathBuf, Vec<NodeId>> = HashMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            for output in &node.outputs {
                producers.entry(output).or_default().push(NodeId(idx));
            }
        }

        let mut dependencies = Vec::new();
        let mut adjacency: Vec<Vec<NodeId>> = vec![Vec::new(); nodes.len()];
        let mut in_degree = vec![0usize; nodes.len()];

        for (idx, node) in nodes.iter().enumerate() {
            let node_id = NodeId(idx);
            for input in &node.inputs {
                let Some(candidates) = producers.get(input) else {
                    continue;
                };
                let producer = candidates
                    .iter()
                    .rev()
                    .find(|p| p.0 < idx)
                    .or_else(|| candidates.iter().find(|p| p.0 > idx));

                if let Some(&producer_id) = producer {
                    if adjacency[producer_id.0].contains(&node_id) {
                        continue;
                    }
                    dependencies.push(StageDependency {
                        from: producer_id,
                        to: node_id,
                        path: input.clone(),
                    });
                    adjacency[producer_id.0].push(node_id);
                    in_degree[idx] += 1;
                }
            }
        }

        let topology_order = Self::topological_sort(&nodes, &adjacency, &in_degree)?;

        Ok(Self {
            nodes,
            dependencies,
            topology_order,
        })
    }

    /// Kahn's algorithm; among ready stages the earliest declared runs first.
    fn topological_sort(
        nodes: &[StageNode],
        adjacency: &[Vec<NodeId>],
        in_degree: &[usize],
    ) -> Result<Vec<NodeId>> {
        let mut in_degree = in_degree.to_vec();
        let mut ready: BTreeSet<NodeId> = (0..nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .map(NodeId)
            .collect();
        let mut result = Vec::with_capacity(nodes.len());

        while let Some(node) = ready.pop_first() {
            result.push(node);
            for &next in &adjacency[node.0] {
                in_degree[next.0] -= 1;
                if in_degree[next.0] == 0 {
                    ready.insert(next);
                }
            }
        }

        if result.len() != nodes.len() {
            let stuck: Vec<&str> = (0..nodes.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| nodes[i].name.as_str())
                .collect();
            return Err(Error::Cycle(stuck.join(", ")));
        }

        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &StageNode {
        &self.nodes[id.0]
    }

    pub fn topology_order(&self) -> &[NodeId] {
        &self.topology_order
    }

    /// Stage names in execution order.
    pub fn ordered_names(&self) -> Vec<&str> {
        self.topology_order
            .iter()
            .map(|id| self.nodes[id.0].name.as_str())
            .collect()
    }

    pub fn get_dependencies(&self, node_id: NodeId) -> Vec<&StageDependency> {
        self.dependencies
            .iter()
            .filter(|dep| dep.to == node_id)
            .collect()
    }

    /// Run every stage in order, stopping at the first failure.
    ///
    /// Declared inputs must exist before a stage starts; declared outputs
    /// must exist once it exits successfully.
    pub fn execute(&self, runner: &dyn CommandRunner) -> Result<()> {
        let total = self.topology_order.len();
        for (step, id) in self.topology_order.iter().enumerate() {
            let node = &self.nodes[id.0];

            if let Some(missing) = node.inputs.iter().find(|p| !p.exists()) {
                return Err(Error::MissingInput {
                    stage: node.name.clone(),
                    path: missing.clone(),
                });
            }

            tracing::info!("[{}/{}] {}", step + 1, total, node.name);
            runner.run(&node.name, &node.command)?;

            if let Some(missing) = node.outputs.iter().find(|p| !p.exists()) {
                return Err(Error::MissingOutput {
                    stage: node.name.clone(),
                    path: missing.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, inputs: &[&str], outputs: &[&str]) -> StageNode {
        let mut n = StageNode::new(name, StageCommand::new("true"));
        n.inputs = inputs.iter().map(PathBuf::from).collect();
        n.outputs = outputs.iter().map(PathBuf::from).collect();
        n
    }

    #[test]
    fn test_chain_keeps_declaration_order() {
        let graph = StageGraph::build(vec![
            node("a", &[], &["x"]),
            node("b", &["x"], &["y"]),
            node("c", &["y"], &["z"]),
        ])
        .unwrap();
        assert_eq!(graph.ordered_names(), vec!["a", "b", "c"]);
        assert_eq!(graph.get_dependencies(NodeId(2)).len(), 1);
        assert_eq!(graph.get_dependencies(NodeId(2))[0].from, NodeId(1));
    }

    #[test]
    fn test_out_of_order_declaration_is_sorted() {
        let graph = StageGraph::build(vec![
            node("consumer", &["x"], &["y"]),
            node("producer", &[], &["x"]),
        ])
        .unwrap();
        assert_eq!(graph.ordered_names(), vec!["producer", "consumer"]);
    }

    #[test]
    fn test_in_place_update_chains_through_latest_writer() {
        let graph = StageGraph::build(vec![
            node("create", &[], &["db"]),
            node("update", &["db"], &["db"]),
            node("read", &["db"], &["out"]),
        ])
        .unwrap();
        assert_eq!(graph.get_dependencies(NodeId(2))[0].from, NodeId(1));
        assert_eq!(graph.ordered_names(), vec!["create", "update", "read"]);
    }

    #[test]
    fn test_cycle_detection() {
        let result = StageGraph::build(vec![
            node("a", &["y"], &["x"]),
            node("b", &["x"], &["y"]),
        ]);
        match result {
            Err(Error::Cycle(names)) => {
                assert!(names.contains('a'));
                assert!(names.contains('b'));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }
}
