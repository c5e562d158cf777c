use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    TreeError,
    node::{Node, NodeIndex},
    split::{SplitResult, find_best_split, squared_error},
};

/// Configuration for a single regression tree.
///
/// Construct via [`RegressionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `max_depth`         | `None` (unlimited)    |
/// | `max_leaf_nodes`    | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 1                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
#[derive(Debug, Clone)]
pub struct RegressionTreeConfig {
    pub(crate) max_depth: Option<usize>,
    pub(crate) max_leaf_nodes: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) seed: u64,
}

impl RegressionTreeConfig {
    /// Config with the defaults above.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: None,
            max_leaf_nodes: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }

    /// Set the maximum tree depth (root is depth 0). `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the maximum number of leaves.
    ///
    /// Trees grow best-first: the leaf whose split removes the most squared
    /// error is expanded next, until this many leaves exist.
    #[must_use]
    pub fn with_max_leaf_nodes(mut self, max_leaf_nodes: Option<usize>) -> Self {
        self.max_leaf_nodes = max_leaf_nodes;
        self
    }

    /// Smallest node that may be split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Smallest child a split may produce.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Candidate columns per split; `None` for all.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Seed for column sampling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the maximum number of leaves, if limited.
    #[must_use]
    pub fn max_leaf_nodes(&self) -> Option<usize> {
        self.max_leaf_nodes
    }

    /// Seed for column sampling.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train a regression tree on the provided row-major dataset.
    ///
    /// `features[sample_idx][feature_idx]`, `targets[sample_idx]`.
    ///
    /// # Errors
    ///
    /// | Variant                               | When                                            |
    /// |---------------------------------------|-------------------------------------------------|
    /// | [`TreeError::EmptyDataset`]           | `features` is empty                             |
    /// | [`TreeError::ZeroFeatures`]           | rows have zero feature columns                  |
    /// | [`TreeError::FeatureCountMismatch`]   | rows have inconsistent lengths                  |
    /// | [`TreeError::TargetCountMismatch`]    | `targets.len() != features.len()`               |
    /// | [`TreeError::NonFiniteValue`]         | any feature is NaN or infinite                  |
    /// | [`TreeError::NonFiniteTarget`]        | any target is NaN or infinite                   |
    /// | [`TreeError::InvalidMaxFeatures`]     | `max_features` resolves outside [1, n_features] |
    /// | [`TreeError::InvalidMaxDepth`]        | `max_depth` is `Some(0)`                        |
    /// | [`TreeError::InvalidMaxLeafNodes`]    | `max_leaf_nodes` is below 2                     |
    /// | [`TreeError::InvalidMinSamplesSplit`] | `min_samples_split` < 2                         |
    /// | [`TreeError::InvalidMinSamplesLeaf`]  | `min_samples_leaf` < 1                          |
    #[instrument(skip(self, features, targets), fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], targets: &[f64]) -> Result<RegressionTree, TreeError> {
        let n_features = crate::forest::validate_dataset(features, targets)?;
        let n_samples = features.len();

        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(TreeError::InvalidMaxDepth { max_depth: 0 });
        }
        if let Some(limit) = self.max_leaf_nodes
            && limit < 2
        {
            return Err(TreeError::InvalidMaxLeafNodes {
                max_leaf_nodes: limit,
            });
        }
        if self.min_samples_split < 2 {
            return Err(TreeError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(TreeError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(TreeError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }

        // Column-major layout for find_best_split.
        let col_features: Vec<Vec<f64>> = (0..n_features)
            .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
            .collect();

        let mut grower = Grower {
            config: self,
            col_features: &col_features,
            targets,
            max_features,
            rng: ChaCha8Rng::seed_from_u64(self.seed),
            arena: Vec::new(),
        };
        grower.grow((0..n_samples).collect());

        debug!(
            n_nodes = grower.arena.len(),
            n_features,
            "regression tree built"
        );

        Ok(RegressionTree {
            nodes: grower.arena,
            n_features,
        })
    }
}

impl Default for RegressionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A leaf waiting to be expanded, with its best split already computed.
struct Candidate {
    node: usize,
    depth: usize,
    split: SplitResult,
}

/// Best-first tree growth over an arena.
struct Grower<'a> {
    config: &'a RegressionTreeConfig,
    col_features: &'a [Vec<f64>],
    targets: &'a [f64],
    max_features: usize,
    rng: ChaCha8Rng,
    arena: Vec<Node>,
}

impl Grower<'_> {
    fn grow(&mut self, root_indices: Vec<usize>) {
        let limit = self.config.max_leaf_nodes.unwrap_or(usize::MAX);
        let mut frontier: Vec<Candidate> = Vec::new();

        let root = self.push_leaf(&root_indices);
        frontier.extend(self.candidate(root, 0, &root_indices));
        let mut n_leaves = 1usize;

        while n_leaves < limit {
            let Some(best_pos) = frontier
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.split.impurity_decrease.total_cmp(&b.1.split.impurity_decrease))
                .map(|(pos, _)| pos)
            else {
                break;
            };
            let Candidate { node, depth, split } = frontier.swap_remove(best_pos);

            let left = self.push_leaf(&split.left_indices);
            let right = self.push_leaf(&split.right_indices);
            let impurity = self.arena[node].impurity();
            let n_samples = self.arena[node].n_samples();
            self.arena[node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: NodeIndex::new(left),
                right: NodeIndex::new(right),
                impurity,
                n_samples,
                impurity_decrease: split.impurity_decrease,
            };
            n_leaves += 1;

            frontier.extend(self.candidate(left, depth + 1, &split.left_indices));
            frontier.extend(self.candidate(right, depth + 1, &split.right_indices));
        }
    }

    fn push_leaf(&mut self, sample_indices: &[usize]) -> usize {
        let n_samples = sample_indices.len();
        let (sum, sum_sq) = sample_indices.iter().fold((0.0, 0.0), |(s, sq), &si| {
            let y = self.targets[si];
            (s + y, sq + y * y)
        });
        let value = if n_samples > 0 { sum / n_samples as f64 } else { 0.0 };
        self.arena.push(Node::Leaf {
            value,
            impurity: squared_error(sum, sum_sq, n_samples),
            n_samples,
        });
        self.arena.len() - 1
    }

    fn candidate(&mut self, node: usize, depth: usize, sample_indices: &[usize]) -> Option<Candidate> {
        let depth_exceeded = self.config.max_depth.is_some_and(|max_d| depth >= max_d);
        let too_few = sample_indices.len() < self.config.min_samples_split;
        let pure = self.arena[node].impurity().value() == 0.0;
        if depth_exceeded || too_few || pure {
            return None;
        }
        let split = find_best_split(
            self.col_features,
            self.targets,
            sample_indices,
            self.max_features,
            self.config.min_samples_leaf,
            &mut self.rng,
        )?;
        Some(Candidate { node, depth, split })
    }
}

/// A fitted regression tree.
///
/// Stored as an arena-based `Vec<Node>` with index references; the root is
/// always at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegressionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
}

impl RegressionTree {
    /// Return the leaf that `sample` falls into.
    ///
    /// Traverses from the root: at each `Split`, goes left when
    /// `sample[feature] <= threshold`, right otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn apply(&self, sample: &[f64]) -> Result<NodeIndex, TreeError> {
        self.check_width(sample)?;
        Ok(NodeIndex::new(self.traverse(sample)))
    }

    /// Predict the leaf mean for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, TreeError> {
        self.check_width(sample)?;
        match &self.nodes[self.traverse(sample)] {
            Node::Leaf { value, .. } => Ok(*value),
            Node::Split { .. } => unreachable!("traverse always ends at a leaf"),
        }
    }

    /// Return the arena nodes.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Arena size.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Leaf count.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree. A root-only tree has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));
        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    fn check_width(&self, sample: &[f64]) -> Result<(), TreeError> {
        if sample.len() != self.n_features {
            return Err(TreeError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(())
    }

    /// Walk from the root to the leaf holding `sample`.
    fn traverse(&self, sample: &[f64]) -> usize {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[feature.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }
}
