//! Arena node types for regression trees.

macro_rules! arena_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(usize);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index)
            }

            /// Zero-based position.
            #[must_use]
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

arena_index!(
    /// Input column a split tests.
    FeatureIndex
);

arena_index!(
    /// Position of a node in its tree's arena.
    ///
    /// For leaves this is also the tree-local leaf id returned by
    /// [`RegressionTree::apply`](crate::RegressionTree::apply).
    NodeIndex
);

/// Squared-error impurity: sum of squared deviations from the node mean.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct Impurity(f64);

impl Impurity {
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Raw value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

/// One slot of a tree arena. Children are arena positions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// Routes `x[feature] <= threshold` left, everything else right.
    Split {
        feature: FeatureIndex,
        threshold: f64,
        left: NodeIndex,
        right: NodeIndex,
        /// Impurity before the split.
        impurity: Impurity,
        /// In-bag samples routed through this node.
        n_samples: usize,
        impurity_decrease: f64,
    },
    /// Terminal node predicting the mean of its in-bag targets.
    Leaf {
        value: f64,
        impurity: Impurity,
        /// In-bag samples (with bootstrap repeats) that ended here.
        n_samples: usize,
    },
}

impl Node {
    /// Impurity of the samples reaching this node.
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    /// In-bag sample count at this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Whether this node is terminal.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}
