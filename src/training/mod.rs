//! Model training
//!
//! Provides the classifier behind the gender model:
//! - CART decision trees with seeded per-split feature sampling
//! - Random forests with seeded bootstrap and deterministic voting
//! - Holdout splitting and classification metrics

mod models;
pub mod decision_tree;
pub mod random_forest;
pub mod split;

pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use models::ModelMetrics;
pub use random_forest::{MaxFeatures, RandomForest};
pub use split::{train_test_split, TrainTestSplit};
