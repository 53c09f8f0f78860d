//! Training infrastructure: per-node training-set assignment and the pooled
//! base-classifier trainer.

mod assign;
mod pool;

pub use assign::{assign_br, assign_hsm, assign_plt, Assignment, TrainStats};
pub(crate) use assign::plt_nodes_for_example;
pub use pool::BaseTrainerPool;
