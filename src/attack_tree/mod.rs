//! Timed attack tree data model and interval propagation

pub mod interval;
pub mod node;
pub mod tree;
pub mod propagate;
pub mod io;

pub use interval::Interval;
pub use node::{Leaf, Operator, OperatorNode};
pub use tree::{AttackTree, Gate, Leaves, AMBIENT_WINDOW};
pub use propagate::{is_propagated, propagate};
pub use io::{
    create_example_trees, extended_example, load_tree_from_file, paper_example,
    parse_tree_from_str, save_tree_to_file, sequential_example, TreeFormat,
};
