//! File I/O and built-in example trees

use super::{AttackTree, Interval, Leaf, Operator};
use anyhow::{Context, Result};
use std::path::Path;

/// Serialization formats understood for tree files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeFormat {
    Yaml,
    Json,
}

impl TreeFormat {
    /// Pick the format from a file extension, defaulting to YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => TreeFormat::Json,
            _ => TreeFormat::Yaml,
        }
    }
}

/// Load an attack tree from a YAML or JSON file
pub fn load_tree_from_file<P: AsRef<Path>>(path: P) -> Result<AttackTree> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tree file: {}", path.display()))?;

    parse_tree_from_str(&content, TreeFormat::from_path(path))
        .with_context(|| format!("Failed to parse tree from file: {}", path.display()))
}

/// Parse an attack tree and re-check the invariants serde cannot see
pub fn parse_tree_from_str(content: &str, format: TreeFormat) -> Result<AttackTree> {
    let tree: AttackTree = match format {
        TreeFormat::Yaml => serde_yaml::from_str(content).context("Invalid YAML attack tree")?,
        TreeFormat::Json => serde_json::from_str(content).context("Invalid JSON attack tree")?,
    };
    tree.validate()?;
    Ok(tree)
}

/// Save an attack tree, choosing the format from the extension
pub fn save_tree_to_file<P: AsRef<Path>>(tree: &AttackTree, path: P) -> Result<()> {
    let path = path.as_ref();
    let content = match TreeFormat::from_path(path) {
        TreeFormat::Yaml => serde_yaml::to_string(tree).context("Failed to serialize tree")?,
        TreeFormat::Json => serde_json::to_string_pretty(tree).context("Failed to serialize tree")?,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write tree to file: {}", path.display()))?;

    Ok(())
}

fn leaf(name: &str, duration: u64, cost: u64) -> Result<AttackTree> {
    Ok(AttackTree::leaf(Leaf::new(name, duration, cost)?))
}

/// Infection tree: either send an infected attachment, or open and insert removable media
pub fn paper_example() -> Result<AttackTree> {
    let injection = AttackTree::node(
        Operator::And,
        Interval::new(5, 16)?,
        "IVRD",
        leaf("OID", 2, 14)?,
        leaf("IRID", 2, 10)?,
    )?;

    Ok(AttackTree::node(
        Operator::Or,
        Interval::new(3, 12)?,
        "IC",
        leaf("ASVVI", 2, 25)?,
        injection,
    )?)
}

/// The paper example conjoined with stealing a digital certificate
pub fn extended_example() -> Result<AttackTree> {
    Ok(AttackTree::node(
        Operator::And,
        Interval::new(10, 200)?,
        "SI",
        leaf("SDC", 160, 1)?,
        paper_example()?,
    )?)
}

/// Sequential variant: the media must be opened before the payload is inserted
pub fn sequential_example() -> Result<AttackTree> {
    let injection = AttackTree::node(
        Operator::Sequence,
        Interval::new(5, 10)?,
        "IVRD",
        leaf("OID", 2, 1)?,
        leaf("IRID", 3, 10)?,
    )?;
    let infection = AttackTree::node(
        Operator::Or,
        Interval::new(3, 12)?,
        "IC",
        leaf("ASVVI", 1, 100)?,
        injection,
    )?;

    Ok(AttackTree::node(
        Operator::And,
        Interval::new(0, 33)?,
        "SI",
        leaf("SDC", 1, 1)?,
        infection,
    )?)
}

/// Write the built-in example trees into a directory
pub fn create_example_trees<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    save_tree_to_file(&paper_example()?, dir.join("paper_example.yaml"))?;
    save_tree_to_file(&extended_example()?, dir.join("extended_example.yaml"))?;
    save_tree_to_file(&sequential_example()?, dir.join("sequential_example.yaml"))?;

    Ok(())
}
