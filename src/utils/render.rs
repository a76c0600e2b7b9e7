//! TikZ export of attack trees

use crate::attack_tree::{AttackTree, Interval};
use anyhow::{Context, Result};
use std::path::Path;

const PREAMBLE: &str = r"\documentclass{standalone}
\usepackage{tikz}
\usetikzlibrary{trees}
\begin{document}
\begin{tikzpicture}[
  edge from parent fork down, sibling distance=3cm, level distance=3cm,
  level 1/.style={sibling distance=4cm},
  level 2/.style={sibling distance=2cm},
  every node/.style={fill=white, draw, align=center}
  ]
";

const POSTAMBLE: &str = r"\end{tikzpicture}
\end{document}
";

/// Standalone LaTeX document drawing the tree
pub fn render_tikz(tree: &AttackTree) -> String {
    format!("{PREAMBLE}  \\node {};\n{POSTAMBLE}", tikz_node(tree))
}

/// Write `render_tikz` output to a `.tex` file
pub fn save_tikz<P: AsRef<Path>>(tree: &AttackTree, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, render_tikz(tree))
        .with_context(|| format!("Failed to write TikZ file: {}", path.display()))
}

fn tikz_node(tree: &AttackTree) -> String {
    match tree {
        AttackTree::Leaf(leaf) => format!(
            "{{ {} \\\\ $\\Delta$={} \\\\ cost={} }}",
            escape(leaf.name()),
            leaf.duration(),
            leaf.cost()
        ),
        AttackTree::Gate(gate) => format!(
            "{{ {} \\\\ {} \\\\ {} }} child {{ node {} }} child {{ node {} }}",
            escape(gate.node.name()),
            gate.node.operator().label(),
            interval_label(gate.node.interval()),
            tikz_node(&gate.left),
            tikz_node(&gate.right)
        ),
    }
}

fn interval_label(interval: &Interval) -> String {
    match interval.tmax() {
        Some(tmax) => format!("$[{},{}]$", interval.tmin(), tmax),
        None => format!("$[{},\\infty]$", interval.tmin()),
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '&' | '%' | '$' | '#' | '{' | '}') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack_tree::{paper_example, Leaf};
    use tempfile::TempDir;

    #[test]
    fn test_paper_example_document() {
        let document = render_tikz(&paper_example().unwrap());
        assert!(document.starts_with(r"\documentclass{standalone}"));
        assert!(document.contains(r"{ IC \\ OR \\ $[3,12]$ }"));
        assert!(document.contains(r"{ IVRD \\ AND \\ $[5,16]$ }"));
        assert!(document.contains(r"child { node { OID \\ $\Delta$=2 \\ cost=14 } }"));
        assert!(document.trim_end().ends_with(r"\end{document}"));
    }

    #[test]
    fn test_unbounded_interval_and_escaping() {
        assert_eq!(interval_label(&Interval::unbounded(4)), r"$[4,\infty]$");
        let tree = AttackTree::leaf(Leaf::new("steal_key", 1, 1).unwrap());
        assert!(render_tikz(&tree).contains(r"steal\_key"));
    }

    #[test]
    fn test_save_tikz() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("tree.tex");
        save_tikz(&paper_example().unwrap(), &path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("tikzpicture"));
    }
}
