//! Display and output formatting utilities

use crate::attack_tree::AttackTree;
use crate::config::OutputFormat;
use crate::error::Violation;
use crate::synthesis::{ConstraintTag, Schedule};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Format schedules, trees and diagnostics for the console
pub struct ScheduleFormatter;

impl ScheduleFormatter {
    /// Format a schedule as a table of actions
    pub fn format_schedule(schedule: &Schedule) -> String {
        let mut output = String::new();

        output.push_str(&format!("=== Schedule (bound {}) ===\n", schedule.bound));
        output.push_str("Action       | Start | End   | Cost\n");
        output.push_str("-------------|-------|-------|------\n");
        for action in &schedule.actions {
            output.push_str(&format!(
                "{:12} | {:5} | {:5} | {}\n",
                action.name, action.start, action.end, action.cost
            ));
        }

        output.push('\n');
        output.push_str(&format!("Actions: {}\n", schedule.len()));
        output.push_str(&format!("Total cost: {}\n", schedule.total_cost()));
        if let Some((start, end)) = schedule.span() {
            output.push_str(&format!("Span: [{}, {}]\n", start, end));
        }

        output
    }

    /// Draw the tree as an indented outline
    pub fn format_tree(tree: &AttackTree) -> String {
        let mut output = String::new();
        Self::format_subtree(tree, 0, &mut output);
        output
    }

    fn format_subtree(tree: &AttackTree, depth: usize, output: &mut String) {
        let indent = "  ".repeat(depth);
        match tree {
            AttackTree::Leaf(leaf) => output.push_str(&format!("{indent}{leaf}\n")),
            AttackTree::Gate(gate) => {
                output.push_str(&format!("{indent}{}\n", gate.node));
                Self::format_subtree(&gate.left, depth + 1, output);
                Self::format_subtree(&gate.right, depth + 1, output);
            }
        }
    }

    pub fn format_violations(violations: &[Violation]) -> String {
        let mut output = format!("Propagation found {} violation(s):\n", violations.len());
        for violation in violations {
            output.push_str(&format!("  - {violation}\n"));
        }
        output
    }

    /// Format an unsatisfiable core, one constraint per line
    pub fn format_core(bound: usize, core: &BTreeSet<ConstraintTag>) -> String {
        let mut output = format!(
            "No schedule with at most {} events; {} constraint(s) conflict:\n",
            bound,
            core.len()
        );
        for tag in core {
            output.push_str(&format!("  - {tag}\n"));
        }
        output
    }

    /// Save a schedule as `schedule.txt` or `schedule.json`
    pub fn save_schedule<P: AsRef<Path>>(
        schedule: &Schedule,
        output_dir: P,
        format: OutputFormat,
    ) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

        let filepath = output_dir.join(format!("schedule.{}", format.extension()));
        let content = match format {
            OutputFormat::Text => Self::format_schedule(schedule),
            OutputFormat::Json => {
                serde_json::to_string_pretty(schedule).context("Failed to serialize schedule")?
            }
        };
        std::fs::write(&filepath, content)
            .with_context(|| format!("Failed to write schedule: {}", filepath.display()))?;

        Ok(filepath)
    }
}

/// Color output utilities
pub struct ColorOutput;

impl ColorOutput {
    /// Format text with color (if terminal supports it)
    pub fn colored(text: &str, color: Color) -> String {
        if Self::supports_color() {
            format!("\x1b[{}m{}\x1b[0m", color.code(), text)
        } else {
            text.to_string()
        }
    }

    fn supports_color() -> bool {
        std::env::var("NO_COLOR").is_err() && (std::env::var("TERM").unwrap_or_default() != "dumb")
    }

    pub fn success(text: &str) -> String {
        Self::colored(text, Color::Green)
    }

    pub fn error(text: &str) -> String {
        Self::colored(text, Color::Red)
    }

    pub fn warning(text: &str) -> String {
        Self::colored(text, Color::Yellow)
    }

    pub fn info(text: &str) -> String {
        Self::colored(text, Color::Blue)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
}

impl Color {
    fn code(self) -> u8 {
        match self {
            Color::Red => 31,
            Color::Green => 32,
            Color::Yellow => 33,
            Color::Blue => 34,
        }
    }
}
