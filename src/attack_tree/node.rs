//! Leaves and operator metadata of an attack tree

use super::Interval;
use crate::error::ConstructionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An atomic attacker action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLeaf", into = "RawLeaf")]
pub struct Leaf {
    name: String,
    duration: u64,
    cost: u64,
    window: Option<Interval>,
}

impl Leaf {
    /// Create a leaf bound only by the windows of its ancestors
    pub fn new(name: impl Into<String>, duration: u64, cost: u64) -> Result<Self, ConstructionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConstructionError::InvalidLeafName(name));
        }
        if duration == 0 {
            return Err(ConstructionError::InvalidDuration { name, duration });
        }
        Ok(Self {
            name,
            duration,
            cost,
            window: None,
        })
    }

    /// Restrict the leaf to its own feasibility window
    pub fn with_window(mut self, window: Interval) -> Self {
        self.window = Some(window);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// Own window, or the propagated one once the tree has been propagated
    pub fn window(&self) -> Option<&Interval> {
        self.window.as_ref()
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Δ={}, cost={})", self.name, self.duration, self.cost)?;
        if let Some(window) = &self.window {
            write!(f, " {}", window)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawLeaf {
    name: String,
    duration: u64,
    #[serde(default)]
    cost: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    window: Option<Interval>,
}

impl TryFrom<RawLeaf> for Leaf {
    type Error = ConstructionError;

    fn try_from(raw: RawLeaf) -> Result<Self, Self::Error> {
        let leaf = Leaf::new(raw.name, raw.duration, raw.cost)?;
        Ok(match raw.window {
            Some(window) => leaf.with_window(window),
            None => leaf,
        })
    }
}

impl From<Leaf> for RawLeaf {
    fn from(leaf: Leaf) -> Self {
        Self {
            name: leaf.name,
            duration: leaf.duration,
            cost: leaf.cost,
            window: leaf.window,
        }
    }
}

/// Gate operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    /// Both children, non-overlapping, in any order
    And,
    /// Exactly one child
    Or,
    /// Both children, left entirely before right
    Sequence,
}

impl Operator {
    /// Short label used in diagrams
    pub fn label(&self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Sequence => "SEQ",
        }
    }
}

impl FromStr for Operator {
    type Err = ConstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" | "&" => Ok(Operator::And),
            "OR" | "||" => Ok(Operator::Or),
            "SEQ" | "SEQUENCE" | "SAND" | ";" => Ok(Operator::Sequence),
            _ => Err(ConstructionError::InvalidOperator(s.to_string())),
        }
    }
}

impl TryFrom<String> for Operator {
    type Error = ConstructionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(operator: Operator) -> Self {
        operator.label().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata carried by an internal node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOperatorNode", into = "RawOperatorNode")]
pub struct OperatorNode {
    operator: Operator,
    interval: Interval,
    name: String,
}

impl OperatorNode {
    pub fn new(
        operator: Operator,
        interval: Interval,
        name: impl Into<String>,
    ) -> Result<Self, ConstructionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConstructionError::InvalidNodeName(name));
        }
        Ok(Self {
            operator,
            interval,
            name,
        })
    }

    /// Build a node from an operator label such as `"&"` or `"SEQ"`
    pub fn parse(
        operator: &str,
        interval: Interval,
        name: impl Into<String>,
    ) -> Result<Self, ConstructionError> {
        Self::new(operator.parse()?, interval, name)
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same node with a different (tightened) interval
    pub(crate) fn with_interval(&self, interval: Interval) -> Self {
        Self {
            operator: self.operator,
            interval,
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for OperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.operator, self.interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawOperatorNode {
    operator: String,
    interval: Interval,
    name: String,
}

impl TryFrom<RawOperatorNode> for OperatorNode {
    type Error = ConstructionError;

    fn try_from(raw: RawOperatorNode) -> Result<Self, Self::Error> {
        OperatorNode::parse(&raw.operator, raw.interval, raw.name)
    }
}

impl From<OperatorNode> for RawOperatorNode {
    fn from(node: OperatorNode) -> Self {
        Self {
            operator: node.operator.into(),
            interval: node.interval,
            name: node.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_validation() {
        assert!(Leaf::new("SDC", 1, 1).is_ok());
        assert_eq!(
            Leaf::new("  ", 1, 1),
            Err(ConstructionError::InvalidLeafName("  ".to_string()))
        );
        assert!(matches!(
            Leaf::new("LMD", 0, 0),
            Err(ConstructionError::InvalidDuration { duration: 0, .. })
        ));
    }

    #[test]
    fn test_operator_spellings() {
        assert_eq!("&".parse::<Operator>().unwrap(), Operator::And);
        assert_eq!("or".parse::<Operator>().unwrap(), Operator::Or);
        assert_eq!("||".parse::<Operator>().unwrap(), Operator::Or);
        assert_eq!(";".parse::<Operator>().unwrap(), Operator::Sequence);
        assert_eq!("Sequence".parse::<Operator>().unwrap(), Operator::Sequence);
    }

    #[test]
    fn test_invalid_operator_rejected() {
        let interval = Interval::new(0, 10).unwrap();
        let result = OperatorNode::parse("xor_bad", interval, "X");
        assert_eq!(
            result,
            Err(ConstructionError::InvalidOperator("xor_bad".to_string()))
        );
    }

    #[test]
    fn test_node_name_required() {
        let interval = Interval::new(0, 10).unwrap();
        assert!(matches!(
            OperatorNode::new(Operator::And, interval, ""),
            Err(ConstructionError::InvalidNodeName(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_bad_operator() {
        let yaml = "operator: xor_bad\ninterval: {tmin: 0, tmax: 4}\nname: X\n";
        let error = serde_yaml::from_str::<OperatorNode>(yaml).unwrap_err();
        assert!(error.to_string().contains("xor_bad"));
    }

    #[test]
    fn test_leaf_window_serialization() {
        let leaf = Leaf::new("IRID", 5, 70)
            .unwrap()
            .with_window(Interval::new(2, 7).unwrap());
        let yaml = serde_yaml::to_string(&leaf).unwrap();
        let back: Leaf = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, leaf);
        assert_eq!(back.window(), Some(&Interval::new(2, 7).unwrap()));
    }
}
