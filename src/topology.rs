//! Static description of the unit pipeline.
//!
//! A [`Topology`] is built once from a list of [`UnitSpec`]s declared in
//! root-to-leaves order plus a list of hard pairs. After validation it only
//! answers adjacency questions; nothing in it ever changes while the line
//! runs.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LinhaError;

/// Index of a unit inside its [`Topology`].
///
/// Ids follow declaration order, so sorting ids sorts units root to leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(usize);

impl UnitId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One station as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub downstream: Vec<String>,
}

impl UnitSpec {
    pub fn new(key: &str, label: &str, downstream: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            downstream: downstream.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    key: String,
    label: String,
    downstream: Vec<UnitId>,
    upstream: Vec<UnitId>,
    pair: Option<UnitId>,
}

/// Validated pipeline graph.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<Node>,
    by_key: HashMap<String, UnitId>,
    pairs: Vec<(UnitId, UnitId)>,
}

/// Units of the standard line, root to leaves.
pub fn standard_units() -> Vec<UnitSpec> {
    vec![
        UnitSpec::new("esteiraMain", "Esteira principal", &["millA", "millB"]),
        UnitSpec::new("millA", "Moinho A", &["canoUnderMotor"]),
        UnitSpec::new("millB", "Moinho B", &["canoUnderMotor"]),
        UnitSpec::new("canoUnderMotor", "Válvula rotativa", &["esteiraUnderCano"]),
        UnitSpec::new("esteiraUnderCano", "Esteira sob válvula", &["separador"]),
        UnitSpec::new(
            "separador",
            "Peneira vibratória",
            &["esteiraEsquerda", "esteiraDireita"],
        ),
        UnitSpec::new("esteiraEsquerda", "Esteira esquerda", &[]),
        UnitSpec::new("esteiraDireita", "Esteira direita", &[]),
    ]
}

/// Hard pairs of the standard line.
pub fn standard_pairs() -> Vec<[String; 2]> {
    vec![["millA".to_string(), "millB".to_string()]]
}

impl Topology {
    /// The eight-unit line with the twin mills paired.
    pub fn standard() -> Self {
        Self::build(&standard_units(), &standard_pairs())
            .expect("standard topology is valid")
    }

    /// Validate the declarations and build the adjacency tables.
    ///
    /// Units must be listed root to leaves: a downstream key has to be
    /// declared after the unit that feeds it, which also rules out cycles.
    pub fn build(units: &[UnitSpec], pairs: &[[String; 2]]) -> Result<Self, LinhaError> {
        if units.is_empty() {
            return Err(LinhaError::Topology("no units declared".into()));
        }

        let mut by_key = HashMap::with_capacity(units.len());
        for (index, spec) in units.iter().enumerate() {
            if spec.key.trim().is_empty() {
                return Err(LinhaError::Topology(format!("unit #{index} has an empty key")));
            }
            if by_key.insert(spec.key.clone(), UnitId(index)).is_some() {
                return Err(LinhaError::Topology(format!("duplicate unit key {}", spec.key)));
            }
        }

        let mut nodes: Vec<Node> = units
            .iter()
            .map(|spec| Node {
                key: spec.key.clone(),
                label: if spec.label.is_empty() {
                    spec.key.clone()
                } else {
                    spec.label.clone()
                },
                downstream: Vec::new(),
                upstream: Vec::new(),
                pair: None,
            })
            .collect();

        for (index, spec) in units.iter().enumerate() {
            for key in &spec.downstream {
                let Some(&next) = by_key.get(key) else {
                    return Err(LinhaError::Topology(format!(
                        "{} feeds undeclared unit {key}",
                        spec.key
                    )));
                };
                if next.0 <= index {
                    return Err(LinhaError::Topology(format!(
                        "{} feeds {key}, which is declared before it",
                        spec.key
                    )));
                }
                if nodes[index].downstream.contains(&next) {
                    continue;
                }
                nodes[index].downstream.push(next);
                nodes[next.0].upstream.push(UnitId(index));
            }
        }

        let mut resolved = Vec::with_capacity(pairs.len());
        for [a, b] in pairs {
            let (Some(&ia), Some(&ib)) = (by_key.get(a), by_key.get(b)) else {
                return Err(LinhaError::Topology(format!("pair {a}/{b} names an undeclared unit")));
            };
            if ia == ib {
                return Err(LinhaError::Topology(format!("unit {a} cannot pair with itself")));
            }
            if nodes[ia.0].pair.is_some() || nodes[ib.0].pair.is_some() {
                return Err(LinhaError::Topology(format!("pair {a}/{b} overlaps another pair")));
            }
            nodes[ia.0].pair = Some(ib);
            nodes[ib.0].pair = Some(ia);
            resolved.push((ia.min(ib), ia.max(ib)));
        }

        Ok(Self {
            nodes,
            by_key,
            pairs: resolved,
        })
    }

    /// Pair the final units when exactly two leaves share one feeder.
    ///
    /// Any other shape is left as it is, with a warning.
    pub fn with_output_pair(mut self) -> Self {
        let leaves: Vec<UnitId> = self.leaves().collect();
        if let &[a, b] = leaves.as_slice()
            && self.nodes[a.0].upstream == self.nodes[b.0].upstream
            && self.nodes[a.0].pair.is_none()
            && self.nodes[b.0].pair.is_none()
        {
            self.nodes[a.0].pair = Some(b);
            self.nodes[b.0].pair = Some(a);
            self.pairs.push((a, b));
        } else {
            warn!(
                leaves = leaves.len(),
                "Output belts left unpaired: need exactly two unpaired leaves on one feeder"
            );
        }
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All units root to leaves.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = UnitId> + '_ {
        (0..self.nodes.len()).map(UnitId)
    }

    pub fn id(&self, key: &str) -> Option<UnitId> {
        self.by_key.get(key).copied()
    }

    pub fn key(&self, id: UnitId) -> &str {
        &self.nodes[id.0].key
    }

    pub fn label(&self, id: UnitId) -> &str {
        &self.nodes[id.0].label
    }

    pub fn immediate_downstream(&self, id: UnitId) -> &[UnitId] {
        &self.nodes[id.0].downstream
    }

    pub fn immediate_upstream(&self, id: UnitId) -> &[UnitId] {
        &self.nodes[id.0].upstream
    }

    /// Every unit that feeds `id` directly or transitively, root first.
    pub fn upstream_of(&self, id: UnitId) -> Vec<UnitId> {
        self.closure(id, |node| &node.upstream)
    }

    /// Every unit fed by `id` directly or transitively, root first.
    pub fn all_downstream(&self, id: UnitId) -> Vec<UnitId> {
        self.closure(id, |node| &node.downstream)
    }

    pub fn pair_of(&self, id: UnitId) -> Option<UnitId> {
        self.nodes[id.0].pair
    }

    pub fn pairs(&self) -> &[(UnitId, UnitId)] {
        &self.pairs
    }

    /// The unit and its pair sibling, if any.
    pub fn with_pair(&self, id: UnitId) -> impl Iterator<Item = UnitId> {
        std::iter::once(id).chain(self.pair_of(id))
    }

    /// Final units: nothing downstream of them.
    pub fn leaves(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.ids().filter(|&id| self.nodes[id.0].downstream.is_empty())
    }

    pub fn is_leaf(&self, id: UnitId) -> bool {
        self.nodes[id.0].downstream.is_empty()
    }

    // Breadth-first walk over either edge direction.
    fn closure(&self, start: UnitId, edges: impl Fn(&Node) -> &Vec<UnitId>) -> Vec<UnitId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<UnitId> = edges(&self.nodes[start.0]).iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(edges(&self.nodes[next.0]).iter().copied());
            }
        }
        seen.into_iter().collect()
    }
}
