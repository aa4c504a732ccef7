//! Artifact catalogue and the dependency graph between artifacts.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use matcher::MatchTier;
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// Every artifact the lifecycle manager knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// De-duplicated registry snapshot with normalized join columns.
    FamiliesClean,
    GeoExact,
    GeoByAddress,
    GeoFuzzy,
    /// Combined per-family view; the only artifact consumers read.
    FamiliesTerritory,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::FamiliesClean,
        ArtifactKind::GeoExact,
        ArtifactKind::GeoByAddress,
        ArtifactKind::GeoFuzzy,
        ArtifactKind::FamiliesTerritory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ArtifactKind::FamiliesClean => "families_clean",
            ArtifactKind::GeoExact => "geo_exact",
            ArtifactKind::GeoByAddress => "geo_by_address",
            ArtifactKind::GeoFuzzy => "geo_fuzzy",
            ArtifactKind::FamiliesTerritory => "families_territory",
        }
    }

    /// The matching tier a tier artifact holds.
    pub fn tier(self) -> Option<MatchTier> {
        match self {
            ArtifactKind::GeoExact => Some(MatchTier::Exact),
            ArtifactKind::GeoByAddress => Some(MatchTier::AddressOnly),
            ArtifactKind::GeoFuzzy => Some(MatchTier::Fuzzy),
            ArtifactKind::FamiliesClean | ArtifactKind::FamiliesTerritory => None,
        }
    }

    pub fn for_tier(tier: MatchTier) -> Self {
        match tier {
            MatchTier::Exact => ArtifactKind::GeoExact,
            MatchTier::AddressOnly => ArtifactKind::GeoByAddress,
            MatchTier::Fuzzy => ArtifactKind::GeoFuzzy,
        }
    }

    fn valid_names() -> String {
        Self::ALL.map(Self::name).join(", ")
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArtifactKind {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| LifecycleError::UnknownArtifact {
                name: s.to_string(),
                valid: Self::valid_names(),
            })
    }
}

/// An edge of the graph. Soft dependencies are used when present and
/// ignored when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub on: ArtifactKind,
    pub required: bool,
}

impl Dependency {
    pub fn required(on: ArtifactKind) -> Self {
        Self { on, required: true }
    }

    pub fn soft(on: ArtifactKind) -> Self {
        Self { on, required: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNode {
    pub kind: ArtifactKind,
    pub depends_on: Vec<Dependency>,
    /// Optional artifacts may legitimately not exist yet; a batch refresh
    /// skips them. Non-optional ones are built on first refresh.
    pub optional: bool,
}

/// Validated, topologically ordered artifact graph.
#[derive(Debug, Clone)]
pub struct ArtifactGraph {
    nodes: BTreeMap<ArtifactKind, ArtifactNode>,
    order: Vec<ArtifactKind>,
}

impl ArtifactGraph {
    /// Validate `nodes` and compute a build order. Nodes appear in the order
    /// given unless a dependency forces otherwise.
    pub fn new(nodes: Vec<ArtifactNode>) -> Result<Self, LifecycleError> {
        let declared: Vec<ArtifactKind> = nodes.iter().map(|n| n.kind).collect();
        let mut by_kind = BTreeMap::new();
        for node in nodes {
            for dep in &node.depends_on {
                if !declared.contains(&dep.on) {
                    return Err(LifecycleError::InvalidGraph(format!(
                        "{} depends on undeclared artifact {}",
                        node.kind, dep.on
                    )));
                }
            }
            if by_kind.insert(node.kind, node).is_some() {
                return Err(LifecycleError::InvalidGraph("duplicate artifact node".into()));
            }
        }

        let mut pending: HashMap<ArtifactKind, usize> = by_kind
            .values()
            .map(|n| (n.kind, n.depends_on.len()))
            .collect();
        let mut order = Vec::with_capacity(declared.len());
        while order.len() < declared.len() {
            let Some(next) = declared
                .iter()
                .copied()
                .find(|kind| pending.get(kind) == Some(&0))
            else {
                return Err(LifecycleError::InvalidGraph("dependency cycle".into()));
            };
            pending.remove(&next);
            for node in by_kind.values() {
                let hits = node.depends_on.iter().filter(|d| d.on == next).count();
                if let Some(count) = pending.get_mut(&node.kind) {
                    *count -= hits;
                }
            }
            order.push(next);
        }

        Ok(Self {
            nodes: by_kind,
            order,
        })
    }

    /// The catalogue: base, tiers in priority order, combined view. The fuzzy
    /// tier is left out when disabled.
    pub fn standard(fuzzy_enabled: bool) -> Result<Self, LifecycleError> {
        use ArtifactKind::*;

        let mut nodes = vec![
            ArtifactNode {
                kind: FamiliesClean,
                depends_on: Vec::new(),
                optional: true,
            },
            ArtifactNode {
                kind: GeoExact,
                depends_on: vec![Dependency::required(FamiliesClean)],
                optional: true,
            },
            ArtifactNode {
                kind: GeoByAddress,
                depends_on: vec![
                    Dependency::required(FamiliesClean),
                    Dependency::required(GeoExact),
                ],
                optional: true,
            },
        ];
        let mut combined_deps = vec![
            Dependency::required(FamiliesClean),
            Dependency::required(GeoExact),
            Dependency::required(GeoByAddress),
        ];
        if fuzzy_enabled {
            nodes.push(ArtifactNode {
                kind: GeoFuzzy,
                depends_on: vec![
                    Dependency::required(FamiliesClean),
                    Dependency::required(GeoExact),
                    Dependency::required(GeoByAddress),
                ],
                optional: true,
            });
            combined_deps.push(Dependency::soft(GeoFuzzy));
        }
        nodes.push(ArtifactNode {
            kind: FamiliesTerritory,
            depends_on: combined_deps,
            optional: false,
        });

        Self::new(nodes)
    }

    pub fn node(&self, kind: ArtifactKind) -> Option<&ArtifactNode> {
        self.nodes.get(&kind)
    }

    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.nodes.contains_key(&kind)
    }

    /// Every artifact in build order.
    pub fn order(&self) -> &[ArtifactKind] {
        &self.order
    }

    /// `members` restricted to this graph, in build order.
    pub fn plan(&self, members: &[ArtifactKind]) -> Vec<ArtifactKind> {
        self.order
            .iter()
            .copied()
            .filter(|kind| members.contains(kind))
            .collect()
    }

    /// Artifacts derived from `kind`, directly or through others, in build
    /// order. `kind` itself is not included.
    pub fn dependents(&self, kind: ArtifactKind) -> Vec<ArtifactKind> {
        let mut derived = BTreeSet::from([kind]);
        for candidate in &self.order {
            let Some(node) = self.nodes.get(candidate) else {
                continue;
            };
            if node.depends_on.iter().any(|dep| derived.contains(&dep.on)) {
                derived.insert(*candidate);
            }
        }
        derived.remove(&kind);
        self.plan(&derived.into_iter().collect::<Vec<_>>())
    }

    /// Tier artifacts present in the graph, in priority order.
    pub fn tiers(&self) -> Vec<ArtifactKind> {
        self.order
            .iter()
            .copied()
            .filter(|kind| kind.tier().is_some())
            .collect()
    }
}

/// Named batch of artifacts refreshed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    All,
    /// The family base, every geo-matching artifact and the combined view.
    Geo,
    Base,
    Territory,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::All, Action::Geo, Action::Base, Action::Territory];

    pub fn name(self) -> &'static str {
        match self {
            Action::All => "all",
            Action::Geo => "geo",
            Action::Base => "base",
            Action::Territory => "territory",
        }
    }

    pub fn members(self) -> Vec<ArtifactKind> {
        use ArtifactKind::*;
        match self {
            Action::All => ArtifactKind::ALL.to_vec(),
            Action::Geo => vec![FamiliesClean, GeoExact, GeoByAddress, GeoFuzzy, FamiliesTerritory],
            Action::Base => vec![FamiliesClean],
            Action::Territory => vec![FamiliesTerritory],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.name() == s)
            .ok_or_else(|| LifecycleError::UnknownAction {
                action: s.to_string(),
                valid: Self::ALL.map(Action::name).join(", "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_order_follows_dependencies() {
        let graph = ArtifactGraph::standard(true).unwrap();
        assert_eq!(graph.order(), &ArtifactKind::ALL);
        assert_eq!(
            graph.tiers(),
            vec![
                ArtifactKind::GeoExact,
                ArtifactKind::GeoByAddress,
                ArtifactKind::GeoFuzzy
            ]
        );
    }

    #[test]
    fn dependents_are_transitive_and_ordered() {
        use ArtifactKind::*;
        let graph = ArtifactGraph::standard(true).unwrap();
        assert_eq!(
            graph.dependents(FamiliesClean),
            vec![GeoExact, GeoByAddress, GeoFuzzy, FamiliesTerritory]
        );
        assert_eq!(
            graph.dependents(GeoByAddress),
            vec![GeoFuzzy, FamiliesTerritory]
        );
        assert!(graph.dependents(FamiliesTerritory).is_empty());
    }

    #[test]
    fn disabled_fuzzy_tier_is_not_planned() {
        let graph = ArtifactGraph::standard(false).unwrap();
        assert!(!graph.contains(ArtifactKind::GeoFuzzy));
        assert_eq!(
            graph.plan(&Action::Geo.members()),
            vec![
                ArtifactKind::FamiliesClean,
                ArtifactKind::GeoExact,
                ArtifactKind::GeoByAddress,
                ArtifactKind::FamiliesTerritory
            ]
        );
    }

    #[test]
    fn declaration_order_yields_to_dependencies() {
        use ArtifactKind::*;
        let graph = ArtifactGraph::new(vec![
            ArtifactNode {
                kind: GeoExact,
                depends_on: vec![Dependency::required(FamiliesClean)],
                optional: true,
            },
            ArtifactNode {
                kind: FamiliesClean,
                depends_on: vec![],
                optional: true,
            },
        ])
        .unwrap();
        assert_eq!(graph.order(), &[FamiliesClean, GeoExact]);
    }

    #[test]
    fn cycles_and_dangling_edges_are_rejected() {
        use ArtifactKind::*;
        let cycle = ArtifactGraph::new(vec![
            ArtifactNode {
                kind: GeoExact,
                depends_on: vec![Dependency::required(GeoByAddress)],
                optional: true,
            },
            ArtifactNode {
                kind: GeoByAddress,
                depends_on: vec![Dependency::required(GeoExact)],
                optional: true,
            },
        ]);
        assert!(matches!(cycle, Err(LifecycleError::InvalidGraph(_))));

        let dangling = ArtifactGraph::new(vec![ArtifactNode {
            kind: GeoExact,
            depends_on: vec![Dependency::required(FamiliesClean)],
            optional: true,
        }]);
        assert!(matches!(dangling, Err(LifecycleError::InvalidGraph(_))));
    }

    #[test]
    fn names_parse_back() {
        for kind in ArtifactKind::ALL {
            assert_eq!(kind.name().parse::<ArtifactKind>().unwrap(), kind);
        }
        assert_eq!("geo".parse::<Action>().unwrap(), Action::Geo);

        let err = "everything".parse::<Action>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown action everything; valid actions: all, geo, base, territory"
        );
    }
}
