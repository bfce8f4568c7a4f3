//! Topology membership: who an agent's peers are, and who a leader is.
//!
//! The coordinator is the only thing that ever mutates a `Topology`; agents
//! observe it through the message bus's routing decisions.

use std::collections::HashMap;

use crate::agents::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Hierarchical,
    Mesh,
    Ring,
    Star,
    HierarchicalMesh,
    Adaptive,
}

impl TopologyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hierarchical => "hierarchical",
            Self::Mesh => "mesh",
            Self::Ring => "ring",
            Self::Star => "star",
            Self::HierarchicalMesh => "hierarchical-mesh",
            Self::Adaptive => "adaptive",
        }
    }

    #[must_use]
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "hierarchical" => Some(Self::Hierarchical),
            "mesh" => Some(Self::Mesh),
            "ring" => Some(Self::Ring),
            "star" => Some(Self::Star),
            "hierarchical-mesh" => Some(Self::HierarchicalMesh),
            "adaptive" => Some(Self::Adaptive),
            _ => None,
        }
    }
}

/// Membership and routing state for one topology instance.
///
/// `members` is kept in insertion order; for `Ring` that order defines
/// next-hop neighbours, for `Hierarchical`/`HierarchicalMesh` the first
/// member is the root unless `parents` says otherwise.
#[derive(Debug)]
pub struct Topology {
    kind: TopologyKind,
    members: Vec<AgentId>,
    parents: HashMap<AgentId, AgentId>,
    leader: Option<AgentId>,
}

impl Topology {
    #[must_use]
    pub fn new(kind: TopologyKind) -> Self {
        Self { kind, members: Vec::new(), parents: HashMap::new(), leader: None }
    }

    #[must_use]
    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    /// Swap the routing strategy in place (used by adaptive-topology
    /// switches); membership carries over, parent edges do not.
    pub fn set_kind(&mut self, kind: TopologyKind) {
        self.kind = kind;
        self.parents.clear();
    }

    #[must_use]
    pub fn members(&self) -> &[AgentId] {
        &self.members
    }

    #[must_use]
    pub fn leader(&self) -> Option<&AgentId> {
        self.leader.as_ref()
    }

    /// Add a member. If this is the first member, it also becomes leader.
    /// Returns `true` if a (re-)election happened.
    pub fn add_member(&mut self, id: AgentId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        self.members.push(id);
        if self.leader.is_none() {
            self.elect_leader()
        } else {
            false
        }
    }

    pub fn set_parent(&mut self, child: AgentId, parent: AgentId) {
        self.parents.insert(child, parent);
    }

    /// Remove a member. If it was the leader, a new one is elected
    /// deterministically from the remaining membership. Returns `true` if a
    /// re-election happened.
    pub fn remove_member(&mut self, id: &AgentId) -> bool {
        self.members.retain(|m| m != id);
        self.parents.retain(|child, parent| child != id && parent != id);
        if self.leader.as_ref() == Some(id) {
            self.leader = None;
            self.elect_leader()
        } else {
            false
        }
    }

    /// Deterministic: the lexicographically smallest remaining member id.
    fn elect_leader(&mut self) -> bool {
        let new_leader = self.members.iter().min().cloned();
        let changed = new_leader != self.leader;
        self.leader = new_leader;
        changed
    }

    /// Direct recipients of a broadcast sent by `from`, per the topology's
    /// fan-out rule. Mesh and star fan out to every other member directly;
    /// hierarchical variants fan out to `from`'s declared children; ring
    /// hands off to the single next hop (a receiving agent is expected to
    /// keep relaying a broadcast it did not originate — full multi-hop
    /// propagation is the message bus's concern, not the topology's).
    #[must_use]
    pub fn broadcast_targets(&self, from: &AgentId) -> Vec<AgentId> {
        match self.kind {
            TopologyKind::Mesh | TopologyKind::Star | TopologyKind::Adaptive => {
                self.members.iter().filter(|m| *m != from).cloned().collect()
            }
            TopologyKind::Hierarchical | TopologyKind::HierarchicalMesh => self
                .parents
                .iter()
                .filter(|(_, parent)| *parent == from)
                .map(|(child, _)| child.clone())
                .collect(),
            TopologyKind::Ring => {
                let Some(pos) = self.members.iter().position(|m| m == from) else {
                    return Vec::new();
                };
                let next = (pos + 1) % self.members.len();
                if next == pos {
                    Vec::new()
                } else {
                    vec![self.members[next].clone()]
                }
            }
        }
    }
}

/// Strategy deciding whether sustained unhealthy signals should replace an
/// `adaptive` topology's effective routing strategy.
pub trait TopologyAdaptationPolicy: Send + Sync {
    /// Given the number of consecutive unhealthy overall health transitions
    /// observed, return the topology kind to switch to, if any.
    fn should_adapt(&self, consecutive_unhealthy: u32) -> Option<TopologyKind>;
}

/// Falls back to `mesh` (maximal direct connectivity, no leader
/// single-point-of-failure) after `threshold` consecutive unhealthy
/// transitions.
pub struct ConsecutiveUnhealthyPolicy {
    pub threshold: u32,
    pub fallback: TopologyKind,
}

impl Default for ConsecutiveUnhealthyPolicy {
    fn default() -> Self {
        Self { threshold: 3, fallback: TopologyKind::Mesh }
    }
}

impl TopologyAdaptationPolicy for ConsecutiveUnhealthyPolicy {
    fn should_adapt(&self, consecutive_unhealthy: u32) -> Option<TopologyKind> {
        if consecutive_unhealthy >= self.threshold {
            Some(self.fallback)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(id: &str) -> AgentId {
        AgentId::from(id)
    }

    #[test]
    fn first_member_becomes_leader() {
        let mut t = Topology::new(TopologyKind::Mesh);
        t.add_member(a("a1"));
        assert_eq!(t.leader(), Some(&a("a1")));
    }

    #[test]
    fn leader_departure_triggers_deterministic_reelection() {
        let mut t = Topology::new(TopologyKind::Mesh);
        t.add_member(a("b"));
        t.add_member(a("a"));
        assert_eq!(t.leader(), Some(&a("a")));
        t.remove_member(&a("a"));
        assert_eq!(t.leader(), Some(&a("b")));
    }

    #[test]
    fn mesh_broadcasts_directly_to_every_other_member() {
        let mut t = Topology::new(TopologyKind::Mesh);
        t.add_member(a("1"));
        t.add_member(a("2"));
        t.add_member(a("3"));
        let targets = t.broadcast_targets(&a("1"));
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&a("2")));
        assert!(targets.contains(&a("3")));
    }

    #[test]
    fn ring_hands_off_to_single_next_hop() {
        let mut t = Topology::new(TopologyKind::Ring);
        t.add_member(a("1"));
        t.add_member(a("2"));
        t.add_member(a("3"));
        assert_eq!(t.broadcast_targets(&a("1")), vec![a("2")]);
        assert_eq!(t.broadcast_targets(&a("3")), vec![a("1")]);
    }

    #[test]
    fn hierarchical_broadcasts_only_to_declared_children() {
        let mut t = Topology::new(TopologyKind::Hierarchical);
        t.add_member(a("root"));
        t.add_member(a("child1"));
        t.add_member(a("child2"));
        t.set_parent(a("child1"), a("root"));
        t.set_parent(a("child2"), a("root"));
        let mut targets = t.broadcast_targets(&a("root"));
        targets.sort();
        assert_eq!(targets, vec![a("child1"), a("child2")]);
        assert!(t.broadcast_targets(&a("child1")).is_empty());
    }

    #[test]
    fn topology_kind_round_trips_through_its_string_form() {
        for kind in [
            TopologyKind::Hierarchical,
            TopologyKind::Mesh,
            TopologyKind::Ring,
            TopologyKind::Star,
            TopologyKind::HierarchicalMesh,
            TopologyKind::Adaptive,
        ] {
            assert_eq!(TopologyKind::parse_str(kind.as_str()), Some(kind));
        }
        assert_eq!(TopologyKind::parse_str("bogus"), None);
    }

    #[test]
    fn adaptation_policy_triggers_at_threshold() {
        let policy = ConsecutiveUnhealthyPolicy::default();
        assert_eq!(policy.should_adapt(2), None);
        assert_eq!(policy.should_adapt(3), Some(TopologyKind::Mesh));
    }
}
