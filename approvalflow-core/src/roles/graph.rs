//! Role delegation graph
//!
//! Edges run `parent -> child`: the parent may act on behalf of the child.
//! The graph is kept acyclic. Readers work on an immutable snapshot; writers
//! validate against the authoritative snapshot under the write lock and
//! publish a replacement, so an authorization check never sees a half-applied
//! edge. Reachability sets are memoized per actor role and tagged with the
//! snapshot generation they were computed from.

use crate::error::{ApprovalError, Result};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

/// Immutable view of the edge set at one generation
#[derive(Debug, Default, Clone)]
struct GraphSnapshot {
    generation: u64,
    children: BTreeMap<String, BTreeSet<String>>,
}

impl GraphSnapshot {
    fn contains_edge(&self, parent: &str, child: &str) -> bool {
        self.children
            .get(parent)
            .is_some_and(|children| children.contains(child))
    }

    /// `Ok(true)` if `parent -> child` would be a new edge, `Ok(false)` if present
    fn admits(&self, parent: &str, child: &str) -> Result<bool> {
        if self.contains_edge(parent, child) {
            return Ok(false);
        }
        if parent == child || self.distance(child, parent).is_some() {
            return Err(ApprovalError::CycleDetected {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        Ok(true)
    }

    /// Every role reachable from `start`, `start` included (BFS)
    fn reachable_from(&self, start: &str) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();

        reachable.insert(start.to_string());
        queue.push_back(start.to_string());

        while let Some(role) = queue.pop_front() {
            if let Some(children) = self.children.get(&role) {
                for child in children {
                    if reachable.insert(child.clone()) {
                        queue.push_back(child.clone());
                    }
                }
            }
        }

        reachable
    }

    /// Number of edges on the shortest path `from -> to`
    fn distance(&self, from: &str, to: &str) -> Option<usize> {
        if from == to {
            return Some(0);
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(from);
        queue.push_back((from, 0usize));

        while let Some((role, hops)) = queue.pop_front() {
            if let Some(children) = self.children.get(role) {
                for child in children {
                    if child == to {
                        return Some(hops + 1);
                    }
                    if visited.insert(child.as_str()) {
                        queue.push_back((child.as_str(), hops + 1));
                    }
                }
            }
        }

        None
    }

    /// Longest delegation chain from any root down to `role`
    fn depth(&self, role: &str) -> u32 {
        let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (parent, children) in &self.children {
            for child in children {
                parents.entry(child.as_str()).or_default().push(parent.as_str());
            }
        }

        fn longest<'a>(
            role: &'a str,
            parents: &HashMap<&'a str, Vec<&'a str>>,
            memo: &mut HashMap<&'a str, u32>,
        ) -> u32 {
            if let Some(depth) = memo.get(role) {
                return *depth;
            }
            let depth = parents
                .get(role)
                .map(|ps| {
                    ps.iter()
                        .map(|p| longest(*p, parents, memo) + 1)
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            memo.insert(role, depth);
            depth
        }

        longest(role, &parents, &mut HashMap::new())
    }
}

/// Directed acyclic graph of role delegations
pub struct RoleGraph {
    snapshot: RwLock<Arc<GraphSnapshot>>,
    reach_cache: DashMap<String, (u64, Arc<HashSet<String>>)>,
}

impl Default for RoleGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleGraph {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(GraphSnapshot::default())),
            reach_cache: DashMap::new(),
        }
    }

    fn current(&self) -> Arc<GraphSnapshot> {
        // Snapshots are swapped whole, so a poisoned lock still guards a consistent value
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Insert `parent -> child`
    ///
    /// Returns `Ok(false)` when the edge already exists. Fails with
    /// `CycleDetected` when `child` already reaches `parent`, leaving the graph
    /// untouched.
    pub fn add_edge(&self, parent: &str, child: &str) -> Result<bool> {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match guard.admits(parent, child) {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) => {
                tracing::warn!(parent, child, "Rejected role delegation that closes a cycle");
                return Err(e);
            }
        }

        let mut next = GraphSnapshot::clone(&guard);
        next.generation += 1;
        next.children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        *guard = Arc::new(next);
        drop(guard);

        self.reach_cache.clear();
        tracing::debug!(parent, child, "Role delegation added");
        Ok(true)
    }

    /// Remove `parent -> child`; returns whether the edge existed
    pub fn remove_edge(&self, parent: &str, child: &str) -> bool {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if !guard.contains_edge(parent, child) {
            return false;
        }

        let mut next = GraphSnapshot::clone(&guard);
        next.generation += 1;
        if let Some(children) = next.children.get_mut(parent) {
            children.remove(child);
            if children.is_empty() {
                next.children.remove(parent);
            }
        }
        *guard = Arc::new(next);
        drop(guard);

        self.reach_cache.clear();
        true
    }

    /// Drop every edge touching `role`; returns the removed edges
    pub fn remove_role(&self, role: &str) -> Vec<(String, String)> {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let removed: Vec<(String, String)> = guard
            .children
            .iter()
            .flat_map(|(parent, children)| {
                children
                    .iter()
                    .filter(move |child| parent == role || *child == role)
                    .map(move |child| (parent.clone(), child.clone()))
            })
            .collect();

        if removed.is_empty() {
            return removed;
        }

        let mut next = GraphSnapshot::clone(&guard);
        next.generation += 1;
        next.children.remove(role);
        for children in next.children.values_mut() {
            children.remove(role);
        }
        next.children.retain(|_, children| !children.is_empty());
        *guard = Arc::new(next);
        drop(guard);

        self.reach_cache.clear();
        removed
    }

    pub fn contains_edge(&self, parent: &str, child: &str) -> bool {
        self.current().contains_edge(parent, child)
    }

    /// Dry run of `add_edge` against the current snapshot; publishes nothing
    pub fn check_edge(&self, parent: &str, child: &str) -> Result<bool> {
        self.current().admits(parent, child)
    }

    /// All edges as `(parent, child)` pairs, sorted
    pub fn edges(&self) -> Vec<(String, String)> {
        self.current()
            .children
            .iter()
            .flat_map(|(parent, children)| {
                children
                    .iter()
                    .map(move |child| (parent.clone(), child.clone()))
            })
            .collect()
    }

    /// Roles the actor may act for, itself included
    pub fn satisfiable_roles(&self, actor_role: &str) -> Arc<HashSet<String>> {
        let snapshot = self.current();

        if let Some(entry) = self.reach_cache.get(actor_role) {
            let (generation, roles) = entry.value();
            if *generation == snapshot.generation {
                return roles.clone();
            }
        }

        let roles = Arc::new(snapshot.reachable_from(actor_role));
        self.reach_cache.insert(
            actor_role.to_string(),
            (snapshot.generation, roles.clone()),
        );
        roles
    }

    /// True iff `actor_role == required_role` or `required_role` is reachable from `actor_role`
    pub fn can_satisfy(&self, actor_role: &str, required_role: &str) -> bool {
        actor_role == required_role || self.satisfiable_roles(actor_role).contains(required_role)
    }

    pub fn distance(&self, ancestor: &str, descendant: &str) -> Option<usize> {
        self.current().distance(ancestor, descendant)
    }

    /// Longest delegation chain from a root role down to `role`
    pub fn depth(&self, role: &str) -> u32 {
        self.current().depth(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estates_graph() -> RoleGraph {
        let graph = RoleGraph::new();
        graph.add_edge("Admin", "PropertyManager").unwrap();
        graph.add_edge("PropertyManager", "EstatesOfficer").unwrap();
        graph
    }

    #[test]
    fn test_can_satisfy_through_chain() {
        let graph = estates_graph();

        assert!(graph.can_satisfy("Admin", "EstatesOfficer"));
        assert!(graph.can_satisfy("PropertyManager", "EstatesOfficer"));
        assert!(!graph.can_satisfy("EstatesOfficer", "Admin"));
        assert!(!graph.can_satisfy("EstatesOfficer", "PropertyManager"));
    }

    #[test]
    fn test_role_satisfies_itself_even_when_unknown() {
        let graph = RoleGraph::new();
        assert!(graph.can_satisfy("Auditor", "Auditor"));
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let graph = estates_graph();
        let before = graph.edges();

        let err = graph.add_edge("EstatesOfficer", "Admin").unwrap_err();
        assert!(matches!(err, ApprovalError::CycleDetected { .. }));
        assert_eq!(graph.edges(), before);
        assert!(!graph.can_satisfy("EstatesOfficer", "Admin"));
    }

    #[test]
    fn test_check_edge_publishes_nothing() {
        let graph = estates_graph();

        assert!(graph.check_edge("EstatesOfficer", "Caretaker").unwrap());
        assert!(!graph.can_satisfy("EstatesOfficer", "Caretaker"));
        assert!(!graph.check_edge("Admin", "PropertyManager").unwrap());
        assert!(matches!(
            graph.check_edge("EstatesOfficer", "Admin"),
            Err(ApprovalError::CycleDetected { .. })
        ));
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let graph = RoleGraph::new();
        assert!(graph.add_edge("Admin", "Admin").is_err());
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let graph = estates_graph();
        assert!(!graph.add_edge("Admin", "PropertyManager").unwrap());
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn test_cache_invalidated_by_mutation() {
        let graph = estates_graph();
        assert!(!graph.can_satisfy("EstatesOfficer", "Clerk"));

        graph.add_edge("EstatesOfficer", "Clerk").unwrap();
        assert!(graph.can_satisfy("EstatesOfficer", "Clerk"));
        assert!(graph.can_satisfy("Admin", "Clerk"));

        assert!(graph.remove_edge("PropertyManager", "EstatesOfficer"));
        assert!(!graph.can_satisfy("Admin", "Clerk"));
        assert!(!graph.can_satisfy("Admin", "EstatesOfficer"));
    }

    #[test]
    fn test_remove_role_drops_incident_edges() {
        let graph = estates_graph();
        let removed = graph.remove_role("PropertyManager");

        assert_eq!(removed.len(), 2);
        assert!(graph.edges().is_empty());
        assert!(!graph.can_satisfy("Admin", "EstatesOfficer"));
    }

    #[test]
    fn test_distance_and_depth() {
        let graph = estates_graph();
        graph.add_edge("Admin", "EstatesOfficer").unwrap();

        assert_eq!(graph.distance("Admin", "EstatesOfficer"), Some(1));
        assert_eq!(graph.distance("EstatesOfficer", "Admin"), None);
        assert_eq!(graph.depth("Admin"), 0);
        assert_eq!(graph.depth("EstatesOfficer"), 2);
    }

    #[test]
    fn test_concurrent_opposite_edges_admit_at_most_one() {
        let graph = RoleGraph::new();

        let results: Vec<Result<bool>> = std::thread::scope(|s| {
            let a = s.spawn(|| graph.add_edge("Finance", "Billing"));
            let b = s.spawn(|| graph.add_edge("Billing", "Finance"));
            vec![a.join().unwrap(), b.join().unwrap()]
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(graph.edges().len(), 1);
    }
}
