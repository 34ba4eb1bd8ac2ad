//! In-memory topology graph
//!
//! Enumerates every shortest (hop-count) path between two devices, which
//! is the candidate set handed to [`crate::PathSelector`].

use osdf_common::{DeviceId, Link, Path, TopologyService};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// Upper bound on enumerated candidates per query
const MAX_CANDIDATES: usize = 64;

/// Directed link graph keyed by source device
#[derive(Debug, Default)]
pub struct TopologyGraph {
    adjacency: RwLock<HashMap<DeviceId, Vec<Link>>>,
}

impl TopologyGraph {
    /// Create empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directed link (ignored if already present)
    pub fn add_link(&self, link: Link) {
        let mut adjacency = self.adjacency.write();
        let out = adjacency.entry(link.src.device_id.clone()).or_default();
        if !out.contains(&link) {
            out.push(link);
        }
    }

    /// Add a link in both directions
    pub fn add_bidirectional(&self, link: Link) {
        let reverse = link.reversed();
        self.add_link(link);
        self.add_link(reverse);
    }

    /// Drop a directed link
    pub fn remove_link(&self, link: &Link) {
        if let Some(out) = self.adjacency.write().get_mut(&link.src.device_id) {
            out.retain(|l| l != link);
        }
    }

    /// Number of directed links
    pub fn link_count(&self) -> usize {
        self.adjacency.read().values().map(Vec::len).sum()
    }

    /// All shortest paths from `src` to `dst`, in link insertion order
    pub fn shortest_paths(&self, src: &DeviceId, dst: &DeviceId) -> Vec<Path> {
        if src == dst {
            return Vec::new();
        }
        let adjacency = self.adjacency.read();

        // BFS hop distances from src
        let mut dist: HashMap<&DeviceId, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        dist.insert(src, 0);
        queue.push_back(src);
        while let Some(dev) = queue.pop_front() {
            let d = dist[dev];
            for link in adjacency.get(dev).into_iter().flatten() {
                let next = &link.dst.device_id;
                if !dist.contains_key(next) {
                    dist.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }

        let Some(&target) = dist.get(dst) else {
            return Vec::new();
        };

        let mut paths = Vec::new();
        let mut stack: Vec<Link> = Vec::with_capacity(target);
        Self::walk(&adjacency, &dist, src, dst, target, &mut stack, &mut paths);
        paths
    }

    fn walk(
        adjacency: &HashMap<DeviceId, Vec<Link>>,
        dist: &HashMap<&DeviceId, usize>,
        at: &DeviceId,
        dst: &DeviceId,
        target: usize,
        stack: &mut Vec<Link>,
        paths: &mut Vec<Path>,
    ) {
        if paths.len() >= MAX_CANDIDATES {
            return;
        }
        if at == dst {
            paths.push(Path::new(stack.clone()));
            return;
        }
        if stack.len() >= target {
            return;
        }
        for link in adjacency.get(at).into_iter().flatten() {
            let next = &link.dst.device_id;
            if dist.get(next) == Some(&(stack.len() + 1)) {
                stack.push(link.clone());
                Self::walk(adjacency, dist, next, dst, target, stack, paths);
                stack.pop();
            }
        }
    }
}

impl TopologyService for TopologyGraph {
    fn paths(&self, src: &DeviceId, dst: &DeviceId) -> Vec<Path> {
        self.shortest_paths(src, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osdf_common::ConnectPoint;

    fn link(a: &str, ap: u32, b: &str, bp: u32) -> Link {
        Link::new(ConnectPoint::new(a, ap), ConnectPoint::new(b, bp))
    }

    /// Leaf-spine: l1, l2 leaves; s1, s2 spines
    fn leaf_spine() -> TopologyGraph {
        let graph = TopologyGraph::new();
        graph.add_bidirectional(link("l1", 1, "s1", 1));
        graph.add_bidirectional(link("l1", 2, "s2", 1));
        graph.add_bidirectional(link("l2", 1, "s1", 2));
        graph.add_bidirectional(link("l2", 2, "s2", 2));
        graph
    }

    #[test]
    fn test_enumerates_equal_cost_paths() {
        let graph = leaf_spine();
        assert_eq!(graph.link_count(), 8);

        let paths = graph.paths(&DeviceId::new("l1"), &DeviceId::new("l2"));
        assert_eq!(paths.len(), 2);
        for p in &paths {
            assert_eq!(p.len(), 2);
            assert_eq!(p.src().unwrap().device_id, DeviceId::new("l1"));
            assert_eq!(p.dst().unwrap().device_id, DeviceId::new("l2"));
        }
        assert_eq!(paths[0].links[0], link("l1", 1, "s1", 1));
        assert_eq!(paths[1].links[0], link("l1", 2, "s2", 1));
    }

    #[test]
    fn test_only_shortest_paths() {
        let graph = leaf_spine();
        graph.add_bidirectional(link("l1", 9, "l2", 9));
        let paths = graph.paths(&DeviceId::new("l1"), &DeviceId::new("l2"));
        assert_eq!(paths, vec![Path::new(vec![link("l1", 9, "l2", 9)])]);
    }

    #[test]
    fn test_unreachable_and_same_device() {
        let graph = leaf_spine();
        assert!(graph.paths(&DeviceId::new("l1"), &DeviceId::new("x")).is_empty());
        assert!(graph.paths(&DeviceId::new("l1"), &DeviceId::new("l1")).is_empty());

        graph.remove_link(&link("l1", 1, "s1", 1));
        graph.remove_link(&link("l1", 2, "s2", 1));
        assert!(graph.paths(&DeviceId::new("l1"), &DeviceId::new("l2")).is_empty());
    }
}
