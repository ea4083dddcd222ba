use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

/// Lowest height each network's nodes still serve, as learned from pruning
/// errors during this session. Later scans consult it instead of probing
/// heights already known to be gone.
#[derive(Debug, Default)]
pub struct PruningBoundaries {
    lowest: RwLock<HashMap<String, u64>>,
}

impl PruningBoundaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `lowest` for `network`. Boundaries only move up.
    pub fn record(&self, network: &str, lowest: u64) {
        let mut map = self.lowest.write().unwrap_or_else(|e| e.into_inner());
        let entry = map.entry(network.to_string()).or_insert(0);
        if lowest > *entry {
            *entry = lowest;
            info!(network, lowest_available = lowest, "recorded pruning boundary");
        }
    }

    pub fn lowest(&self, network: &str) -> Option<u64> {
        let map = self.lowest.read().unwrap_or_else(|e| e.into_inner());
        map.get(network).copied()
    }

    /// Whether `height` is known to be below the boundary.
    pub fn is_pruned(&self, network: &str, height: u64) -> bool {
        self.lowest(network).is_some_and(|l| height < l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_only_moves_up() {
        let b = PruningBoundaries::new();
        assert!(!b.is_pruned("bbn", 1));
        b.record("bbn", 920);
        b.record("bbn", 500);
        assert_eq!(b.lowest("bbn"), Some(920));
        assert!(b.is_pruned("bbn", 919));
        assert!(!b.is_pruned("bbn", 920));
        assert_eq!(b.lowest("other"), None);
    }
}
