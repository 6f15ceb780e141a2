//! Cache usage counters.

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from memory.
    pub hits: u64,
    /// Reads that had to consult the persistent store.
    pub misses: u64,
    /// Misses that found and decoded a persistent entry.
    pub lazy_loads: u64,
    /// Successful `set` calls.
    pub writes: u64,
    /// Successful `unset` calls plus keys removed by `clear`.
    pub removals: u64,
    /// Change notifications applied to memory.
    pub notifications_applied: u64,
    /// Change notifications whose value failed to decode.
    pub notifications_rejected: u64,
    /// Times memory was dropped after missed notifications.
    pub resyncs: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

