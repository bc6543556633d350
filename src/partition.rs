//! Versioned partition naming.
//!
//! Partitions are named `"{logical}-v{N}"`. On a version bump the engine
//! deletes every partition whose logical name matches the current set but
//! whose version does not, so an upgrade atomically replaces old content.

/// Logical name of the partition holding precached build assets.
pub const STATIC_PARTITION: &str = "static";

/// Logical name of the partition holding runtime API responses.
pub const DYNAMIC_PARTITION: &str = "dynamic";

/// Build a versioned partition name: `partition_name("static", 2)` → `"static-v2"`.
pub fn partition_name(logical: &str, version: u32) -> String {
    format!("{}-v{}", logical, version)
}

/// Split a versioned partition name into its logical name and version.
///
/// Returns `None` for names that do not follow the `"{logical}-v{N}"` scheme.
pub fn parse_partition_name(name: &str) -> Option<(&str, u32)> {
    let (logical, version) = name.rsplit_once("-v")?;
    if logical.is_empty() {
        return None;
    }
    version.parse().ok().map(|v| (logical, v))
}

/// The set of partitions a given engine version owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionSet {
    version: u32,
}

impl PartitionSet {
    pub fn new(version: u32) -> Self {
        PartitionSet { version }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Name of this version's static partition.
    pub fn static_partition(&self) -> String {
        partition_name(STATIC_PARTITION, self.version)
    }

    /// Name of this version's dynamic partition.
    pub fn dynamic_partition(&self) -> String {
        partition_name(DYNAMIC_PARTITION, self.version)
    }

    /// Whether `name` belongs to the current versioned set.
    pub fn contains(&self, name: &str) -> bool {
        name == self.static_partition() || name == self.dynamic_partition()
    }

    /// Whether `name` is an older (or newer) version of one of our logical
    /// partitions and should be evicted during activation.
    ///
    /// Partitions with unrelated logical names are left alone.
    pub fn is_stale(&self, name: &str) -> bool {
        match parse_partition_name(name) {
            Some((logical, version)) => {
                (logical == STATIC_PARTITION || logical == DYNAMIC_PARTITION)
                    && version != self.version
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_name() {
        assert_eq!(partition_name("static", 2), "static-v2");
        assert_eq!(partition_name("dynamic", 13), "dynamic-v13");
    }

    #[test]
    fn test_parse_partition_name() {
        assert_eq!(parse_partition_name("static-v2"), Some(("static", 2)));
        assert_eq!(parse_partition_name("dynamic-v10"), Some(("dynamic", 10)));
        assert_eq!(parse_partition_name("no-version"), None);
        assert_eq!(parse_partition_name("-v3"), None);
    }

    #[test]
    fn test_partition_set_names() {
        let set = PartitionSet::new(2);
        assert_eq!(set.static_partition(), "static-v2");
        assert_eq!(set.dynamic_partition(), "dynamic-v2");
        assert!(set.contains("static-v2"));
        assert!(!set.contains("static-v1"));
    }

    #[test]
    fn test_partition_set_staleness() {
        let set = PartitionSet::new(2);
        assert!(set.is_stale("static-v1"));
        assert!(set.is_stale("dynamic-v3"));
        assert!(!set.is_stale("static-v2"));
        // unrelated partitions are not ours to delete
        assert!(!set.is_stale("thumbnails-v1"));
        assert!(!set.is_stale("garbage"));
    }
}
