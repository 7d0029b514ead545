//! Synthetic identifier derivation
//!
//! Entities without a native Kubernetes UID (clusters, namespaces created
//! lazily, objects ingested from manifests) get a deterministic identifier
//! hashed from their descriptive parameters. The same inputs always produce
//! the same identifier, so repeated lookups converge on the same node.

/// Derive a stable UID from an ordered sequence of string parameters.
///
/// The parts are joined with `-`, md5-hashed, and the 32 hex characters are
/// formatted as the familiar 8-4-4-4-12 layout. Real resource UIDs are never
/// passed through here.
pub fn to_uid(parts: &[&str]) -> String {
    let digest = md5::compute(parts.join("-").as_bytes());
    let hex = format!("{digest:x}");

    format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_uid_is_deterministic() {
        let a = to_uid(&["Cluster", "production"]);
        let b = to_uid(&["Cluster", "production"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_to_uid_depends_on_order_and_values() {
        let a = to_uid(&["Cluster", "production"]);
        let b = to_uid(&["production", "Cluster"]);
        let c = to_uid(&["Cluster", "staging"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_to_uid_layout() {
        let uid = to_uid(&["Namespace", "prod", "default"]);
        let groups: Vec<&str> = uid.split('-').collect();
        assert_eq!(groups.len(), 5);
        let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(lengths, vec![8, 4, 4, 4, 12]);
        assert!(uid.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }
}
