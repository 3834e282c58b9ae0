//! Deterministic logical ids derived from construct paths.
//!
//! A construct at path `MyVpc/PublicSubnet1/Subnet` becomes
//! `MyVpcPublicSubnet1Subnet` followed by eight hex digits of the path's
//! SHA-256 digest. The human-readable part keeps ids legible in diffs; the
//! digest keeps paths that collapse to the same characters distinct.

use ecsynth_common::types::LogicalId;
use sha2::{Digest, Sha256};

/// Path components dropped from the human-readable part.
const HIDDEN_COMPONENTS: [&str; 2] = ["Resource", "Default"];

/// Maximum length of the human-readable part.
const MAX_HUMAN_LEN: usize = 240;

/// Number of hex digits of the digest appended to every id.
const HASH_LEN: usize = 8;

/// Computes the logical id of the construct at `path`.
#[must_use]
pub fn from_path(path: &[&str]) -> LogicalId {
    let human: String = path
        .iter()
        .copied()
        .filter(|component| !HIDDEN_COMPONENTS.contains(component))
        .flat_map(|component| component.chars())
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_HUMAN_LEN)
        .collect();
    LogicalId::new(format!("{human}{}", path_hash(path)))
}

fn path_hash(path: &[&str]) -> String {
    let digest = Sha256::digest(path.join("/").as_bytes());
    digest
        .iter()
        .take(HASH_LEN / 2)
        .map(|byte| format!("{byte:02X}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_across_calls() {
        let a = from_path(&["MyVpc", "Resource"]);
        let b = from_path(&["MyVpc", "Resource"]);
        assert_eq!(a, b);
    }

    #[test]
    fn resource_component_is_hidden_but_hashed() {
        let with = from_path(&["MyVpc", "Resource"]);
        let without = from_path(&["MyVpc"]);
        assert!(with.as_str().starts_with("MyVpc"));
        assert!(without.as_str().starts_with("MyVpc"));
        assert_eq!(with.as_str().len(), "MyVpc".len() + HASH_LEN);
        assert_ne!(with, without);
    }

    #[test]
    fn non_alphanumeric_characters_are_stripped() {
        let id = from_path(&["LB", "SecurityGroup", "from 0.0.0.0/0:80"]);
        assert!(id.as_str().starts_with("LBSecurityGroupfrom0000080"));
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn colliding_human_parts_get_distinct_hashes() {
        let a = from_path(&["A", "BC"]);
        let b = from_path(&["AB", "C"]);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_suffix_is_uppercase_hex() {
        let id = from_path(&["Ec2Cluster"]);
        let suffix = &id.as_str()["Ec2Cluster".len()..];
        assert_eq!(suffix.len(), HASH_LEN);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }
}
