//! Unique identifiers for Weft entities.
//!
//! Strongly-typed UUID identifiers built on [`domain-key`](https://crates.io/crates/domain-key)
//! `Uuid<D>` wrappers. Each identifier type is parameterized by a unique
//! domain marker, so mixing two id types is a compile error rather than a
//! runtime surprise.
//!
//! All ID types are `Copy` (16 bytes, stack-allocated) and support:
//! - `v4()` for random UUID generation
//! - `nil()` for zero-valued default
//! - `parse(&str)` for string parsing
//! - Full serde support (serializes as UUID string)
//! - `Display`, `FromStr`, `Eq`, `Ord`, `Hash`

use domain_key::define_uuid;

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

// Entity identifiers — UUID-based, Copy, 16 bytes each
define_uuid!(pub ExecutionIdDomain => ExecutionId);
define_uuid!(pub WorkflowIdDomain => WorkflowId);
define_uuid!(pub NodeIdDomain => NodeId);
define_uuid!(pub UserIdDomain => UserId);
define_uuid!(pub InteractionIdDomain => InteractionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_v4_creates_non_nil_uuid() {
        let id = ExecutionId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn workflow_id_v4_creates_non_nil_uuid() {
        let id = WorkflowId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn node_id_v4_creates_non_nil_uuid() {
        let id = NodeId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn interaction_id_v4_creates_non_nil_uuid() {
        let id = InteractionId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn id_nil_creates_zero_valued_uuid() {
        let id = NodeId::nil();
        assert!(id.is_nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn id_parse_valid_uuid_string_succeeds() {
        let id = NodeId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(!id.is_nil());
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn id_parse_invalid_string_returns_error() {
        let result = NodeId::parse("not-a-uuid");
        assert!(result.is_err());
    }

    #[test]
    fn id_copy_semantics_both_copies_usable() {
        let id1 = ExecutionId::v4();
        let id2 = id1; // Copy, not move
        assert_eq!(id1, id2);
    }

    #[test]
    fn id_serde_json_roundtrip() {
        let id = WorkflowId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: WorkflowId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn id_ordering_is_consistent() {
        let a = NodeId::nil();
        let b = NodeId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(a < b);
    }

    #[test]
    fn id_hash_is_consistent() {
        use std::collections::HashSet;
        let id = ExecutionId::v4();
        let mut set = HashSet::new();
        set.insert(id);
        assert!(set.contains(&id));
    }

    #[test]
    fn different_id_types_are_incompatible() {
        // ExecutionId and NodeId are distinct types — passing one where the
        // other is expected would be a compile error.
        fn accepts_execution(_id: ExecutionId) {}
        fn accepts_node(_id: NodeId) {}

        accepts_execution(ExecutionId::v4());
        accepts_node(NodeId::v4());
        // accepts_execution(NodeId::v4()); // Would not compile
    }
}
