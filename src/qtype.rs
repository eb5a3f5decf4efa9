//! QType and the rule type-set membership test (spec §3, §4.2).

use hickory_proto::rr::RecordType;
use std::collections::HashSet;

/// One of the standard DNS record type enumerants, or the pseudo-type
/// `ANY`. Re-uses `hickory_proto`'s `RecordType`, which already carries an
/// `ANY` variant for QTYPE=255 — the wire codec collaborator's type, kept
/// as the core's type too so no translation layer is needed at the
/// decode boundary.
pub type QType = RecordType;

/// A rule's declared set of matching types. `All` is the symbolic
/// `ALL_CTYPES` set from the design ("every handleable type"); `Some`
/// additionally treats a set containing `ANY` as matching every type, per
/// spec §3's membership test.
#[derive(Debug, Clone)]
pub enum TypeSet {
    Some(HashSet<QType>),
    All,
}

impl TypeSet {
    pub fn all() -> Self {
        TypeSet::All
    }

    pub fn of(types: impl IntoIterator<Item = QType>) -> Self {
        TypeSet::Some(types.into_iter().collect())
    }

    pub fn single(t: QType) -> Self {
        Self::of([t])
    }

    /// `T ∈ rule.types or ANY ∈ rule.types or rule.types = ALL_CTYPES`.
    pub fn contains(&self, t: QType) -> bool {
        match self {
            TypeSet::All => true,
            TypeSet::Some(set) => set.contains(&t) || set.contains(&QType::ANY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ctypes_matches_everything() {
        let set = TypeSet::all();
        assert!(set.contains(QType::A));
        assert!(set.contains(QType::TXT));
    }

    #[test]
    fn any_member_matches_everything() {
        let set = TypeSet::of([QType::ANY]);
        assert!(set.contains(QType::A));
        assert!(set.contains(QType::MX));
    }

    #[test]
    fn explicit_set_matches_only_its_members() {
        let set = TypeSet::of([QType::A, QType::AAAA]);
        assert!(set.contains(QType::A));
        assert!(set.contains(QType::AAAA));
        assert!(!set.contains(QType::TXT));
    }
}
