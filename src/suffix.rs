//! The shipped [`crate::name::SuffixResolver`] implementation, built on the
//! `psl` crate's compiled public suffix list (see
//! `other_examples/manifests/KumoCorp-kumomta/Cargo.toml` for prior art of
//! this crate inside the retrieval pack). No network access or file
//! loading: the list is baked into the binary at `psl`'s build time.

use crate::name::{Name, SuffixResolver};

#[derive(Debug, Default, Clone, Copy)]
pub struct PslSuffixResolver;

impl PslSuffixResolver {
    pub fn new() -> Self {
        Self
    }
}

impl SuffixResolver for PslSuffixResolver {
    fn base_domain(&self, name: &Name) -> Option<Name> {
        if name.is_root() {
            return None;
        }

        let canonical = name.to_canonical_string();

        // `psl`'s default "*" rule would otherwise treat any unlisted TLD
        // as its own public suffix (so e.g. `.internal` would register one
        // label *plus* `internal`). The design wants non-public suffixes
        // to resolve to just their last label, so check `is_known()`
        // before trusting the computed domain.
        let suffix = psl::suffix(canonical.as_bytes());
        let is_known_public_suffix = suffix.map(|s| s.is_known()).unwrap_or(false);

        if is_known_public_suffix {
            if let Some(domain) = psl::domain(canonical.as_bytes()) {
                let text = std::str::from_utf8(domain.as_bytes()).ok()?;
                return Name::parse(text).ok();
            }
        }

        // Non-public suffix (e.g. `.local`, `.internal`): fall back to the
        // last label only, per spec.
        name.labels().last().cloned().map(|last| Name::from_labels([last]))
    }
}
