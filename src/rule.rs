//! The rule matcher (C2, spec §3, §4.2): the four name-pattern variants,
//! wrapped with a type set, case-sensitivity flag, and a body that is
//! either a handler or a nested container (spec §4.3's `Container` rule
//! variant / `mount`).

use crate::container::Container;
use crate::error::ConfigurationError;
use crate::glob::WildcardPattern;
use crate::handler::HandlerRef;
use crate::name::{Name, SuffixResolver};
use crate::qtype::{QType, TypeSet};
use crate::query::Query;
use regex::Regex;
use std::sync::Arc;

/// The name-pattern half of a rule. Shared between ordinary rules and
/// `mount`'s outer match condition over a nested container (spec §4.3:
/// "a Zone/Glob/Static/Regex over the outer name space").
#[derive(Debug, Clone)]
pub enum Matcher {
    Static(Name),
    Zone(Name),
    Glob(WildcardPattern),
    Regex(Regex),
}

impl Matcher {
    pub fn parse_static(name: &str) -> Result<Self, ConfigurationError> {
        Ok(Matcher::Static(parse_name(name)?))
    }

    pub fn parse_zone(apex: &str) -> Result<Self, ConfigurationError> {
        Ok(Matcher::Zone(parse_name(apex)?))
    }

    pub fn parse_glob(pattern: &str) -> Result<Self, ConfigurationError> {
        Ok(Matcher::Glob(WildcardPattern::parse(pattern)?))
    }

    pub fn regex(pattern: Regex) -> Self {
        Matcher::Regex(pattern)
    }

    pub fn parse_regex(pattern: &str) -> Result<Self, ConfigurationError> {
        let compiled = Regex::new(pattern).map_err(|source| ConfigurationError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Matcher::Regex(compiled))
    }

    /// `smart_make_rule` (spec §6): a string with no wildcard tokens is
    /// `Static`; one containing `*`, `**`, or `{base_domain}` is `Glob`.
    /// Callers that already hold a compiled `Regex` or an explicit
    /// `Matcher` bypass this heuristic entirely by constructing one
    /// directly.
    pub fn smart(pattern: &str) -> Result<Self, ConfigurationError> {
        if WildcardPattern::is_literal_style(pattern) {
            Self::parse_static(pattern)
        } else {
            Self::parse_glob(pattern)
        }
    }

    pub fn matches(&self, name: &Name, case_sensitive: bool, suffix: &dyn SuffixResolver) -> bool {
        match self {
            Matcher::Static(pattern) => name.equals(pattern, case_sensitive),
            Matcher::Zone(apex) => name.is_subdomain_of(apex, case_sensitive),
            Matcher::Glob(pattern) => pattern.matches(name, case_sensitive, suffix),
            Matcher::Regex(regex) => {
                let subject = if case_sensitive {
                    name.to_string()
                } else {
                    name.to_canonical_string()
                };
                regex.is_match(&subject)
            }
        }
    }
}

fn parse_name(input: &str) -> Result<Name, ConfigurationError> {
    Name::parse(input).map_err(|reason| ConfigurationError::InvalidName {
        name: input.to_string(),
        reason,
    })
}

/// What a matched rule delegates to: a handler, or a nested container
/// (spec §4.3's `Container` rule variant).
pub enum RuleBody {
    Handler(HandlerRef),
    Container(Arc<Container>),
}

pub struct Rule {
    pub matcher: Matcher,
    pub types: TypeSet,
    pub case_sensitive: bool,
    pub body: RuleBody,
}

impl Rule {
    pub fn handler(
        matcher: Matcher,
        types: TypeSet,
        case_sensitive: bool,
        handler: HandlerRef,
    ) -> Self {
        Self {
            matcher,
            types,
            case_sensitive,
            body: RuleBody::Handler(handler),
        }
    }

    pub fn container(
        matcher: Matcher,
        types: TypeSet,
        case_sensitive: bool,
        child: Arc<Container>,
    ) -> Self {
        Self {
            matcher,
            types,
            case_sensitive,
            body: RuleBody::Container(child),
        }
    }

    /// Outer match test against a query: name pattern and type-set
    /// membership both have to hold (spec §3's wildcard type membership
    /// test).
    pub fn matches(&self, query: &Query, suffix: &dyn SuffixResolver) -> bool {
        self.types.contains(query.qtype)
            && self
                .matcher
                .matches(&query.name, self.case_sensitive, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suffix::PslSuffixResolver;

    fn query(name: &str, qtype: QType) -> Query {
        Query::new(Name::parse(name).unwrap(), qtype)
    }

    #[test]
    fn static_rule_requires_exact_name_and_type() {
        let rule_matcher = Matcher::parse_static("example.com").unwrap();
        let suffix = PslSuffixResolver::new();
        assert!(rule_matcher.matches(&Name::parse("example.com").unwrap(), false, &suffix));
        assert!(!rule_matcher.matches(&Name::parse("www.example.com").unwrap(), false, &suffix));
    }

    #[test]
    fn zone_rule_matches_apex_and_descendants() {
        let rule_matcher = Matcher::parse_zone("example.com").unwrap();
        let suffix = PslSuffixResolver::new();
        assert!(rule_matcher.matches(&Name::parse("example.com").unwrap(), false, &suffix));
        assert!(rule_matcher.matches(&Name::parse("a.b.example.com").unwrap(), false, &suffix));
        assert!(!rule_matcher.matches(&Name::parse("example.net").unwrap(), false, &suffix));
    }

    #[test]
    fn smart_make_rule_picks_static_for_plain_names() {
        assert!(matches!(Matcher::smart("example.com").unwrap(), Matcher::Static(_)));
    }

    #[test]
    fn smart_make_rule_picks_glob_for_wildcard_tokens() {
        assert!(matches!(Matcher::smart("*.example.com").unwrap(), Matcher::Glob(_)));
        assert!(matches!(Matcher::smart("**.example.com").unwrap(), Matcher::Glob(_)));
        assert!(matches!(
            Matcher::smart("hello.{base_domain}").unwrap(),
            Matcher::Glob(_)
        ));
    }

    #[test]
    fn rule_matches_requires_type_membership() {
        let matcher = Matcher::parse_static("example.com").unwrap();
        let suffix = PslSuffixResolver::new();
        let rule = Rule {
            matcher,
            types: TypeSet::of([QType::A]),
            case_sensitive: false,
            body: RuleBody::Handler(Arc::new(crate::handler::test_support::noop_handler())),
        };
        assert!(rule.matches(&query("example.com", QType::A), &suffix));
        assert!(!rule.matches(&query("example.com", QType::TXT), &suffix));
    }
}
