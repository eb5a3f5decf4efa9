//! The `WildcardString` glob grammar (spec §4.2): one token per label of
//! the pattern — a literal label, `*` (exactly one label), `**` (one or
//! more labels, greedy with backtracking), or `{base_domain}` (the label
//! sequence of the query name's resolved base domain).

use crate::error::ConfigurationError;
use crate::name::{Name, SuffixResolver};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Star,
    DoubleStar,
    BaseDomain,
}

#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    tokens: Vec<Token>,
}

impl WildcardPattern {
    /// Parses and validates a glob pattern. Rejects an empty pattern,
    /// adjacent `**` tokens, and more than one `{base_domain}` token.
    pub fn parse(pattern: &str) -> Result<Self, ConfigurationError> {
        if pattern.is_empty() {
            return Err(ConfigurationError::EmptyPattern);
        }

        let trimmed = pattern.strip_suffix('.').unwrap_or(pattern);
        if trimmed.is_empty() {
            return Err(ConfigurationError::EmptyPattern);
        }

        let mut tokens = Vec::new();
        let mut saw_base_domain = false;
        let mut prev_double_star = false;

        for label in trimmed.split('.') {
            let token = match label {
                "*" => Token::Star,
                "**" => Token::DoubleStar,
                "{base_domain}" => {
                    if saw_base_domain {
                        return Err(ConfigurationError::InvalidGlob {
                            pattern: pattern.to_string(),
                            reason: "{base_domain} may appear at most once".into(),
                        });
                    }
                    saw_base_domain = true;
                    Token::BaseDomain
                }
                lit => {
                    if lit.is_empty() {
                        return Err(ConfigurationError::InvalidGlob {
                            pattern: pattern.to_string(),
                            reason: "empty label".into(),
                        });
                    }
                    Token::Literal(lit.to_string())
                }
            };

            if matches!(token, Token::DoubleStar) && prev_double_star {
                return Err(ConfigurationError::InvalidGlob {
                    pattern: pattern.to_string(),
                    reason: "** may not appear adjacent to another **".into(),
                });
            }
            prev_double_star = matches!(token, Token::DoubleStar);
            tokens.push(token);
        }

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_literal_style(pattern: &str) -> bool {
        !pattern.split('.').any(|label| {
            label == "*" || label == "**" || label == "{base_domain}"
        })
    }

    /// Matches the entire query name against this pattern. `suffix` is
    /// consulted only if the pattern contains a `{base_domain}` token; if
    /// base-domain resolution fails for this query name, the rule is
    /// treated as non-matching (open question in the design, resolved
    /// this way — see DESIGN.md).
    pub fn matches(&self, name: &Name, case_sensitive: bool, suffix: &dyn SuffixResolver) -> bool {
        let base_domain_labels = if self.tokens.iter().any(|t| *t == Token::BaseDomain) {
            match suffix.base_domain(name) {
                Some(bd) => Some(bd.labels().to_vec()),
                None => return false,
            }
        } else {
            None
        };

        match_from(
            &self.tokens,
            0,
            name.labels(),
            0,
            case_sensitive,
            base_domain_labels.as_deref(),
        )
    }
}

fn label_eq(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

fn match_from(
    tokens: &[Token],
    ti: usize,
    labels: &[String],
    li: usize,
    case_sensitive: bool,
    base_domain: Option<&[String]>,
) -> bool {
    if ti == tokens.len() {
        return li == labels.len();
    }

    match &tokens[ti] {
        Token::Literal(lit) => {
            li < labels.len()
                && label_eq(lit, &labels[li], case_sensitive)
                && match_from(tokens, ti + 1, labels, li + 1, case_sensitive, base_domain)
        }
        Token::Star => {
            li < labels.len()
                && match_from(tokens, ti + 1, labels, li + 1, case_sensitive, base_domain)
        }
        Token::DoubleStar => {
            if li >= labels.len() {
                return false;
            }
            let max_consume = labels.len() - li;
            (1..=max_consume).rev().any(|consume| {
                match_from(tokens, ti + 1, labels, li + consume, case_sensitive, base_domain)
            })
        }
        Token::BaseDomain => {
            let bd = match base_domain {
                Some(bd) => bd,
                None => return false,
            };
            let n = bd.len();
            li + n <= labels.len()
                && (0..n).all(|k| label_eq(&bd[k], &labels[li + k], case_sensitive))
                && match_from(tokens, ti + 1, labels, li + n, case_sensitive, base_domain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;

    struct FixedSuffix(Option<&'static str>);
    impl SuffixResolver for FixedSuffix {
        fn base_domain(&self, _name: &Name) -> Option<Name> {
            self.0.map(|s| Name::parse(s).unwrap())
        }
    }

    #[test]
    fn rejects_empty_pattern() {
        assert!(WildcardPattern::parse("").is_err());
    }

    #[test]
    fn rejects_adjacent_double_star() {
        assert!(WildcardPattern::parse("**.**.com").is_err());
    }

    #[test]
    fn rejects_duplicate_base_domain_token() {
        assert!(WildcardPattern::parse("{base_domain}.{base_domain}").is_err());
    }

    #[test]
    fn star_matches_exactly_one_label() {
        let pattern = WildcardPattern::parse("www.*.com.au").unwrap();
        let suffix = FixedSuffix(None);
        assert!(pattern.matches(&Name::parse("www.foo.com.au").unwrap(), false, &suffix));
        assert!(!pattern.matches(&Name::parse("www.foo.bar.com.au").unwrap(), false, &suffix));
        assert!(!pattern.matches(&Name::parse("www.com.au").unwrap(), false, &suffix));
    }

    #[test]
    fn double_star_matches_one_or_more_labels_not_zero() {
        let pattern = WildcardPattern::parse("**.com.au").unwrap();
        let suffix = FixedSuffix(None);
        assert!(pattern.matches(&Name::parse("foo.com.au").unwrap(), false, &suffix));
        assert!(pattern.matches(&Name::parse("www.foo.com.au").unwrap(), false, &suffix));
        assert!(!pattern.matches(&Name::parse("com.au").unwrap(), false, &suffix));
    }

    #[test]
    fn base_domain_token_consumes_multi_label_base() {
        let pattern = WildcardPattern::parse("hello.{base_domain}").unwrap();
        let suffix = FixedSuffix(Some("foo.com.au"));
        assert!(pattern.matches(&Name::parse("hello.foo.com.au").unwrap(), false, &suffix));
        assert!(!pattern.matches(&Name::parse("hello.foo.com").unwrap(), false, &suffix));
    }

    #[test]
    fn base_domain_resolution_failure_means_no_match() {
        let pattern = WildcardPattern::parse("hello.{base_domain}").unwrap();
        let suffix = FixedSuffix(None);
        assert!(!pattern.matches(&Name::parse("hello.foo.com").unwrap(), false, &suffix));
    }

    #[test]
    fn is_literal_style_detects_wildcard_tokens() {
        assert!(WildcardPattern::is_literal_style("example.com"));
        assert!(!WildcardPattern::is_literal_style("*.example.com"));
        assert!(!WildcardPattern::is_literal_style("**.example.com"));
        assert!(!WildcardPattern::is_literal_style("{base_domain}"));
    }
}
