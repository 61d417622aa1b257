//! Domain knowledge
//!
//! Read-only vocabulary the research stage consults before searching:
//! synonym groups for query expansion, short background notes, and the
//! inclusion/exclusion policy handed to the model for relevance judgment.

pub mod catalog;

use std::fmt;

/// Category of a catalog term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Herb,
    Formulation,
    Practice,
    Concept,
    Condition,
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TermKind::Herb => "herb",
            TermKind::Formulation => "formulation",
            TermKind::Practice => "practice",
            TermKind::Concept => "concept",
            TermKind::Condition => "condition",
        };
        f.write_str(label)
    }
}

/// A synonym group found in a query
#[derive(Debug, Clone, PartialEq)]
pub struct TermMatch {
    pub kind: TermKind,
    pub synonyms: Vec<&'static str>,
}

impl TermMatch {
    pub fn is_intervention(&self) -> bool {
        self.kind != TermKind::Condition
    }

    /// `(a OR "b c")` in PubMed query syntax
    pub fn as_expression(&self) -> String {
        let terms: Vec<String> = self.synonyms.iter().map(|s| quote_term(s)).collect();
        if terms.len() == 1 {
            terms[0].clone()
        } else {
            format!("({})", terms.join(" OR "))
        }
    }
}

fn quote_term(term: &str) -> String {
    if term.contains(' ') {
        format!("\"{}\"", term)
    } else {
        term.to_string()
    }
}

/// Secondary information source consulted alongside the search provider
pub trait KnowledgeBase: Send + Sync {
    /// Background notes relevant to `query`; empty when nothing applies
    fn lookup(&self, query: &str) -> Vec<String>;
}

/// The Ayurvedic vocabulary from [`catalog`]
#[derive(Debug, Clone, Default)]
pub struct KeywordCatalog;

impl KeywordCatalog {
    pub fn new() -> Self {
        Self
    }

    fn groups() -> impl Iterator<Item = (TermKind, &'static [&'static str])> {
        let tag = |kind: TermKind, groups: &'static [&'static [&'static str]]| {
            groups.iter().map(move |g| (kind, *g))
        };
        tag(TermKind::Herb, catalog::HERBS)
            .chain(tag(TermKind::Formulation, catalog::FORMULATIONS))
            .chain(tag(TermKind::Practice, catalog::PRACTICES))
            .chain(tag(TermKind::Concept, catalog::CONCEPTS))
            .chain(tag(TermKind::Condition, catalog::CONDITIONS))
    }

    /// Synonym groups with at least one member mentioned in `query`, in catalog order
    pub fn expand_terms(&self, query: &str) -> Vec<TermMatch> {
        let haystack = query.to_lowercase();
        Self::groups()
            .filter(|(_, group)| group.iter().any(|term| contains_phrase(&haystack, term)))
            .map(|(kind, group)| TermMatch {
                kind,
                synonyms: group.to_vec(),
            })
            .collect()
    }

    /// Search expressions for `query`, most specific first, at most `max`.
    ///
    /// Recognised terms produce an expanded boolean expression; the raw query
    /// is always included; queries with no recognised intervention are also
    /// tried scoped to Ayurveda.
    pub fn build_expressions(&self, query: &str, max: usize) -> Vec<String> {
        let query = query.trim();
        let matches = self.expand_terms(query);
        let mut expressions = Vec::new();

        if !matches.is_empty() {
            let clauses: Vec<String> = matches.iter().map(TermMatch::as_expression).collect();
            expressions.push(clauses.join(" AND "));
        }
        expressions.push(query.to_string());
        if !matches.iter().any(TermMatch::is_intervention) {
            expressions.push(format!("({}) AND (ayurveda OR ayurvedic)", query));
        }

        let mut unique = Vec::new();
        for expression in expressions {
            if !unique.contains(&expression) {
                unique.push(expression);
            }
        }
        unique.truncate(max);
        unique
    }
}

impl KnowledgeBase for KeywordCatalog {
    fn lookup(&self, query: &str) -> Vec<String> {
        self.expand_terms(query)
            .into_iter()
            .map(|m| {
                let name = m.synonyms[0];
                let aliases = &m.synonyms[1..];
                if aliases.is_empty() {
                    format!("{} ({})", name, m.kind)
                } else {
                    format!("{} ({}): also known as {}", name, m.kind, aliases.join(", "))
                }
            })
            .collect()
    }
}

/// Keyword policy deciding which papers count as in-domain
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            include: catalog::INCLUDE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            exclude: catalog::EXCLUDE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DomainPolicy {
    pub fn matched_include(&self, text: &str) -> Vec<&str> {
        Self::matches(&self.include, text)
    }

    pub fn matched_exclude(&self, text: &str) -> Vec<&str> {
        Self::matches(&self.exclude, text)
    }

    fn matches<'a>(keywords: &'a [String], text: &str) -> Vec<&'a str> {
        let haystack = text.to_lowercase();
        keywords
            .iter()
            .filter(|k| contains_phrase(&haystack, &k.to_lowercase()))
            .map(String::as_str)
            .collect()
    }

    /// Policy text for the research prompt
    pub fn describe(&self) -> String {
        format!(
            "Include papers that substantially study Ayurvedic herbs, formulations, practices or principles \
             (signals: {}).\n\
             Exclude papers whose focus is conventional or modern medicine content \
             (signals: {}), papers that mention Ayurveda only in passing, and purely theoretical papers \
             without empirical data.",
            self.include.join(", "),
            self.exclude.join(", ")
        )
    }
}

/// Whole-word (or whole-phrase) containment; `haystack` must already be lowercase
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_alphanumeric();
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before_ok = haystack[..start].chars().next_back().map_or(true, |c| !is_word(c));
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_word(c));
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_terms_matches_synonyms() {
        let catalog = KeywordCatalog::new();
        let matches = catalog.expand_terms("Withania somnifera for Anxiety");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].kind, TermKind::Herb);
        assert_eq!(matches[0].synonyms[0], "ashwagandha");
        assert_eq!(matches[1].kind, TermKind::Condition);
    }

    #[test]
    fn test_whole_word_matching() {
        // "ama" must not fire inside "samadhi", nor "prana" inside "pranayama"
        let catalog = KeywordCatalog::new();
        let kinds: Vec<_> = catalog
            .expand_terms("amla samadhi pranayama")
            .into_iter()
            .map(|m| m.synonyms[0])
            .collect();
        assert_eq!(kinds, vec!["amla", "pranayama"]);
        assert!(contains_phrase("brahmi ghrita trial", "brahmi ghrita"));
        assert!(!contains_phrase("yogas", "yoga"));
    }

    #[test]
    fn test_build_expressions_for_known_herb() {
        let catalog = KeywordCatalog::new();
        let expressions = catalog.build_expressions("ashwagandha for anxiety", 3);
        assert_eq!(
            expressions,
            vec![
                "(ashwagandha OR \"withania somnifera\") AND (anxiety OR stress)".to_string(),
                "ashwagandha for anxiety".to_string(),
            ]
        );
    }

    #[test]
    fn test_build_expressions_for_unknown_term() {
        let catalog = KeywordCatalog::new();
        let expressions = catalog.build_expressions("  xyz-nonexistent-herb ", 3);
        assert_eq!(
            expressions,
            vec![
                "xyz-nonexistent-herb".to_string(),
                "(xyz-nonexistent-herb) AND (ayurveda OR ayurvedic)".to_string(),
            ]
        );
        assert_eq!(catalog.build_expressions("xyz", 1).len(), 1);
    }

    #[test]
    fn test_lookup_notes() {
        let notes = KeywordCatalog::new().lookup("tulsi and panchakarma");
        assert_eq!(
            notes,
            vec![
                "tulsi (herb): also known as ocimum sanctum, holy basil".to_string(),
                "panchakarma (practice)".to_string(),
            ]
        );
        assert!(KeywordCatalog::new().lookup("quantum computing").is_empty());
    }

    #[test]
    fn test_domain_policy_matches() {
        let policy = DomainPolicy::default();
        let text = "An Ayurvedic rasayana compared with metformin";
        assert_eq!(policy.matched_include(text), vec!["ayurvedic", "rasayana"]);
        assert_eq!(policy.matched_exclude(text), vec!["metformin"]);
        assert!(policy.describe().contains("chemotherapy"));
    }
}
