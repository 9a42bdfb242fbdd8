//! Deterministic planning rules
//!
//! A priority-ordered table of patterns mapped to fixed tool+input
//! templates. Evaluation order is the declared priority, not insertion
//! order. Rules are pure: identical inputs always yield identical actions.

use std::sync::Arc;

use fancy_regex::Regex;

use crate::trajectory::Action;

type Builder = Arc<dyn Fn(&str) -> Option<Action> + Send + Sync>;
type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// How a rule decides whether it applies. Matching is case-insensitive.
#[derive(Clone)]
pub enum Matcher {
    /// Any of these substrings appears in the text.
    AnyKeyword(Vec<String>),
    /// The regex matches somewhere in the text.
    Pattern(Arc<Regex>),
    /// Arbitrary pure predicate.
    Predicate(Predicate),
}

impl Matcher {
    pub fn keywords<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyKeyword(words.into_iter().map(|w| w.into().to_lowercase()).collect())
    }

    pub fn pattern(pattern: &str) -> Result<Self, fancy_regex::Error> {
        Ok(Self::Pattern(Arc::new(Regex::new(pattern)?)))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        match self {
            Self::AnyKeyword(words) => words.iter().any(|w| lower.contains(w)),
            Self::Pattern(regex) => regex.is_match(text).unwrap_or(false),
            Self::Predicate(f) => f(text),
        }
    }
}

/// One deterministic rule: matcher + action template + priority.
#[derive(Clone)]
pub struct Rule {
    name: String,
    priority: u32,
    matcher: Matcher,
    /// When set, a successful observation of this rule's action is the
    /// final answer; no further iterations are needed.
    answer_from_observation: bool,
    build: Builder,
}

impl Rule {
    pub fn new<F>(name: impl Into<String>, priority: u32, matcher: Matcher, build: F) -> Self
    where
        F: Fn(&str) -> Option<Action> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            matcher,
            answer_from_observation: false,
            build: Arc::new(build),
        }
    }

    pub fn answer_from_observation(mut self) -> Self {
        self.answer_from_observation = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn is_terminal(&self) -> bool {
        self.answer_from_observation
    }
}

/// Outcome of a rule match.
pub struct RuleMatch<'a> {
    pub rule: &'a Rule,
    pub action: Action,
}

/// Priority-ordered rule table. Lower priority value wins first.
#[derive(Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
        // Stable sort keeps insertion order within one priority bucket.
        self.rules.sort_by_key(Rule::priority);
    }

    pub fn with(mut self, rule: Rule) -> Self {
        self.push(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule (in priority order) whose matcher hits and whose template
    /// produces an action. A matching rule whose template declines (returns
    /// `None`) falls through to later rules.
    pub fn first_match(&self, text: &str) -> Option<RuleMatch<'_>> {
        self.rules.iter().find_map(|rule| {
            if !rule.matcher.matches(text) {
                return None;
            }
            (rule.build)(text).map(|action| RuleMatch { rule, action })
        })
    }

    /// The builtin table: repository indexing, arithmetic, and document
    /// retrieval, in that priority order.
    pub fn builtin() -> Self {
        Self::empty()
            .with(Rule::new(
                "index_repo",
                10,
                Matcher::predicate(|text| {
                    let lower = text.to_lowercase();
                    lower.contains("build index")
                        || (lower.contains("index") && lower.contains("http"))
                }),
                build_index_action,
            ))
            .with(
                Rule::new(
                    "calculator",
                    20,
                    Matcher::predicate(|text| {
                        let lower = text.to_lowercase();
                        lower.contains("calculate")
                            || (lower.chars().any(|c| "+-*/%".contains(c))
                                && lower.chars().any(|c| c.is_ascii_digit()))
                    }),
                    build_calculator_action,
                )
                .answer_from_observation(),
            )
            .with(Rule::new(
                "search_docs",
                30,
                Matcher::keywords(["search", "query", "find", "retrieve", "lookup"]),
                |text| {
                    Some(Action::call(
                        "search_docs",
                        serde_json::json!({ "query": text, "top_k": 4 }),
                    ))
                },
            ))
    }
}

fn build_index_action(text: &str) -> Option<Action> {
    let repo_url = text.split_whitespace().find(|p| p.starts_with("http"))?;
    let index_name = repo_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()?
        .trim_end_matches(".git");
    Some(Action::call(
        "index_repo",
        serde_json::json!({ "repo_url": repo_url, "index_name": index_name }),
    ))
}

fn build_calculator_action(text: &str) -> Option<Action> {
    let expr: String = text
        .chars()
        .filter(|c| "0123456789+-*/(). %".contains(*c))
        .collect();
    let expr = expr.trim().to_string();
    if expr.chars().any(|c| c.is_ascii_digit()) {
        Some(Action::call("calculator", serde_json::json!({ "expr": expr })))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_arithmetic_task_matches_calculator() {
        let table = RuleTable::builtin();
        let matched = table.first_match("2+3").expect("should match");

        assert_eq!(matched.rule.name(), "calculator");
        assert!(matched.rule.is_terminal());
        assert_eq!(
            matched.action,
            Action::call("calculator", serde_json::json!({ "expr": "2+3" }))
        );
    }

    #[test]
    fn test_retrieval_keywords_match_search_docs() {
        let table = RuleTable::builtin();
        let matched = table
            .first_match("Find the section about chunk overlap")
            .expect("should match");

        assert_eq!(matched.rule.name(), "search_docs");
        assert!(!matched.rule.is_terminal());
        match matched.action {
            Action::Call { tool, input } => {
                assert_eq!(tool, "search_docs");
                assert_eq!(input["top_k"], 4);
            }
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn test_index_rule_derives_index_name_from_url() {
        let table = RuleTable::builtin();
        let matched = table
            .first_match("build index for https://github.com/acme/docs.git")
            .expect("should match");

        assert_eq!(matched.rule.name(), "index_repo");
        match matched.action {
            Action::Call { input, .. } => {
                assert_eq!(input["repo_url"], "https://github.com/acme/docs.git");
                assert_eq!(input["index_name"], "docs");
            }
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn test_index_rule_without_url_falls_through() {
        // "build index" matches the index rule but its template declines
        // (no URL), and "index" alone matches nothing else.
        let table = RuleTable::builtin();
        assert!(table.first_match("build index please").is_none());
    }

    #[test]
    fn test_priority_order_beats_insertion_order() {
        let table = RuleTable::empty()
            .with(Rule::new("late", 50, Matcher::keywords(["ping"]), |_| {
                Some(Action::call("late", serde_json::json!({})))
            }))
            .with(Rule::new("early", 5, Matcher::keywords(["ping"]), |_| {
                Some(Action::call("early", serde_json::json!({})))
            }));

        let matched = table.first_match("ping").expect("should match");
        assert_eq!(matched.rule.name(), "early");
    }

    #[test]
    fn test_rules_are_pure() {
        let table = RuleTable::builtin();
        let a = table.first_match("calculate 6 * 7").map(|m| m.action);
        let b = table.first_match("calculate 6 * 7").map(|m| m.action);
        assert_eq!(a, b);
    }

    #[test]
    fn test_plain_prose_matches_nothing() {
        let table = RuleTable::builtin();
        assert!(table.first_match("hello there").is_none());
    }

    #[test]
    fn test_pattern_matcher_fires_on_regex_hit() {
        let table = RuleTable::empty().with(Rule::new(
            "ticket_lookup",
            5,
            Matcher::pattern(r"#\d+").expect("valid pattern"),
            |text| {
                Some(Action::call(
                    "search_docs",
                    serde_json::json!({ "query": text, "top_k": 1 }),
                ))
            },
        ));

        let matched = table
            .first_match("regression introduced in #142")
            .expect("should match");
        assert_eq!(matched.rule.name(), "ticket_lookup");

        assert!(table.first_match("no ticket reference here").is_none());
    }
}
