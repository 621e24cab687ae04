//! Keyword-based scoped-label suggestions.
//!
//! Each scope has an ordered rule table; the first rule whose keywords
//! appear in an issue's lowercased title and description wins, and the
//! scope's default applies when none do.

pub mod generator;
pub mod stories;

use serde::Serialize;

use crate::model::{scoped_value, Issue};

pub use generator::{generate_label_suggestions, IssueSuggestions};
pub use stories::{generate_stories, Story};

pub const WORKFLOW_LABELS: &[&str] = &[
    "workflow::grooming",
    "workflow::scoping",
    "workflow::clarification",
    "workflow::qa-scoping",
    "workflow::triage",
    "workflow::review",
    "workflow::qa",
    "workflow::resolved",
    "workflow::hold",
    "workflow::blocked",
];

pub const TYPE_LABELS: &[&str] = &[
    "type::new-feature",
    "type::customisation",
    "type::enhancement",
    "type::bug",
    "type::categorisation",
    "type::refactoring",
    "type::dc-movement",
    "type::move-to-prod",
    "type::operations",
    "type::poc",
    "type::other",
];

pub const PRIORITY_LABELS: &[&str] = &["priority::1", "priority::2", "priority::3"];

/// Fires when any of its keywords is a substring of the content.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub keywords: &'static [&'static str],
    pub label: &'static str,
}

impl Rule {
    pub fn matches(&self, content: &str) -> bool {
        self.keywords.iter().any(|kw| content.contains(kw))
    }
}

/// Ordered rules for one label scope.
#[derive(Debug, Clone, Copy)]
pub struct ScopeRules {
    pub scope: &'static str,
    pub rules: &'static [Rule],
    pub default: &'static str,
}

impl ScopeRules {
    pub fn classify(&self, content: &str) -> &'static str {
        self.rules
            .iter()
            .find(|r| r.matches(content))
            .map_or(self.default, |r| r.label)
    }
}

pub const TYPE_RULES: ScopeRules = ScopeRules {
    scope: "type",
    rules: &[
        Rule {
            keywords: &["bug", "error", "fix", "issue", "problem", "failure"],
            label: "type::bug",
        },
        Rule {
            keywords: &["feature", "implement", "add new", "create"],
            label: "type::new-feature",
        },
        Rule {
            keywords: &["enhance", "improve", "update", "refine"],
            label: "type::enhancement",
        },
    ],
    default: "type::categorisation",
};

pub const WORKFLOW_RULES: ScopeRules = ScopeRules {
    scope: "workflow",
    rules: &[
        Rule {
            keywords: &["blocked", "waiting for"],
            label: "workflow::blocked",
        },
        Rule {
            keywords: &["review"],
            label: "workflow::review",
        },
        Rule {
            keywords: &["qa", "test"],
            label: "workflow::qa",
        },
    ],
    default: "workflow::triage",
};

pub const PRIORITY_RULES: ScopeRules = ScopeRules {
    scope: "priority",
    rules: &[
        Rule {
            keywords: &["critical", "urgent", "blocker", "asap"],
            label: "priority::1",
        },
        Rule {
            keywords: &["low priority", "cosmetic"],
            label: "priority::3",
        },
    ],
    default: "priority::2",
};

/// Scopes in the order suggestions are emitted.
pub const ALL_SCOPES: [ScopeRules; 3] = [TYPE_RULES, WORKFLOW_RULES, PRIORITY_RULES];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub scope: &'static str,
    pub label: &'static str,
}

/// One suggestion per scope missing from `existing_labels`.
pub fn suggest_labels(title: &str, description: Option<&str>, existing_labels: &[String]) -> Vec<Suggestion> {
    let content = format!(
        "{} {}",
        title.to_lowercase(),
        description.unwrap_or("").to_lowercase()
    );
    ALL_SCOPES
        .iter()
        .filter(|rules| scoped_value(existing_labels, rules.scope).is_none())
        .map(|rules| Suggestion {
            scope: rules.scope,
            label: rules.classify(&content),
        })
        .collect()
}

/// [`suggest_labels`] for an issue's own title, description and labels.
pub fn suggest_for_issue(issue: &Issue) -> Vec<Suggestion> {
    suggest_labels(&issue.title, issue.description.as_deref(), &issue.labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_of(s: &[Suggestion]) -> Vec<&str> {
        s.iter().map(|s| s.label).collect()
    }

    #[test]
    fn test_fix_login_bug() {
        let s = suggest_labels("Fix login bug", None, &[]);
        assert_eq!(
            labels_of(&s),
            vec!["type::bug", "workflow::triage", "priority::2"]
        );
    }

    #[test]
    fn test_existing_scope_suppresses_suggestion() {
        let s = suggest_labels("Fix login bug", None, &["priority::1".to_string()]);
        assert_eq!(labels_of(&s), vec!["type::bug", "workflow::triage"]);
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        // "blocked" beats "review"; "critical" beats "cosmetic".
        let s = suggest_labels(
            "Improve dashboard",
            Some("Blocked on review. Critical but cosmetic."),
            &[],
        );
        assert_eq!(
            labels_of(&s),
            vec!["type::enhancement", "workflow::blocked", "priority::1"]
        );
    }

    #[test]
    fn test_defaults() {
        let s = suggest_labels("Quarterly roadmap", Some("Notes from planning"), &[]);
        assert_eq!(
            labels_of(&s),
            vec!["type::categorisation", "workflow::triage", "priority::2"]
        );
    }

    #[test]
    fn test_description_is_searched() {
        let s = suggest_labels(
            "Checkout page",
            Some("Please implement Apple Pay. Needs QA sign-off."),
            &["priority::3".to_string()],
        );
        assert_eq!(labels_of(&s), vec!["type::new-feature", "workflow::qa"]);
    }

    #[test]
    fn test_all_rule_labels_are_catalogued() {
        for rules in ALL_SCOPES {
            let catalog = match rules.scope {
                "type" => TYPE_LABELS,
                "workflow" => WORKFLOW_LABELS,
                _ => PRIORITY_LABELS,
            };
            assert!(catalog.contains(&rules.default));
            for rule in rules.rules {
                assert!(catalog.contains(&rule.label), "{} not catalogued", rule.label);
            }
        }
    }
}
