//! Keyword classifier that picks a worker for a new conversation.
//!
//! Rules are evaluated in priority order and the first match wins. A rule
//! matches when the message contains one of its keywords (case-insensitive
//! substring) or when `context.domain` equals the rule's domain.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Worker used when no rule matches.
pub const DEFAULT_WORKER: &str = "server-sequential-thinking";

/// One entry of the routing table.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    /// Value of `context.domain` that selects this rule.
    pub domain: String,
    /// Worker the rule routes to.
    pub worker: String,
    /// Keywords as configured, listed by `/api/capabilities`.
    pub keywords: Vec<String>,
    /// Case-insensitive alternation of the escaped keywords; `None` when there are none.
    matcher: Option<Regex>,
}

impl RoutingRule {
    pub fn new(
        domain: impl Into<String>,
        worker: impl Into<String>,
        keywords: &[&str],
    ) -> Result<Self, regex::Error> {
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        // An empty alternation would match everything.
        let matcher = if keywords.is_empty() {
            None
        } else {
            Some(Regex::new(&format!("(?i)(?:{alternation})"))?)
        };

        Ok(Self {
            domain: domain.into(),
            worker: worker.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            matcher,
        })
    }

    pub fn matches(&self, message: &str, domain: Option<&str>) -> bool {
        domain == Some(self.domain.as_str())
            || self.matcher.as_ref().is_some_and(|m| m.is_match(message))
    }
}

/// Ordered rule table plus a fallback worker.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<RoutingRule>,
    default_worker: String,
}

impl Classifier {
    pub fn new(rules: Vec<RoutingRule>, default_worker: impl Into<String>) -> Self {
        Self {
            rules,
            default_worker: default_worker.into(),
        }
    }

    /// The standard MCP server routing table.
    pub fn default_rules() -> Self {
        let table: [(&str, &str, &[&str]); 7] = [
            (
                "code",
                "claude-code-mcp",
                &[
                    "code", "coding", "programming", "function", "debug", "review", "bug",
                    "compile", "refactor",
                ],
            ),
            (
                "github",
                "github",
                &["github", "repository", "commit", "pull request"],
            ),
            (
                "research",
                "perplexity-deep-research",
                &["research", "analyze", "analyse", "find information", "investigate"],
            ),
            (
                "workflow",
                "n8n-workflow-builder",
                &["workflow", "automation", "automate", "process"],
            ),
            ("data", "fetch-mcp", &["fetch", "get data", "api", "download"]),
            ("react", "react-mcp", &["react", "component", "frontend", "jsx"]),
            ("thinking", "smart-thinking", &["think", "reasoning", "logic"]),
        ];

        let rules = table
            .into_iter()
            .map(|(domain, worker, keywords)| {
                // Escaped literals always form a valid pattern.
                RoutingRule::new(domain, worker, keywords).unwrap_or_else(|e| {
                    unreachable!("built-in routing rule {domain} failed to compile: {e}")
                })
            })
            .collect();

        Self::new(rules, DEFAULT_WORKER)
    }

    /// Pick a worker for `message` given the caller's `context`.
    pub fn classify(&self, message: &str, context: &Map<String, Value>) -> &str {
        let domain = context.get("domain").and_then(Value::as_str);

        for rule in &self.rules {
            if rule.matches(message, domain) {
                debug!(domain = %rule.domain, worker = %rule.worker, "Routing rule matched");
                return &rule.worker;
            }
        }
        debug!(worker = %self.default_worker, "No routing rule matched, using default");
        &self.default_worker
    }

    /// Rules in priority order.
    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn default_worker(&self) -> &str {
        &self.default_worker
    }

    /// Every worker this classifier can select, in priority order, default last.
    pub fn worker_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::with_capacity(self.rules.len() + 1);
        for worker in self
            .rules
            .iter()
            .map(|r| r.worker.as_str())
            .chain(std::iter::once(self.default_worker.as_str()))
        {
            if !ids.contains(&worker) {
                ids.push(worker);
            }
        }
        ids
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::default_rules()
    }
}
