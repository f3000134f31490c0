//! Keyword and pattern based tagger.

use std::path::Path;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::Tagger;
use crate::error::CollaboratorError;
use crate::models::PaperRecord;

/// A category assigned when any keyword appears as a whole word or phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: String,
    pub keywords: Vec<String>,
}

/// A tag assigned when `pattern` matches anywhere in the title or abstract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPattern {
    pub tag: String,
    pub pattern: String,
}

/// Rule set for [`RuleTagger`]. The default targets quantitative finance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerRules {
    pub case_sensitive: bool,
    pub categories: Vec<CategoryRule>,
    pub tag_patterns: Vec<TagPattern>,
    /// Domain terms added as tags when present. Multi-word terms are tagged
    /// with spaces replaced by underscores.
    pub terms: Vec<String>,
}

fn category(name: &str, keywords: &[&str]) -> CategoryRule {
    CategoryRule {
        category: name.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

fn tag_pattern(tag: &str, pattern: &str) -> TagPattern {
    TagPattern {
        tag: tag.to_string(),
        pattern: pattern.to_string(),
    }
}

impl Default for TaggerRules {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            categories: vec![
                category(
                    "Machine Learning in Finance",
                    &[
                        "machine learning",
                        "ml",
                        "neural network",
                        "deep learning",
                        "artificial intelligence",
                        "predictive model",
                        "feature engineering",
                        "ensemble method",
                        "random forest",
                        "gradient boosting",
                        "svm",
                    ],
                ),
                category(
                    "Deep Learning in Finance",
                    &[
                        "deep learning",
                        "neural network",
                        "cnn",
                        "rnn",
                        "lstm",
                        "gru",
                        "transformer",
                        "attention mechanism",
                        "autoencoder",
                        "gan",
                        "deep neural network",
                        "convolutional",
                        "recurrent",
                    ],
                ),
                category(
                    "Reinforcement Learning in Finance",
                    &[
                        "reinforcement learning",
                        "rl",
                        "q-learning",
                        "policy gradient",
                        "actor-critic",
                        "markov decision",
                        "mdp",
                        "multi-agent",
                        "trading agent",
                        "algorithmic trading",
                        "automated trading",
                    ],
                ),
                category(
                    "Time Series Forecasting",
                    &[
                        "time series",
                        "forecasting",
                        "prediction",
                        "arima",
                        "garch",
                        "volatility modeling",
                        "trend analysis",
                        "seasonality",
                        "econometric",
                        "financial time series",
                        "stock price prediction",
                    ],
                ),
                category(
                    "Risk Management",
                    &[
                        "risk management",
                        "var",
                        "value at risk",
                        "stress testing",
                        "credit risk",
                        "market risk",
                        "operational risk",
                        "portfolio risk",
                        "risk assessment",
                        "risk modeling",
                        "basel",
                    ],
                ),
                category(
                    "Portfolio Optimization",
                    &[
                        "portfolio optimization",
                        "asset allocation",
                        "mean variance",
                        "markowitz",
                        "sharpe ratio",
                        "efficient frontier",
                        "risk parity",
                        "portfolio construction",
                        "rebalancing",
                        "diversification",
                    ],
                ),
                category(
                    "Quantitative Trading",
                    &[
                        "algorithmic trading",
                        "quantitative trading",
                        "high frequency",
                        "market making",
                        "execution algorithm",
                        "order flow",
                        "market microstructure",
                        "trading strategy",
                        "alpha generation",
                    ],
                ),
            ],
            tag_patterns: vec![
                tag_pattern(
                    "algorithm",
                    r"\b(?:algorithm|model|method|approach|technique)\b",
                ),
                tag_pattern(
                    "finance",
                    r"\b(?:financial|finance|market|trading|investment|portfolio)\b",
                ),
                tag_pattern(
                    "quantitative",
                    r"\b(?:quantitative|quant|mathematical|statistical|numerical)\b",
                ),
                tag_pattern("prediction", r"\b(?:predict|forecast|estimate|model|analyze)\b"),
            ],
            terms: [
                "stock",
                "bond",
                "option",
                "future",
                "derivative",
                "etf",
                "mutual fund",
                "equity",
                "fixed income",
                "forex",
                "commodity",
                "cryptocurrency",
                "regression",
                "correlation",
                "cointegration",
                "volatility",
                "momentum",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        }
    }
}

impl TaggerRules {
    /// Loads a rule set from YAML. Missing sections take the defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CollaboratorError> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw).map_err(|e| CollaboratorError::Tag(format!("invalid rules: {e}")))
    }
}

struct CompiledRule {
    label: String,
    regex: Regex,
}

/// Tags records by matching compiled keyword and pattern rules against the
/// title and abstract.
pub struct RuleTagger {
    name: String,
    categories: Vec<CompiledRule>,
    tags: Vec<CompiledRule>,
}

impl RuleTagger {
    /// Compiles `rules`.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Tag` if a pattern is not a valid regex.
    pub fn new(name: impl Into<String>, rules: &TaggerRules) -> Result<Self, CollaboratorError> {
        let compile = |pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(!rules.case_sensitive)
                .build()
                .map_err(|e| CollaboratorError::Tag(format!("invalid pattern '{pattern}': {e}")))
        };

        let mut categories = Vec::with_capacity(rules.categories.len());
        for rule in rules.categories.iter().filter(|r| !r.keywords.is_empty()) {
            categories.push(CompiledRule {
                label: rule.category.trim().to_string(),
                regex: compile(&word_alternation(&rule.keywords))?,
            });
        }

        let mut tags = Vec::with_capacity(rules.tag_patterns.len() + rules.terms.len());
        for pattern in &rules.tag_patterns {
            tags.push(CompiledRule {
                label: pattern.tag.trim().to_lowercase(),
                regex: compile(&pattern.pattern)?,
            });
        }
        for term in &rules.terms {
            // Single words also match their plural.
            let escaped = regex::escape(term.trim());
            let pattern = if term.contains(' ') {
                format!(r"\b{escaped}\b")
            } else {
                format!(r"\b{escaped}s?\b")
            };
            tags.push(CompiledRule {
                label: term.trim().to_lowercase().replace(' ', "_"),
                regex: compile(&pattern)?,
            });
        }

        Ok(Self {
            name: name.into(),
            categories,
            tags,
        })
    }

    /// Tagger with the default quantitative-finance rules.
    pub fn with_defaults(name: impl Into<String>) -> Result<Self, CollaboratorError> {
        Self::new(name, &TaggerRules::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Categories whose keywords occur in `text`, in rule order.
    pub fn extract_categories(&self, text: &str) -> Vec<String> {
        matching_labels(&self.categories, text)
    }

    /// Tags whose patterns match `text`, in rule order.
    pub fn extract_tags(&self, text: &str) -> Vec<String> {
        matching_labels(&self.tags, text)
    }
}

fn word_alternation(keywords: &[String]) -> String {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    format!(r"\b(?:{})\b", alternatives.join("|"))
}

fn matching_labels(rules: &[CompiledRule], text: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for rule in rules {
        if !rule.label.is_empty() && rule.regex.is_match(text) && !labels.contains(&rule.label) {
            labels.push(rule.label.clone());
        }
    }
    labels
}

#[async_trait]
impl Tagger for RuleTagger {
    async fn tag_record(&self, mut record: PaperRecord) -> Result<PaperRecord, CollaboratorError> {
        let text = format!(
            "{} {}",
            record.title,
            record.abstract_text.as_deref().unwrap_or("")
        );

        let categories = self.extract_categories(&text);
        let tags = self.extract_tags(&text);
        debug!(
            record = record.primary_id(),
            categories = categories.len(),
            tags = tags.len(),
            "Tagged record"
        );

        for category in categories {
            record.add_category(category);
        }
        for tag in tags {
            record.add_tag(tag);
        }
        record
            .metadata
            .insert("tagger".to_string(), serde_json::json!(self.name));
        record
            .metadata
            .insert("tagging_method".to_string(), serde_json::json!("rule_based"));

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_rules_tag_finance_paper() {
        let tagger = RuleTagger::with_defaults("rules").expect("default rules compile");
        let record = PaperRecord::new("LSTM networks for stock price prediction").with_abstract(
            "We forecast equity returns with recurrent models and compare volatility regimes.",
        );

        let tagged = tagger.tag_record(record).await.expect("tagging succeeds");
        assert!(tagged.categories.contains(&"Deep Learning in Finance".to_string()));
        assert!(tagged.categories.contains(&"Time Series Forecasting".to_string()));
        assert!(tagged.tags.contains(&"stock".to_string()));
        assert!(tagged.tags.contains(&"equity".to_string()));
        assert!(tagged.tags.contains(&"volatility".to_string()));
        assert!(tagged.tags.contains(&"prediction".to_string()));
        assert_eq!(tagged.metadata["tagger"], "rules");
        assert_eq!(tagged.metadata["tagging_method"], "rule_based");
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let tagger = RuleTagger::with_defaults("rules").expect("compile");
        // "html" must not trigger the "ml" keyword.
        assert!(tagger.extract_categories("parsing html documents").is_empty());
        assert_eq!(
            tagger.extract_categories("an ML pipeline"),
            vec!["Machine Learning in Finance"]
        );
    }

    #[test]
    fn test_multi_word_terms_use_underscores() {
        let tagger = RuleTagger::with_defaults("rules").expect("compile");
        let tags = tagger.extract_tags("A study of fixed income and mutual fund flows");
        assert!(tags.contains(&"fixed_income".to_string()));
        assert!(tags.contains(&"mutual_fund".to_string()));
    }

    #[test]
    fn test_case_sensitive_rules() {
        let rules = TaggerRules {
            case_sensitive: true,
            categories: vec![category("Acronyms", &["GARCH"])],
            tag_patterns: Vec::new(),
            terms: Vec::new(),
        };
        let tagger = RuleTagger::new("strict", &rules).expect("compile");
        assert!(tagger.extract_categories("garch models").is_empty());
        assert_eq!(tagger.extract_categories("GARCH models"), vec!["Acronyms"]);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let rules = TaggerRules {
            tag_patterns: vec![tag_pattern("broken", "(unclosed")],
            ..TaggerRules::default()
        };
        assert!(matches!(
            RuleTagger::new("bad", &rules),
            Err(CollaboratorError::Tag(_))
        ));
    }

    #[test]
    fn test_rules_from_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rules.yaml");
        std::fs::write(
            &path,
            "categories:\n  - category: Crypto\n    keywords: [bitcoin, ethereum]\nterms: []\n",
        )
        .expect("write");

        let rules = TaggerRules::from_yaml_file(&path).expect("load");
        assert_eq!(rules.categories.len(), 1);
        assert!(rules.terms.is_empty());
        assert!(!rules.tag_patterns.is_empty());

        let tagger = RuleTagger::new("crypto", &rules).expect("compile");
        assert_eq!(tagger.extract_categories("Bitcoin volatility"), vec!["Crypto"]);
    }
}
