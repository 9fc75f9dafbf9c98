//! Ranked, explainable retrieval over the index store.
//!
//! The engine operates entirely through the [`IndexStore`] trait. Each query
//! runs against one `list()` snapshot taken when it starts; the inverted
//! index used for filtering is derived from that same snapshot.
//!
//! # Scoring
//!
//! 1. Tokenize the query into lowercase terms, dropping stopwords.
//! 2. Pre-filter candidates by `tags`/`dependencies` (AND) via the
//!    inverted index.
//! 3. Per distinct term: exact tag match adds `tag`, dependency-name match
//!    adds `dependency`, summary word match adds `summary`. Adjacent-term
//!    phrases (`vision-language-model`) count toward tags only.
//! 4. Drop records scoring 0.
//! 5. Sort by score (desc), `indexed_at` (desc), identity (asc).
//! 6. Truncate to `limit`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use crate::error::KbResult;
use crate::models::{normalize_package_name, normalize_tag, RepoId, RepositoryRecord};
use crate::store::{IndexCache, IndexStore};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "for", "from", "how", "i",
    "in", "into", "is", "it", "me", "my", "of", "on", "or", "repo", "repos", "repositories",
    "repository", "show", "so", "some", "that", "the", "this", "to", "use", "using", "want",
    "we", "what", "which", "with", "you",
];

const MAX_PHRASE_WORDS: usize = 3;

/// Per-field weights. Must satisfy `tag > dependency > summary > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    pub tag: f64,
    pub dependency: f64,
    pub summary: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            tag: 3.0,
            dependency: 2.0,
            summary: 1.0,
        }
    }
}

/// Inputs for a single query.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest<'a> {
    pub text: &'a str,
    /// Hard filter: every tag must be present.
    pub tags: &'a [String],
    /// Hard filter: every dependency must be present.
    pub dependencies: &'a [String],
    pub limit: usize,
}

/// Score contribution of each field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FieldScores {
    pub tag: f64,
    pub dependency: f64,
    pub summary: f64,
}

impl FieldScores {
    pub fn total(&self) -> f64 {
        self.tag + self.dependency + self.summary
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: RepoId,
    pub score: f64,
    /// `tag:<t>`, `dependency:<d>`, or `summary:<w>` entries, in match order.
    pub matched: Vec<String>,
    pub breakdown: FieldScores,
    pub summary: String,
    pub indexed_at: DateTime<Utc>,
    pub incomplete: bool,
}

/// Lowercase terms of `text`: split outside `[a-z0-9+._-]`, edge punctuation
/// trimmed, stopwords dropped. Order is preserved; duplicates are kept so
/// callers can build phrases.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '_' | '-')))
        .map(|t| t.trim_matches(|c: char| matches!(c, '.' | '_' | '-')))
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Distinct terms in first-seen order.
fn distinct(tokens: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

/// Adjacent-token phrases (2 and 3 words) joined with `-`.
fn phrases(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for width in 2..=MAX_PHRASE_WORDS {
        for window in tokens.windows(width) {
            out.push(window.join("-"));
        }
    }
    distinct(&out)
}

/// Summary vocabulary: every token, plus the parts of hyphenated or dotted
/// tokens, so `vision` matches `vision-language`.
fn summary_words(record: &RepositoryRecord) -> HashSet<String> {
    let mut words = HashSet::new();
    for token in tokenize(&record.summary) {
        for part in token.split(['-', '.', '_']).filter(|p| !p.is_empty()) {
            words.insert(part.to_string());
        }
        words.insert(token);
    }
    words
}

fn score_record(
    record: &RepositoryRecord,
    terms: &[String],
    phrases: &[String],
    weights: &ScoreWeights,
) -> (FieldScores, Vec<String>) {
    let tags: HashSet<&str> = record.tags.iter().map(String::as_str).collect();
    let deps: HashSet<&str> = record.dependencies.iter().map(|d| d.name.as_str()).collect();
    let summary = summary_words(record);

    let mut scores = FieldScores::default();
    let mut matched = Vec::new();

    for term in terms {
        let tag = normalize_tag(term).unwrap_or_else(|| term.clone());
        if tags.contains(tag.as_str()) {
            scores.tag += weights.tag;
            matched.push(format!("tag:{}", tag));
        }
        let dep = normalize_package_name(term);
        if deps.contains(dep.as_str()) {
            scores.dependency += weights.dependency;
            matched.push(format!("dependency:{}", dep));
        }
        if summary.contains(term.as_str()) {
            scores.summary += weights.summary;
            matched.push(format!("summary:{}", term));
        }
    }
    for phrase in phrases {
        if tags.contains(phrase.as_str()) {
            scores.tag += weights.tag;
            matched.push(format!("tag:{}", phrase));
        }
    }
    (scores, matched)
}

/// Query engine bound to one store. Holds the inverted-index cache, so
/// reuse one engine across queries to benefit from it.
pub struct QueryEngine<'s, S: IndexStore + ?Sized> {
    store: &'s S,
    weights: ScoreWeights,
    cache: IndexCache,
}

impl<'s, S: IndexStore + ?Sized> QueryEngine<'s, S> {
    pub fn new(store: &'s S, weights: ScoreWeights) -> Self {
        Self {
            store,
            weights,
            cache: IndexCache::new(),
        }
    }

    /// Run a query. An empty result is "no local match", not an error; only
    /// store failures are errors.
    pub fn search(&self, req: &QueryRequest<'_>) -> KbResult<Vec<QueryHit>> {
        let tag_filter: Vec<String> = req.tags.iter().filter_map(|t| normalize_tag(t)).collect();
        let dep_filter: Vec<String> = req
            .dependencies
            .iter()
            .map(|d| normalize_package_name(d))
            .filter(|d| !d.is_empty())
            .collect();

        let tokens = tokenize(req.text);
        let (terms, phrases) = if tokens.is_empty() {
            let mut fallback = tag_filter.clone();
            fallback.extend(dep_filter.iter().cloned());
            (distinct(&fallback), Vec::new())
        } else {
            let terms = distinct(&tokens);
            let phrases: Vec<String> = phrases(&tokens)
                .into_iter()
                .filter(|p| !terms.contains(p))
                .collect();
            (terms, phrases)
        };
        if terms.is_empty() || req.limit == 0 {
            return Ok(Vec::new());
        }

        let snapshot = self.store.list()?;
        let allowed: Option<BTreeSet<RepoId>> = if tag_filter.is_empty() && dep_filter.is_empty() {
            None
        } else {
            self.cache.get_or_build(&snapshot).filter(&tag_filter, &dep_filter)
        };

        let mut hits: Vec<QueryHit> = snapshot
            .into_iter()
            .filter(|r| allowed.as_ref().is_none_or(|ids| ids.contains(&r.id)))
            .filter_map(|record| {
                let (breakdown, matched) = score_record(&record, &terms, &phrases, &self.weights);
                let score = breakdown.total();
                (score > 0.0).then(|| QueryHit {
                    id: record.id,
                    score,
                    matched,
                    breakdown,
                    summary: record.summary,
                    indexed_at: record.indexed_at,
                    incomplete: record.incomplete,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.indexed_at.cmp(&a.indexed_at))
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(req.limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dependency;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn record(id: &str, summary: &str, tags: &[&str], deps: &[&str], day: u32) -> RepositoryRecord {
        RepositoryRecord {
            version: crate::models::RECORD_VERSION,
            id: id.parse().unwrap(),
            local_path: PathBuf::new(),
            summary: summary.to_string(),
            use_when: None,
            dependencies: deps.iter().map(|d| Dependency::new(d, "")).collect(),
            key_files: Vec::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            indexed_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            source_hash: String::new(),
            incomplete: false,
            notes: Vec::new(),
        }
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .put(&record(
                "vision/minigpt",
                "A vision-language model for multimodal chat.",
                &["vision-language-model", "multimodal", "pytorch"],
                &["torch", "transformers"],
                1,
            ))
            .unwrap();
        store
            .put(&record(
                "web/site",
                "A static site generator written in Rust.",
                &["web", "rust"],
                &["serde", "clap"],
                2,
            ))
            .unwrap();
        store
            .put(&record(
                "nlp/tagger",
                "Part of speech tagging with transformers.",
                &["nlp"],
                &["transformers"],
                3,
            ))
            .unwrap();
        store
    }

    fn query<'a>(text: &'a str) -> QueryRequest<'a> {
        QueryRequest {
            text,
            limit: 10,
            ..Default::default()
        }
    }

    fn ids(hits: &[QueryHit]) -> Vec<String> {
        hits.iter().map(|h| h.id.to_string()).collect()
    }

    #[test]
    fn tokenize_drops_stopwords_and_punctuation() {
        assert_eq!(
            tokenize("Which repos use PyTorch, for C++ and scikit_learn?"),
            vec!["pytorch", "c++", "scikit_learn"]
        );
        assert!(tokenize("  the of a ").is_empty());
    }

    #[test]
    fn tag_outranks_dependency_outranks_summary() {
        let store = store();
        let engine = QueryEngine::new(&store, ScoreWeights::default());
        let hits = engine.search(&query("multimodal")).unwrap();
        assert_eq!(ids(&hits), vec!["vision/minigpt"]);
        assert_eq!(hits[0].matched, vec!["tag:multimodal", "summary:multimodal"]);
        assert_eq!(hits[0].score, 4.0);

        let hits = engine.search(&query("transformers")).unwrap();
        // nlp/tagger: dependency + summary = 3, indexed later; minigpt: dependency only.
        assert_eq!(ids(&hits), vec!["nlp/tagger", "vision/minigpt"]);
    }

    #[test]
    fn phrase_matches_hyphenated_tag() {
        let store = store();
        let engine = QueryEngine::new(&store, ScoreWeights::default());
        let hits = engine.search(&query("vision language model")).unwrap();
        assert_eq!(hits[0].id.to_string(), "vision/minigpt");
        assert!(hits[0]
            .matched
            .contains(&"tag:vision-language-model".to_string()));
    }

    #[test]
    fn underscored_term_matches_hyphenated_tag() {
        let store = store();
        let engine = QueryEngine::new(&store, ScoreWeights::default());
        let hits = engine.search(&query("Vision_Language_Model")).unwrap();
        assert_eq!(ids(&hits), vec!["vision/minigpt"]);
        assert_eq!(hits[0].matched, vec!["tag:vision-language-model"]);
        assert_eq!(hits[0].breakdown.tag, 3.0);
    }

    #[test]
    fn ties_break_on_recency_then_identity() {
        let store = InMemoryStore::new();
        store.put(&record("b/b", "", &["llm"], &[], 1)).unwrap();
        store.put(&record("a/a", "", &["llm"], &[], 1)).unwrap();
        store.put(&record("c/c", "", &["llm"], &[], 5)).unwrap();
        let engine = QueryEngine::new(&store, ScoreWeights::default());
        assert_eq!(
            ids(&engine.search(&query("llm")).unwrap()),
            vec!["c/c", "a/a", "b/b"]
        );
    }

    #[test]
    fn filters_are_hard_and_combined() {
        let store = store();
        let engine = QueryEngine::new(&store, ScoreWeights::default());
        let deps = vec!["Transformers".to_string()];
        let tags = vec!["NLP".to_string()];
        let hits = engine
            .search(&QueryRequest {
                text: "transformers",
                tags: &tags,
                dependencies: &deps,
                limit: 10,
            })
            .unwrap();
        assert_eq!(ids(&hits), vec!["nlp/tagger"]);
    }

    #[test]
    fn filter_only_query_scores_filter_values() {
        let store = store();
        let engine = QueryEngine::new(&store, ScoreWeights::default());
        let tags = vec!["rust".to_string()];
        let hits = engine
            .search(&QueryRequest {
                text: "",
                tags: &tags,
                dependencies: &[],
                limit: 10,
            })
            .unwrap();
        assert_eq!(ids(&hits), vec!["web/site"]);
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn no_match_is_empty_not_error() {
        let store = store();
        let engine = QueryEngine::new(&store, ScoreWeights::default());
        assert!(engine.search(&query("kubernetes operator")).unwrap().is_empty());
        assert!(engine.search(&query("")).unwrap().is_empty());
        assert!(engine.search(&query("the of")).unwrap().is_empty());
    }

    #[test]
    fn limit_truncates() {
        let store = store();
        let engine = QueryEngine::new(&store, ScoreWeights::default());
        let mut req = query("transformers");
        req.limit = 1;
        assert_eq!(engine.search(&req).unwrap().len(), 1);
    }

    #[test]
    fn sees_writes_between_queries() {
        let store = store();
        let engine = QueryEngine::new(&store, ScoreWeights::default());
        let tags = vec!["nlp".to_string()];
        let req = QueryRequest {
            text: "",
            tags: &tags,
            dependencies: &[],
            limit: 10,
        };
        assert_eq!(engine.search(&req).unwrap().len(), 1);
        store
            .put(&record("new/one", "", &["nlp"], &[], 9))
            .unwrap();
        assert_eq!(ids(&engine.search(&req).unwrap()), vec!["new/one", "nlp/tagger"]);
    }
}
