//! Node type registry.
//!
//! Maps a `type` string from the IR to a factory producing a [`Node`]
//! instance, plus searchable metadata. The registry is populated at startup,
//! read-only afterwards, and cheap to clone (contents are behind `Arc`s), so
//! one registry serves any number of concurrent runs.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::node::Node;

/// Factory producing a fresh node instance for one compilation.
pub type NodeFactory = Arc<dyn Fn() -> Arc<dyn Node> + Send + Sync>;

/// Searchable description of a registered node type.
#[derive(Clone, Debug, Default)]
pub struct NodeMetadata {
    pub description: String,
    pub keywords: Vec<String>,
}

impl NodeMetadata {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            keywords: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Clone)]
struct RegistryEntry {
    factory: NodeFactory,
    metadata: NodeMetadata,
}

/// Registry of node types available to the compiler and validator.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use pflow::node::{Node, NodeCtx, NodeError, NodeOutcome, NodeSpec};
/// use pflow::registry::{NodeMetadata, Registry};
/// use pflow::types::JsonMap;
///
/// struct Noop;
///
/// #[async_trait]
/// impl Node for Noop {
///     fn spec(&self) -> NodeSpec { NodeSpec::new() }
///     async fn exec(&self, _: JsonMap, _: NodeCtx) -> Result<NodeOutcome, NodeError> {
///         Ok(NodeOutcome::success(JsonMap::new()))
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.register("noop", NodeMetadata::new("does nothing"), || Arc::new(Noop));
/// assert!(registry.contains("noop"));
/// assert!(registry.get("missing").is_none());
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    entries: FxHashMap<String, RegistryEntry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type. Re-registering a name replaces the entry.
    pub fn register<F, N>(&mut self, name: impl Into<String>, metadata: NodeMetadata, factory: F)
    where
        F: Fn() -> Arc<N> + Send + Sync + 'static,
        N: Node + 'static,
    {
        let factory: NodeFactory = Arc::new(move || factory() as Arc<dyn Node>);
        self.entries
            .insert(name.into(), RegistryEntry { factory, metadata });
    }

    /// Instantiate a node of the given type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.entries.get(name).map(|entry| (entry.factory)())
    }

    /// Whether the type is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Metadata for a registered type.
    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<&NodeMetadata> {
        self.entries.get(name).map(|entry| &entry.metadata)
    }

    /// All registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Rank registered types against a free-text query.
    ///
    /// Scoring: exact name match, then name prefix, then name substring,
    /// then keyword/description hits. Results are sorted by descending score
    /// with name as the tie-breaker; non-matches are omitted.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<(String, NodeMetadata, f32)> {
        let needle = query.to_lowercase();
        let mut hits: Vec<(String, NodeMetadata, f32)> = self
            .entries
            .iter()
            .filter_map(|(name, entry)| {
                let score = score_entry(name, &entry.metadata, &needle);
                (score > 0.0).then(|| (name.clone(), entry.metadata.clone(), score))
            })
            .collect();
        hits.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits
    }
}

fn score_entry(name: &str, metadata: &NodeMetadata, needle: &str) -> f32 {
    let name_lc = name.to_lowercase();
    if name_lc == needle {
        return 1.0;
    }
    if name_lc.starts_with(needle) {
        return 0.8;
    }
    if name_lc.contains(needle) {
        return 0.6;
    }
    if metadata
        .keywords
        .iter()
        .any(|k| k.to_lowercase().contains(needle))
    {
        return 0.4;
    }
    if metadata.description.to_lowercase().contains(needle) {
        return 0.2;
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeCtx, NodeError, NodeOutcome, NodeSpec};
    use crate::types::JsonMap;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Node for Noop {
        fn spec(&self) -> NodeSpec {
            NodeSpec::new()
        }
        async fn exec(&self, _: JsonMap, _: NodeCtx) -> Result<NodeOutcome, NodeError> {
            Ok(NodeOutcome::success(JsonMap::new()))
        }
    }

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register(
            "http",
            NodeMetadata::new("perform an HTTP request").with_keywords(["fetch", "rest"]),
            || Arc::new(Noop),
        );
        r.register("http_download", NodeMetadata::new("download a file"), || {
            Arc::new(Noop)
        });
        r.register("shell", NodeMetadata::new("run a shell command"), || {
            Arc::new(Noop)
        });
        r
    }

    #[test]
    fn exact_match_outranks_prefix() {
        let hits = registry().search("http");
        assert_eq!(hits[0].0, "http");
        assert_eq!(hits[1].0, "http_download");
        assert!(hits[0].2 > hits[1].2);
    }

    #[test]
    fn keyword_hits_rank_below_name_hits() {
        let hits = registry().search("fetch");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "http");
        assert!(hits[0].2 < 0.6);
    }

    #[test]
    fn type_names_are_sorted() {
        assert_eq!(registry().type_names(), ["http", "http_download", "shell"]);
    }
}
