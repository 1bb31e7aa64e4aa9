//! Route cache policies.
//!
//! Maps route shapes to `{namespace, ttl, invalidation tags}`. The registry
//! is built once at startup and read-only afterwards; unmatched routes are
//! not errors, they receive the default policy.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Template for an invalidation tag, e.g. `project:{id}`.
///
/// Placeholders refer to path parameters captured by the matched route
/// pattern and are filled in at cache-write time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagTemplate(String);

impl TagTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Render the template against captured path parameters.
    ///
    /// A placeholder with no matching parameter is left literal, so the tag
    /// still names a stable (if coarser) group.
    pub fn render(&self, path_params: &BTreeMap<String, String>) -> String {
        let mut rendered = self.0.clone();
        for (name, value) in path_params {
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        rendered
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Caching policy for one route shape.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub namespace: String,
    pub ttl: Duration,
    pub tags: Vec<TagTemplate>,
    /// Allow caching of non-GET responses; when set, the request body joins
    /// the key hash. Off by default.
    pub cache_mutating: bool,
}

impl CachePolicy {
    pub fn new(namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            ttl,
            tags: Vec::new(),
            cache_mutating: false,
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(|t| TagTemplate::new(t)).collect();
        self
    }

    pub fn cache_mutating(mut self) -> Self {
        self.cache_mutating = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    fn is_parameterized(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Param(_)))
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let concrete: Vec<_> = path.split('/').filter(|s| !s.is_empty()).collect();
        if concrete.len() != self.segments.len() {
            return None;
        }
        let mut params = BTreeMap::new();
        for (segment, actual) in self.segments.iter().zip(concrete) {
            match segment {
                Segment::Literal(expected) if expected == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), actual.to_string());
                }
            }
        }
        Some(params)
    }
}

/// Outcome of resolving a concrete request path.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The matched route shape (the pattern string, or the concrete path for
    /// exact and default matches). Part of the cache key.
    pub route: String,
    pub policy: CachePolicy,
    pub path_params: BTreeMap<String, String>,
}

/// Static route-shape → policy registry.
///
/// Matching order: exact literal, then parameterized patterns with the most
/// literal segments (ties broken by total length), then the default policy.
pub struct PolicyRegistry {
    exact: HashMap<String, CachePolicy>,
    patterns: Vec<(RoutePattern, CachePolicy)>,
    default_policy: CachePolicy,
}

impl PolicyRegistry {
    pub fn builder(default_policy: CachePolicy) -> PolicyRegistryBuilder {
        PolicyRegistryBuilder {
            routes: Vec::new(),
            default_policy,
        }
    }

    pub fn resolve(&self, path: &str) -> Resolution {
        if let Some(policy) = self.exact.get(path) {
            return Resolution {
                route: path.to_string(),
                policy: policy.clone(),
                path_params: BTreeMap::new(),
            };
        }
        for (pattern, policy) in &self.patterns {
            if let Some(path_params) = pattern.matches(path) {
                return Resolution {
                    route: pattern.raw.clone(),
                    policy: policy.clone(),
                    path_params,
                };
            }
        }
        Resolution {
            route: path.to_string(),
            policy: self.default_policy.clone(),
            path_params: BTreeMap::new(),
        }
    }

    pub fn default_policy(&self) -> &CachePolicy {
        &self.default_policy
    }
}

pub struct PolicyRegistryBuilder {
    routes: Vec<(String, CachePolicy)>,
    default_policy: CachePolicy,
}

impl PolicyRegistryBuilder {
    pub fn route(mut self, pattern: impl Into<String>, policy: CachePolicy) -> Self {
        self.routes.push((pattern.into(), policy));
        self
    }

    pub fn build(self) -> PolicyRegistry {
        let mut exact = HashMap::new();
        let mut patterns = Vec::new();
        for (raw, policy) in self.routes {
            let pattern = RoutePattern::parse(&raw);
            if pattern.is_parameterized() {
                patterns.push((pattern, policy));
            } else {
                exact.insert(raw, policy);
            }
        }
        patterns.sort_by(|(a, _), (b, _)| {
            b.literal_count()
                .cmp(&a.literal_count())
                .then(b.segments.len().cmp(&a.segments.len()))
        });
        PolicyRegistry {
            exact,
            patterns,
            default_policy: self.default_policy,
        }
    }
}
