use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Monotonic stamp attached to every distinct query a feed has shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryVersion(u64);

impl QueryVersion {
    pub fn get(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for QueryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl Query {
    pub fn new(search: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            filters: BTreeMap::new(),
        }
    }

    pub fn with_filter(mut self, facet: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(facet.into(), value.into());
        self
    }

    /// The search text as it should be sent to a backend.
    pub fn search_text(&self) -> &str {
        self.search.trim()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search={:?}", self.search)?;
        for (facet, value) in &self.filters {
            write!(f, " {facet}={value:?}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FacetEdit {
    Set(String, String),
    Clear(String),
}

/// A partial edit of a [`Query`].
///
/// Updates compose with [`QueryUpdate::merge`], later edits winning, so that
/// several edits made inside one debounce window apply as one change. Setting
/// a facet to an empty value clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryUpdate {
    search: Option<String>,
    clear_filters: bool,
    facets: Vec<FacetEdit>,
}

impl QueryUpdate {
    pub fn search(text: impl Into<String>) -> Self {
        Self::default().with_search(text)
    }

    pub fn filter(facet: impl Into<String>, value: impl Into<String>) -> Self {
        Self::default().with_filter(facet, value)
    }

    pub fn clear_filter(facet: impl Into<String>) -> Self {
        Self::default().without_filter(facet)
    }

    pub fn clear_all_filters() -> Self {
        Self {
            clear_filters: true,
            ..Self::default()
        }
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn with_filter(mut self, facet: impl Into<String>, value: impl Into<String>) -> Self {
        self.facets.push(FacetEdit::Set(facet.into(), value.into()));
        self
    }

    pub fn without_filter(mut self, facet: impl Into<String>) -> Self {
        self.facets.push(FacetEdit::Clear(facet.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_none() && !self.clear_filters && self.facets.is_empty()
    }

    pub fn merge(mut self, later: QueryUpdate) -> Self {
        if later.search.is_some() {
            self.search = later.search;
        }
        if later.clear_filters {
            self.clear_filters = true;
            self.facets.clear();
        }
        self.facets.extend(later.facets);
        self
    }

    pub fn apply_to(&self, base: &Query) -> Query {
        let mut query = base.clone();
        if let Some(search) = &self.search {
            query.search = search.clone();
        }
        if self.clear_filters {
            query.filters.clear();
        }
        for edit in &self.facets {
            match edit {
                FacetEdit::Set(facet, value) if value.is_empty() => {
                    query.filters.remove(facet);
                }
                FacetEdit::Set(facet, value) => {
                    query.filters.insert(facet.clone(), value.clone());
                }
                FacetEdit::Clear(facet) => {
                    query.filters.remove(facet);
                }
            }
        }
        query
    }
}

/// The live query of one feed and its version counter.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    current: Query,
    version: QueryVersion,
}

impl QueryState {
    pub fn new(initial: Query) -> Self {
        Self {
            current: initial,
            version: QueryVersion::default(),
        }
    }

    pub fn current(&self) -> &Query {
        &self.current
    }

    pub fn version(&self) -> QueryVersion {
        self.version
    }

    /// Applies `update` and returns the new query and version, or `None`
    /// when the result is equal to the current query.
    pub fn update(&mut self, update: &QueryUpdate) -> Option<(Query, QueryVersion)> {
        let next = update.apply_to(&self.current);
        if next == self.current {
            return None;
        }
        self.current = next;
        self.version = self.version.next();
        Some((self.current.clone(), self.version))
    }

    /// Issues a new version for the unchanged query.
    pub fn bump(&mut self) -> QueryVersion {
        self.version = self.version.next();
        self.version
    }
}
