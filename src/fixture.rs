use crate::error::FetchError;
use crate::page::Page;
use crate::query::Query;
use crate::search::rank_matches;
use crate::source::{CancelToken, PageRequest, PageSource};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// In-memory page source over a list of JSON records.
///
/// Facet filters match record fields exactly (ignoring ASCII case; array
/// fields match when any element does). Search text is matched against the
/// configured text fields, or every string field when none are configured.
pub struct FixtureSource {
    items: Vec<Value>,
    text_fields: Vec<String>,
    latency: Duration,
}

impl FixtureSource {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            text_fields: Vec::new(),
            latency: Duration::ZERO,
        }
    }

    /// Loads a JSON array, or an object with an `items` array.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        let root: Value = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse fixture {}", path.display()))?;
        let items = match root {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("items") {
                Some(Value::Array(items)) => items,
                _ => bail!("fixture {} has no `items` array", path.display()),
            },
            _ => bail!("fixture {} is not a JSON array", path.display()),
        };
        Ok(Self::new(items))
    }

    pub fn with_text_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn item_text(&self, item: &Value) -> String {
        let mut parts = Vec::new();
        match item {
            Value::Object(map) if self.text_fields.is_empty() => {
                parts.extend(map.values().filter_map(Value::as_str));
            }
            Value::Object(map) => {
                parts.extend(
                    self.text_fields
                        .iter()
                        .filter_map(|field| map.get(field))
                        .filter_map(Value::as_str),
                );
            }
            Value::String(s) => parts.push(s.as_str()),
            _ => {}
        }
        parts.join(" ").to_lowercase()
    }

    fn wait_latency(&self, cancel: &CancelToken) -> Result<(), FetchError> {
        let deadline = Instant::now() + self.latency;
        loop {
            cancel.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(Duration::from_millis(5)));
        }
    }

    fn select(&self, query: &Query) -> Vec<&Value> {
        let candidates: Vec<&Value> = self
            .items
            .iter()
            .filter(|item| matches_filters(item, query))
            .collect();
        let haystacks: Vec<String> = candidates.iter().map(|item| self.item_text(item)).collect();
        rank_matches(query.search_text(), &haystacks)
            .into_iter()
            .map(|index| candidates[index])
            .collect()
    }
}

fn field_matches(value: &Value, wanted: &str) -> bool {
    match value {
        Value::String(s) => s.eq_ignore_ascii_case(wanted),
        Value::Number(n) => n.to_string() == wanted,
        Value::Bool(b) => b.to_string().eq_ignore_ascii_case(wanted),
        Value::Array(values) => values.iter().any(|v| field_matches(v, wanted)),
        _ => false,
    }
}

fn matches_filters(item: &Value, query: &Query) -> bool {
    query
        .filters
        .iter()
        .filter(|(_, wanted)| !wanted.is_empty())
        .all(|(facet, wanted)| {
            item.get(facet)
                .map(|value| field_matches(value, wanted))
                .unwrap_or(false)
        })
}

impl PageSource for FixtureSource {
    type Item = Value;

    fn fetch_page(
        &mut self,
        request: &PageRequest,
        cancel: &CancelToken,
    ) -> Result<Page<Value>, FetchError> {
        if request.page == 0 || request.per_page == 0 {
            return Err(FetchError::Client {
                status: 400,
                message: "page and per_page must be positive".to_string(),
            });
        }
        self.wait_latency(cancel)?;

        let matched = self.select(&request.query);
        let per_page = request.per_page as usize;
        let start = (request.page as usize - 1).saturating_mul(per_page);
        let end = start.saturating_add(per_page).min(matched.len());
        let items = matched
            .get(start..end)
            .map(|slice| slice.iter().map(|item| (*item).clone()).collect())
            .unwrap_or_default();

        Ok(Page {
            items,
            page_number: request.page,
            total_count: matched.len() as u64,
            has_more: end < matched.len(),
        })
    }
}
