use crate::error::FetchError;
use crate::page::Page;
use crate::source::{CancelToken, PageRequest, PageSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pagination {
    /// `?page=n`, numbered from 1.
    #[default]
    Page,
    /// Opaque continuation token taken from the previous response.
    ///
    /// `next_field` is the dotted path of that token in the response body.
    Cursor {
        param: String,
        #[serde(default = "default_next_field")]
        next_field: String,
    },
}

fn default_next_field() -> String {
    "next_cursor".to_string()
}

/// Where the pieces of a page live inside the response JSON.
///
/// Each field is a dotted path such as `meta.total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub items: String,
    pub total: Option<String>,
    pub has_more: Option<String>,
    pub next_cursor: Option<String>,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            items: "items".to_string(),
            total: Some("total".to_string()),
            has_more: Some("has_more".to_string()),
            next_cursor: None,
        }
    }
}

impl Envelope {
    /// `{ "data": [...], "meta": { "total": n, "next_cursor": ... } }`
    pub fn data_meta() -> Self {
        Self {
            items: "data".to_string(),
            total: Some("meta.total".to_string()),
            has_more: None,
            next_cursor: Some("meta.next_cursor".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub page_param: String,
    pub per_page_param: String,
    pub search_param: String,
    pub cache_bust_param: Option<String>,
    pub pagination: Pagination,
    pub envelope: Envelope,
    pub timeout_ms: u64,
    pub bearer_token: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            page_param: "page".to_string(),
            per_page_param: "per_page".to_string(),
            search_param: "search".to_string(),
            cache_bust_param: Some("t".to_string()),
            pagination: Pagination::Page,
            envelope: Envelope::default(),
            timeout_ms: 10_000,
            bearer_token: None,
            headers: BTreeMap::new(),
        }
    }
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct DecodedPage {
    pub page: Page<Value>,
    pub next_cursor: Option<String>,
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |value, segment| value.get(segment))
}

fn cursor_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decodes one response body into a page of opaque items.
///
/// `has_more` comes from the explicit flag when the envelope has one, then
/// from the presence of a next cursor, and only as a last resort from
/// whether the server returned a full page.
pub fn decode_page(
    body: &str,
    envelope: &Envelope,
    request: &PageRequest,
) -> Result<DecodedPage, FetchError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    let items = lookup(&root, &envelope.items)
        .and_then(Value::as_array)
        .ok_or_else(|| {
            FetchError::Decode(format!("no item array at `{}`", envelope.items))
        })?
        .clone();

    let next_cursor = envelope
        .next_cursor
        .as_deref()
        .and_then(|path| lookup(&root, path))
        .and_then(cursor_text);
    let explicit = envelope
        .has_more
        .as_deref()
        .and_then(|path| lookup(&root, path))
        .and_then(Value::as_bool);
    let has_more = match (explicit, &envelope.next_cursor) {
        (Some(flag), _) => flag,
        (None, Some(_)) => next_cursor.is_some(),
        (None, None) => {
            let full = request.per_page > 0 && items.len() >= request.per_page as usize;
            debug!(page = request.page, full, "no more-flag in response, inferring from page size");
            full
        }
    };

    let seen = u64::from(request.page.saturating_sub(1)) * u64::from(request.per_page)
        + items.len() as u64;
    let total_count = envelope
        .total
        .as_deref()
        .and_then(|path| lookup(&root, path))
        .and_then(Value::as_u64)
        .unwrap_or(seen);

    Ok(DecodedPage {
        page: Page {
            items,
            page_number: request.page,
            total_count,
            has_more,
        },
        next_cursor,
    })
}

fn map_transport_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            FetchError::from_status(code, body)
        }
        ureq::Error::Transport(transport) => FetchError::Network(transport.to_string()),
    }
}

/// Blocking REST page source.
pub struct HttpSource {
    agent: ureq::Agent,
    config: HttpConfig,
    cursors: Vec<String>,
    requests_sent: u64,
}

impl HttpSource {
    pub fn new(mut config: HttpConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        if let Pagination::Cursor { next_field, .. } = &config.pagination {
            config.envelope.next_cursor = Some(next_field.clone());
        }
        Self {
            agent,
            config,
            cursors: Vec::new(),
            requests_sent: 0,
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn cache_bust(&mut self) -> String {
        self.requests_sent = self.requests_sent.wrapping_add(1);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        format!("{nanos}-{}", self.requests_sent)
    }

    /// Query parameters for `request`, in the order they are sent.
    pub fn query_params(&mut self, request: &PageRequest) -> Result<Vec<(String, String)>, FetchError> {
        let mut params = Vec::new();
        match &self.config.pagination {
            Pagination::Page => {
                params.push((self.config.page_param.clone(), request.page.to_string()));
            }
            Pagination::Cursor { param, .. } => {
                if request.page > 1 {
                    let index = (request.page - 2) as usize;
                    let cursor = self.cursors.get(index).ok_or_else(|| {
                        FetchError::Decode(format!("no cursor recorded for page {}", request.page))
                    })?;
                    params.push((param.clone(), cursor.clone()));
                }
            }
        }
        params.push((self.config.per_page_param.clone(), request.per_page.to_string()));

        let search = request.query.search_text();
        if !search.is_empty() {
            params.push((self.config.search_param.clone(), search.to_string()));
        }
        for (facet, value) in &request.query.filters {
            if !value.is_empty() {
                params.push((facet.clone(), value.clone()));
            }
        }
        if let Some(param) = self.config.cache_bust_param.clone() {
            params.push((param, self.cache_bust()));
        }
        Ok(params)
    }

    fn remember_cursor(&mut self, page: u32, cursor: Option<String>) {
        let keep = page.saturating_sub(1) as usize;
        self.cursors.truncate(keep);
        if let Some(cursor) = cursor {
            self.cursors.push(cursor);
        }
    }
}

impl PageSource for HttpSource {
    type Item = Value;

    fn fetch_page(
        &mut self,
        request: &PageRequest,
        cancel: &CancelToken,
    ) -> Result<Page<Value>, FetchError> {
        cancel.check()?;
        let params = self.query_params(request)?;

        let mut call = self.agent.get(&self.config.base_url);
        for (name, value) in &params {
            call = call.query(name, value);
        }
        if let Some(token) = &self.config.bearer_token {
            call = call.set("Authorization", &format!("Bearer {token}"));
        }
        for (name, value) in &self.config.headers {
            call = call.set(name, value);
        }

        debug!(url = %self.config.base_url, page = request.page, "GET");
        let response = call.call().map_err(map_transport_error)?;
        cancel.check()?;
        let body = response
            .into_string()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        cancel.check()?;

        let decoded = decode_page(&body, &self.config.envelope, request)?;
        self.remember_cursor(request.page, decoded.next_cursor);
        Ok(decoded.page)
    }
}
