use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

#[derive(Debug, Clone, Default)]
pub struct SearchTerms {
    pub include_terms: Vec<String>,
    pub exact_terms: Vec<String>,
    pub exclude_terms: Vec<String>,
}

impl SearchTerms {
    pub fn is_empty(&self) -> bool {
        self.include_terms.is_empty() && self.exact_terms.is_empty() && self.exclude_terms.is_empty()
    }
}

/// Splits free text into fuzzy, `'exact` and `!excluded` terms.
pub fn parse_terms(text: &str) -> SearchTerms {
    let mut include_terms = Vec::new();
    let mut exact_terms = Vec::new();
    let mut exclude_terms = Vec::new();

    for token in text.split_whitespace() {
        if let Some(term) = token.strip_prefix('\'').filter(|t| !t.is_empty()) {
            exact_terms.push(term.to_lowercase());
        } else if let Some(term) = token.strip_prefix('!').filter(|t| !t.is_empty()) {
            exclude_terms.push(term.to_lowercase());
        } else {
            include_terms.push(token.to_lowercase());
        }
    }

    SearchTerms {
        include_terms,
        exact_terms,
        exclude_terms,
    }
}

fn is_subsequence(query: &str, text: &str) -> bool {
    let mut wanted = query.chars().peekable();
    for ch in text.chars() {
        if wanted.peek() == Some(&ch) {
            wanted.next();
        }
    }
    wanted.peek().is_none()
}

fn matches_anchored_literal(term: &str, text: &str) -> bool {
    let anchored_start = term.starts_with('^');
    let anchored_end = term.len() > 1 && term.ends_with('$');

    let mut core = term;
    if anchored_start {
        core = &core[1..];
    }
    if anchored_end {
        core = &core[..core.len().saturating_sub(1)];
    }
    if core.is_empty() {
        return false;
    }

    match (anchored_start, anchored_end) {
        (true, true) => text == core,
        (true, false) => text.starts_with(core),
        (false, true) => text.ends_with(core),
        (false, false) => text.contains(core),
    }
}

fn matches_include_term(term: &str, text: &str) -> bool {
    text.contains(term) || is_subsequence(term, text)
}

/// Whether `haystack` satisfies every term. `haystack` must be lowercase.
pub fn matches_terms(terms: &SearchTerms, haystack: &str) -> bool {
    if terms
        .exclude_terms
        .iter()
        .any(|term| matches_anchored_literal(term, haystack))
    {
        return false;
    }
    terms
        .exact_terms
        .iter()
        .all(|term| matches_anchored_literal(term, haystack))
        && terms
            .include_terms
            .iter()
            .all(|term| matches_include_term(term, haystack))
}

fn fallback_score(query: &str, text: &str) -> i64 {
    let mut score = 0;
    if text.contains(query) {
        score += 25;
    }
    if text.starts_with(query) {
        score += 30;
    }
    score + query.len().min(text.len()) as i64
}

/// Filters `haystacks` by `text` and returns the indices of the matches,
/// best first. Ties keep their input order.
pub fn rank_matches(text: &str, haystacks: &[String]) -> Vec<usize> {
    let terms = parse_terms(text);
    if terms.is_empty() {
        return (0..haystacks.len()).collect();
    }

    let mut q = terms.include_terms.join(" ");
    if q.is_empty() {
        if let Some(first_exact) = terms.exact_terms.first() {
            q = first_exact.clone();
        }
    }

    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(usize, i64)> = haystacks
        .iter()
        .enumerate()
        .filter(|(_, haystack)| matches_terms(&terms, haystack))
        .map(|(index, haystack)| {
            let mut score = if q.is_empty() {
                0
            } else {
                matcher
                    .fuzzy_match(haystack, &q)
                    .unwrap_or_else(|| fallback_score(&q, haystack))
            };
            score += 800 * terms.exact_terms.len() as i64;
            (index, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(index, _)| index).collect()
}
