//! `URL`/`URLSearchParams` (spec §4.4, §9 "URL live binding"): wraps the
//! `url`/`idna` crates the way `deno_url` does. `url.searchParams` is a
//! true live binding: the `UrlSearchParams` returned by `search_params()` is
//! itself `Arc`-backed interior-mutable state, cached on the owning `Url`
//! behind a `OnceLock` the same way `response.rs`'s `body_shim` caches its
//! stream shim — every call returns the *same* instance (same `InstanceId`,
//! same backing entries), so a mutation made through one retained reference
//! is visible through any other, and through `url.search`/`url.href`,
//! without any explicit "apply" step.

use std::sync::{Arc, Mutex, OnceLock};

use crate::error::WebError;
use crate::identity::InstanceId;

/// `&self` methods throughout: the entries live behind a shared `Mutex` so
/// every clone of a `UrlSearchParams` (including the one cached on its
/// owning `Url`) observes the same mutations (spec §9 "URL live binding").
#[derive(Debug, Clone)]
pub struct UrlSearchParams {
    id: InstanceId,
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl UrlSearchParams {
    pub fn new() -> Self {
        Self {
            id: InstanceId::next(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// `+` decodes as space, per WHATWG `application/x-www-form-urlencoded`.
    pub fn parse(query: &str) -> Self {
        let params = Self::new();
        let query = query.strip_prefix('?').unwrap_or(query);
        if query.is_empty() {
            return params;
        }
        let mut entries = params.entries.lock().unwrap();
        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (name, value) = match pair.split_once('=') {
                Some((n, v)) => (n, v),
                None => (pair, ""),
            };
            entries.push((decode_form(name), decode_form(value)));
        }
        drop(entries);
        params
    }

    /// Copy-constructs by iterating an existing instance's entries (spec
    /// §4.4 "Constructor accepts another URLSearchParams by iterator copy").
    /// A fresh, independent instance — not a further live-bound clone.
    pub fn from_existing(other: &UrlSearchParams) -> Self {
        let params = Self::new();
        *params.entries.lock().unwrap() = other.entries.lock().unwrap().clone();
        params
    }

    /// Replaces every entry in place so existing holders of this same
    /// instance observe the update (used when a `Url` mutation like
    /// `set_href`/`set_search` needs to resync an already-cached
    /// `searchParams`).
    pub(crate) fn replace_entries_from_query(&self, query: &str) {
        let reparsed = Self::parse(query);
        *self.entries.lock().unwrap() = reparsed.entries.lock().unwrap().clone();
    }

    pub fn append(&self, name: &str, value: &str) {
        self.entries.lock().unwrap().push((name.to_string(), value.to_string()));
    }

    pub fn set(&self, name: &str, value: &str) {
        let mut entries = self.entries.lock().unwrap();
        let mut found = false;
        entries.retain_mut(|(n, v)| {
            if n == name {
                if found {
                    false
                } else {
                    found = true;
                    *v = value.to_string();
                    true
                }
            } else {
                true
            }
        });
        if !found {
            entries.push((name.to_string(), value.to_string()));
        }
    }

    pub fn delete(&self, name: &str, value: Option<&str>) {
        self.entries
            .lock()
            .unwrap()
            .retain(|(n, v)| n != name || value.is_some_and(|value| v != value));
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.entries.lock().unwrap().iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
    }

    pub fn get_all(&self, name: &str) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn has(&self, name: &str, value: Option<&str>) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(n, v)| n == name && value.is_none_or(|value| v == value))
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn values(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn size(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Stable sort by name, preserving relative order of same-named pairs.
    pub fn sort(&self) {
        self.entries.lock().unwrap().sort_by(|a, b| a.0.cmp(&b.0));
    }

    /// `+` for space, percent-encoding otherwise.
    pub fn to_query_string(&self) -> String {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(n, v)| format!("{}={}", encode_form(n), encode_form(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl Default for UrlSearchParams {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_form(s: &str) -> String {
    percent_encoding::percent_decode_str(&s.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

fn encode_form(s: &str) -> String {
    const FRAGMENT: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
        .remove(b'*')
        .remove(b'-')
        .remove(b'.')
        .remove(b'_');
    percent_encoding::utf8_percent_encode(s, FRAGMENT)
        .to_string()
        .replace("%20", "+")
}

#[derive(Debug, Clone)]
pub struct Url {
    id: InstanceId,
    inner: url::Url,
    /// Cached on first access, mirroring `response.rs`'s `body_shim`
    /// `OnceLock` pattern; never replaced wholesale once set, only mutated
    /// in place via `UrlSearchParams::replace_entries_from_query`.
    search_params: Arc<OnceLock<UrlSearchParams>>,
}

impl Url {
    pub fn parse(input: &str, base: Option<&str>) -> Result<Self, WebError> {
        let parsed = match base {
            Some(base) => {
                let base = url::Url::parse(base)?;
                base.join(input)?
            }
            None => url::Url::parse(input)?,
        };
        Ok(Self {
            id: InstanceId::next(),
            inner: parsed,
            search_params: Arc::new(OnceLock::new()),
        })
    }

    pub fn can_parse(input: &str, base: Option<&str>) -> bool {
        Self::parse(input, base).is_ok()
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn href(&self) -> String {
        match self.search_params.get() {
            Some(params) => self.href_with_query(&params.to_query_string()),
            None => self.inner.as_str().to_string(),
        }
    }

    fn href_with_query(&self, query: &str) -> String {
        let mut inner = self.inner.clone();
        inner.set_query(if query.is_empty() { None } else { Some(query) });
        inner.as_str().to_string()
    }

    pub fn set_href(&mut self, href: &str) -> Result<(), WebError> {
        self.inner = url::Url::parse(href)?;
        self.sync_cached_params();
        Ok(())
    }

    /// Pushes a mutation made directly on `self.inner`'s query string into
    /// the cached `searchParams`, if one has already been handed out, so
    /// that reference keeps observing the url's current state.
    fn sync_cached_params(&self) {
        if let Some(params) = self.search_params.get() {
            params.replace_entries_from_query(self.inner.query().unwrap_or(""));
        }
    }

    pub fn search(&self) -> String {
        let query = match self.search_params.get() {
            Some(params) => params.to_query_string(),
            None => self.inner.query().unwrap_or("").to_string(),
        };
        if query.is_empty() {
            String::new()
        } else {
            format!("?{query}")
        }
    }

    pub fn set_search(&mut self, search: &str) {
        let trimmed = search.strip_prefix('?').unwrap_or(search);
        self.inner.set_query(if trimmed.is_empty() { None } else { Some(trimmed) });
        self.sync_cached_params();
    }

    /// Returns the single, identity-stable `searchParams` live binding:
    /// every call returns a handle onto the same cached instance.
    pub fn search_params(&self) -> UrlSearchParams {
        self.search_params
            .get_or_init(|| UrlSearchParams::parse(self.inner.query().unwrap_or("")))
            .clone()
    }

    pub fn origin(&self) -> String {
        self.inner.origin().ascii_serialization()
    }

    pub fn protocol(&self) -> String {
        format!("{}:", self.inner.scheme())
    }

    pub fn host(&self) -> String {
        self.inner.host_str().map(|h| {
            match self.inner.port() {
                Some(p) => format!("{h}:{p}"),
                None => h.to_string(),
            }
        }).unwrap_or_default()
    }

    pub fn hostname(&self) -> String {
        self.inner.host_str().unwrap_or_default().to_string()
    }

    pub fn pathname(&self) -> String {
        self.inner.path().to_string()
    }

    pub fn hash(&self) -> String {
        match self.inner.fragment() {
            Some(f) if !f.is_empty() => format!("#{f}"),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_href_is_stable() {
        let u = Url::parse("https://example.com/a?b=1#c", None).unwrap();
        let reparsed = Url::parse(&u.href(), None).unwrap();
        assert_eq!(u.href(), reparsed.href());
    }

    #[test]
    fn can_parse_reports_validity_without_throwing() {
        assert!(Url::can_parse("https://example.com", None));
        assert!(!Url::can_parse("not a url", None));
    }

    #[test]
    fn search_params_is_identity_stable_across_calls() {
        let u = Url::parse("https://example.com/", None).unwrap();
        assert_eq!(u.search_params().id(), u.search_params().id());
    }

    #[test]
    fn mutating_a_held_search_params_reference_is_visible_on_search_and_href_without_reassign() {
        let u = Url::parse("https://example.com/", None).unwrap();
        let params = u.search_params();
        params.append("a", "1");
        assert_eq!(u.search(), "?a=1");
        assert!(u.href().contains("a=1"));
        // A second, independently fetched reference observes the same state.
        assert_eq!(u.search_params().get("a").as_deref(), Some("1"));
    }

    #[test]
    fn assigning_search_is_reflected_by_existing_search_params_reference() {
        let mut u = Url::parse("https://example.com/", None).unwrap();
        let params = u.search_params();
        u.set_search("?x=9");
        assert_eq!(params.get("x").as_deref(), Some("9"));
    }

    #[test]
    fn assigning_href_resyncs_an_already_cached_search_params_reference() {
        let mut u = Url::parse("https://example.com/?a=1", None).unwrap();
        let params = u.search_params();
        u.set_href("https://example.com/?b=2").unwrap();
        assert_eq!(params.get("a"), None);
        assert_eq!(params.get("b").as_deref(), Some("2"));
    }

    #[test]
    fn plus_encodes_space_and_decodes_back() {
        let params = UrlSearchParams::new();
        params.append("q", "a b");
        assert_eq!(params.to_query_string(), "q=a+b");
        let decoded = UrlSearchParams::parse("q=a+b");
        assert_eq!(decoded.get("q").as_deref(), Some("a b"));
    }

    #[test]
    fn size_counts_entries() {
        let params = UrlSearchParams::new();
        params.append("a", "1");
        params.append("b", "2");
        assert_eq!(params.size(), 2);
    }

    #[test]
    fn sort_is_stable_by_name() {
        let params = UrlSearchParams::new();
        params.append("b", "1");
        params.append("a", "2");
        params.append("a", "1");
        params.sort();
        assert_eq!(params.keys(), vec!["a", "a", "b"]);
    }

    #[test]
    fn from_existing_copies_a_snapshot_not_a_live_reference() {
        let original = UrlSearchParams::new();
        original.append("a", "1");
        let copy = UrlSearchParams::from_existing(&original);
        original.append("b", "2");
        assert_eq!(copy.size(), 1);
        assert_ne!(copy.id(), original.id());
    }
}
