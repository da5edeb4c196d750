//! `Headers` (spec §3, §4.4): case-insensitive multi-map with ascending
//! lowercased-name iteration order and a dedicated ordered list for
//! `Set-Cookie`.

use std::collections::BTreeMap;

use crate::error::WebError;
use crate::identity::InstanceId;

#[derive(Debug, Clone)]
pub struct Headers {
    id: InstanceId,
    // lowercased name -> comma-joined value, except "set-cookie" which is
    // never stored here (it lives only in `set_cookies` so its occurrences
    // stay individually addressable).
    entries: BTreeMap<String, String>,
    set_cookies: Vec<String>,
}

fn is_set_cookie(name: &str) -> bool {
    name.eq_ignore_ascii_case("set-cookie")
}

fn validate_name(name: &str) -> Result<(), WebError> {
    let valid = !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        });
    if valid {
        Ok(())
    } else {
        Err(WebError::InvalidHeaderName(name.to_string()))
    }
}

fn validate_value(value: &str) -> Result<(), WebError> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        Err(WebError::InvalidHeaderValue(value.to_string()))
    } else {
        Ok(())
    }
}

impl Headers {
    pub fn new() -> Self {
        Self {
            id: InstanceId::next(),
            entries: BTreeMap::new(),
            set_cookies: Vec::new(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, WebError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            headers.append(name.as_ref(), value.as_ref())?;
        }
        Ok(headers)
    }

    /// Copy-constructs from another `Headers` via its public iterator, never
    /// by reading internal fields directly (spec §4.4, §4.5, §9).
    pub fn from_existing(other: &Headers) -> Self {
        let mut headers = Self::new();
        for (name, value) in other.entries() {
            // already-validated data from an existing instance
            headers.append_unchecked(&name, &value);
        }
        headers
    }

    fn append_unchecked(&mut self, name: &str, value: &str) {
        let lower = name.to_ascii_lowercase();
        if is_set_cookie(&lower) {
            self.set_cookies.push(value.to_string());
            return;
        }
        self.entries
            .entry(lower)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    pub fn append(&mut self, name: &str, value: &str) -> Result<(), WebError> {
        validate_name(name)?;
        validate_value(value)?;
        self.append_unchecked(name, value);
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), WebError> {
        validate_name(name)?;
        validate_value(value)?;
        let lower = name.to_ascii_lowercase();
        if is_set_cookie(&lower) {
            self.set_cookies = vec![value.to_string()];
        } else {
            self.entries.insert(lower, value.to_string());
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let lower = name.to_ascii_lowercase();
        if is_set_cookie(&lower) {
            if self.set_cookies.is_empty() {
                None
            } else {
                Some(self.set_cookies.join(", "))
            }
        } else {
            self.entries.get(&lower).cloned()
        }
    }

    pub fn get_set_cookie(&self) -> Vec<String> {
        self.set_cookies.clone()
    }

    pub fn has(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        if is_set_cookie(&lower) {
            !self.set_cookies.is_empty()
        } else {
            self.entries.contains_key(&lower)
        }
    }

    /// Two-argument `has(name, value)` form.
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        match self.get(name) {
            Some(existing) => existing.split(", ").any(|v| v == value),
            None => false,
        }
    }

    pub fn delete(&mut self, name: &str) {
        let lower = name.to_ascii_lowercase();
        if is_set_cookie(&lower) {
            self.set_cookies.clear();
        } else {
            self.entries.remove(&lower);
        }
    }

    /// Two-argument `delete(name, value)` form: removes only the matching
    /// comma-joined member, or the whole entry if it was the last one.
    pub fn delete_value(&mut self, name: &str, value: &str) {
        let lower = name.to_ascii_lowercase();
        if is_set_cookie(&lower) {
            self.set_cookies.retain(|v| v != value);
            return;
        }
        if let Some(existing) = self.entries.get(&lower) {
            let remaining: Vec<&str> = existing.split(", ").filter(|v| *v != value).collect();
            if remaining.is_empty() {
                self.entries.remove(&lower);
            } else {
                self.entries.insert(lower, remaining.join(", "));
            }
        }
    }

    /// Iteration order: ascending by lowercased name; `set-cookie` entries
    /// are surfaced individually, each occurrence its own pair, in
    /// insertion order, interleaved at their lexicographic position.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for cookie in &self.set_cookies {
            out.push(("set-cookie".to_string(), cookie.clone()));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    pub fn for_each<F: FnMut(&str, &str)>(&self, mut f: F) {
        for (name, value) in self.entries() {
            f(&name, &value);
        }
    }
}

impl Default for Headers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_case_insensitive() {
        let h = Headers::from_pairs([("Content-Type", "application/json")]).unwrap();
        assert_eq!(h.get("content-type").as_deref(), Some("application/json"));
        assert_eq!(h.get("CONTENT-TYPE").as_deref(), Some("application/json"));
    }

    #[test]
    fn iteration_is_ascending_by_lowercased_name() {
        let h = Headers::from_pairs([("Zebra", "1"), ("apple", "2")]).unwrap();
        let names: Vec<_> = h.keys();
        assert_eq!(names, vec!["apple", "zebra"]);
    }

    #[test]
    fn append_joins_with_comma() {
        let mut h = Headers::new();
        h.append("X-Foo", "a").unwrap();
        h.append("X-Foo", "b").unwrap();
        assert_eq!(h.get("x-foo").as_deref(), Some("a, b"));
    }

    #[test]
    fn set_cookie_entries_stay_individually_addressable() {
        let mut h = Headers::new();
        h.append("Set-Cookie", "a=1").unwrap();
        h.append("Set-Cookie", "b=2").unwrap();
        assert_eq!(h.get_set_cookie(), vec!["a=1", "b=2"]);
        let cookie_entries: Vec<_> = h
            .entries()
            .into_iter()
            .filter(|(k, _)| k == "set-cookie")
            .collect();
        assert_eq!(cookie_entries.len(), 2);
    }

    #[test]
    fn copy_construct_traverses_via_public_iterator() {
        let mut original = Headers::new();
        original.append("A", "1").unwrap();
        let copy = Headers::from_existing(&original);
        assert_eq!(copy.get("a").as_deref(), Some("1"));
        assert_ne!(copy.id().as_u64(), original.id().as_u64());
    }

    #[test]
    fn invalid_header_name_rejected() {
        assert!(Headers::new().append("bad name", "v").is_err());
    }

    #[test]
    fn has_value_and_delete_value_filter_by_member() {
        let mut h = Headers::new();
        h.append("X-Foo", "a").unwrap();
        h.append("X-Foo", "b").unwrap();
        assert!(h.has_value("X-Foo", "a"));
        h.delete_value("X-Foo", "a");
        assert_eq!(h.get("x-foo").as_deref(), Some("b"));
    }
}
