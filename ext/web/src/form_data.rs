//! `FormData` (spec §3, §4.4): ordered, duplicate-name-preserving entry list
//! where Blob values are promoted to File (default filename `"blob"`).

use crate::blob::{Blob, File};
use crate::identity::InstanceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File(File),
}

#[derive(Debug, Clone)]
pub struct FormData {
    id: InstanceId,
    entries: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self {
            id: InstanceId::next(),
            entries: Vec::new(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn append_text(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), FormValue::Text(value.to_string())));
    }

    pub fn append_blob(&mut self, name: &str, blob: Blob, filename: Option<&str>) {
        let file = File::promote(blob, filename.unwrap_or("blob"));
        self.entries.push((name.to_string(), FormValue::File(file)));
    }

    pub fn set_text(&mut self, name: &str, value: &str) {
        self.replace(name, FormValue::Text(value.to_string()));
    }

    pub fn set_blob(&mut self, name: &str, blob: Blob, filename: Option<&str>) {
        let file = File::promote(blob, filename.unwrap_or("blob"));
        self.replace(name, FormValue::File(file));
    }

    fn replace(&mut self, name: &str, value: FormValue) {
        let mut replaced = false;
        self.entries.retain_mut(|(n, v)| {
            if n == name {
                if replaced {
                    false
                } else {
                    *v = value.clone();
                    replaced = true;
                    true
                }
            } else {
                true
            }
        });
        if !replaced {
            self.entries.push((name.to_string(), value));
        }
    }

    /// `delete(name)`/two-argument `delete(name, value)` (whatwg-compatible,
    /// spec §3 "FormData operations"), mirroring `Headers`'/
    /// `URLSearchParams`' own two-arg filter forms: with a `value`, only the
    /// entries equal to it are removed, by string equality for `Text` and
    /// by `File` equality (name, bytes, content type) for `File`.
    pub fn delete(&mut self, name: &str, value: Option<&FormValue>) {
        self.entries
            .retain(|(n, v)| n != name || value.is_some_and(|value| v != value));
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_all(&self, name: &str) -> Vec<&FormValue> {
        self.entries.iter().filter(|(n, _)| n == name).map(|(_, v)| v).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn entries(&self) -> &[(String, FormValue)] {
        &self.entries
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn for_each<F: FnMut(&str, &FormValue)>(&self, mut f: F) {
        for (name, value) in &self.entries {
            f(name, value);
        }
    }
}

impl Default for FormData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order_including_duplicates() {
        let mut fd = FormData::new();
        fd.append_text("a", "1");
        fd.append_text("a", "2");
        fd.append_text("b", "3");
        let names: Vec<_> = fd.entries().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["a", "a", "b"]);
    }

    #[test]
    fn get_all_returns_every_value_for_name() {
        let mut fd = FormData::new();
        fd.append_text("a", "1");
        fd.append_text("a", "2");
        assert_eq!(fd.get_all("a").len(), 2);
    }

    #[test]
    fn blob_append_promotes_to_file_with_default_name() {
        let mut fd = FormData::new();
        fd.append_blob("file", Blob::from_bytes(bytes::Bytes::from_static(b"x"), "text/plain"), None);
        match fd.get("file") {
            Some(FormValue::File(f)) => assert_eq!(f.name, "blob"),
            _ => panic!("expected file"),
        }
    }

    #[test]
    fn set_replaces_all_same_name_entries_with_one() {
        let mut fd = FormData::new();
        fd.append_text("a", "1");
        fd.append_text("a", "2");
        fd.set_text("a", "final");
        assert_eq!(fd.get_all("a").len(), 1);
    }

    #[test]
    fn delete_without_value_removes_every_entry_for_name() {
        let mut fd = FormData::new();
        fd.append_text("a", "1");
        fd.append_text("a", "2");
        fd.append_text("b", "3");
        fd.delete("a", None);
        assert!(!fd.has("a"));
        assert!(fd.has("b"));
    }

    #[test]
    fn delete_with_value_removes_only_matching_entries() {
        let mut fd = FormData::new();
        fd.append_text("a", "1");
        fd.append_text("a", "2");
        fd.delete("a", Some(&FormValue::Text("1".into())));
        assert_eq!(fd.get_all("a"), vec![&FormValue::Text("2".into())]);
    }
}
