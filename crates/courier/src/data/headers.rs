/// Ordered header list with case-insensitive names.
///
/// Setting a name that is already present replaces its value in place, so
/// the last write wins and the original position is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self { Self::default() }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Append without replacing; used for response headers that may repeat.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool { self.get(name).is_some() }

    pub fn remove(&mut self, name: &str) { self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name)); }

    pub fn merge(&mut self, other: &HeaderList) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn to_vec(&self) -> Vec<(String, String)> { self.0.clone() }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut list = HeaderList::new();
        for (k, v) in iter {
            list.set(k, v);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins_case_insensitive() {
        let mut headers = HeaderList::new();
        headers.set("Accept", "text/plain");
        headers.set("X-Trace", "1");
        headers.set("accept", "application/json");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("ACCEPT"), Some("application/json"));
        assert_eq!(headers.iter().next(), Some(("Accept", "application/json")));
    }

    #[test]
    fn test_append_keeps_duplicates() {
        let mut headers = HeaderList::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("set-cookie"), Some("b=2"));
    }

    #[test]
    fn test_merge_and_remove() {
        let mut base: HeaderList = [("A", "1"), ("B", "2")].into_iter().collect();
        let overlay: HeaderList = [("b", "3"), ("C", "4")].into_iter().collect();
        base.merge(&overlay);
        assert_eq!(base.get("B"), Some("3"));
        assert_eq!(base.len(), 3);
        base.remove("a");
        assert!(!base.contains("A"));
    }
}
