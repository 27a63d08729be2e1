use std::fmt;

use crate::{Result, StoreError};

/// Slash-separated path of a collection, e.g. `users` or `users/u1/sentRecipes`.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug)]
pub struct CollectionPath(String);

/// Slash-separated path of a document, always one segment deeper than its collection.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug)]
pub struct DocumentPath(String);

fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StoreError::InvalidPath(format!("bad path segment `{segment}`")));
    }
    Ok(())
}

impl CollectionPath {
    pub fn root(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        check_segment(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn doc(&self, id: impl AsRef<str>) -> Result<DocumentPath> {
        let id = id.as_ref();
        check_segment(id)?;
        Ok(DocumentPath(format!("{}/{}", self.0, id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key prefix shared by every document directly or indirectly under this collection.
    pub(crate) fn key_prefix(&self) -> String {
        format!("{}/", self.0)
    }
}

impl DocumentPath {
    pub fn collection(&self, name: impl AsRef<str>) -> Result<CollectionPath> {
        let name = name.as_ref();
        check_segment(name)?;
        Ok(CollectionPath(format!("{}/{}", self.0, name)))
    }

    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_key(key: &[u8]) -> Result<Self> {
        let key = std::str::from_utf8(key)
            .map_err(|_| StoreError::InvalidPath("stored key is not utf-8".into()))?;
        Ok(Self(key.to_string()))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths() {
        let user = CollectionPath::root("users").unwrap().doc("u1").unwrap();
        let sent = user.collection("sentRecipes").unwrap().doc("s1").unwrap();
        assert_eq!(sent.as_str(), "users/u1/sentRecipes/s1");
        assert_eq!(sent.id(), "s1");
        assert_eq!(sent.parent().as_str(), "users/u1/sentRecipes");
    }

    #[test]
    fn rejects_empty_and_slashed_segments() {
        assert!(CollectionPath::root("").is_err());
        let users = CollectionPath::root("users").unwrap();
        assert!(users.doc("a/b").is_err());
        assert!(users.doc("").is_err());
    }
}
