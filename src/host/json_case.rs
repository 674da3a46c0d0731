//! File-backed host: a JSON case manifest plus a tag ledger.
//!
//! Manifest layout:
//!
//! ```json
//! { "items": [ { "guid": "...", "localised_name": "...", "is_top_level": true,
//!                "kind": "email", "mime_type": "message/rfc822",
//!                "path_guids": ["<mbox guid>"],
//!                "properties": { "Message-ID": "<...>" } } ] }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{BulkAnnotator, CaseStore};
use crate::error::{Result, XrefError};
use crate::model::item::Item;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, BTreeSet<String>>,
}

/// Items of a case loaded from a JSON manifest.
#[derive(Debug, Default)]
pub struct JsonCase {
    items: Vec<Item>,
    by_guid: HashMap<String, usize>,
}

impl JsonCase {
    pub fn from_items(items: Vec<Item>) -> Self {
        let by_guid = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.guid.clone(), i))
            .collect();
        Self { items, by_guid }
    }

    /// Load a case manifest.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                XrefError::FileNotFound(path.to_path_buf())
            } else {
                XrefError::io(path, e)
            }
        })?;
        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| XrefError::Host(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), items = manifest.items.len(), "Loaded case manifest");
        Ok(Self::from_items(manifest.items))
    }

    /// Write the items (with their custom metadata) and the applied tags.
    pub fn save(&self, path: &Path, tags: &TagLedger) -> Result<()> {
        let manifest = Manifest {
            items: self.items.clone(),
            tags: tags.tags.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| XrefError::Host(format!("{}: {e}", path.display())))?;
        std::fs::write(path, json).map_err(|e| XrefError::io(path, e))?;
        info!(path = %path.display(), "Saved annotated case");
        Ok(())
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, guid: &str) -> Option<&Item> {
        self.by_guid.get(guid).map(|&i| &self.items[i])
    }
}

impl CaseStore for JsonCase {
    fn search(&self, query: &str) -> Result<Vec<Item>> {
        let query = CaseQuery::parse(query)?;
        let found: Vec<Item> = self
            .items
            .iter()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        debug!(hits = found.len(), "Case query executed");
        Ok(found)
    }

    fn save_custom_metadata(&mut self, items: &[Item]) -> Result<()> {
        for item in items {
            let idx = *self
                .by_guid
                .get(&item.guid)
                .ok_or_else(|| XrefError::Host(format!("Unknown item GUID {}", item.guid)))?;
            self.items[idx]
                .custom_metadata
                .extend(item.custom_metadata.clone());
        }
        Ok(())
    }
}

/// Tags applied through [`BulkAnnotator`], keyed by tag name.
#[derive(Debug, Default)]
pub struct TagLedger {
    tags: BTreeMap<String, BTreeSet<String>>,
}

impl TagLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// GUIDs carrying `tag_name`.
    pub fn items_with(&self, tag_name: &str) -> Option<&BTreeSet<String>> {
        self.tags.get(tag_name)
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}

impl BulkAnnotator for TagLedger {
    fn add_tag(&mut self, tag_name: &str, item_guids: &[String]) -> Result<()> {
        self.tags
            .entry(tag_name.to_string())
            .or_default()
            .extend(item_guids.iter().cloned());
        Ok(())
    }
}

/// The small query language the core issues: `AND`-joined terms of
/// `kind:<kind>`, `mime-type:"<type>"`, and `path-guid:(<g1> OR <g2>)`.
#[derive(Debug, PartialEq)]
enum Term {
    Kind(String),
    MimeType(String),
    PathGuid(Vec<String>),
}

#[derive(Debug, PartialEq)]
struct CaseQuery {
    terms: Vec<Term>,
}

impl CaseQuery {
    fn parse(query: &str) -> Result<Self> {
        let terms = query
            .split(" AND ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|term| {
                let (field, value) = term
                    .split_once(':')
                    .ok_or_else(|| XrefError::Host(format!("Unsupported query term '{term}'")))?;
                let value = value.trim();
                match field.trim() {
                    "kind" => Ok(Term::Kind(unquote(value).to_string())),
                    "mime-type" => Ok(Term::MimeType(unquote(value).to_string())),
                    "path-guid" => {
                        let inner = value
                            .strip_prefix('(')
                            .and_then(|v| v.strip_suffix(')'))
                            .unwrap_or(value);
                        Ok(Term::PathGuid(
                            inner
                                .split(" OR ")
                                .map(|g| unquote(g.trim()).to_string())
                                .filter(|g| !g.is_empty())
                                .collect(),
                        ))
                    }
                    other => Err(XrefError::Host(format!("Unsupported query field '{other}'"))),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { terms })
    }

    fn matches(&self, item: &Item) -> bool {
        self.terms.iter().all(|term| match term {
            Term::Kind(kind) => item.kind.eq_ignore_ascii_case(kind),
            Term::MimeType(mime) => item.mime_type.eq_ignore_ascii_case(mime),
            Term::PathGuid(guids) => item.path_guids.iter().any(|g| guids.contains(g)),
        })
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{emails_in_containers_query, mbox_container_query, EMAIL_QUERY};
    use crate::model::document::MetadataValue;

    fn item(guid: &str, kind: &str, mime: &str, path: &[&str]) -> Item {
        Item {
            guid: guid.into(),
            localised_name: format!("{guid}.eml"),
            is_top_level: true,
            kind: kind.into(),
            mime_type: mime.into(),
            path_guids: path.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn case() -> JsonCase {
        JsonCase::from_items(vec![
            item("mbox1", "container", "application/mbox", &[]),
            item("mbox2", "container", "application/mbox", &[]),
            item("e1", "email", "message/rfc822", &["mbox1"]),
            item("e2", "email", "message/rfc822", &["mbox2"]),
            item("att", "email", "message/rfc822", &["mbox2", "e2"]),
        ])
    }

    #[test]
    fn test_query_parsing() {
        let q = CaseQuery::parse("path-guid:(a OR b) AND kind:email").unwrap();
        assert_eq!(
            q.terms,
            vec![
                Term::PathGuid(vec!["a".into(), "b".into()]),
                Term::Kind("email".into())
            ]
        );
        assert!(CaseQuery::parse("flag:audited").is_err());
        assert!(CaseQuery::parse("nonsense").is_err());
    }

    #[test]
    fn test_search() {
        let case = case();
        assert_eq!(case.search(EMAIL_QUERY).unwrap().len(), 3);
        assert_eq!(case.search(&mbox_container_query()).unwrap().len(), 2);
        let in_mbox2 = case
            .search(&emails_in_containers_query(&["mbox2".to_string()]))
            .unwrap();
        let guids: Vec<_> = in_mbox2.iter().map(|i| i.guid.as_str()).collect();
        assert_eq!(guids, vec!["e2", "att"]);
    }

    #[test]
    fn test_save_custom_metadata_and_tags_roundtrip() {
        let mut case = case();
        let mut e1 = case.get("e1").unwrap().clone();
        e1.custom_metadata
            .insert("XmlExternalFileName".into(), MetadataValue::Text("f.mbox".into()));
        case.save_custom_metadata(&[e1]).unwrap();

        let mut tags = TagLedger::new();
        tags.add_tag("GMailLabels|Inbox", &["e1".to_string()]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("case.json");
        case.save(&out, &tags).unwrap();

        let reloaded = JsonCase::load(&out).unwrap();
        assert_eq!(
            reloaded.get("e1").unwrap().custom_metadata["XmlExternalFileName"],
            MetadataValue::Text("f.mbox".into())
        );
        let raw = std::fs::read_to_string(&out).unwrap();
        assert!(raw.contains("GMailLabels|Inbox"));
    }

    #[test]
    fn test_save_unknown_item_fails() {
        let mut case = case();
        let stranger = item("nope", "email", "message/rfc822", &[]);
        assert!(case.save_custom_metadata(&[stranger]).is_err());
    }
}
