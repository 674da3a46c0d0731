//! Label grouping for batched tagging.

use std::collections::BTreeMap;

/// Accumulates matched item GUIDs per export label so that each label costs
/// one bulk tag call instead of one call per item.
#[derive(Debug, Default)]
pub struct LabelGrouper {
    groups: BTreeMap<String, Vec<String>>,
}

impl LabelGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `item_guid` under `label`, creating the group on first use.
    pub fn add(&mut self, label: &str, item_guid: &str) {
        self.groups
            .entry(label.to_string())
            .or_default()
            .push(item_guid.to_string());
    }

    /// Record an item under each of its labels.
    pub fn add_all<'a>(&mut self, labels: impl IntoIterator<Item = &'a String>, item_guid: &str) {
        for label in labels {
            self.add(label, item_guid);
        }
    }

    pub fn label_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Drain the groups as `("<prefix>|<label>", guids)` pairs.
    pub fn flush(&mut self, prefix: &str) -> Vec<(String, Vec<String>)> {
        std::mem::take(&mut self.groups)
            .into_iter()
            .map(|(label, guids)| (tag_name(prefix, &label), guids))
            .collect()
    }
}

/// Case tag name for an export label.
pub fn tag_name(prefix: &str, label: &str) -> String {
    format!("{prefix}|{label}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_by_label() {
        let mut grouper = LabelGrouper::new();
        grouper.add("Inbox", "g1");
        grouper.add("Inbox", "g2");
        grouper.add_all(&["Inbox".to_string(), "Work".to_string()], "g3");
        assert_eq!(grouper.label_count(), 2);

        let flushed = grouper.flush("GMailLabels");
        assert_eq!(
            flushed,
            vec![
                (
                    "GMailLabels|Inbox".to_string(),
                    vec!["g1".to_string(), "g2".to_string(), "g3".to_string()]
                ),
                ("GMailLabels|Work".to_string(), vec!["g3".to_string()]),
            ]
        );
        assert!(grouper.is_empty());
    }
}
