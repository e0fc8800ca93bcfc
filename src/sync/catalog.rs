//! The aggregate public catalog (`content-metadata.json`).
//!
//! An array of entries per content type, public items only. Full syncs
//! rebuild it from scratch; partial syncs read-modify-write the stored
//! document so an incomplete item set never shrinks the catalog.

use std::collections::BTreeMap;

use crate::types::{CatalogEntry, ContentItem};

/// Catalog document: type → entries, newest first
pub type Catalog = BTreeMap<String, Vec<CatalogEntry>>;

/// Build a catalog from a full run's item set
pub fn build_catalog(items: &[ContentItem]) -> Catalog {
    let mut catalog = Catalog::new();
    for item in items.iter().filter(|i| !i.is_protected) {
        catalog
            .entry(item.content_type.clone())
            .or_default()
            .push(CatalogEntry::from(item));
    }
    for entries in catalog.values_mut() {
        sort_entries(entries);
    }
    catalog
}

/// Apply a partial run to an existing catalog: public items are inserted or
/// replaced, protected items and removals are dropped.
pub fn merge_catalog(
    mut existing: Catalog,
    items: &[ContentItem],
    removals: &[(String, String)],
) -> Catalog {
    for item in items {
        let entries = existing.entry(item.content_type.clone()).or_default();
        entries.retain(|e| e.slug != item.slug);
        if !item.is_protected {
            entries.push(CatalogEntry::from(item));
        }
    }

    for (content_type, slug) in removals {
        if let Some(entries) = existing.get_mut(content_type) {
            entries.retain(|e| &e.slug != slug);
        }
    }

    existing.retain(|_, entries| {
        sort_entries(entries);
        !entries.is_empty()
    });
    existing
}

fn sort_entries(entries: &mut [CatalogEntry]) {
    entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.slug.cmp(&b.slug)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessMode;
    use chrono::{TimeZone, Utc};

    fn item(content_type: &str, slug: &str, protected: bool, day: u32) -> ContentItem {
        ContentItem {
            content_type: content_type.into(),
            slug: slug.into(),
            title: slug.to_uppercase(),
            date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            read_time: "1 min read".into(),
            excerpt: String::new(),
            html: format!("<p>{}</p>", slug),
            raw_body: String::new(),
            frontmatter: Default::default(),
            is_protected: protected,
            access_mode: if protected {
                AccessMode::Password
            } else {
                AccessMode::Open
            },
        }
    }

    #[test]
    fn test_build_excludes_protected() {
        let items = vec![
            item("notes", "a", false, 1),
            item("ideas", "b", true, 2),
            item("pages", "c", false, 3),
        ];
        let catalog = build_catalog(&items);

        assert_eq!(catalog.get("notes").map(Vec::len), Some(1));
        assert_eq!(catalog.get("pages").map(Vec::len), Some(1));
        assert!(catalog.get("ideas").is_none());
    }

    #[test]
    fn test_build_sorts_newest_first() {
        let items = vec![
            item("notes", "old", false, 1),
            item("notes", "new", false, 20),
        ];
        let catalog = build_catalog(&items);
        let notes = catalog.get("notes").unwrap();
        assert_eq!(notes[0].slug, "new");
        assert_eq!(notes[1].slug, "old");
    }

    #[test]
    fn test_merge_replaces_and_inserts() {
        let existing = build_catalog(&[item("notes", "a", false, 1)]);

        let merged = merge_catalog(
            existing,
            &[item("notes", "a", false, 5), item("notes", "d", false, 2)],
            &[],
        );
        let notes = merged.get("notes").unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].slug, "a"); // re-dated, still one entry
        assert_eq!(notes[0].date.format("%d").to_string(), "05");
    }

    #[test]
    fn test_merge_drops_newly_protected() {
        let existing = build_catalog(&[item("notes", "a", false, 1)]);
        let merged = merge_catalog(existing, &[item("notes", "a", true, 1)], &[]);
        assert!(merged.get("notes").is_none());
    }

    #[test]
    fn test_merge_applies_removals() {
        let existing = build_catalog(&[
            item("notes", "a", false, 1),
            item("notes", "keep", false, 2),
        ]);
        let merged = merge_catalog(existing, &[], &[("notes".into(), "a".into())]);
        let notes = merged.get("notes").unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].slug, "keep");
    }
}
