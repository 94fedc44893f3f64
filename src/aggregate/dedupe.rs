//! Merging repeated observations of the same torrent.
//!
//! Inputs are never mutated; merged records are fresh clones.

use std::collections::HashMap;

use tracing::instrument;

use crate::model::TorrentItem;

/// Groups `items` by info hash and merges each group.
///
/// Hashes compare case-insensitively. Groups appear at the position of their
/// first member. Items without an info hash cannot be matched and pass
/// through unchanged.
#[must_use]
#[instrument(skip(items), fields(count = items.len()))]
pub fn deduplicate(items: &[TorrentItem]) -> Vec<TorrentItem> {
    group_and_merge(items, |item| {
        item.info_hash
            .as_deref()
            .map(|hash| hash.trim().to_ascii_lowercase())
            .filter(|hash| !hash.is_empty())
    })
}

/// Groups `items` by `normalizer(title)` and merges each group.
///
/// Items whose normalized title is empty pass through unchanged.
#[must_use]
#[instrument(skip(items, normalizer), fields(count = items.len()))]
pub fn deduplicate_by_title<F>(items: &[TorrentItem], normalizer: F) -> Vec<TorrentItem>
where
    F: Fn(&str) -> String,
{
    group_and_merge(items, |item| {
        let key = normalizer(&item.title);
        (!key.is_empty()).then_some(key)
    })
}

/// Lowercases `title` and collapses every run of non-alphanumeric characters
/// into one space, so `Big.Movie-2160p` and `big movie 2160p` match.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merges a group of observations into one record, seeded with the first.
///
/// Counters and upload time take the maximum, the better discount wins,
/// tags are unioned in first-seen order and missing links are filled in.
/// Returns `None` for an empty group.
#[must_use]
pub fn merge_duplicates<'a, I>(items: I) -> Option<TorrentItem>
where
    I: IntoIterator<Item = &'a TorrentItem>,
{
    let mut items = items.into_iter();
    let mut merged = items.next()?.clone();
    for candidate in items {
        merge_into(&mut merged, candidate);
    }
    Some(merged)
}

fn merge_into(acc: &mut TorrentItem, candidate: &TorrentItem) {
    acc.seeders = acc.seeders.max(candidate.seeders);
    acc.leechers = acc.leechers.max(candidate.leechers);
    acc.snatched = acc.snatched.max(candidate.snatched);
    acc.uploaded_at = acc.uploaded_at.max(candidate.uploaded_at);

    if candidate.is_free() && !acc.is_free() {
        acc.discount_level = candidate.discount_level;
        acc.discount_end_time = candidate.discount_end_time;
    }
    if candidate.discount_level.priority() > acc.discount_level.priority() {
        acc.discount_level = candidate.discount_level;
        acc.discount_end_time = candidate.discount_end_time;
    }

    for tag in &candidate.tags {
        acc.add_tag(tag.as_str());
    }
    if acc.download_url.is_none() {
        acc.download_url.clone_from(&candidate.download_url);
    }
    if acc.magnet.is_none() {
        acc.magnet.clone_from(&candidate.magnet);
    }
    if acc.info_hash.is_none() {
        acc.info_hash.clone_from(&candidate.info_hash);
    }
}

enum Slot<'a> {
    Single(&'a TorrentItem),
    Group(Vec<&'a TorrentItem>),
}

fn group_and_merge<K>(items: &[TorrentItem], key: K) -> Vec<TorrentItem>
where
    K: Fn(&TorrentItem) -> Option<String>,
{
    let mut slots: Vec<Slot<'_>> = Vec::with_capacity(items.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        match key(item) {
            Some(key) => {
                if let Some(&at) = index.get(&key)
                    && let Slot::Group(members) = &mut slots[at]
                {
                    members.push(item);
                } else {
                    index.insert(key, slots.len());
                    slots.push(Slot::Group(vec![item]));
                }
            }
            None => slots.push(Slot::Single(item)),
        }
    }

    slots
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Single(item) => Some(item.clone()),
            Slot::Group(members) => merge_duplicates(members),
        })
        .collect()
}
