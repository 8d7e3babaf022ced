//! Subscription filters.
//!
//! A filter is an immutable query a relay understands. Its JSON encoding is
//! deterministic: fields serialize in a fixed order and list members are
//! sorted at construction time. Relays compare filters textually, so a
//! reordered-but-equal filter would trigger a spurious re-request.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::relay_url::NormalizedRelayUrl;

/// An immutable relay query.
///
/// All list fields are kept sorted and deduplicated; construct through the
/// builder methods to preserve that invariant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    pub ids: Option<Vec<String>>,
    pub authors: Option<Vec<String>>,
    pub kinds: Option<Vec<u16>>,
    /// Single-letter tag constraints, keyed by tag name without the `#`.
    pub tags: BTreeMap<String, Vec<String>>,
    /// Unix seconds, inclusive lower bound.
    pub since: Option<u64>,
    /// Unix seconds, inclusive upper bound.
    pub until: Option<u64>,
    pub limit: Option<u32>,
}

fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values.dedup();
    values
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.ids = Some(sorted(ids.into_iter().collect()));
        self
    }

    pub fn authors(mut self, authors: impl IntoIterator<Item = String>) -> Self {
        self.authors = Some(sorted(authors.into_iter().collect()));
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        let mut kinds: Vec<u16> = kinds.into_iter().collect();
        kinds.sort_unstable();
        kinds.dedup();
        self.kinds = Some(kinds);
        self
    }

    /// Add a tag constraint, e.g. `tag("e", roots)` for `#e`.
    pub fn tag(mut self, name: &str, values: impl IntoIterator<Item = String>) -> Self {
        self.tags
            .insert(name.to_string(), sorted(values.into_iter().collect()));
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Relay-side matching semantics, for local checks.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| *id == event.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == event.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        for (name, values) in &self.tags {
            if !event
                .tag_values(name)
                .any(|v| values.iter().any(|w| w.as_str() == v))
            {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        true
    }

    /// Decode the JSON object form.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::MalformedFrame("filter is not an object".to_string()))?;

        let str_list = |v: &Value| -> Option<Vec<String>> {
            v.as_array().map(|arr| {
                sorted(
                    arr.iter()
                        .filter_map(|x| x.as_str().map(str::to_string))
                        .collect(),
                )
            })
        };

        let mut filter = Filter::new();
        for (key, v) in obj {
            match key.as_str() {
                "ids" => filter.ids = str_list(v),
                "authors" => filter.authors = str_list(v),
                "kinds" => {
                    filter.kinds = v.as_array().map(|arr| {
                        let mut kinds: Vec<u16> = arr
                            .iter()
                            .filter_map(|x| x.as_u64())
                            .filter_map(|k| u16::try_from(k).ok())
                            .collect();
                        kinds.sort_unstable();
                        kinds.dedup();
                        kinds
                    });
                }
                "since" => filter.since = v.as_u64(),
                "until" => filter.until = v.as_u64(),
                "limit" => filter.limit = v.as_u64().and_then(|l| u32::try_from(l).ok()),
                tag if tag.starts_with('#') && tag.len() > 1 => {
                    if let Some(values) = str_list(v) {
                        filter.tags.insert(tag[1..].to_string(), values);
                    }
                }
                // Unknown fields are ignored, not errors.
                _ => {}
            }
        }
        Ok(filter)
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(ids) = &self.ids {
            map.serialize_entry("ids", ids)?;
        }
        if let Some(authors) = &self.authors {
            map.serialize_entry("authors", authors)?;
        }
        if let Some(kinds) = &self.kinds {
            map.serialize_entry("kinds", kinds)?;
        }
        for (name, values) in &self.tags {
            map.serialize_entry(&format!("#{name}"), values)?;
        }
        if let Some(since) = self.since {
            map.serialize_entry("since", &since)?;
        }
        if let Some(until) = self.until {
            map.serialize_entry("until", &until)?;
        }
        if let Some(limit) = self.limit {
            map.serialize_entry("limit", &limit)?;
        }
        map.end()
    }
}

/// A `(relay, filter)` pair, the unit the orchestration layer produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayBasedFilter {
    pub relay: NormalizedRelayUrl,
    pub filter: Filter,
}
