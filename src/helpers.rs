//! Pure helpers over field maps: version extraction, key folding, key
//! filtering and shallow diffing.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::error::{SgError, SgResult};
use crate::fields::{is_empty_value, FieldMap};

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v(\d+)").expect("version pattern is valid"));

/// Extract the highest `v<digits>` number from a collection of strings.
///
/// Only the first match in each string counts. Numbers past `u64::MAX` are
/// skipped. Returns `None` when no string carries a version.
///
/// ```
/// use shotgrid::helpers::get_highest_version;
/// let codes = ["STN_6620_povs_OPS_v006", "STN_6620_ref_OPS_v007", "STN_6620_comp_OPS_v003"];
/// assert_eq!(get_highest_version(codes), Some(7));
/// ```
pub fn get_highest_version<I, S>(version_strings: I) -> Option<u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    version_strings
        .into_iter()
        .filter_map(|s| {
            VERSION_PATTERN
                .captures(s.as_ref())
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
        })
        .max()
}

/// Fold a list of records into a map keyed by one of their fields.
///
/// Records whose key value is empty are skipped. With a `separator` the value
/// must be a string; it is split and each trimmed, non-empty part maps to the
/// owning record. Any key produced twice is an error naming every duplicate,
/// sorted.
pub fn list_of_dicts_to_dict(
    items: &[FieldMap],
    key: &str,
    separator: Option<&str>,
) -> SgResult<IndexMap<String, FieldMap>> {
    let mut result: IndexMap<String, FieldMap> = IndexMap::new();
    let mut duplicates: BTreeSet<String> = BTreeSet::new();

    for item in items {
        let value = match item.get(key) {
            Some(v) if !is_empty_value(v) => v,
            _ => continue,
        };

        let keys: Vec<String> = match separator {
            Some(sep) if !sep.is_empty() => {
                let s = value.as_str().ok_or_else(|| {
                    SgError::Type(format!(
                        "Value for key '{}' must be a string when separator is provided. Got {}.",
                        key, value
                    ))
                })?;
                s.split(sep).map(|part| part.trim().to_string()).collect()
            }
            _ => vec![key_string(value)],
        };

        for k in keys {
            if k.is_empty() {
                continue;
            }
            if result.contains_key(&k) {
                duplicates.insert(k.clone());
            }
            result.insert(k, item.clone());
        }
    }

    if !duplicates.is_empty() {
        let listed: Vec<String> = duplicates.into_iter().collect();
        return Err(SgError::Validation(format!(
            "Duplicate keys found: {:?}",
            listed
        )));
    }
    Ok(result)
}

fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Keys present in `updated` that are absent from, or differ in, `original`.
pub fn dict_diff(original: &FieldMap, updated: &FieldMap) -> FieldMap {
    updated
        .iter()
        .filter(|(k, v)| original.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// How [`remove_keys`] treats the listed keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Drop the listed keys.
    #[default]
    Remove,
    /// Keep only the listed keys.
    Keep,
}

/// Return a copy of `data` with keys removed or kept per `mode`.
///
/// With `remove_empty`, any remaining key with an empty value is dropped too.
pub fn remove_keys(data: &FieldMap, keys: &[&str], mode: KeyMode, remove_empty: bool) -> FieldMap {
    let mut result = data.clone();
    remove_keys_in_place(&mut result, keys, mode, remove_empty);
    result
}

/// In-place variant of [`remove_keys`].
pub fn remove_keys_in_place(data: &mut FieldMap, keys: &[&str], mode: KeyMode, remove_empty: bool) {
    match mode {
        KeyMode::Remove => {
            for key in keys {
                data.shift_remove(*key);
            }
        }
        KeyMode::Keep => data.retain(|k, _| keys.contains(&k.as_str())),
    }
    if remove_empty {
        data.retain(|_, v| !is_empty_value(v));
    }
}
