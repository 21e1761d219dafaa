//! Tag links and project tag enums.
//!
//! On the wire a tag field is a list of `{type: "Tag", id}` records; callers
//! work with bare integer ids instead.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::error::{SgError, SgResult};

pub const TAG_TYPE: &str = "Tag";

/// A `{type: "Tag", id}` link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagRef {
    pub id: i64,
}

impl TagRef {
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    pub fn to_value(&self) -> Value {
        json!({ "type": TAG_TYPE, "id": self.id })
    }

    /// Parse a single wire record; anything that is not a Tag link yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get("type").and_then(Value::as_str) != Some(TAG_TYPE) {
            return None;
        }
        obj.get("id").and_then(Value::as_i64).map(Self::new)
    }
}

/// Wire list for a set of tag ids.
pub fn tag_list<I: IntoIterator<Item = i64>>(ids: I) -> Value {
    Value::Array(ids.into_iter().map(|id| TagRef::new(id).to_value()).collect())
}

/// Tag ids from a wire list, unique and in order of first appearance.
///
/// Non-list values and non-Tag records are ignored.
pub fn tag_ids(value: Option<&Value>) -> Vec<i64> {
    let mut ids = Vec::new();
    if let Some(Value::Array(items)) = value {
        for id in items.iter().filter_map(|v| TagRef::from_value(v).map(|t| t.id)) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Parse a loosely typed tag id set, e.g. `[341, 12]`.
pub fn parse_tag_set(value: &Value) -> SgResult<BTreeSet<i64>> {
    let items = value.as_array().ok_or_else(|| {
        SgError::Type(format!("Tags must be a set of integer IDs. Got {}.", value))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_i64().ok_or_else(|| {
                SgError::Type("All items in the tags set must be integer IDs.".to_string())
            })
        })
        .collect()
}

/// Project-defined tag enums whose discriminants are remote Tag ids.
///
/// ```
/// use shotgrid::tags::PipelineTag;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// enum StudioTag { Pipeline, Ingest }
///
/// impl PipelineTag for StudioTag {
///     const ALL: &'static [Self] = &[StudioTag::Pipeline, StudioTag::Ingest];
///     fn id(&self) -> i64 { match self { StudioTag::Pipeline => 341, StudioTag::Ingest => 342 } }
///     fn name(&self) -> &'static str { match self { StudioTag::Pipeline => "PIPELINE", StudioTag::Ingest => "INGEST" } }
/// }
///
/// assert_eq!(StudioTag::from_id(342), Some(StudioTag::Ingest));
/// ```
pub trait PipelineTag: Copy + Ord + Sized + 'static {
    const ALL: &'static [Self];

    fn id(&self) -> i64;

    fn name(&self) -> &'static str;

    fn tag_ref(&self) -> TagRef {
        TagRef::new(self.id())
    }

    fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.id() == id)
    }

    fn by_name(name: &str, ignore_case: bool) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| {
            if ignore_case {
                t.name().eq_ignore_ascii_case(name)
            } else {
                t.name() == name
            }
        })
    }

    /// Convert one wire record; unknown ids yield `None`.
    fn from_tag_value(value: &Value) -> Option<Self> {
        TagRef::from_value(value).and_then(|t| Self::from_id(t.id))
    }

    fn from_tag_list(value: Option<&Value>) -> BTreeSet<Self> {
        tag_ids(value).into_iter().filter_map(Self::from_id).collect()
    }

    fn to_tag_list(tags: &BTreeSet<Self>) -> Value {
        tag_list(tags.iter().map(|t| t.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    enum TestTag {
        Pipeline,
        Review,
    }

    impl PipelineTag for TestTag {
        const ALL: &'static [Self] = &[TestTag::Pipeline, TestTag::Review];

        fn id(&self) -> i64 {
            match self {
                TestTag::Pipeline => 341,
                TestTag::Review => 7,
            }
        }

        fn name(&self) -> &'static str {
            match self {
                TestTag::Pipeline => "PIPELINE",
                TestTag::Review => "REVIEW",
            }
        }
    }

    #[test]
    fn test_tag_ids_ordered_unique() {
        let wire = json!([
            {"type": "Tag", "id": 5},
            {"type": "Tag", "id": 2},
            {"type": "Tag", "id": 5},
            {"type": "Shot", "id": 9},
            "junk"
        ]);
        assert_eq!(tag_ids(Some(&wire)), vec![5, 2]);
        assert!(tag_ids(Some(&json!("not a list"))).is_empty());
        assert!(tag_ids(None).is_empty());
    }

    #[test]
    fn test_parse_tag_set() {
        assert_eq!(
            parse_tag_set(&json!([3, 1, 3])).unwrap(),
            BTreeSet::from([1, 3])
        );
        assert!(matches!(parse_tag_set(&json!("1,2")), Err(SgError::Type(_))));
        assert!(matches!(parse_tag_set(&json!([1, "x"])), Err(SgError::Type(_))));
    }

    #[test]
    fn test_pipeline_tag_enum() {
        assert_eq!(TestTag::by_name("review", true), Some(TestTag::Review));
        assert_eq!(TestTag::by_name("review", false), None);
        assert_eq!(
            TestTag::from_tag_value(&json!({"type": "Tag", "id": 341})),
            Some(TestTag::Pipeline)
        );
        let wire = json!([{"type": "Tag", "id": 7}, {"type": "Tag", "id": 999}]);
        let set = TestTag::from_tag_list(Some(&wire));
        assert_eq!(set, BTreeSet::from([TestTag::Review]));
        assert_eq!(TestTag::to_tag_list(&set), json!([{"type": "Tag", "id": 7}]));
    }
}
