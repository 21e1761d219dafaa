use super::{entity_wrapper, Shot};
use crate::error::SgResult;
use crate::fields::FieldMap;
use crate::filters::Filter;

entity_wrapper!(
    /// A group of shots.
    Sequence => Sequence
);

impl Sequence {
    /// Shots whose `sg_sequence` is this sequence.
    pub async fn get_shots(&self, code: Option<&str>, fields: Option<&[&str]>) -> SgResult<Vec<Shot>> {
        let mut filters = vec![Filter::is("sg_sequence", self.link()?)];
        if let Some(code) = code {
            filters.push(Filter::is("code", code));
        }
        self.find_children(&filters, fields).await
    }

    /// Create a shot in this sequence and its project.
    pub async fn create_shot(&self, code: &str, mut data: FieldMap) -> SgResult<Shot> {
        data.insert("code".to_string(), code.into());
        data.insert("sg_sequence".to_string(), self.link()?);
        self.create_child(data).await
    }
}

#[cfg(test)]
mod tests {
    use crate::api::InMemoryApi;
    use crate::config::Config;
    use crate::fields::FieldMap;
    use crate::session::Session;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_and_list_shots() {
        let api = Arc::new(InMemoryApi::new());
        let session = Session::new(api.clone(), Config::new("https://site.example.com", "t", "k"));
        let project = session.create_project("Demo", FieldMap::new()).await.unwrap();
        let seq = project.create_sequence("SQ010", FieldMap::new()).await.unwrap();
        let other = project.create_sequence("SQ020", FieldMap::new()).await.unwrap();

        let shot = seq.create_shot("SQ010_0010", FieldMap::new()).await.unwrap();
        other.create_shot("SQ020_0010", FieldMap::new()).await.unwrap();

        assert_eq!(shot.project().map(|p| p.id), project.id());
        let shots = seq.get_shots(None, None).await.unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].code(), Some("SQ010_0010"));
        assert!(seq.get_shots(Some("SQ020_0010"), None).await.unwrap().is_empty());
    }
}
