use serde::{Deserialize, Serialize};

use crate::domain::{Identifier, Node};
use crate::error::PolymixError;

/// Field filter for [`EntityStore::get`]. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
}

impl Query {
    pub fn name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn title(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn identifier(key: &str, value: &str) -> Self {
        Self {
            identifiers: vec![Identifier::new(key, value)],
            ..Self::default()
        }
    }

    pub fn in_group(mut self, group_uid: &str) -> Self {
        self.group = Some(group_uid.to_string());
        self
    }

    pub fn created_by(mut self, user_uid: &str) -> Self {
        self.created_by = Some(user_uid.to_string());
        self
    }

    pub fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// The remote record store.
///
/// `get` with no match fails with [`PolymixError::NotFound`]. `save` creates
/// a node without a uid (assigning the new uid on success) and fails with
/// [`PolymixError::Duplicate`] when the natural key is taken; a node with a
/// uid is updated in place.
pub trait EntityStore: Send + Sync {
    fn user_uid(&self) -> &str;
    fn get<N: Node>(&self, query: &Query) -> Result<N, PolymixError>;
    fn save<N: Node>(&self, node: &mut N) -> Result<(), PolymixError>;
}
