use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::notation::doi_from_title;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Group,
    Collection,
    Reference,
    Material,
    Inventory,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Group => "group",
            NodeKind::Collection => "collection",
            NodeKind::Reference => "reference",
            NodeKind::Material => "material",
            NodeKind::Inventory => "inventory",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A record owned by the remote store.
pub trait Node: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: NodeKind;

    fn uid(&self) -> Option<&str>;
    fn set_uid(&mut self, uid: String);

    /// Human-readable natural key, used in diagnostics.
    fn natural_key(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub name: String,
}

impl Node for Group {
    const KIND: NodeKind = NodeKind::Group;

    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    fn set_uid(&mut self, uid: String) {
        self.uid = Some(uid);
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub name: String,
    pub group: String,
}

impl Node for Collection {
    const KIND: NodeKind = NodeKind::Collection;

    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    fn set_uid(&mut self, uid: String) {
        self.uid = Some(uid);
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub group: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default)]
    pub public: bool,
}

impl Reference {
    /// Builds a public reference, pulling the DOI out of titles that are
    /// really `doi.org` links.
    pub fn new(group: &str, title: &str) -> Self {
        Self {
            uid: None,
            group: group.to_string(),
            title: title.to_string(),
            doi: doi_from_title(title),
            public: true,
        }
    }
}

impl Node for Reference {
    const KIND: NodeKind = NodeKind::Reference;

    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    fn set_uid(&mut self, uid: String) {
        self.uid = Some(uid);
    }

    fn natural_key(&self) -> String {
        self.title.clone()
    }
}

/// Points a property at the reference it was reported in. Citations are
/// embedded in properties and never saved on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub reference: Reference,
}

impl Citation {
    pub fn new(reference: Reference) -> Self {
        Self { reference }
    }

    pub fn title(&self) -> &str {
        &self.reference.title
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub key: String,
    pub value: String,
}

impl Identifier {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub value: ConditionValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

impl Property {
    pub fn new(key: &str, value: f64) -> Self {
        Self {
            key: key.to_string(),
            value,
            unit: None,
            component_id: None,
            conditions: Vec::new(),
            citations: Vec::new(),
        }
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn component(mut self, component_id: u32) -> Self {
        self.component_id = Some(component_id);
        self
    }

    pub fn cited_by(mut self, citation: &Citation) -> Self {
        self.citations.push(citation.clone());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub component_uid: u32,
    /// Uid of the component material.
    pub component: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub group: String,
    pub name: String,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub public: bool,
}

impl Material {
    pub fn identifier(&self, key: &str) -> Option<&str> {
        self.identifiers
            .iter()
            .find(|identifier| identifier.key == key)
            .map(|identifier| identifier.value.as_str())
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.key == key)
    }

    /// Overwrites every locally owned field with `intent`, keeping the
    /// remote uid.
    pub fn apply(&mut self, intent: &Material) {
        self.group = intent.group.clone();
        self.name = intent.name.clone();
        self.identifiers = intent.identifiers.clone();
        self.components = intent.components.clone();
        self.properties = intent.properties.clone();
        self.public = intent.public;
    }
}

impl Node for Material {
    const KIND: NodeKind = NodeKind::Material;

    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    fn set_uid(&mut self, uid: String) {
        self.uid = Some(uid);
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub group: String,
    pub collection: String,
    pub name: String,
    /// Material uids.
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub public: bool,
}

impl Inventory {
    pub fn new(group: &str, collection: &str, name: &str) -> Self {
        Self {
            uid: None,
            group: group.to_string(),
            collection: collection.to_string(),
            name: name.to_string(),
            materials: Vec::new(),
            public: true,
        }
    }

    pub fn contains(&self, material_uid: &str) -> bool {
        self.materials.iter().any(|uid| uid == material_uid)
    }
}

impl Node for Inventory {
    const KIND: NodeKind = NodeKind::Inventory;

    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    fn set_uid(&mut self, uid: String) {
        self.uid = Some(uid);
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}
