#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use polymix::app::{ProgressEvent, ProgressSink};
use polymix::domain::{Collection, Group, Identifier, Material, Node, NodeKind};
use polymix::error::PolymixError;
use polymix::resolver::{PolymerKeyPolicy, SessionSettings};
use polymix::store::{EntityStore, Query};
use serde_json::Value;

pub const USER: &str = "user-1";
pub const GROUP: &str = "polymer lab";
pub const SOLVENT_GROUP: &str = "CRIPT";
pub const COLLECTION: &str = "cloud points";

struct Record {
    created_by: String,
    body: Value,
}

/// In-memory record store keyed by node kind. Creating a node whose natural
/// key is taken fails with `Duplicate`, like the real service.
pub struct MemoryStore {
    records: Mutex<HashMap<NodeKind, Vec<Record>>>,
    next_uid: AtomicUsize,
    gets: AtomicUsize,
    saves: AtomicUsize,
    failing_name: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            next_uid: AtomicUsize::new(1),
            gets: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            failing_name: Mutex::new(None),
        }
    }

    /// Target group, solvent group, collection and two shared solvents.
    pub fn seeded() -> Self {
        let store = Self::new();
        let group = store.insert(
            "admin",
            Group {
                uid: None,
                name: GROUP.to_string(),
            },
        );
        let solvents = store.insert(
            "admin",
            Group {
                uid: None,
                name: SOLVENT_GROUP.to_string(),
            },
        );
        store.insert(
            "admin",
            Collection {
                uid: None,
                name: COLLECTION.to_string(),
                group,
            },
        );
        store.insert("admin", solvent(&solvents, "toluene", "108-88-3"));
        store.insert("admin", solvent(&solvents, "cyclohexane", "110-82-7"));
        store
    }

    /// Stores `node` directly, without counting it as a call.
    pub fn insert<N: Node>(&self, created_by: &str, mut node: N) -> String {
        let uid = format!("{}-{}", N::KIND, self.next_uid.fetch_add(1, Ordering::SeqCst));
        node.set_uid(uid.clone());
        let body = serde_json::to_value(&node).unwrap();
        self.records
            .lock()
            .unwrap()
            .entry(N::KIND)
            .or_default()
            .push(Record {
                created_by: created_by.to_string(),
                body,
            });
        uid
    }

    pub fn all<N: Node>(&self) -> Vec<N> {
        self.records
            .lock()
            .unwrap()
            .get(&N::KIND)
            .map(|records| {
                records
                    .iter()
                    .map(|record| serde_json::from_value(record.body.clone()).unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn material(&self, name: &str) -> Option<Material> {
        self.all::<Material>()
            .into_iter()
            .find(|material| material.name == name)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.saves.store(0, Ordering::SeqCst);
    }

    /// Makes every save of a node with this natural key fail with a 500.
    pub fn fail_saves_of(&self, name: &str) {
        *self.failing_name.lock().unwrap() = Some(name.to_string());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for MemoryStore {
    fn user_uid(&self) -> &str {
        USER
    }

    fn get<N: Node>(&self, query: &Query) -> Result<N, PolymixError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().unwrap();
        let found = records
            .get(&N::KIND)
            .and_then(|records| records.iter().find(|record| matches(record, query)));
        match found {
            Some(record) => serde_json::from_value(record.body.clone())
                .map_err(|err| PolymixError::StoreDecode(err.to_string())),
            None => Err(PolymixError::NotFound {
                kind: N::KIND,
                query: query.describe(),
            }),
        }
    }

    fn save<N: Node>(&self, node: &mut N) -> Result<(), PolymixError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.failing_name.lock().unwrap().as_deref() == Some(node.natural_key().as_str()) {
            return Err(PolymixError::StoreStatus {
                status: 500,
                message: "internal error".to_string(),
            });
        }

        let mut records = self.records.lock().unwrap();
        let records = records.entry(N::KIND).or_default();
        match node.uid().map(str::to_string) {
            Some(uid) => {
                let body = serde_json::to_value(&*node).unwrap();
                let Some(record) = records
                    .iter_mut()
                    .find(|record| record.body["uid"] == Value::String(uid.clone()))
                else {
                    return Err(PolymixError::NotFound {
                        kind: N::KIND,
                        query: uid,
                    });
                };
                record.body = body;
                Ok(())
            }
            None => {
                let key = node.natural_key();
                let taken = records.iter().any(|record| {
                    serde_json::from_value::<N>(record.body.clone())
                        .map(|existing| existing.natural_key() == key)
                        .unwrap_or(false)
                });
                if taken {
                    return Err(PolymixError::Duplicate { kind: N::KIND, key });
                }
                let uid = format!("{}-{}", N::KIND, self.next_uid.fetch_add(1, Ordering::SeqCst));
                node.set_uid(uid);
                records.push(Record {
                    created_by: USER.to_string(),
                    body: serde_json::to_value(&*node).unwrap(),
                });
                Ok(())
            }
        }
    }
}

fn matches(record: &Record, query: &Query) -> bool {
    let field = |name: &str, expected: &Option<String>| match expected {
        Some(expected) => record.body.get(name).and_then(Value::as_str) == Some(expected.as_str()),
        None => true,
    };
    if !field("name", &query.name) || !field("title", &query.title) || !field("group", &query.group)
    {
        return false;
    }
    if let Some(created_by) = &query.created_by
        && &record.created_by != created_by
    {
        return false;
    }
    let identifiers: Vec<Identifier> = record
        .body
        .get("identifiers")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();
    query
        .identifiers
        .iter()
        .all(|wanted| identifiers.contains(wanted))
}

pub fn solvent(group: &str, name: &str, cas: &str) -> Material {
    Material {
        uid: None,
        group: group.to_string(),
        name: name.to_string(),
        identifiers: vec![
            Identifier::new("preferred_name", name),
            Identifier::new("cas", cas),
        ],
        components: Vec::new(),
        properties: Vec::new(),
        public: true,
    }
}

pub fn settings(polymer_key: PolymerKeyPolicy) -> SessionSettings {
    SessionSettings {
        group: GROUP.to_string(),
        collection: COLLECTION.to_string(),
        solvent_group: SOLVENT_GROUP.to_string(),
        polymer_key,
    }
}

/// Collects every progress event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == polymix::app::EventLevel::Error)
            .map(|event| event.message.clone())
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
