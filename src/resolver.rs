//! Create-or-fetch resolution of the records behind one CSV row.
//!
//! Every resolver follows the same upsert contract: try to create the record,
//! and when the store reports that its natural key is taken, fetch the
//! existing record instead (overwriting it with local intent for materials).
//! Resolved handles are cached per run in [`KeyedCache`]s so that repeated
//! keys cost no network calls and concurrent workers never race to create
//! the same record.

use std::collections::HashSet;
use std::sync::Mutex;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{KeyedCache, lock};
use crate::domain::{
    Citation, Collection, Component, Condition, ConditionValue, Group, Identifier, Material,
    Node, NodeKind, Property, Reference,
};
use crate::error::PolymixError;
use crate::notation::to_bigsmiles;
use crate::rows::Row;
use crate::store::{EntityStore, Query};

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// Already resolved earlier in this run; no network call was made.
    Cached(T),
    Created(T),
    /// An existing remote record was reused as-is.
    Found(T),
    /// An existing remote record was overwritten with local fields.
    Updated(T),
    NotFound,
}

impl<T> Resolution<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Resolution::Cached(value)
            | Resolution::Created(value)
            | Resolution::Found(value)
            | Resolution::Updated(value) => Some(value),
            Resolution::NotFound => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        self.into_parts().map(|(value, _)| value)
    }

    pub fn into_parts(self) -> Option<(T, Outcome)> {
        match self {
            Resolution::Cached(value) => Some((value, Outcome::Cached)),
            Resolution::Created(value) => Some((value, Outcome::Created)),
            Resolution::Found(value) => Some((value, Outcome::Found)),
            Resolution::Updated(value) => Some((value, Outcome::Updated)),
            Resolution::NotFound => None,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Resolution::Cached(_) => Outcome::Cached,
            Resolution::Created(_) => Outcome::Created,
            Resolution::Found(_) => Outcome::Found,
            Resolution::Updated(_) => Outcome::Updated,
            Resolution::NotFound => Outcome::NotFound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Cached,
    Created,
    Found,
    Updated,
    NotFound,
}

impl Outcome {
    pub fn verb(self) -> &'static str {
        match self {
            Outcome::Cached | Outcome::Found => "Found existing",
            Outcome::Created => "Created",
            Outcome::Updated => "Updated existing",
            Outcome::NotFound => "Did not find",
        }
    }
}

/// Which fields decide that two rows describe the same polymer sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolymerKeyPolicy {
    /// Molecular weight, dispersity and reference title.
    #[default]
    Properties,
    /// The row's `polymer_id`; rows without one fall back to `Properties`.
    PolymerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolymerKey {
    Properties {
        mw: Option<u64>,
        pdi: Option<u64>,
        reference: String,
    },
    PolymerId(String),
}

impl PolymerKey {
    pub fn for_row(policy: PolymerKeyPolicy, row: &Row, citation: &Citation) -> Self {
        if policy == PolymerKeyPolicy::PolymerId
            && let Some(id) = &row.polymer_id
        {
            return PolymerKey::PolymerId(id.clone());
        }
        PolymerKey::Properties {
            mw: row.polymer_mw.map(f64::to_bits),
            pdi: row.polymer_pdi.map(f64::to_bits),
            reference: citation.title().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub group: String,
    pub collection: String,
    pub solvent_group: String,
    pub polymer_key: PolymerKeyPolicy,
}

/// Everything one upload run shares: the store, the scope it writes into
/// and the natural-key caches.
pub struct Session<S: EntityStore> {
    store: S,
    group: Group,
    collection: Collection,
    solvent_group: Group,
    polymer_key: PolymerKeyPolicy,
    citations: KeyedCache<String, Citation>,
    solvents: KeyedCache<String, Material>,
    polymers: KeyedCache<PolymerKey, Material>,
    polymer_names: Mutex<HashSet<String>>,
    mixture_names: Mutex<HashSet<String>>,
}

impl<S: EntityStore> Session<S> {
    /// Looks up the target group/collection and the group that owns the
    /// shared solvent records.
    pub fn open(store: S, settings: &SessionSettings) -> Result<Self, PolymixError> {
        let group: Group = store.get(&Query::name(&settings.group))?;
        let group_uid = required_uid(&group)?.to_string();
        let solvent_group: Group = store.get(&Query::name(&settings.solvent_group))?;
        let collection: Collection =
            store.get(&Query::name(&settings.collection).in_group(&group_uid))?;
        required_uid(&solvent_group)?;
        required_uid(&collection)?;
        info!(
            group = %group.name,
            collection = %collection.name,
            solvent_group = %solvent_group.name,
            "session opened"
        );

        Ok(Self {
            store,
            group,
            collection,
            solvent_group,
            polymer_key: settings.polymer_key,
            citations: KeyedCache::new(),
            solvents: KeyedCache::new(),
            polymers: KeyedCache::new(),
            polymer_names: Mutex::new(HashSet::new()),
            mixture_names: Mutex::new(HashSet::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn group_uid(&self) -> &str {
        self.group.uid.as_deref().unwrap_or_default()
    }

    pub fn collection_uid(&self) -> &str {
        self.collection.uid.as_deref().unwrap_or_default()
    }

    pub fn cached_citations(&self) -> usize {
        self.citations.len()
    }

    pub fn cached_polymers(&self) -> usize {
        self.polymers.len()
    }

    pub fn resolve_citation(&self, title: &str) -> Result<Resolution<Citation>, PolymixError> {
        self.citations.get_or_try_insert_with(title.to_string(), || {
            let mut reference = Reference::new(self.group_uid(), title);
            match self.store.save(&mut reference) {
                Ok(()) => {
                    info!(title, "created reference");
                    Ok(Resolution::Created(Citation::new(reference)))
                }
                Err(err) if err.is_duplicate() => {
                    let query = Query::title(title).created_by(self.store.user_uid());
                    let existing: Reference = self.store.get(&query)?;
                    debug!(title, "reference already exists");
                    Ok(Resolution::Found(Citation::new(existing)))
                }
                Err(err) => Err(err),
            }
        })
    }

    /// Solvents are shared records; they are looked up, never created.
    pub fn resolve_solvent(&self, cas: &str) -> Result<Resolution<Material>, PolymixError> {
        let cas = cas.trim();
        if cas.is_empty() {
            return Ok(Resolution::NotFound);
        }
        let solvent_group = self.solvent_group.uid.as_deref().unwrap_or_default();
        self.solvents.get_or_try_insert_with(cas.to_string(), || {
            let query = Query::identifier("cas", cas).in_group(solvent_group);
            match self.store.get::<Material>(&query) {
                Ok(solvent) => Ok(Resolution::Found(solvent)),
                Err(err) if err.is_not_found() => {
                    debug!(cas, "solvent not found");
                    Ok(Resolution::NotFound)
                }
                Err(err) => Err(err),
            }
        })
    }

    pub fn resolve_polymer(
        &self,
        row: &Row,
        citation: &Citation,
    ) -> Result<Resolution<Material>, PolymixError> {
        let key = PolymerKey::for_row(self.polymer_key, row, citation);
        self.polymers.get_or_try_insert_with(key.clone(), || {
            let mut intent = self.polymer_intent(row, citation);
            let candidates = polymer_name_candidates(&key, &intent.name, row);
            let Some(name) = claim_first(&self.polymer_names, &candidates) else {
                return Err(PolymixError::Duplicate {
                    kind: NodeKind::Material,
                    key: intent.name,
                });
            };
            if name != intent.name {
                debug!(base = %intent.name, name = %name, "polymer name taken by another key");
            }
            intent.name = name.clone();
            let resolution = self.upsert_material(intent);
            if resolution.is_err() {
                lock(&self.polymer_names).remove(&name);
            }
            resolution
        })
    }

    pub fn resolve_mixture(
        &self,
        line: usize,
        row: &Row,
        polymer: &Material,
        solvent: &Material,
        citation: &Citation,
    ) -> Result<Resolution<Material>, PolymixError> {
        let intent = self.mixture_intent(line, row, polymer, solvent, citation)?;
        self.upsert_material(intent)
    }

    pub fn polymer_intent(&self, row: &Row, citation: &Citation) -> Material {
        let name = row.polymer.clone().unwrap_or_default();
        let unique_name = match &row.polymer_id {
            Some(id) => format!("{name}_{id}"),
            None => name.clone(),
        };

        let mut identifiers = Vec::new();
        if !name.is_empty() {
            identifiers.push(Identifier::new("preferred_name", &name));
        }
        if let Some(cas) = &row.polymer_cas {
            identifiers.push(Identifier::new("cas", cas));
        }
        if let Some(bigsmiles) = row.polymer_smiles.as_deref().and_then(to_bigsmiles) {
            identifiers.push(Identifier::new("bigsmiles", &bigsmiles));
        }

        let mut properties = Vec::new();
        if let Some(mw) = row.polymer_mw {
            properties.push(Property::new("mw_w", mw).unit("g/mol").cited_by(citation));
        }
        if let Some(pdi) = row.polymer_pdi {
            properties.push(Property::new("mw_d", pdi).cited_by(citation));
        }

        Material {
            uid: None,
            group: self.group_uid().to_string(),
            name: unique_name,
            identifiers,
            components: Vec::new(),
            properties,
            public: true,
        }
    }

    pub fn mixture_intent(
        &self,
        line: usize,
        row: &Row,
        polymer: &Material,
        solvent: &Material,
        citation: &Citation,
    ) -> Result<Material, PolymixError> {
        let name = format!("{} + {} mixture", polymer.name, solvent.name);
        let unique_name = self.claim_mixture_name(&name, row.mixture_id.as_deref(), line);

        let components = vec![
            Component {
                component_uid: 1,
                component: required_uid(polymer)?.to_string(),
            },
            Component {
                component_uid: 2,
                component: required_uid(solvent)?.to_string(),
            },
        ];

        let mut properties = Vec::new();
        if let Some(fraction) = row.polymer_vol_frac {
            properties.push(
                Property::new("conc_vol_fraction", fraction)
                    .component(1)
                    .cited_by(citation),
            );
        }
        if let Some(fraction) = row.polymer_wt_frac {
            properties.push(
                Property::new("conc_mass_fraction", fraction)
                    .component(1)
                    .cited_by(citation),
            );
        }
        if let Some(temp) = row.cloud_point_temp {
            let mut cloud_point = Property::new("temp_cloud", temp)
                .unit("degC")
                .cited_by(citation);
            if let Some(pressure) = row.pressure_mpa {
                cloud_point.conditions.push(Condition {
                    key: "pressure".to_string(),
                    value: ConditionValue::Number(pressure),
                    unit: Some("MPa".to_string()),
                });
            }
            if let Some(direction) = &row.one_phase_direction {
                cloud_point.conditions.push(Condition {
                    key: "+one_phase_direction".to_string(),
                    value: ConditionValue::Text(direction.clone()),
                    unit: None,
                });
            }
            properties.push(cloud_point);
        }

        Ok(Material {
            uid: None,
            group: self.group_uid().to_string(),
            name: unique_name,
            identifiers: vec![Identifier::new("preferred_name", &name)],
            components,
            properties,
            public: true,
        })
    }

    /// Suffixes `name` with the mixture id (or the row's line when there is
    /// none). A suffix already used in this run gets the line appended too;
    /// lines are unique, so the result always is.
    fn claim_mixture_name(&self, name: &str, mixture_id: Option<&str>, line: usize) -> String {
        let suffix = mixture_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("row {line}"));
        let candidate = format!("{name} ({suffix})");
        let mut claimed = lock(&self.mixture_names);
        if claimed.insert(candidate.clone()) {
            return candidate;
        }
        let fallback = format!("{name} ({suffix}, row {line})");
        claimed.insert(fallback.clone());
        fallback
    }

    fn upsert_material(&self, intent: Material) -> Result<Resolution<Material>, PolymixError> {
        let mut material = intent.clone();
        match self.store.save(&mut material) {
            Ok(()) => {
                info!(name = %material.name, "created material");
                Ok(Resolution::Created(material))
            }
            Err(err) if err.is_duplicate() => {
                let query = Query::name(&intent.name).created_by(self.store.user_uid());
                let mut existing: Material = self.store.get(&query)?;
                existing.apply(&intent);
                self.store.save(&mut existing)?;
                info!(name = %existing.name, "updated existing material");
                Ok(Resolution::Updated(existing))
            }
            Err(err) => Err(err),
        }
    }
}

/// Remote names a polymer may take, most preferred first. Rows keyed by
/// properties can share a polymer name, so the later names carry the key.
fn polymer_name_candidates(key: &PolymerKey, base: &str, row: &Row) -> Vec<String> {
    let PolymerKey::Properties { reference, .. } = key else {
        return vec![base.to_string()];
    };
    let number = |value: Option<f64>| value.map_or_else(|| "NA".to_string(), |v| v.to_string());
    let properties = format!(
        "Mw {}, PDI {}",
        number(row.polymer_mw),
        number(row.polymer_pdi)
    );
    vec![
        base.to_string(),
        format!("{base} ({properties})"),
        format!("{base} ({properties}, {reference})"),
    ]
}

/// Claims the first name nobody in this run holds yet.
fn claim_first(claimed: &Mutex<HashSet<String>>, candidates: &[String]) -> Option<String> {
    let mut claimed = lock(claimed);
    let name = candidates
        .iter()
        .find(|candidate| !claimed.contains(candidate.as_str()))?
        .clone();
    claimed.insert(name.clone());
    Some(name)
}

pub(crate) fn required_uid<N: Node>(node: &N) -> Result<&str, PolymixError> {
    node.uid().ok_or_else(|| {
        PolymixError::StoreDecode(format!(
            "{} `{}` has no uid",
            N::KIND,
            node.natural_key()
        ))
    })
}

/// Unwraps a resolution that cannot legitimately be `NotFound`.
pub fn expect_resolved<T>(
    resolution: Resolution<T>,
    kind: NodeKind,
    key: &str,
) -> Result<(T, Outcome), PolymixError> {
    resolution
        .into_parts()
        .ok_or_else(|| PolymixError::NotFound {
            kind,
            query: key.to_string(),
        })
}
