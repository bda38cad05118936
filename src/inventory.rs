use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info};

use crate::cache::lock;
use crate::domain::{Inventory, Material};
use crate::error::PolymixError;
use crate::resolver::{Outcome, required_uid};
use crate::store::{EntityStore, Query};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryCategory {
    Solvents,
    Polymers,
    Mixtures,
}

impl InventoryCategory {
    pub const ALL: [InventoryCategory; 3] = [
        InventoryCategory::Solvents,
        InventoryCategory::Polymers,
        InventoryCategory::Mixtures,
    ];

    pub fn label(self) -> &'static str {
        match self {
            InventoryCategory::Solvents => "solvents",
            InventoryCategory::Polymers => "polymers",
            InventoryCategory::Mixtures => "mixtures",
        }
    }

    fn index(self) -> usize {
        match self {
            InventoryCategory::Solvents => 0,
            InventoryCategory::Polymers => 1,
            InventoryCategory::Mixtures => 2,
        }
    }
}

impl fmt::Display for InventoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Result of adding a material to an inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub inventory: String,
    /// How the inventory itself was resolved, when this call resolved it.
    pub resolved: Option<Outcome>,
    /// False when the material was already listed; nothing was saved then.
    pub added: bool,
}

/// Keeps the run's solvent/polymer/mixture inventories in step with the
/// uploaded materials.
///
/// Each inventory is resolved on first use and then held behind its own
/// lock, so append-and-save for one inventory never interleaves.
pub struct InventoryRegistrar {
    group_uid: String,
    collection_uid: String,
    base_name: String,
    inventories: [Mutex<Option<Inventory>>; 3],
}

impl InventoryRegistrar {
    pub fn new(group_uid: &str, collection_uid: &str, base_name: &str) -> Self {
        Self {
            group_uid: group_uid.to_string(),
            collection_uid: collection_uid.to_string(),
            base_name: base_name.to_string(),
            inventories: Default::default(),
        }
    }

    pub fn inventory_name(&self, category: InventoryCategory) -> String {
        format!("{} ({})", self.base_name, category.label())
    }

    /// Appends `material` to the category's inventory and saves it right
    /// away, so an aborted run leaves every finished row registered.
    pub fn register<S: EntityStore>(
        &self,
        store: &S,
        category: InventoryCategory,
        material: &Material,
    ) -> Result<Registration, PolymixError> {
        let material_uid = required_uid(material)?.to_string();
        let mut slot = lock(&self.inventories[category.index()]);

        let mut resolved = None;
        if slot.is_none() {
            let (inventory, outcome) = self.resolve(store, category)?;
            *slot = Some(inventory);
            resolved = Some(outcome);
        }
        let Some(inventory) = slot.as_mut() else {
            return Err(PolymixError::StoreDecode(format!(
                "inventory `{}` unavailable",
                self.inventory_name(category)
            )));
        };

        if inventory.contains(&material_uid) {
            debug!(inventory = %inventory.name, material = %material.name, "already registered");
            return Ok(Registration {
                inventory: inventory.name.clone(),
                resolved,
                added: false,
            });
        }

        inventory.materials.push(material_uid);
        if let Err(err) = store.save(inventory) {
            inventory.materials.pop();
            return Err(err);
        }
        debug!(inventory = %inventory.name, material = %material.name, "registered");
        Ok(Registration {
            inventory: inventory.name.clone(),
            resolved,
            added: true,
        })
    }

    /// Current local copy of an inventory, if it has been resolved.
    pub fn snapshot(&self, category: InventoryCategory) -> Option<Inventory> {
        lock(&self.inventories[category.index()]).clone()
    }

    fn resolve<S: EntityStore>(
        &self,
        store: &S,
        category: InventoryCategory,
    ) -> Result<(Inventory, Outcome), PolymixError> {
        let name = self.inventory_name(category);
        let mut inventory = Inventory::new(&self.group_uid, &self.collection_uid, &name);
        match store.save(&mut inventory) {
            Ok(()) => {
                info!(inventory = %name, "created inventory");
                Ok((inventory, Outcome::Created))
            }
            Err(err) if err.is_duplicate() => {
                let existing: Inventory =
                    store.get(&Query::name(&name).in_group(&self.group_uid))?;
                info!(inventory = %name, materials = existing.materials.len(), "found existing inventory");
                Ok((existing, Outcome::Found))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_names() {
        let registrar = InventoryRegistrar::new("g1", "c1", "LCST dataset");
        assert_eq!(
            registrar.inventory_name(InventoryCategory::Solvents),
            "LCST dataset (solvents)"
        );
        assert_eq!(
            registrar.inventory_name(InventoryCategory::Mixtures),
            "LCST dataset (mixtures)"
        );
        assert!(registrar.snapshot(InventoryCategory::Polymers).is_none());
    }
}
