//! Conjuring rules and the summoned spirit's lifecycle.
//!
//! Summoning runs as two tests. The summoner rolls Magic + Summoning limited
//! by Force; the spirit then resists with Force dice. The spirit document is
//! created before the resistance roll and either finalized (the spirit lost)
//! or deleted again (the spirit won, or the roll was cancelled).

use super::data::{DamageData, DamageKind, SPIRIT_TYPES};
use super::{Notice, Test, TestError};
use crate::document::{Document, DocumentSeed, Ownership};
use crate::store::{EntityStore, StoreError};
use serde_json::{json, Map, Value};

/// Services owed by a bound spirit: the summoner's net hits.
pub fn spirit_services(summoner_hits: i32, spirit_hits: i32) -> i32 {
    (summoner_hits - spirit_hits).max(0)
}

/// Drain value caused by the spirit's resistance: twice its hits, at least 2.
pub fn summoning_drain(spirit_hits: i32) -> i32 {
    (spirit_hits * 2).max(2)
}

/// Drain is physical when the spirit's Force exceeds the summoner's Magic.
pub fn drain_damage_kind(force: i32, magic: i32) -> DamageKind {
    if force > magic {
        DamageKind::Physical
    } else {
        DamageKind::Stun
    }
}

/// Display name of a summoned spirit, e.g. `Ada Air Spirit`.
pub fn spirit_name(summoner: &str, spirit_type: &str) -> String {
    let mut chars = spirit_type.chars();
    let spirit_type = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("{summoner} {spirit_type} Spirit")
}

pub fn summoner_magic(summoner: &Document) -> i32 {
    summoner.system_i32("attributes.magic.value").unwrap_or(0)
}

/// The summoner a spirit is bound to, if it has one and it still exists.
pub async fn summoner_of(
    store: &dyn EntityStore,
    spirit: &Document,
) -> Result<Option<Document>, StoreError> {
    match spirit.summoner_handle() {
        Some(handle) => store.resolve(&handle).await,
        None => Ok(None),
    }
}

impl Test {
    /// Force is a dynamic limit chosen per roll.
    pub(super) fn prepare_summon_limit(&mut self) {
        let force = self.data.force.unwrap_or(0);
        if let Some(limit) = self.data.limit.as_mut() {
            limit.modifiers.add_unique("Force", force);
        }
    }

    pub(super) fn validate_summon_force(&mut self) {
        let force = self.data.force.unwrap_or(0);
        if force < 1 {
            self.notify(Notice::warning("Force must be at least 1"));
        }

        let Some(magic) = self.documents.actor.as_ref().map(summoner_magic) else {
            return;
        };
        if force > magic * 2 {
            tracing::warn!(force, magic, "Summoning Force exceeds twice the summoner's Magic");
            self.notify(Notice::warning(format!(
                "Force {force} is more than twice the summoner's Magic ({magic})"
            )));
        }
    }

    /// The spirit has no actor values to speak of; it resists with its Force.
    pub(super) fn prepare_opposed_summon_pool(&mut self) {
        let force = self
            .against
            .as_ref()
            .and_then(|against| against.data.force)
            .unwrap_or(0);
        if let Some(pool) = self.data.pool.as_mut() {
            pool.modifiers.add_unique("Force", force);
        }
    }

    /// Set drain from the spirit's resistance hits.
    pub fn calc_drain(&mut self, spirit_hits: i32) {
        let drain = summoning_drain(spirit_hits);
        let force = self.data.force.unwrap_or(0);
        let kind = match self.documents.actor.as_ref() {
            Some(summoner) => drain_damage_kind(force, summoner_magic(summoner)),
            None => DamageKind::Stun,
        };

        self.data.drain = Some(drain);
        self.data.drain_damage = Some(DamageData::new(drain, kind));
        tracing::debug!(spirit_hits, drain, ?kind, "Calculated summoning drain");
    }

    pub(super) fn derive_spirit_services(&mut self) {
        let summoner_hits = self
            .against
            .as_ref()
            .map_or(0, |against| against.total_hits());
        self.data.services = Some(spirit_services(summoner_hits, self.total_hits()));
    }

    /// Create the spirit document the summoner is trying to bind.
    pub(super) async fn create_summoned_spirit(&mut self) {
        let Some(against) = self.against.as_ref() else {
            return;
        };
        let Some(summoner) = against.documents.actor.as_ref() else {
            tracing::warn!("Summoning test has no summoner; no spirit created");
            self.notify(Notice::warning("The summoning test has no summoner"));
            return;
        };

        let spirit_type = against
            .data
            .spirit_type_selected
            .clone()
            .unwrap_or_else(|| SPIRIT_TYPES[0].to_string());
        let force = against.data.force.unwrap_or(1);
        let seed = DocumentSeed::actor(
            spirit_name(&summoner.name, &spirit_type),
            "spirit",
            json!({"force": force, "spiritType": spirit_type}),
        );

        let result = self.ctx.store.create(seed).await;
        match result {
            Ok(handle) => {
                tracing::info!(%handle, force, %spirit_type, "Created summoned spirit");
                self.data.summoned_spirit_handle = Some(handle);
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not create the summoned spirit");
                self.notify(Notice::error(format!(
                    "Could not create the summoned spirit: {e}"
                )));
            }
        }
    }

    /// Bind the spirit: services, summoner and ownership for the summoner's players.
    pub(super) async fn finalize_summoned_spirit(&mut self) {
        let Some(spirit) = self.documents.actor.as_ref() else {
            return;
        };
        let Some(summoner) = self
            .against
            .as_ref()
            .and_then(|against| against.documents.actor.as_ref())
        else {
            return;
        };

        let services = self.data.services.unwrap_or(0);
        let mut patch = json!({
            "system": {"services": services, "summoner": summoner.handle.as_str()}
        });

        if self.ctx.config.grant_summoner_ownership {
            let owners: Map<String, Value> = self
                .ctx
                .users
                .users()
                .into_iter()
                .filter(|user| !user.is_gm && user.character.as_ref() == Some(&summoner.handle))
                .map(|user| (user.id.0, json!(Ownership::Owner)))
                .collect();
            if !owners.is_empty() {
                patch["ownership"] = Value::Object(owners);
            }
        }

        let handle = spirit.handle.clone();
        let result = self.ctx.store.update(&handle, patch.clone()).await;
        match result {
            Ok(()) => {
                tracing::info!(%handle, services, "Summoned spirit bound");
                if let Some(spirit) = self.documents.actor.as_mut() {
                    if let Err(e) = spirit.apply_patch(&patch) {
                        tracing::warn!(error = %e, "Could not mirror spirit update locally");
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, %handle, "Could not finalize the summoned spirit");
                self.notify(Notice::error(format!(
                    "Could not finalize the summoned spirit: {e}"
                )));
            }
        }
    }

    /// Delete the spirit document, if one was created.
    pub(super) async fn cleanup_summoned_spirit(&mut self) {
        let Some(handle) = self.data.summoned_spirit_handle.clone() else {
            return;
        };

        let result = self.ctx.store.delete(&handle).await;
        match result {
            Ok(()) | Err(StoreError::NotFound(_)) => {
                tracing::debug!(%handle, "Removed summoned spirit");
                self.data.summoned_spirit_handle = None;
                self.data.source_actor_handle = None;
                self.documents.actor = None;
            }
            Err(e) => {
                tracing::error!(error = %e, %handle, "Could not remove the summoned spirit");
                self.notify(Notice::error(format!(
                    "Could not remove the summoned spirit: {e}"
                )));
            }
        }
    }

    /// Hand the spirit's hits to the summoning test and run its follow-up.
    pub(super) async fn chain_into_against(&mut self) -> Result<(), TestError> {
        let hits = self.total_hits();
        let Some(against) = self.against.as_mut() else {
            return Ok(());
        };

        against.calc_drain(hits);
        against.execute_follow_up_test().await?;
        self.data.against = Some(Box::new(against.record()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_are_net_hits() {
        assert_eq!(spirit_services(5, 2), 3);
        assert_eq!(spirit_services(2, 2), 0);
        assert_eq!(spirit_services(1, 4), 0);
    }

    #[test]
    fn test_drain_has_a_minimum() {
        assert_eq!(summoning_drain(0), 2);
        assert_eq!(summoning_drain(1), 2);
        assert_eq!(summoning_drain(3), 6);
    }

    #[test]
    fn test_drain_kind() {
        assert_eq!(drain_damage_kind(6, 5), DamageKind::Physical);
        assert_eq!(drain_damage_kind(5, 5), DamageKind::Stun);
    }

    #[test]
    fn test_spirit_name() {
        assert_eq!(spirit_name("Ada", "air"), "Ada Air Spirit");
        assert_eq!(spirit_name("Ada", "beasts"), "Ada Beasts Spirit");
    }
}
