// ── Entity subscription manager ──
//
// Tracks smart entities on one server and keeps their subscription flags
// and last known values in step with the live session. Every remote call
// goes through `EntityControl`, which the session controller implements.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustlink_api::Transport;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::error::CoreError;
use crate::model::{ConnectionState, ConnectionStatus, DomainEvent, Entity, EntityInfo, EntityValue};
use crate::store::{Persistence, entities_key, load_as, save_as};

/// The remote operations entity tracking needs.
pub trait EntityControl: Send + Sync {
    fn get_entity_info(
        &self,
        entity_id: u32,
    ) -> impl Future<Output = Result<EntityInfo, CoreError>> + Send;

    fn set_entity_value(
        &self,
        entity_id: u32,
        value: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn set_subscription(
        &self,
        entity_id: u32,
        value: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

impl<T: Transport> EntityControl for Controller<T> {
    fn get_entity_info(
        &self,
        entity_id: u32,
    ) -> impl Future<Output = Result<EntityInfo, CoreError>> + Send {
        Controller::get_entity_info(self, entity_id)
    }

    fn set_entity_value(
        &self,
        entity_id: u32,
        value: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send {
        Controller::set_entity_value(self, entity_id, value)
    }

    fn set_subscription(
        &self,
        entity_id: u32,
        value: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send {
        Controller::set_subscription(self, entity_id, value)
    }
}

// ── EntityManager ────────────────────────────────────────────────

pub struct EntityManager<C> {
    control: C,
    server_id: String,
    entities: DashMap<u32, Entity>,
    /// Subscriptions to restore when the session comes back.
    resubscribe: Mutex<HashSet<u32>>,
    store: Option<Arc<dyn Persistence>>,
}

impl<C: EntityControl> EntityManager<C> {
    pub fn new(control: C, server_id: impl Into<String>) -> Self {
        Self {
            control,
            server_id: server_id.into(),
            entities: DashMap::new(),
            resubscribe: Mutex::new(HashSet::new()),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn Persistence>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    // ── Persistence ──────────────────────────────────────────────

    /// Restore the persisted entity list. Restored entities start offline;
    /// those that were subscribed are queued for resubscription.
    pub fn load(&self) -> Result<usize, CoreError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let saved: Vec<Entity> =
            load_as(store.as_ref(), &entities_key(&self.server_id))?.unwrap_or_default();

        let mut wanted = self.resubscribe_set();
        for mut entity in saved {
            if entity.subscribed {
                wanted.insert(entity.entity_id);
            }
            entity.subscribed = false;
            entity.online = false;
            self.entities.insert(entity.entity_id, entity);
        }
        drop(wanted);

        debug!(server = %self.server_id, count = self.entities.len(), "entities loaded");
        Ok(self.entities.len())
    }

    /// Persist the entity list. Subscriptions waiting to be restored are
    /// saved as subscribed.
    pub fn save(&self) -> Result<(), CoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let wanted = self.resubscribe_set().clone();
        let mut all = self.list();
        for entity in &mut all {
            entity.subscribed |= wanted.contains(&entity.entity_id);
        }
        save_as(store.as_ref(), &entities_key(&self.server_id), &all)
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(server = %self.server_id, error = %e, "failed to persist entities");
        }
    }

    fn resubscribe_set(&self) -> std::sync::MutexGuard<'_, HashSet<u32>> {
        self.resubscribe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Tracking ─────────────────────────────────────────────────

    /// Start tracking `entity_id`, reading its type and value from the server.
    pub async fn track(&self, entity_id: u32, name: Option<String>) -> Result<Entity, CoreError> {
        if self.entities.contains_key(&entity_id) {
            return Err(CoreError::EntityAlreadyTracked { entity_id });
        }

        let info = self.control.get_entity_info(entity_id).await?;
        let entity = Entity {
            entity_id,
            server_id: self.server_id.clone(),
            name: name.unwrap_or_else(|| format!("Entity {entity_id}")),
            entity_type: info.entity_type,
            subscribed: false,
            last_value: Some(info.value),
            last_updated: Utc::now(),
            online: true,
        };

        match self.entities.entry(entity_id) {
            Entry::Occupied(_) => return Err(CoreError::EntityAlreadyTracked { entity_id }),
            Entry::Vacant(slot) => {
                slot.insert(entity.clone());
            }
        }
        info!(entity_id, kind = %entity.entity_type, name = %entity.name, "entity tracked");
        self.persist();
        Ok(entity)
    }

    /// Stop tracking. A live subscription is cancelled first; if the session
    /// is already gone the unsubscribe is abandoned and removal proceeds.
    pub async fn remove(&self, entity_id: u32) -> Result<Entity, CoreError> {
        let subscribed = self.require(entity_id)?.subscribed;

        if subscribed {
            match self.unsubscribe(entity_id).await {
                Ok(()) => {}
                Err(e) if e.is_connection_error() => {
                    debug!(entity_id, error = %e, "unsubscribe abandoned");
                }
                Err(e) => return Err(e),
            }
        }

        self.resubscribe_set().remove(&entity_id);
        let (_, entity) = self
            .entities
            .remove(&entity_id)
            .ok_or(CoreError::EntityNotTracked { entity_id })?;
        info!(entity_id, "entity removed");
        self.persist();
        Ok(entity)
    }

    pub fn list(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self.entities.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|e| e.entity_id);
        all
    }

    pub fn get(&self, entity_id: u32) -> Option<Entity> {
        self.entities.get(&entity_id).map(|e| e.value().clone())
    }

    fn require(&self, entity_id: u32) -> Result<Entity, CoreError> {
        self.get(entity_id)
            .ok_or(CoreError::EntityNotTracked { entity_id })
    }

    /// Drop every tracked entity of this server.
    pub fn clear(&self) {
        self.entities.clear();
        self.resubscribe_set().clear();
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(&entities_key(&self.server_id)) {
                warn!(server = %self.server_id, error = %e, "failed to clear entities");
            }
        }
    }

    fn update(&self, entity_id: u32, apply: impl FnOnce(&mut Entity)) -> bool {
        match self.entities.get_mut(&entity_id) {
            Some(mut entity) => {
                apply(entity.value_mut());
                true
            }
            None => false,
        }
    }

    fn record_value(&self, entity_id: u32, value: EntityValue) {
        self.update(entity_id, |e| {
            e.last_value = Some(value);
            e.last_updated = Utc::now();
            e.online = true;
        });
    }

    // ── Remote operations ────────────────────────────────────────

    /// Current snapshot; refreshes the tracked copy when there is one.
    pub async fn get_info(&self, entity_id: u32) -> Result<EntityInfo, CoreError> {
        let info = self.control.get_entity_info(entity_id).await?;
        self.record_value(entity_id, info.value);
        Ok(info)
    }

    /// Switch a smart switch on or off. Other entity kinds are rejected
    /// before anything is sent.
    pub async fn set_value(&self, entity_id: u32, value: bool) -> Result<(), CoreError> {
        let entity_type = match self.get(entity_id) {
            Some(entity) => entity.entity_type,
            None => self.control.get_entity_info(entity_id).await?.entity_type,
        };
        if !entity_type.is_controllable() {
            return Err(CoreError::NotControllable {
                entity_id,
                entity_type: entity_type.to_string(),
            });
        }

        self.control.set_entity_value(entity_id, value).await?;
        self.record_value(entity_id, EntityValue::Flag(value));
        self.persist();
        Ok(())
    }

    /// Read the switch state and write its negation. Returns the new value.
    ///
    /// Read and write are separate round-trips: two racing toggles may both
    /// read the same state, and the last write wins.
    pub async fn toggle(&self, entity_id: u32) -> Result<bool, CoreError> {
        let info = self.control.get_entity_info(entity_id).await?;
        if !info.entity_type.is_controllable() {
            return Err(CoreError::NotControllable {
                entity_id,
                entity_type: info.entity_type.to_string(),
            });
        }

        let next = !info.value.as_flag().unwrap_or(false);
        self.control.set_entity_value(entity_id, next).await?;
        self.record_value(entity_id, EntityValue::Flag(next));
        self.persist();
        Ok(next)
    }

    /// Subscribe to change broadcasts. No-op when already subscribed.
    pub async fn subscribe(&self, entity_id: u32) -> Result<(), CoreError> {
        if self.require(entity_id)?.subscribed {
            return Ok(());
        }
        self.control.set_subscription(entity_id, true).await?;
        self.resubscribe_set().remove(&entity_id);
        self.update(entity_id, |e| e.subscribed = true);
        debug!(entity_id, "subscribed");
        self.persist();
        Ok(())
    }

    /// Cancel a subscription. No remote call when not subscribed; a
    /// subscription waiting to be restored is simply forgotten.
    pub async fn unsubscribe(&self, entity_id: u32) -> Result<(), CoreError> {
        let subscribed = self.require(entity_id)?.subscribed;
        let pending = self.resubscribe_set().remove(&entity_id);
        if !subscribed {
            if pending {
                self.persist();
            }
            return Ok(());
        }
        self.control.set_subscription(entity_id, false).await?;
        self.update(entity_id, |e| e.subscribed = false);
        debug!(entity_id, "unsubscribed");
        self.persist();
        Ok(())
    }

    /// Re-read one entity. Failure marks it offline.
    pub async fn refresh(&self, entity_id: u32) -> Result<Entity, CoreError> {
        self.require(entity_id)?;
        match self.control.get_entity_info(entity_id).await {
            Ok(info) => {
                self.record_value(entity_id, info.value);
                self.require(entity_id)
            }
            Err(e) => {
                self.update(entity_id, |entity| entity.online = false);
                Err(e)
            }
        }
    }

    /// Re-read every tracked entity; returns how many succeeded.
    pub async fn refresh_all(&self) -> usize {
        let ids: Vec<u32> = self.entities.iter().map(|e| *e.key()).collect();
        let mut refreshed = 0;
        for entity_id in ids {
            match self.refresh(entity_id).await {
                Ok(_) => refreshed += 1,
                Err(e) => warn!(entity_id, error = %e, "entity refresh failed"),
            }
        }
        self.persist();
        refreshed
    }

    // ── Event and status following ───────────────────────────────

    /// Fold a domain event into tracked state. Returns `true` if a tracked
    /// entity changed.
    pub fn apply_event(&self, event: &DomainEvent) -> bool {
        let DomainEvent::EntityValueChanged {
            entity_id, value, ..
        } = event
        else {
            return false;
        };
        let touched = self.update(*entity_id, |e| {
            if let Some(value) = value.coerce_to(e.entity_type) {
                e.last_value = Some(value);
            }
            e.last_updated = Utc::now();
            e.online = true;
        });
        if touched {
            debug!(entity_id, %value, "entity value changed");
        }
        touched
    }

    /// The session went away: every entity is offline and every
    /// subscription is gone, but remembered.
    pub fn mark_offline(&self) {
        let mut wanted = self.resubscribe_set();
        for mut entity in self.entities.iter_mut() {
            entity.online = false;
            if entity.subscribed {
                wanted.insert(entity.entity_id);
                entity.subscribed = false;
            }
        }
    }

    /// The session is back: mark entities online and restore remembered
    /// subscriptions.
    pub async fn mark_online(&self) {
        for mut entity in self.entities.iter_mut() {
            entity.online = true;
        }
        let wanted: Vec<u32> = self.resubscribe_set().drain().collect();
        for entity_id in wanted {
            if let Err(e) = self.subscribe(entity_id).await {
                if !matches!(e, CoreError::EntityNotTracked { .. }) {
                    warn!(entity_id, error = %e, "resubscribe failed");
                    self.resubscribe_set().insert(entity_id);
                }
            }
        }
    }

    /// Apply events and follow connection status until cancelled or either
    /// channel closes.
    pub async fn follow(
        &self,
        mut events: broadcast::Receiver<Arc<DomainEvent>>,
        mut status: watch::Receiver<ConnectionStatus>,
        cancel: CancellationToken,
    ) {
        let mut connected = status.borrow_and_update().state == ConnectionState::Connected;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now = status.borrow_and_update().state == ConnectionState::Connected;
                    if now != connected {
                        connected = now;
                        if now {
                            self.mark_online().await;
                        } else {
                            self.mark_offline();
                        }
                        self.persist();
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        self.apply_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "entity follower lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
