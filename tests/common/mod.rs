//! In-memory cluster shared by the integration tests.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use futures::{StreamExt as _, channel::mpsc, stream};
use kubestep::{
    ResourceClient, ResourceRef,
    client::{ClientError, Watch, WatchEvent, WatchOptions},
    resource::ResourceOption,
};
use serde_json::Value as Json;

type Subscriber = (String, mpsc::UnboundedSender<Result<WatchEvent, ClientError>>);

#[derive(Default)]
struct State {
    objects: HashMap<String, Json>,
    options: HashMap<String, Vec<ResourceOption>>,
    watchers: Vec<Subscriber>,
}

/// Cluster keeping resources in memory, keyed by `kind/name`.
#[derive(Default)]
pub struct Cluster {
    state: Mutex<State>,
}

impl Cluster {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Stores the `object`, notifying watchers.
    pub fn put(&self, target: &ResourceRef, object: Json) {
        let key = target.to_string();
        let mut state = self.state();
        let event = if state.objects.insert(key.clone(), object.clone()).is_some() {
            WatchEvent::Modified(object)
        } else {
            WatchEvent::Added(object)
        };
        state.notify(&key, event);
    }

    /// Updates the object in place, notifying watchers.
    pub fn modify(&self, target: &ResourceRef, change: impl FnOnce(&mut Json)) {
        let key = target.to_string();
        let mut state = self.state();
        let Some(object) = state.objects.get_mut(&key) else {
            return;
        };
        change(object);
        let event = WatchEvent::Modified(object.clone());
        state.notify(&key, event);
    }

    /// Returns the options the `target` was last created with.
    pub fn options_of(&self, target: &ResourceRef) -> Option<Vec<ResourceOption>> {
        self.state().options.get(&target.to_string()).cloned()
    }

    /// Returns the number of stored resources.
    pub fn len(&self) -> usize {
        self.state().objects.len()
    }

    /// Returns the number of watches nobody released yet.
    pub fn open_watches(&self) -> usize {
        let mut state = self.state();
        state.watchers.retain(|(_, tx)| !tx.is_closed());
        state.watchers.len()
    }
}

impl State {
    fn notify(&mut self, key: &str, event: WatchEvent) {
        self.watchers.retain(|(watched, tx)| {
            watched != key || tx.unbounded_send(Ok(event.clone())).is_ok()
        });
    }
}

/// Returns the `kind/name` reference of the `object`.
pub fn reference_of(object: &Json) -> Result<ResourceRef, ClientError> {
    let kind = object["kind"].as_str();
    let name = object["metadata"]["name"].as_str();
    match (kind, name) {
        (Some(kind), Some(name)) => Ok(ResourceRef::new(kind.to_lowercase(), name)),
        _ => Err(ClientError::Invalid { message: "missing kind or name".into() }),
    }
}

#[async_trait]
impl ResourceClient for Cluster {
    async fn get(&self, target: &ResourceRef) -> Result<Json, ClientError> {
        self.state()
            .objects
            .get(&target.to_string())
            .cloned()
            .ok_or_else(|| ClientError::NotFound { what: target.to_string() })
    }

    async fn create(
        &self,
        object: &Json,
        options: &[ResourceOption],
    ) -> Result<Json, ClientError> {
        let target = reference_of(object)?;
        _ = self.state().options.insert(target.to_string(), options.to_vec());
        if self.state().objects.contains_key(&target.to_string()) {
            return Err(ClientError::Conflict { message: format!("{target} exists") });
        }
        if !options.contains(&ResourceOption::DryRunAll) {
            self.put(&target, object.clone());
        }
        Ok(object.clone())
    }

    async fn delete(
        &self,
        target: &ResourceRef,
        _: &[ResourceOption],
    ) -> Result<(), ClientError> {
        let key = target.to_string();
        let mut state = self.state();
        let removed = state
            .objects
            .remove(&key)
            .ok_or_else(|| ClientError::NotFound { what: key.clone() })?;
        state.notify(&key, WatchEvent::Deleted(removed));
        Ok(())
    }

    async fn watch(&self, target: &ResourceRef, _: &WatchOptions) -> Result<Watch, ClientError> {
        let key = target.to_string();
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.state();
        let current = state.objects.get(&key).cloned().map(|o| Ok(WatchEvent::Added(o)));
        state.watchers.push((key, tx));
        Ok(Watch::new(stream::iter(current).chain(rx)))
    }
}
