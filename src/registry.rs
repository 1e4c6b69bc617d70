use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::prediction::{Prediction, Settlement};

/// Chat (or other subscriber) that received a notice.
pub type SubscriberId = i64;
/// Notifier-side handle of a sent message, e.g. a message id.
pub type MessageHandle = i64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    pub predictions: BTreeMap<String, Prediction>,
    #[serde(default)]
    pub handles: BTreeMap<String, HashMap<SubscriberId, MessageHandle>>,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: RegistryState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().predictions.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Prediction> {
        self.lock().predictions.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts under the prediction's key unless that key is already
    /// tracked. Returns whether the prediction was inserted.
    pub fn insert_if_absent(&self, prediction: Prediction) -> bool {
        let mut state = self.lock();
        if state.predictions.contains_key(&prediction.key) {
            return false;
        }
        state.predictions.insert(prediction.key.clone(), prediction);
        true
    }

    /// Copies of every prediction still waiting for its result.
    pub fn upcoming(&self) -> Vec<Prediction> {
        self.lock()
            .predictions
            .values()
            .filter(|p| !p.is_finished())
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Prediction> {
        self.lock().predictions.values().cloned().collect()
    }

    /// Finishes the prediction under `key`. Returns the settled copy only
    /// when this call performed the transition.
    pub fn settle(&self, key: &str, settlement: Settlement) -> Option<Prediction> {
        let mut state = self.lock();
        let prediction = state.predictions.get_mut(key)?;
        if prediction.settle(settlement) {
            Some(prediction.clone())
        } else {
            None
        }
    }

    /// Drops every prediction whose kickoff is more than `retention` before
    /// `now`, whatever its status, together with its message handles.
    /// Returns the removed keys.
    pub fn prune(&self, now: DateTime<Utc>, retention: Duration) -> Vec<String> {
        let cutoff = now - retention;
        let mut state = self.lock();
        let stale: Vec<String> = state
            .predictions
            .iter()
            .filter(|(_, p)| p.kickoff < cutoff)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            state.predictions.remove(key);
            state.handles.remove(key);
        }
        stale
    }

    pub fn attach_handle(&self, key: &str, subscriber: SubscriberId, handle: MessageHandle) {
        self.lock()
            .handles
            .entry(key.to_string())
            .or_default()
            .insert(subscriber, handle);
    }

    pub fn handles_for(&self, key: &str) -> HashMap<SubscriberId, MessageHandle> {
        self.lock().handles.get(key).cloned().unwrap_or_default()
    }

    /// Removes a subscriber from every handle map, e.g. after it blocked
    /// the bot.
    pub fn forget_subscriber(&self, subscriber: SubscriberId) {
        let mut state = self.lock();
        for handles in state.handles.values_mut() {
            handles.remove(&subscriber);
        }
        state.handles.retain(|_, handles| !handles.is_empty());
    }

    pub fn export_state(&self) -> RegistryState {
        self.lock().clone()
    }
}
