// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`Storage`] implementation.
//!
//! Backs the fake clientset and the store adapter in tests, and can be
//! embedded anywhere a process-local registry is enough.
//!
//! - One monotonically increasing `u64` resource version per store; every
//!   write takes the next value.
//! - Objects keep their insertion order; updates do not move them.
//! - A bounded event history lets watches resume from a recent version.
//!   Resuming from anything older fails with `Expired`.
//! - Live events fan out through a broadcast channel. A watcher that falls
//!   too far behind receives `Expired` and its stream ends.

use super::{check_preconditions, generate_uid, SelectionPredicate, Storage, OPTIMISTIC_LOCK_MESSAGE};
use crate::constants::{WATCH_CHANNEL_CAPACITY, WATCH_HISTORY_CAPACITY};
use crate::crd::RegistryKind;
use crate::errors::RegistryError;
use crate::options::{Preconditions, ResourceList, WatchEvent, WatchStream};
use async_trait::async_trait;
use base64::Engine;
use futures::stream::{self, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::jiff::Timestamp;
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// Version tag written into continue tokens.
const CONTINUE_TOKEN_VERSION: &str = "meta.k8s.io/v1";

type ObjectKey = (String, String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EventType {
    Added,
    Modified,
    Deleted,
}

#[derive(Clone, Debug)]
struct StoredEvent<K> {
    revision: u64,
    event_type: EventType,
    object: K,
    previous: Option<K>,
}

/// Opaque paging cursor handed to clients as base64 JSON.
#[derive(Debug, Serialize, Deserialize)]
struct ContinueToken {
    v: String,
    rv: u64,
    start: u64,
}

impl ContinueToken {
    fn encode(&self) -> Result<String, RegistryError> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(token: &str) -> Result<Self, RegistryError> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| RegistryError::BadRequest(format!("invalid continue token: {e}")))?;
        let parsed: Self = serde_json::from_slice(&bytes)
            .map_err(|e| RegistryError::BadRequest(format!("invalid continue token: {e}")))?;
        if parsed.v != CONTINUE_TOKEN_VERSION {
            return Err(RegistryError::BadRequest(format!(
                "continue token version {:?} is not supported",
                parsed.v
            )));
        }
        Ok(parsed)
    }
}

struct State<K> {
    /// Latest resource version handed out.
    revision: u64,
    /// Highest revision dropped from `history`; watches must start after it.
    compacted: u64,
    next_seq: u64,
    objects: BTreeMap<u64, K>,
    index: HashMap<ObjectKey, u64>,
    history: VecDeque<StoredEvent<K>>,
}

impl<K: RegistryKind> State<K> {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn lookup(&self, key: &ObjectKey) -> Option<(u64, &K)> {
        let seq = *self.index.get(key)?;
        self.objects.get(&seq).map(|obj| (seq, obj))
    }

    fn record(&mut self, event: StoredEvent<K>) {
        if self.history.len() >= WATCH_HISTORY_CAPACITY {
            if let Some(dropped) = self.history.pop_front() {
                self.compacted = dropped.revision;
            }
        }
        self.history.push_back(event);
    }
}

/// Thread-safe, process-local object store for one kind.
pub struct MemoryStorage<K: RegistryKind> {
    state: Mutex<State<K>>,
    events: broadcast::Sender<StoredEvent<K>>,
}

impl<K: RegistryKind> Default for MemoryStorage<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RegistryKind> MemoryStorage<K> {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State {
                revision: 0,
                compacted: 0,
                next_seq: 0,
                objects: BTreeMap::new(),
                index: HashMap::new(),
                history: VecDeque::new(),
            }),
            events,
        }
    }

    /// Latest resource version issued by this store.
    pub async fn current_revision(&self) -> u64 {
        self.state.lock().await.revision
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.state.lock().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.objects.is_empty()
    }

    fn key_of(obj: &K) -> ObjectKey {
        let namespace = if K::NAMESPACED {
            obj.namespace().unwrap_or_default()
        } else {
            String::new()
        };
        (namespace, obj.name_any())
    }

    fn key(namespace: Option<&str>, name: &str) -> ObjectKey {
        let namespace = if K::NAMESPACED {
            namespace.unwrap_or_default().to_string()
        } else {
            String::new()
        };
        (namespace, name.to_string())
    }

    fn in_namespace(obj: &K, namespace: Option<&str>) -> bool {
        match namespace {
            Some(ns) if K::NAMESPACED => obj.namespace().as_deref() == Some(ns),
            _ => true,
        }
    }

    fn publish(&self, state: &mut State<K>, event: StoredEvent<K>) {
        state.record(event.clone());
        // no receivers is not an error
        let _ = self.events.send(event);
    }

    fn not_found(name: &str) -> RegistryError {
        RegistryError::not_found(&K::qualified_resource(), name)
    }
}

/// Translate a stored event into what a watcher with `predicate` should see.
///
/// An update that moves an object into the selection is reported as
/// `Added`, one that moves it out as `Deleted`.
fn to_watch_event<K: RegistryKind>(
    event: &StoredEvent<K>,
    namespace: Option<&str>,
    predicate: &SelectionPredicate<K>,
) -> Option<WatchEvent<K>> {
    if !MemoryStorage::<K>::in_namespace(&event.object, namespace) {
        return None;
    }
    let current = predicate.matches(&event.object);
    match event.event_type {
        EventType::Added => current.then(|| WatchEvent::Added(event.object.clone())),
        EventType::Deleted => current.then(|| WatchEvent::Deleted(event.object.clone())),
        EventType::Modified => {
            let previous = event.previous.as_ref().is_some_and(|p| predicate.matches(p));
            match (previous, current) {
                (true, true) => Some(WatchEvent::Modified(event.object.clone())),
                (false, true) => Some(WatchEvent::Added(event.object.clone())),
                (true, false) => event.previous.as_ref().map(|p| {
                    let mut gone = p.clone();
                    gone.meta_mut().resource_version = Some(event.revision.to_string());
                    WatchEvent::Deleted(gone)
                }),
                (false, false) => None,
            }
        }
    }
}

#[async_trait]
impl<K: RegistryKind> Storage<K> for MemoryStorage<K> {
    async fn create(&self, mut obj: K) -> Result<K, RegistryError> {
        let key = Self::key_of(&obj);
        if key.1.is_empty() {
            return Err(RegistryError::BadRequest("name is required".to_string()));
        }
        if obj.meta().resource_version.as_deref().is_some_and(|rv| !rv.is_empty()) {
            return Err(RegistryError::BadRequest(
                "resourceVersion should not be set on objects to be created".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if state.index.contains_key(&key) {
            return Err(RegistryError::already_exists(&K::qualified_resource(), &key.1));
        }

        let revision = state.next_revision();
        let meta = obj.meta_mut();
        meta.resource_version = Some(revision.to_string());
        if meta.uid.as_deref().unwrap_or_default().is_empty() {
            meta.uid = Some(generate_uid());
        }
        if meta.creation_timestamp.is_none() {
            meta.creation_timestamp = Some(Time(Timestamp::now()));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.objects.insert(seq, obj.clone());
        state.index.insert(key, seq);
        self.publish(
            &mut state,
            StoredEvent {
                revision,
                event_type: EventType::Added,
                object: obj.clone(),
                previous: None,
            },
        );
        Ok(obj)
    }

    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, RegistryError> {
        let state = self.state.lock().await;
        state
            .lookup(&Self::key(namespace, name))
            .map(|(_, obj)| obj.clone())
            .ok_or_else(|| Self::not_found(name))
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        predicate: &SelectionPredicate<K>,
    ) -> Result<ResourceList<K>, RegistryError> {
        let state = self.state.lock().await;

        let start = match predicate.continue_token.as_deref() {
            Some(token) => {
                let token = ContinueToken::decode(token)?;
                if token.rv < state.compacted {
                    return Err(RegistryError::Expired {
                        requested: token.rv.to_string(),
                        oldest: (state.compacted + 1).to_string(),
                    });
                }
                token.start
            }
            None => 0,
        };
        let limit = predicate.limit.map_or(usize::MAX, |l| l as usize);

        let mut items = Vec::new();
        let mut next = None;
        for (seq, obj) in state.objects.range(start..) {
            if !Self::in_namespace(obj, namespace) || !predicate.matches(obj) {
                continue;
            }
            if items.len() == limit {
                next = Some(*seq);
                break;
            }
            items.push(obj.clone());
        }

        let continue_token = next
            .map(|start| {
                ContinueToken {
                    v: CONTINUE_TOKEN_VERSION.to_string(),
                    rv: state.revision,
                    start,
                }
                .encode()
            })
            .transpose()?;

        Ok(ResourceList {
            items,
            resource_version: Some(state.revision.to_string()),
            continue_token,
        })
    }

    async fn watch(
        &self,
        namespace: Option<&str>,
        predicate: SelectionPredicate<K>,
        resource_version: Option<&str>,
    ) -> Result<WatchStream<K>, RegistryError> {
        let namespace = namespace.map(str::to_string);
        let state = self.state.lock().await;

        let initial: Vec<WatchEvent<K>> = match resource_version.filter(|rv| !rv.is_empty() && *rv != "0") {
            None => state
                .objects
                .values()
                .filter(|obj| Self::in_namespace(obj, namespace.as_deref()) && predicate.matches(obj))
                .cloned()
                .map(WatchEvent::Added)
                .collect(),
            Some(rv) => {
                let since: u64 = rv.parse().map_err(|_| {
                    RegistryError::BadRequest(format!("invalid resource version {rv:?}"))
                })?;
                if since < state.compacted {
                    return Err(RegistryError::Expired {
                        requested: rv.to_string(),
                        oldest: (state.compacted + 1).to_string(),
                    });
                }
                state
                    .history
                    .iter()
                    .filter(|event| event.revision > since)
                    .filter_map(|event| to_watch_event(event, namespace.as_deref(), &predicate))
                    .collect()
            }
        };

        // subscribe while still holding the lock so no write slips between
        // the replay and the live feed
        let receiver = self.events.subscribe();
        drop(state);

        debug!(
            kind = %K::kind(&()),
            namespace = ?namespace,
            resource_version = ?resource_version,
            replayed = initial.len(),
            "Watch started"
        );

        let live = stream::unfold(
            Some((receiver, namespace, predicate)),
            |watcher| async move {
                let (mut receiver, namespace, predicate) = watcher?;
                loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            if let Some(out) = to_watch_event(&event, namespace.as_deref(), &predicate) {
                                return Some((Ok(out), Some((receiver, namespace, predicate))));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(kind = %K::kind(&()), skipped, "Watcher fell behind, closing watch");
                            let err = RegistryError::Expired {
                                requested: String::new(),
                                oldest: format!("{skipped} events dropped"),
                            };
                            return Some((Err(err), None));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        );

        Ok(stream::iter(initial.into_iter().map(Ok)).chain(live).boxed())
    }

    async fn update(&self, mut obj: K) -> Result<K, RegistryError> {
        let key = Self::key_of(&obj);
        let mut state = self.state.lock().await;

        let (seq, previous) = match state.lookup(&key) {
            Some((seq, stored)) => (seq, stored.clone()),
            None => return Err(Self::not_found(&key.1)),
        };
        if let Some(rv) = obj.meta().resource_version.as_deref().filter(|rv| !rv.is_empty()) {
            if Some(rv) != previous.meta().resource_version.as_deref() {
                return Err(RegistryError::conflict(
                    &K::qualified_resource(),
                    &key.1,
                    OPTIMISTIC_LOCK_MESSAGE,
                ));
            }
        }

        let revision = state.next_revision();
        obj.meta_mut().resource_version = Some(revision.to_string());
        state.objects.insert(seq, obj.clone());
        self.publish(
            &mut state,
            StoredEvent {
                revision,
                event_type: EventType::Modified,
                object: obj.clone(),
                previous: Some(previous),
            },
        );
        Ok(obj)
    }

    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        preconditions: Option<&Preconditions>,
    ) -> Result<K, RegistryError> {
        let key = Self::key(namespace, name);
        let mut state = self.state.lock().await;

        let seq = match state.lookup(&key) {
            Some((seq, stored)) => {
                check_preconditions(stored, preconditions)?;
                seq
            }
            None => return Err(Self::not_found(name)),
        };

        let revision = state.next_revision();
        state.index.remove(&key);
        let Some(mut obj) = state.objects.remove(&seq) else {
            return Err(Self::not_found(name));
        };
        obj.meta_mut().resource_version = Some(revision.to_string());
        self.publish(
            &mut state,
            StoredEvent {
                revision,
                event_type: EventType::Deleted,
                object: obj.clone(),
                previous: None,
            },
        );
        Ok(obj)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
