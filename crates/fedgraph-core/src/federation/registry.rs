//! Access-guarded mapping from graph id to backend graph.
//!
//! Mutations are serialised behind one write lock and persisted through the
//! cache substrate before the in-memory map changes; reads share the lock.

use fedgraph_common::User;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::FederatedAccess;
use crate::cache::{get_json, keys_with_prefix, put_json, CacheService};
use crate::error::{GraphError, Result};
use crate::schema::Schema;
use crate::store::{Context, GraphFactory, GraphHandle, StoreProperties};

pub const GRAPH_KEY_PREFIX: &str = "federatedStoreGraphs:";

/// Persisted form of a registry entry; enough to rebuild the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSerialisable {
    pub graph_id: String,
    pub schema: Schema,
    pub properties: StoreProperties,
    pub access: FederatedAccess,
}

#[derive(Clone)]
pub struct GraphEntry {
    graph_id: String,
    handle: Arc<dyn GraphHandle>,
    schema: Schema,
    access: FederatedAccess,
}

impl std::fmt::Debug for GraphEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEntry")
            .field("graph_id", &self.graph_id)
            .field("schema", &self.schema)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl GraphEntry {
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub fn handle(&self) -> &Arc<dyn GraphHandle> {
        &self.handle
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn access(&self) -> &FederatedAccess {
        &self.access
    }

    pub fn properties(&self) -> &StoreProperties {
        self.handle.properties()
    }

    fn to_serialisable(&self) -> GraphSerialisable {
        GraphSerialisable {
            graph_id: self.graph_id.clone(),
            schema: self.schema.clone(),
            properties: self.properties().clone(),
            access: self.access.clone(),
        }
    }
}

fn graph_key(graph_id: &str) -> String {
    format!("{}{}", GRAPH_KEY_PREFIX, graph_id)
}

pub struct GraphRegistry {
    entries: RwLock<BTreeMap<String, GraphEntry>>,
    cache: Option<Arc<dyn CacheService>>,
    admin_auth: Option<String>,
    default_graph_ids: Vec<String>,
    generation: AtomicU64,
}

impl GraphRegistry {
    /// A registry without persistence.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            cache: None,
            admin_auth: None,
            default_graph_ids: Vec::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheService>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_admin_auth(mut self, admin_auth: Option<String>) -> Self {
        self.admin_auth = admin_auth;
        self
    }

    /// Replaces the "every enabled, readable graph" default target set.
    pub fn with_default_graph_ids(mut self, ids: Vec<String>) -> Self {
        self.default_graph_ids = ids;
        self
    }

    pub fn admin_auth(&self) -> Option<&str> {
        self.admin_auth.as_deref()
    }

    /// Bumped on every mutation; lets derived caches detect staleness.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn persist(&self, entry: &GraphSerialisable) -> Result<()> {
        match &self.cache {
            Some(cache) => put_json(cache.as_ref(), &graph_key(&entry.graph_id), entry),
            None => Ok(()),
        }
    }

    fn unpersist(&self, graph_id: &str) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.remove(&graph_key(graph_id))?;
        }
        Ok(())
    }

    /// Adds a graph. Re-registering identical content is a no-op; any
    /// difference fails naming the field.
    pub async fn register(&self, handle: Arc<dyn GraphHandle>, access: FederatedAccess) -> Result<()> {
        let graph_id = handle.graph_id().to_string();
        let owner_ctx = Context::new(User::new(access.owner_user_id.clone()));
        let schema = handle.schema(&owner_ctx).await?;
        let entry = GraphEntry {
            graph_id: graph_id.clone(),
            handle,
            schema,
            access,
        };

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&graph_id) {
            let field = if existing.schema != entry.schema {
                Some("schema")
            } else if existing.properties() != entry.properties() {
                Some("properties")
            } else if existing.access != entry.access {
                Some("access")
            } else {
                None
            };
            return match field {
                None => {
                    tracing::debug!("Graph {} re-registered with identical content", graph_id);
                    Ok(())
                }
                Some(field) => Err(GraphError::AlreadyExists(format!(
                    "graph {} is already registered with a different {}",
                    graph_id, field
                ))),
            };
        }

        self.persist(&entry.to_serialisable())?;
        entries.insert(graph_id.clone(), entry);
        self.bump();
        tracing::info!("Registered graph {}", graph_id);
        Ok(())
    }

    /// Rebuilds persisted entries through `factory`. Entries that fail to
    /// load are logged and skipped.
    pub async fn restore(&self, factory: &GraphFactory) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let mut entries = self.entries.write().await;
        let mut restored = 0;
        for graph_id in keys_with_prefix(cache.as_ref(), GRAPH_KEY_PREFIX)? {
            let loaded: Option<GraphSerialisable> = match get_json(cache.as_ref(), &graph_key(&graph_id)) {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!("Failed to read persisted graph {}: {}", graph_id, e);
                    continue;
                }
            };
            let Some(saved) = loaded else { continue };
            match factory.create(&saved.graph_id, saved.schema.clone(), saved.properties.clone()) {
                Ok(handle) => {
                    entries.insert(
                        saved.graph_id.clone(),
                        GraphEntry {
                            graph_id: saved.graph_id,
                            handle,
                            schema: saved.schema,
                            access: saved.access,
                        },
                    );
                    restored += 1;
                }
                Err(e) => tracing::warn!("Failed to restore graph {}: {}", graph_id, e),
            }
        }
        if restored > 0 {
            self.bump();
        }
        tracing::info!("Restored {} graphs from cache", restored);
        Ok(restored)
    }

    /// Removes a graph the user may write. Missing or invisible graphs
    /// report `false`.
    pub async fn remove(&self, graph_id: &str, user: &User) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get(graph_id) else {
            return Ok(false);
        };
        if !entry.access.has_read_access(user, self.admin_auth()) {
            return Ok(false);
        }
        if !entry.access.has_write_access(user, self.admin_auth()) {
            return Err(GraphError::AccessDenied(format!(
                "user {} cannot remove graph {}",
                user.user_id, graph_id
            )));
        }
        self.unpersist(graph_id)?;
        entries.remove(graph_id);
        self.bump();
        tracing::info!("Removed graph {} for user {}", graph_id, user.user_id);
        Ok(true)
    }

    fn writable<'a>(
        &self,
        entries: &'a BTreeMap<String, GraphEntry>,
        graph_id: &str,
        user: &User,
    ) -> Result<&'a GraphEntry> {
        let entry = entries
            .get(graph_id)
            .filter(|e| e.access.has_read_access(user, self.admin_auth()))
            .ok_or_else(|| not_visible(&[graph_id.to_string()]))?;
        if !entry.access.has_write_access(user, self.admin_auth()) {
            return Err(GraphError::AccessDenied(format!(
                "user {} cannot modify graph {}",
                user.user_id, graph_id
            )));
        }
        Ok(entry)
    }

    /// Replaces the access record of a graph the user may write.
    pub async fn change_access(&self, graph_id: &str, access: FederatedAccess, user: &User) -> Result<()> {
        self.modify_access(graph_id, user, |_| access).await
    }

    /// Derives a new access record from the current one under the write lock.
    pub async fn modify_access<F>(&self, graph_id: &str, user: &User, change: F) -> Result<()>
    where
        F: FnOnce(&FederatedAccess) -> FederatedAccess + Send,
    {
        let mut entries = self.entries.write().await;
        let mut updated = self.writable(&entries, graph_id, user)?.clone();
        updated.access = change(&updated.access);
        self.persist(&updated.to_serialisable())?;
        entries.insert(graph_id.to_string(), updated);
        self.bump();
        tracing::info!("Changed access of graph {} for user {}", graph_id, user.user_id);
        Ok(())
    }

    /// Re-keys a graph. The new entry is persisted before the old one is
    /// removed; if removal fails the new entry is withdrawn again.
    pub async fn change_graph_id(&self, graph_id: &str, new_graph_id: &str, user: &User) -> Result<()> {
        let mut entries = self.entries.write().await;
        let mut renamed = self.writable(&entries, graph_id, user)?.clone();
        if entries.contains_key(new_graph_id) {
            return Err(GraphError::AlreadyExists(format!("graph {}", new_graph_id)));
        }
        renamed.graph_id = new_graph_id.to_string();

        self.persist(&renamed.to_serialisable())?;
        if let Err(e) = self.unpersist(graph_id) {
            if let Err(rollback) = self.unpersist(new_graph_id) {
                tracing::warn!("Failed to withdraw graph {} after a failed rename: {}", new_graph_id, rollback);
            }
            return Err(e);
        }
        entries.remove(graph_id);
        entries.insert(new_graph_id.to_string(), renamed);
        self.bump();
        tracing::info!("Renamed graph {} to {}", graph_id, new_graph_id);
        Ok(())
    }

    /// Graphs to run against, in merge order. With no request (or an empty
    /// one), the configured default set or every enabled readable graph;
    /// with a request, exactly those graphs.
    pub async fn visible_graphs(&self, user: &User, requested: Option<&[String]>) -> Result<Vec<GraphEntry>> {
        let requested = requested.filter(|ids| !ids.is_empty());
        let entries = self.entries.read().await;
        let readable = |e: &&GraphEntry| e.access.has_read_access(user, self.admin_auth());
        match requested {
            None if !self.default_graph_ids.is_empty() => Ok(self
                .default_graph_ids
                .iter()
                .filter_map(|id| entries.get(id))
                .filter(readable)
                .cloned()
                .collect()),
            None => Ok(entries
                .values()
                .filter(|e| !e.access.disabled_by_default)
                .filter(readable)
                .cloned()
                .collect()),
            Some(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                let mut missing = Vec::new();
                for id in ids {
                    match entries.get(id).filter(readable) {
                        Some(entry) => found.push(entry.clone()),
                        None => missing.push(id.clone()),
                    }
                }
                if !missing.is_empty() {
                    return Err(not_visible(&missing));
                }
                Ok(found)
            }
        }
    }

    /// Every graph id the user can read, including disabled-by-default ones.
    pub async fn graph_ids(&self, user: &User) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.access.has_read_access(user, self.admin_auth()))
            .map(|e| e.graph_id.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for GraphRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn not_visible(ids: &[String]) -> GraphError {
    GraphError::IllegalArgument(format!(
        "the following graph ids are not visible or do not exist: {:?}",
        ids
    ))
}
