use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::core::index::{FolderInfo, NodeInfo, ORDER_METHOD_SYSTEM, ServerInfo};
use crate::core::manager::{CacheManager, ServerInfoMap};

/// Lookup misses, raised only by the `_or_die` accessors. The HTTP layer
/// turns these into 404 responses; they are never written into the cache.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("server '{0}' not found")]
    ServerNotFound(String),
    #[error("folder '{folder}' not found on server '{server}'")]
    FolderNotFound { server: String, folder: String },
    #[error("node '{node}' not found on server '{server}'")]
    NodeNotFound { server: String, node: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStats {
    pub active_count: usize,
    pub active: Vec<String>,
    pub disabled_count: usize,
    pub disabled: Vec<String>,
}

/// Read-only query facade over the manager's latest published generation.
/// Never mutates cached state.
#[derive(Clone)]
pub struct Repository {
    manager: CacheManager,
}

impl Repository {
    pub fn new(manager: CacheManager) -> Self {
        Self { manager }
    }

    fn snapshot(&self) -> Arc<ServerInfoMap> {
        self.manager.cached_server_infos()
    }

    pub fn server_names(&self) -> Vec<String> {
        self.manager.cached_server_names()
    }

    pub fn server_info(&self, server: &str) -> Option<ServerInfo> {
        self.snapshot().get(server).cloned()
    }

    pub fn server_info_or_die(&self, server: &str) -> Result<ServerInfo, RepositoryError> {
        self.server_info(server)
            .ok_or_else(|| RepositoryError::ServerNotFound(server.to_string()))
    }

    /// Folder list for a server, optionally narrowed. Filters intersect:
    /// each one runs over the previous filter's output.
    ///
    /// `order_methods` is a membership filter where a `None` entry matches
    /// folders with no order method at all. `node_ids` keeps folders whose
    /// own node id matches or whose jobs run on one of the given nodes.
    pub fn folders(
        &self,
        server: &str,
        order_methods: Option<&[Option<String>]>,
        node_ids: Option<&[String]>,
    ) -> Result<Vec<FolderInfo>, RepositoryError> {
        let snapshot = self.snapshot();
        let info = snapshot
            .get(server)
            .ok_or_else(|| RepositoryError::ServerNotFound(server.to_string()))?;

        let mut kept: Vec<&FolderInfo> = info.folders.iter().collect();
        if let Some(order_methods) = order_methods {
            kept.retain(|folder| {
                order_methods
                    .iter()
                    .any(|method| method.as_deref() == folder.order_method.as_deref())
            });
        }
        if let Some(node_ids) = node_ids {
            kept.retain(|folder| {
                folder
                    .node_id
                    .as_ref()
                    .is_some_and(|node_id| node_ids.contains(node_id))
                    || folder
                        .job_node_keys
                        .iter()
                        .any(|node_id| node_ids.contains(node_id))
            });
        }
        Ok(kept.into_iter().cloned().collect())
    }

    pub fn folder(&self, server: &str, folder: &str) -> Option<FolderInfo> {
        let snapshot = self.snapshot();
        let info = snapshot.get(server)?;
        info.folders.iter().find(|f| f.name == folder).cloned()
    }

    pub fn folder_or_die(&self, server: &str, folder: &str) -> Result<FolderInfo, RepositoryError> {
        let info = self.server_info_or_die(server)?;
        info.folders
            .iter()
            .find(|f| f.name == folder)
            .cloned()
            .ok_or_else(|| RepositoryError::FolderNotFound {
                server: server.to_string(),
                folder: folder.to_string(),
            })
    }

    pub fn node_names(&self, server: &str) -> Result<Vec<String>, RepositoryError> {
        let info = self.server_info_or_die(server)?;
        Ok(info.nodes.keys().cloned().collect())
    }

    pub fn node(&self, server: &str, node: &str) -> Option<NodeInfo> {
        let snapshot = self.snapshot();
        snapshot.get(server)?.nodes.get(node).cloned()
    }

    pub fn node_or_die(&self, server: &str, node: &str) -> Result<NodeInfo, RepositoryError> {
        let info = self.server_info_or_die(server)?;
        info.nodes
            .get(node)
            .cloned()
            .ok_or_else(|| RepositoryError::NodeNotFound {
                server: server.to_string(),
                node: node.to_string(),
            })
    }

    /// Active vs disabled folder counts per node, derived from the folder
    /// filters rather than stored.
    pub fn node_stats(
        &self,
        server: &str,
    ) -> Result<IndexMap<String, NodeStats>, RepositoryError> {
        let active_methods = [Some(ORDER_METHOD_SYSTEM.to_string())];
        let disabled_methods = [None];
        let mut stats = IndexMap::new();
        for node in self.node_names(server)? {
            let node_filter = [node.clone()];
            let active = self.folders(server, Some(&active_methods), Some(&node_filter))?;
            let disabled = self.folders(server, Some(&disabled_methods), Some(&node_filter))?;
            stats.insert(
                node,
                NodeStats {
                    active_count: active.len(),
                    active: active.into_iter().map(|folder| folder.name).collect(),
                    disabled_count: disabled.len(),
                    disabled: disabled.into_iter().map(|folder| folder.name).collect(),
                },
            );
        }
        Ok(stats)
    }

}
