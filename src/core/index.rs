use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::core::model::{DefTable, DefTableItem, JobData, SimpleFolder, SmartFolder};

/// Order method marking a folder as automatically scheduled.
pub const ORDER_METHOD_SYSTEM: &str = "SYSTEM";
/// Task type of placeholder jobs that never execute anything.
pub const TASK_TYPE_DUMMY: &str = "Dummy";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("unsupported definition item '{tag}'")]
    UnsupportedItem { tag: String },
}

/// Per-server aggregate view of one definition generation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub application_keys: Vec<String>,
    pub sub_application_keys: Vec<String>,
    pub nodes: IndexMap<String, NodeInfo>,
    pub folders: Vec<FolderInfo>,
}

impl ServerInfo {
    fn new(name: String) -> Self {
        Self {
            name,
            application_keys: Vec::new(),
            sub_application_keys: Vec::new(),
            nodes: IndexMap::new(),
            folders: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderInfo {
    pub name: String,
    pub server: String,
    pub is_smart: bool,
    pub order_method: Option<String>,
    pub is_running_automatically: bool,
    pub application: Option<String>,
    pub sub_application: Option<String>,
    pub run_as: Option<String>,
    pub node_id: Option<String>,
    pub jobs: Vec<JobInfo>,
    pub job_application_keys: Vec<String>,
    pub job_sub_application_keys: Vec<String>,
    pub job_node_keys: Vec<String>,
    /// job name → node id
    pub job_node_ids: IndexMap<String, String>,
    /// node id → job names running on it
    pub node_jobs: IndexMap<String, Vec<String>>,
}

impl FolderInfo {
    fn empty(server: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            server: server.to_string(),
            is_smart: false,
            order_method: None,
            is_running_automatically: false,
            application: None,
            sub_application: None,
            run_as: None,
            node_id: None,
            jobs: Vec::new(),
            job_application_keys: Vec::new(),
            job_sub_application_keys: Vec::new(),
            job_node_keys: Vec::new(),
            job_node_ids: IndexMap::new(),
            node_jobs: IndexMap::new(),
        }
    }

    fn from_simple(folder: &SimpleFolder) -> Self {
        let mut info = Self::empty(&folder.data_center, &folder.folder_name);
        info.order_method = folder.order_method.clone();
        info.is_running_automatically =
            folder.order_method.as_deref() == Some(ORDER_METHOD_SYSTEM);
        info
    }

    fn from_smart(folder: &SmartFolder) -> Self {
        let mut info = Self::empty(&folder.data_center, &folder.folder_name);
        info.is_smart = true;
        info.order_method = folder.order_method.clone();
        info.is_running_automatically =
            folder.order_method.as_deref() == Some(ORDER_METHOD_SYSTEM);
        info.application = folder.application.clone();
        info.sub_application = folder.sub_application.clone();
        info.run_as = folder.run_as.clone();
        info.node_id = folder.node_id.clone();

        for job in &folder.jobs {
            let job = JobInfo::from_job(job);
            if let Some(application) = &job.application {
                push_unique(&mut info.job_application_keys, application);
            }
            if let Some(sub_application) = &job.sub_application {
                push_unique(&mut info.job_sub_application_keys, sub_application);
            }
            if let Some(node_id) = &job.node_id {
                push_unique(&mut info.job_node_keys, node_id);
                if let Some(name) = &job.name {
                    info.job_node_ids.insert(name.clone(), node_id.clone());
                    info.node_jobs
                        .entry(node_id.clone())
                        .or_default()
                        .push(name.clone());
                }
            }
            info.jobs.push(job);
        }
        info
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub name: Option<String>,
    pub mem_name: Option<String>,
    pub node_id: Option<String>,
    pub application: Option<String>,
    pub sub_application: Option<String>,
    pub group: Option<String>,
    pub description: Option<String>,
    pub days: Option<String>,
    pub is_running_automatically: bool,
    pub task_type: Option<String>,
    pub is_dummy: bool,
    pub variables: Vec<(Option<String>, Option<String>)>,
}

impl JobInfo {
    fn from_job(job: &JobData) -> Self {
        Self {
            name: job.job_name.clone(),
            mem_name: job.mem_name.clone(),
            node_id: job.node_id.clone(),
            application: job.application.clone(),
            sub_application: job.sub_application.clone(),
            group: job.group.clone(),
            description: job.description.clone(),
            days: job.days.clone(),
            is_running_automatically: job.days.is_some(),
            task_type: job.task_type.clone(),
            is_dummy: job.task_type.as_deref() == Some(TASK_TYPE_DUMMY),
            variables: job
                .variables
                .iter()
                .map(|var| (var.name.clone(), var.value.clone()))
                .collect(),
        }
    }
}

/// An execution host referenced by folders/jobs on one server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeInfo {
    pub group: Option<String>,
    pub folders: Vec<String>,
    pub jobs: Vec<String>,
}

impl NodeInfo {
    fn record_folder(&mut self, folder_name: &str) {
        push_unique(&mut self.folders, folder_name);
    }

    fn record_job(&mut self, folder_name: &str, job_name: &str) {
        let key = format!("{folder_name}/{job_name}");
        push_unique(&mut self.jobs, &key);
    }
}

/// Builds the per-server aggregates for one generation. All-or-nothing: a
/// single unsupported item fails the whole pass rather than producing a
/// partially populated snapshot.
pub fn build_server_infos(
    table: &DefTable,
) -> Result<IndexMap<String, ServerInfo>, IndexError> {
    let mut servers: IndexMap<String, ServerInfo> = IndexMap::new();
    for item in &table.items {
        match item {
            DefTableItem::Plain(item) => {
                return Err(IndexError::UnsupportedItem {
                    tag: item.tag.clone(),
                });
            }
            DefTableItem::Simple(folder) => {
                index_folder(&mut servers, FolderInfo::from_simple(folder));
            }
            DefTableItem::Smart(folder) => {
                index_folder(&mut servers, FolderInfo::from_smart(folder));
            }
        }
    }
    Ok(servers)
}

fn index_folder(servers: &mut IndexMap<String, ServerInfo>, folder: FolderInfo) {
    let server = servers
        .entry(folder.server.clone())
        .or_insert_with(|| ServerInfo::new(folder.server.clone()));

    if let Some(application) = &folder.application {
        push_unique(&mut server.application_keys, application);
    }
    if let Some(sub_application) = &folder.sub_application {
        push_unique(&mut server.sub_application_keys, sub_application);
    }
    for application in &folder.job_application_keys {
        push_unique(&mut server.application_keys, application);
    }
    for sub_application in &folder.job_sub_application_keys {
        push_unique(&mut server.sub_application_keys, sub_application);
    }

    for job in &folder.jobs {
        if let Some(node_id) = &job.node_id {
            let node = server.nodes.entry(node_id.clone()).or_default();
            node.record_folder(&folder.name);
            if let Some(job_name) = &job.name {
                node.record_job(&folder.name, job_name);
            }
        }
    }

    server.folders.push(folder);
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::PlainItem;

    fn smart(server: &str, name: &str) -> SmartFolder {
        SmartFolder {
            data_center: server.to_string(),
            folder_name: name.to_string(),
            ..SmartFolder::default()
        }
    }

    fn job(name: &str, node_id: Option<&str>, application: Option<&str>) -> JobData {
        JobData {
            job_name: Some(name.to_string()),
            node_id: node_id.map(str::to_string),
            application: application.map(str::to_string),
            ..JobData::default()
        }
    }

    #[test]
    fn indexes_one_server_with_folder_job_and_node() {
        let mut folder = smart("S1", "F");
        folder.order_method = Some(ORDER_METHOD_SYSTEM.to_string());
        folder.application = Some("A1".to_string());
        folder.jobs.push(job("J", Some("N1"), None));
        let table = DefTable {
            items: vec![DefTableItem::Smart(folder)],
        };

        let servers = build_server_infos(&table).unwrap();
        assert_eq!(servers.keys().collect::<Vec<_>>(), vec!["S1"]);

        let server = &servers["S1"];
        assert_eq!(server.application_keys, vec!["A1"]);
        assert_eq!(server.nodes.keys().collect::<Vec<_>>(), vec!["N1"]);
        assert_eq!(server.folders.len(), 1);

        let indexed = &server.folders[0];
        assert!(indexed.is_running_automatically);
        assert_eq!(indexed.job_node_keys, vec!["N1"]);
        assert_eq!(indexed.job_node_ids["J"], "N1");
        assert_eq!(indexed.node_jobs["N1"], vec!["J"]);

        let node = &server.nodes["N1"];
        assert_eq!(node.folders, vec!["F"]);
        assert_eq!(node.jobs, vec!["F/J"]);
    }

    #[test]
    fn plain_item_fails_the_whole_pass() {
        let table = DefTable {
            items: vec![
                DefTableItem::Smart(smart("S1", "F")),
                DefTableItem::Plain(PlainItem {
                    tag: "SCHED_TABLE".to_string(),
                }),
            ],
        };
        let err = build_server_infos(&table).unwrap_err();
        assert!(err.to_string().contains("SCHED_TABLE"));
    }

    #[test]
    fn jobs_without_node_or_application_are_omitted_not_errors() {
        let mut folder = smart("S1", "F");
        folder.jobs.push(job("J1", None, None));
        folder.jobs.push(job("J2", Some("N1"), Some("A1")));
        let table = DefTable {
            items: vec![DefTableItem::Smart(folder)],
        };

        let servers = build_server_infos(&table).unwrap();
        let server = &servers["S1"];
        assert_eq!(server.nodes.keys().collect::<Vec<_>>(), vec!["N1"]);
        assert_eq!(server.application_keys, vec!["A1"]);
        // both jobs are still part of the folder itself
        assert_eq!(server.folders[0].jobs.len(), 2);
    }

    #[test]
    fn key_sets_keep_first_seen_order_and_deduplicate() {
        let mut first = smart("S1", "F1");
        first.application = Some("B".to_string());
        first.jobs.push(job("J1", Some("N1"), Some("A")));
        let mut second = smart("S1", "F2");
        second.application = Some("A".to_string());
        second.jobs.push(job("J2", Some("N1"), Some("B")));
        let table = DefTable {
            items: vec![DefTableItem::Smart(first), DefTableItem::Smart(second)],
        };

        let servers = build_server_infos(&table).unwrap();
        let server = &servers["S1"];
        assert_eq!(server.application_keys, vec!["B", "A"]);
        // N1 is shared: both folders recorded against it, in input order
        assert_eq!(server.nodes["N1"].folders, vec!["F1", "F2"]);
        assert_eq!(server.nodes["N1"].jobs, vec!["F1/J1", "F2/J2"]);
    }

    #[test]
    fn simple_folders_index_without_smart_metadata() {
        let table = DefTable {
            items: vec![DefTableItem::Simple(SimpleFolder {
                data_center: "S1".to_string(),
                folder_name: "PLAIN".to_string(),
                order_method: None,
            })],
        };
        let servers = build_server_infos(&table).unwrap();
        let server = &servers["S1"];
        assert!(server.application_keys.is_empty());
        assert!(server.nodes.is_empty());
        assert_eq!(server.folders[0].name, "PLAIN");
        assert!(!server.folders[0].is_smart);
        assert!(!server.folders[0].is_running_automatically);
    }

    #[test]
    fn dummy_and_automatic_flags_derive_from_task_type_and_days() {
        let mut folder = smart("S1", "F");
        folder.jobs.push(JobData {
            job_name: Some("J".to_string()),
            days: Some("ALL".to_string()),
            task_type: Some(TASK_TYPE_DUMMY.to_string()),
            ..JobData::default()
        });
        folder.jobs.push(JobData {
            job_name: Some("K".to_string()),
            task_type: Some("Command".to_string()),
            ..JobData::default()
        });
        let table = DefTable {
            items: vec![DefTableItem::Smart(folder)],
        };

        let servers = build_server_infos(&table).unwrap();
        let jobs = &servers["S1"].folders[0].jobs;
        assert!(jobs[0].is_running_automatically);
        assert!(jobs[0].is_dummy);
        assert!(!jobs[1].is_running_automatically);
        assert!(!jobs[1].is_dummy);
    }
}
