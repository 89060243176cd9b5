use serde::Serialize;

/// A parsed definition export: the flat list of top-level table items.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DefTable {
    pub items: Vec<DefTableItem>,
}

/// Top-level item of a definition table. The set is closed on purpose:
/// downstream passes match exhaustively instead of probing for attributes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum DefTableItem {
    Plain(PlainItem),
    Simple(SimpleFolder),
    Smart(SmartFolder),
}

impl DefTableItem {
    pub fn is_smart(&self) -> bool {
        matches!(self, DefTableItem::Smart(_))
    }
}

/// A recognized but non-folder table item. Nothing downstream can index it.
#[derive(Debug, Clone, Serialize)]
pub struct PlainItem {
    pub tag: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimpleFolder {
    pub data_center: String,
    pub folder_name: String,
    pub order_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SmartFolder {
    pub data_center: String,
    pub folder_name: String,
    pub order_method: Option<String>,
    pub description: Option<String>,
    pub application: Option<String>,
    pub sub_application: Option<String>,
    pub mem_name: Option<String>,
    pub job_name: Option<String>,
    pub node_id: Option<String>,
    pub priority: Option<String>,
    pub cyclic: Option<String>,
    pub run_as: Option<String>,
    pub owner: Option<String>,
    pub author: Option<String>,
    pub created_by: Option<String>,
    pub variables: Vec<VarData>,
    pub jobs: Vec<JobData>,
}

/// One job inside a smart folder. The export carries far more attributes
/// than these; only the scheduling-relevant subset is retained.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobData {
    pub job_name: Option<String>,
    pub mem_name: Option<String>,
    pub node_id: Option<String>,
    pub application: Option<String>,
    pub sub_application: Option<String>,
    pub group: Option<String>,
    pub description: Option<String>,
    pub task_type: Option<String>,
    pub days: Option<String>,
    pub weekdays: Option<String>,
    pub run_as: Option<String>,
    pub owner: Option<String>,
    pub priority: Option<String>,
    pub critical: Option<String>,
    pub cyclic: Option<String>,
    pub time_from: Option<String>,
    pub time_to: Option<String>,
    pub created_by: Option<String>,
    pub variables: Vec<VarData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VarData {
    pub name: Option<String>,
    pub value: Option<String>,
}
