use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Task,
    TaskAssigned,
    Handover,
    Sla,
    Budget,
    Project,
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    Module,
    Release,
    Sprint,
    System,
    DataRefresh,
    Heartbeat,
    #[serde(other)]
    Other,
}

impl NotificationType {
    /// Housekeeping events travel over the push channel but never reach the user.
    pub fn is_housekeeping(self) -> bool {
        matches!(self, NotificationType::DataRefresh | NotificationType::Heartbeat)
    }

    pub fn is_project_lifecycle(self) -> bool {
        matches!(
            self,
            NotificationType::ProjectCreated
                | NotificationType::ProjectUpdated
                | NotificationType::ProjectDeleted
        )
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NotificationType::Task => "task",
            NotificationType::TaskAssigned => "task_assigned",
            NotificationType::Handover => "handover",
            NotificationType::Sla => "sla",
            NotificationType::Budget => "budget",
            NotificationType::Project => "project",
            NotificationType::ProjectCreated => "project_created",
            NotificationType::ProjectUpdated => "project_updated",
            NotificationType::ProjectDeleted => "project_deleted",
            NotificationType::Module => "module",
            NotificationType::Release => "release",
            NotificationType::Sprint => "sprint",
            NotificationType::System => "system",
            NotificationType::DataRefresh => "data_refresh",
            NotificationType::Heartbeat => "heartbeat",
            NotificationType::Other => "other",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(alias = "_id")]
    #[validate(length(min = 1))]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Project,
    Module,
    Release,
    Sprint,
}

/// Where a click on a notification should take the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationTarget {
    pub entity: EntityKind,
    pub id: String,
}

impl NavigationTarget {
    pub fn path(&self) -> String {
        let segment = match self.entity {
            EntityKind::Task => "tasks",
            EntityKind::Project => "projects",
            EntityKind::Module => "modules",
            EntityKind::Release => "releases",
            EntityKind::Sprint => "sprints",
        };
        format!("/{}/{}", segment, self.id)
    }
}

impl NotificationRecord {
    pub fn navigation_target(&self) -> Option<NavigationTarget> {
        let entity = match self.kind {
            NotificationType::Task
            | NotificationType::TaskAssigned
            | NotificationType::Handover
            | NotificationType::Sla => EntityKind::Task,
            NotificationType::Project
            | NotificationType::ProjectCreated
            | NotificationType::ProjectUpdated
            | NotificationType::Budget => EntityKind::Project,
            NotificationType::Module => EntityKind::Module,
            NotificationType::Release => EntityKind::Release,
            NotificationType::Sprint => EntityKind::Sprint,
            // A deleted project has nowhere to go.
            _ => return None,
        };
        let id = self.ref_id.as_ref().filter(|id| !id.is_empty())?;
        Some(NavigationTarget {
            entity,
            id: id.clone(),
        })
    }
}
