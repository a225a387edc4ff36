// src/store.rs
//! Durable keyed storage for project documents.
//!
//! Every write goes through [`ProjectStore::replace_if_current`], a
//! compare-and-swap on the document's `version` counter. There is no
//! unconditional whole-document overwrite.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::StreamExt;
use mongodb::bson::{doc, Document};
use mongodb::Collection;
use serde::Deserialize;

use crate::db::MongoDB;
use crate::error::{AppError, AppResult};
use crate::models::{Project, ProjectStatus};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub client_id: Option<String>,
}

impl ProjectFilter {
    fn matches(&self, project: &Project) -> bool {
        self.status.map_or(true, |s| project.status == s)
            && self
                .client_id
                .as_deref()
                .map_or(true, |c| project.client_id == c)
    }

    fn to_document(&self) -> Document {
        let mut filter = doc! {};
        if let Some(status) = self.status {
            filter.insert("status", status.as_str());
        }
        if let Some(client_id) = &self.client_id {
            filter.insert("clientId", client_id.as_str());
        }
        filter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The write landed; the document now carries `version`.
    Committed { version: i64 },
    /// Someone else committed first. `None` when the document is gone.
    Stale { current_version: Option<i64> },
}

#[async_trait]
pub trait ProjectStore: Send + Sync + 'static {
    /// Stores a brand-new project; its `version` must be 0.
    async fn insert(&self, project: &Project) -> AppResult<()>;

    async fn get(&self, id: &str) -> AppResult<Option<Project>>;

    /// Newest first.
    async fn list(&self, filter: &ProjectFilter) -> AppResult<Vec<Project>>;

    /// Writes `project` only if the stored version still equals
    /// `project.version`; the stored copy gets `project.version + 1`.
    async fn replace_if_current(&self, project: &Project) -> AppResult<CommitOutcome>;

    /// Removes the project only if the stored version still equals `version`.
    /// Returns whether a document was removed.
    async fn delete_if_current(&self, id: &str, version: i64) -> AppResult<bool>;
}

/// In-process store with the same CAS semantics as the Mongo one.
#[derive(Debug, Default, Clone)]
pub struct MemoryProjectStore {
    projects: Arc<RwLock<HashMap<String, Project>>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> AppError {
    AppError::storage("lock poisoned")
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn insert(&self, project: &Project) -> AppResult<()> {
        let mut projects = self.projects.write().map_err(poisoned)?;
        if projects.contains_key(&project.id) {
            return Err(AppError::duplicate(format!(
                "Project {} already exists.",
                project.id
            )));
        }
        projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<Project>> {
        let projects = self.projects.read().map_err(poisoned)?;
        Ok(projects.get(id).cloned())
    }

    async fn list(&self, filter: &ProjectFilter) -> AppResult<Vec<Project>> {
        let projects = self.projects.read().map_err(poisoned)?;
        let mut matching: Vec<Project> = projects
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn replace_if_current(&self, project: &Project) -> AppResult<CommitOutcome> {
        let mut projects = self.projects.write().map_err(poisoned)?;
        let stored = match projects.get_mut(&project.id) {
            Some(stored) => stored,
            None => return Ok(CommitOutcome::Stale { current_version: None }),
        };
        if stored.version != project.version {
            return Ok(CommitOutcome::Stale {
                current_version: Some(stored.version),
            });
        }
        let mut next = project.clone();
        next.version = project.version + 1;
        let version = next.version;
        *stored = next;
        Ok(CommitOutcome::Committed { version })
    }

    async fn delete_if_current(&self, id: &str, version: i64) -> AppResult<bool> {
        let mut projects = self.projects.write().map_err(poisoned)?;
        if projects.get(id).map(|p| p.version) != Some(version) {
            return Ok(false);
        }
        Ok(projects.remove(id).is_some())
    }
}

pub struct MongoProjectStore {
    projects: Collection<Project>,
}

impl MongoProjectStore {
    pub fn new(mongodb: &MongoDB) -> Self {
        MongoProjectStore {
            projects: mongodb.db.collection::<Project>("projects"),
        }
    }
}

#[async_trait]
impl ProjectStore for MongoProjectStore {
    async fn insert(&self, project: &Project) -> AppResult<()> {
        self.projects.insert_one(project).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<Project>> {
        Ok(self.projects.find_one(doc! { "_id": id }).await?)
    }

    async fn list(&self, filter: &ProjectFilter) -> AppResult<Vec<Project>> {
        let mut cursor = self
            .projects
            .find(filter.to_document())
            .sort(doc! { "createdAt": -1 })
            .await?;
        let mut projects = Vec::new();
        while let Some(res) = cursor.next().await {
            projects.push(res?);
        }
        Ok(projects)
    }

    async fn replace_if_current(&self, project: &Project) -> AppResult<CommitOutcome> {
        let mut next = project.clone();
        next.version = project.version + 1;
        let res = self
            .projects
            .replace_one(doc! { "_id": &project.id, "version": project.version }, &next)
            .await?;
        if res.matched_count == 1 {
            return Ok(CommitOutcome::Committed {
                version: next.version,
            });
        }
        let current_version = self.get(&project.id).await?.map(|p| p.version);
        Ok(CommitOutcome::Stale { current_version })
    }

    async fn delete_if_current(&self, id: &str, version: i64) -> AppResult<bool> {
        let res = self
            .projects
            .delete_one(doc! { "_id": id, "version": version })
            .await?;
        Ok(res.deleted_count == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn project(client: &str) -> Project {
        Project::new(client, "Title", "Description", Utc::now())
    }

    #[tokio::test]
    async fn stale_version_is_refused() {
        let store = MemoryProjectStore::new();
        let original = project("c-1");
        store.insert(&original).await.unwrap();

        let mut first = store.get(&original.id).await.unwrap().unwrap();
        let mut second = first.clone();

        first.progress = 10;
        assert_eq!(
            store.replace_if_current(&first).await.unwrap(),
            CommitOutcome::Committed { version: 1 }
        );

        second.progress = 20;
        assert_eq!(
            store.replace_if_current(&second).await.unwrap(),
            CommitOutcome::Stale {
                current_version: Some(1)
            }
        );
        assert_eq!(store.get(&original.id).await.unwrap().unwrap().progress, 10);
    }

    #[tokio::test]
    async fn delete_is_version_guarded_and_replace_reports_it_gone() {
        let store = MemoryProjectStore::new();
        let original = project("c-1");
        store.insert(&original).await.unwrap();
        assert!(!store.delete_if_current(&original.id, 3).await.unwrap());
        assert!(store.delete_if_current(&original.id, 0).await.unwrap());
        assert!(!store.delete_if_current(&original.id, 0).await.unwrap());
        assert_eq!(
            store.replace_if_current(&original).await.unwrap(),
            CommitOutcome::Stale {
                current_version: None
            }
        );
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let store = MemoryProjectStore::new();
        let mut older = project("c-1");
        older.created_at = Utc::now() - Duration::hours(1);
        let newer = project("c-1");
        let mut other = project("c-2");
        other.status = ProjectStatus::Cancelled;
        for p in [&older, &newer, &other] {
            store.insert(p).await.unwrap();
        }

        let mine = store
            .list(&ProjectFilter {
                client_id: Some("c-1".to_string()),
                ..ProjectFilter::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = mine.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);

        let cancelled = store
            .list(&ProjectFilter {
                status: Some(ProjectStatus::Cancelled),
                ..ProjectFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].client_id, "c-2");
    }

    #[test]
    fn filter_document_uses_stored_field_names() {
        let filter = ProjectFilter {
            status: Some(ProjectStatus::InProgress),
            client_id: Some("c-1".to_string()),
        };
        assert_eq!(
            filter.to_document(),
            doc! { "status": "in_progress", "clientId": "c-1" }
        );
    }
}
