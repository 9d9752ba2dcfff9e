//! Local collaborator adapters.
//!
//! These back the CLI when no real project-management, chat, or
//! language-model service is wired in: tasks and users load from a YAML
//! fixture file, messages print to stdout, and "completions" are a
//! deterministic digest of the prompt. Integration tests use them too.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::{Sprint, Task, User};
use crate::domain::ports::{
    ChatService, CollaboratorError, CompletionParams, LanguageModel, MessagePayload,
    ProjectService, TaskPatch,
};

/// On-disk fixture shape for `FixtureProjectService`.
#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub sprints: Vec<Sprint>,
}

/// Project-management collaborator reading from a YAML fixture.
///
/// `update_task` mutates the in-memory copy so a CLI session behaves
/// coherently, but nothing is written back to disk.
pub struct FixtureProjectService {
    state: Mutex<Fixture>,
}

impl FixtureProjectService {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            state: Mutex::new(fixture),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let fixture: Fixture = serde_yaml::from_str(&raw)?;
        Ok(Self::new(fixture))
    }
}

#[async_trait]
impl ProjectService for FixtureProjectService {
    async fn fetch_tasks(
        &self,
        _team_id: Uuid,
        sprint_id: Option<Uuid>,
    ) -> Result<Vec<Task>, CollaboratorError> {
        let state = self.state.lock().await;
        let tasks = state
            .tasks
            .iter()
            .filter(|t| sprint_id.is_none() || t.sprint_id == sprint_id)
            .cloned()
            .collect();
        Ok(tasks)
    }

    async fn fetch_users(&self, _team_id: Uuid) -> Result<Vec<User>, CollaboratorError> {
        Ok(self.state.lock().await.users.clone())
    }

    async fn fetch_active_sprint(
        &self,
        team_id: Uuid,
    ) -> Result<Option<Sprint>, CollaboratorError> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(state
            .sprints
            .iter()
            .find(|s| s.team_id == team_id && s.is_active(now))
            .cloned())
    }

    async fn update_task(
        &self,
        task_id: Uuid,
        patch: TaskPatch,
    ) -> Result<Task, CollaboratorError> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("task {task_id}")))?;

        if let Some(assignee) = patch.assignee {
            task.assignee = Some(assignee);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

/// Chat collaborator that prints messages to stdout.
#[derive(Debug, Default)]
pub struct ConsoleChatService;

#[async_trait]
impl ChatService for ConsoleChatService {
    async fn post_message(
        &self,
        channel: &str,
        payload: MessagePayload,
    ) -> Result<String, CollaboratorError> {
        println!("[{channel}] {}", payload.text);
        for block in &payload.blocks {
            println!("[{channel}]   {block}");
        }
        Ok(Uuid::new_v4().to_string())
    }
}

/// Deterministic stand-in for the language-model service.
///
/// Summarizes the prompt instead of calling out anywhere, so CLI runs
/// are reproducible and offline.
#[derive(Debug, Default)]
pub struct StaticLanguageModel;

#[async_trait]
impl LanguageModel for StaticLanguageModel {
    async fn complete(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<String, CollaboratorError> {
        let lines = prompt.lines().count();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for word in prompt.split_whitespace().take(200) {
            *counts.entry(word).or_insert(0) += 1;
        }
        let top: Vec<&str> = counts
            .iter()
            .filter(|(_, &n)| n > 1)
            .map(|(&w, _)| w)
            .take(5)
            .collect();
        Ok(format!(
            "[{} summary] {} lines of context; recurring terms: {}",
            params.model,
            lines,
            if top.is_empty() { "none".to_string() } else { top.join(", ") }
        ))
    }
}
