use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::TaskApi;
use crate::config::{Config, DEFAULT_API_URL};
use crate::error::{AppError, Result};
use crate::models::{Board, CreateBoardColumnRequest, CreateBoardColumnResponse, CreateTaskRequest, Task};

/// Envelope wrapped around every Task API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error_message: Option<String>,
}

/// JSON-over-HTTP client for the Task API.
#[derive(Clone)]
pub struct HttpTaskApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskApi {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(Some(config.api_url.clone()), config.timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn envelope<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<Option<T>> {
        let response: reqwest::Response = request
            .send()
            .await
            .map_err(|e| AppError::Network(format!("{} request failed: {}", action, e)))?;

        let status = response.status();
        let body: String = response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("{} response unreadable: {}", action, e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                .ok()
                .and_then(|r| r.error_message)
                .unwrap_or(body);
            return Err(AppError::Api {
                status: status.as_u16(),
                message: format!("{} failed: {}", action, message),
            });
        }

        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            AppError::Network(format!("Failed to parse {} response: {}", action, e))
        })?;

        if !parsed.success {
            return Err(AppError::Api {
                status: status.as_u16(),
                message: format!(
                    "{} failed: {}",
                    action,
                    parsed.error_message.unwrap_or_else(|| "Unknown error".to_string())
                ),
            });
        }

        Ok(parsed.data)
    }

    async fn data<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<T> {
        self.envelope(request, action).await?.ok_or_else(|| AppError::Api {
            status: 200,
            message: format!("{} returned no data", action),
        })
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn create_task(&self, request: CreateTaskRequest) -> Result<Task> {
        debug!("Creating task {:?} on board {}", request.title, request.board_id);
        self.data(self.client.post(self.url("/tasks")).json(&request), "Create task")
            .await
    }

    async fn update_tasks(&self, tasks: &[Task]) -> Result<Vec<Task>> {
        debug!(
            "Updating {} task(s): {:?}",
            tasks.len(),
            tasks.iter().map(|t| t.id).collect::<Vec<_>>()
        );
        self.data(self.client.put(self.url("/tasks")).json(tasks), "Update tasks")
            .await
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        debug!("Deleting task {}", task_id);
        self.envelope::<serde_json::Value>(
            self.client.delete(self.url(&format!("/tasks/{}", task_id))),
            "Delete task",
        )
        .await?;
        Ok(())
    }

    async fn get_tasks_by_board_id(&self, board_id: Uuid) -> Result<Vec<Task>> {
        debug!("Getting tasks for board {}", board_id);
        self.data(
            self.client.get(self.url(&format!("/boards/{}/tasks", board_id))),
            "Get board tasks",
        )
        .await
    }

    async fn get_board(&self, board_id: Uuid) -> Result<Board> {
        self.data(
            self.client.get(self.url(&format!("/boards/{}", board_id))),
            "Get board",
        )
        .await
    }

    async fn update_board(&self, board: &Board) -> Result<Board> {
        debug!("Updating board {}", board.id);
        self.data(self.client.put(self.url("/boards")).json(board), "Update board")
            .await
    }

    async fn create_board_column(
        &self,
        board_id: Uuid,
        request: CreateBoardColumnRequest,
    ) -> Result<CreateBoardColumnResponse> {
        debug!("Creating column {:?} on board {}", request.title, board_id);
        self.data(
            self.client
                .post(self.url(&format!("/boards/{}/columns", board_id)))
                .json(&request),
            "Create board column",
        )
        .await
    }

    async fn delete_board_column(&self, board_id: Uuid, column_id: Uuid) -> Result<Board> {
        debug!("Deleting column {} of board {}", column_id, board_id);
        self.data(
            self.client
                .delete(self.url(&format!("/boards/{}/columns/{}", board_id, column_id))),
            "Delete board column",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let api = HttpTaskApi::new(
            Some("http://kanban.local/api/".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(api.base_url(), "http://kanban.local/api");
        assert_eq!(api.url("/tasks"), "http://kanban.local/api/tasks");
    }

    #[test]
    fn test_default_base_url() {
        let api = HttpTaskApi::new(None, Duration::from_secs(1)).unwrap();
        assert_eq!(api.base_url(), DEFAULT_API_URL);
    }
}
