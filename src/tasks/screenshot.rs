//! Bookmark screenshots through a Browserless-compatible service.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, instrument};

use crate::config::ScreenshotConfig;
use crate::errors::{StorageError, WorkerError};
use crate::storage::{blocking, SharedStore};

use super::queue::ScreenshotTask;

const SCREENSHOT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct ScreenshotWorker {
    client: reqwest::Client,
    store: SharedStore,
    config: ScreenshotConfig,
}

impl ScreenshotWorker {
    pub fn new(store: SharedStore, config: ScreenshotConfig) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SCREENSHOT_TIMEOUT_SECS))
            .build()
            .map_err(|e| WorkerError::Screenshot(e.to_string()))?;
        Ok(ScreenshotWorker {
            client,
            store,
            config,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.endpoint.is_some()
    }

    /// Capture the page, save it as `<dir>/<bookmark_id>.png` and record the path.
    #[instrument(skip_all, fields(bookmark_id = task.bookmark_id, url = %task.url))]
    pub async fn run(&self, task: ScreenshotTask) -> Result<PathBuf, WorkerError> {
        let endpoint = self
            .config
            .endpoint
            .as_deref()
            .ok_or(WorkerError::ScreenshotDisabled)?;

        let bookmark_id = task.bookmark_id;
        let bookmark = blocking(&self.store, move |s| s.get_bookmark(bookmark_id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("bookmark {bookmark_id}")))?;
        let url = if task.url.is_empty() {
            bookmark.url
        } else {
            task.url
        };

        let mut request_url = format!("{}/screenshot", endpoint.trim_end_matches('/'));
        if let Some(token) = &self.config.token {
            request_url.push_str(&format!("?token={token}"));
        }
        let body = serde_json::json!({
            "url": url,
            "options": { "type": "png", "fullPage": false },
        });

        let response = self
            .client
            .post(&request_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorkerError::Screenshot(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WorkerError::Screenshot(format!(
                "HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }
        let png = response
            .bytes()
            .await
            .map_err(|e| WorkerError::Screenshot(e.to_string()))?;

        tokio::fs::create_dir_all(&self.config.dir).await?;
        let path = self.config.dir.join(format!("{bookmark_id}.png"));
        tokio::fs::write(&path, &png).await?;

        let stored = path.display().to_string();
        blocking(&self.store, move |s| s.set_bookmark_screenshot(bookmark_id, &stored)).await?;
        info!(path = %path.display(), bytes = png.len(), "Saved screenshot");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{bookmark::NewBookmark, user::User};
    use crate::test_helpers::create_test_store;
    use crate::Store;
    use mockito::Matcher;
    use std::sync::Arc;

    fn config(endpoint: Option<String>, dir: PathBuf) -> ScreenshotConfig {
        ScreenshotConfig {
            endpoint,
            token: Some("secret".to_string()),
            dir,
        }
    }

    #[tokio::test]
    async fn test_disabled_without_endpoint() {
        let (dir, store) = create_test_store();
        let worker =
            ScreenshotWorker::new(Arc::new(store), config(None, dir.path().to_path_buf())).unwrap();
        assert!(!worker.is_enabled());

        let result = worker
            .run(ScreenshotTask {
                bookmark_id: 1,
                url: "https://example.com".to_string(),
            })
            .await;
        assert!(matches!(result, Err(WorkerError::ScreenshotDisabled)));
    }

    #[tokio::test]
    async fn test_captures_and_records_screenshot() {
        let (dir, store) = create_test_store();
        let bookmark = {
            let mut conn = store.conn().unwrap();
            let user = User::create(&mut conn, "a@example.com").unwrap();
            NewBookmark::new(user.id, "https://example.com/page", "Page")
                .insert(&mut conn)
                .unwrap()
        };

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/screenshot")
            .match_query(Matcher::UrlEncoded("token".into(), "secret".into()))
            .match_body(Matcher::PartialJson(serde_json::json!({
                "url": "https://example.com/page",
                "options": { "type": "png" },
            })))
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(b"\x89PNG fake".to_vec())
            .create_async()
            .await;

        let shots = dir.path().join("shots");
        let store = Arc::new(store);
        let settings = config(Some(server.url()), shots.clone());
        let worker = ScreenshotWorker::new(store.clone(), settings).unwrap();
        let path = worker
            .run(ScreenshotTask {
                bookmark_id: bookmark.id,
                url: String::new(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(path, shots.join(format!("{}.png", bookmark.id)));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG fake");

        let updated = store.get_bookmark(bookmark.id).unwrap().unwrap();
        assert_eq!(updated.screenshot, Some(path.display().to_string()));
    }

    #[tokio::test]
    async fn test_service_error() {
        let (dir, store) = create_test_store();
        let bookmark = {
            let mut conn = store.conn().unwrap();
            let user = User::create(&mut conn, "a@example.com").unwrap();
            NewBookmark::new(user.id, "https://example.com/page", "Page")
                .insert(&mut conn)
                .unwrap()
        };
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/screenshot")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("browser crashed")
            .create_async()
            .await;

        let settings = config(Some(server.url()), dir.path().to_path_buf());
        let worker = ScreenshotWorker::new(Arc::new(store), settings).unwrap();
        let result = worker
            .run(ScreenshotTask {
                bookmark_id: bookmark.id,
                url: "https://example.com/page".to_string(),
            })
            .await;
        assert!(matches!(result, Err(WorkerError::Screenshot(m)) if m.contains("500")));
    }
}
