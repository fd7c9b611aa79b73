use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_server::tls_rustls::RustlsConfig;
use serde_json::json;

use crate::core::{CreateTodo, Todo, TodoError, TodoService, UpdateTodo};
use crate::storage::TableStore;

#[cfg(feature = "tracing")]
use tracing::info;

impl IntoResponse for TodoError {
    fn into_response(self) -> Response {
        let status = match &self {
            TodoError::Validation(_) => StatusCode::BAD_REQUEST,
            TodoError::NotFound(_) => StatusCode::NOT_FOUND,
            TodoError::Conflict(_) => StatusCode::CONFLICT,
            TodoError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub struct HttpApi<S: TableStore + Send + Sync + 'static> {
    service: Arc<TodoService<S>>,
}

impl<S: TableStore + Send + Sync + 'static> HttpApi<S> {
    pub fn new(service: TodoService<S>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/todo", get(list_todos::<S>).post(create_todo::<S>))
            .route(
                "/todo/{id}",
                get(get_todo::<S>)
                    .put(update_todo::<S>)
                    .delete(delete_todo::<S>),
            )
            .with_state(self.service.clone())
    }

    pub async fn serve(&self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        #[cfg(feature = "tracing")]
        info!(addr = %addr, "HTTP server started");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    pub async fn serve_tls(
        &self,
        addr: SocketAddr,
        cert_path: PathBuf,
        key_path: PathBuf,
    ) -> anyhow::Result<()> {
        let config = RustlsConfig::from_pem_file(cert_path, key_path).await?;
        #[cfg(feature = "tracing")]
        info!(addr = %addr, "HTTPS server started");
        axum_server::bind_rustls(addr, config)
            .serve(self.router().into_make_service())
            .await?;
        Ok(())
    }
}

async fn create_todo<S: TableStore + Send + Sync + 'static>(
    State(service): State<Arc<TodoService<S>>>,
    payload: Result<Json<CreateTodo>, JsonRejection>,
) -> Result<Json<Todo>, TodoError> {
    #[cfg(feature = "tracing")]
    info!("Create a todo");
    let Json(input) = payload.map_err(|e| TodoError::Validation(e.body_text()))?;
    let todo = service.create(input).await?;
    Ok(Json(todo))
}

async fn list_todos<S: TableStore + Send + Sync + 'static>(
    State(service): State<Arc<TodoService<S>>>,
) -> Result<Json<Vec<Todo>>, TodoError> {
    #[cfg(feature = "tracing")]
    info!("Getting todos");
    let todos = service.list().await?;
    Ok(Json(todos))
}

async fn get_todo<S: TableStore + Send + Sync + 'static>(
    State(service): State<Arc<TodoService<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, TodoError> {
    #[cfg(feature = "tracing")]
    info!(id = %id, "Getting todo by id");
    service.get(&id).await.map(Json)
}

async fn update_todo<S: TableStore + Send + Sync + 'static>(
    State(service): State<Arc<TodoService<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTodo>, JsonRejection>,
) -> Result<Json<Todo>, TodoError> {
    #[cfg(feature = "tracing")]
    info!(id = %id, "Updating todo");
    let Json(patch) = payload.map_err(|e| TodoError::Validation(e.body_text()))?;
    service.update(&id, patch).await.map(Json)
}

async fn delete_todo<S: TableStore + Send + Sync + 'static>(
    State(service): State<Arc<TodoService<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, TodoError> {
    #[cfg(feature = "tracing")]
    info!(id = %id, "Deleting todo");
    service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
