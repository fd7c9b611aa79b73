use std::sync::Arc;

use tabletodo::adapters::HttpApi;
use tabletodo::core::{ServiceConfig, TodoService};
use tabletodo::storage::sqlite::SqliteTable;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let db_path = std::env::var("TODO_DB").unwrap_or_else(|_| "todos.db".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());

    let store = Arc::new(SqliteTable::new(&db_path, 100)?);
    let service = TodoService::new(store, ServiceConfig::default());
    let api = HttpApi::new(service);
    api.serve(&format!("0.0.0.0:{port}")).await?;
    Ok(())
}
