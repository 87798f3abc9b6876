use anyhow::{Context, Result};
use aws_examples::storage::S3Store;
use aws_examples::worker::{SqsQueue, Worker};
use aws_examples::{client, conf};
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// The routes served next to the worker.
fn health_routes() -> Router {
    Router::new().route("/health", get(|| async { "ok" }))
}

/// Serve the health endpoint until the listener fails.
async fn listen(addr: String) -> Result<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to listen on {}", &addr))?;
    info!("Listening on {}", &addr);
    axum::serve(listener, health_routes())
        .await
        .with_context(|| format!("HTTP listener on {} failed", &addr))
}

/// Consume S3 event notifications from an SQS queue, printing every
/// notified object and deleting each message once its objects were
/// downloaded.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    let aws_settings = conf::aws()?;
    let worker_settings = conf::worker()?;
    let listener_settings = conf::listener()?;

    let sdk_config = client::sdk_config(&aws_settings).await;
    let queue = SqsQueue::connect(client::sqs(&sdk_config), &worker_settings).await?;
    let store = S3Store::new(client::s3(&sdk_config, &aws_settings));
    let worker = Worker::new(
        Arc::new(queue),
        Arc::new(store),
        worker_settings.channel_capacity,
    );

    // Listen for abort signals
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Couldn't listen for CTRL-C: {:?}", e);
            std::future::pending::<()>().await;
        }
        info!("CTRL-C");
    };

    tokio::select! {
        result = worker.run(shutdown) => result,
        result = listen(listener_settings.listen_addr) => result,
    }
    .map_err(|e| {
        error!("{:?}", e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_answers_ok() {
        let response = health_routes()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let response = health_routes()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
