use std::{future::IntoFuture, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{camera::CameraStatus, service::SnapshotService, snapshot::SnapshotError};

pub fn router(service: Arc<SnapshotService>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/{file}", get(snapshot))
        .with_state(service)
}

/// Serves until `cancel` fires, then gives open connections `grace` to
/// finish before the task returns without them.
pub(crate) fn start_api_server(
    listener: TcpListener,
    service: Arc<SnapshotService>,
    cancel: CancellationToken,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(service);
        match listener.local_addr() {
            Ok(addr) => log::info!("API server listening on {}", addr),
            Err(e) => log::warn!("API server address unknown: {}", e),
        }
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel.clone()))
            .into_future();
        tokio::pin!(serve);

        let result = tokio::select! {
            result = &mut serve => result,
            _ = cancel.cancelled() => match tokio::time::timeout(grace, &mut serve).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!("API server connections still open after {:?}, closing", grace);
                    Ok(())
                }
            },
        };
        if let Err(e) = result {
            log::error!("Error running API server: {}", e);
        }
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Shutting down API server...");
}

async fn snapshot(
    State(service): State<Arc<SnapshotService>>,
    Path(file): Path<String>,
) -> Result<Response, SnapshotError> {
    let Some(name) = file.strip_suffix(".jpg") else {
        return Err(SnapshotError::NotFound(file));
    };
    let bytes = service.get_snapshot(name).await?;
    Ok((
        [
            (header::CONTENT_TYPE, service.content_type()),
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    )
        .into_response())
}

async fn status(State(service): State<Arc<SnapshotService>>) -> Json<Vec<CameraStatus>> {
    Json(service.status())
}

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;
