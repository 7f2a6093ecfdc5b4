//! Liveness and readiness probes.

use crate::services::upload_service::UploadService;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
pub struct Liveness {
    status: &'static str,
}

#[derive(Serialize)]
pub struct Readiness {
    status: &'static str,
    checks: BTreeMap<&'static str, Probe>,
}

#[derive(Serialize)]
pub struct Probe {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<E: ToString> From<Result<(), E>> for Probe {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Probe {
                ok: true,
                error: None,
            },
            Err(e) => Probe {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// `GET /healthz`: never touches the database or disk.
pub async fn healthz() -> Json<Liveness> {
    Json(Liveness { status: "ok" })
}

/// `GET /readyz`: 200 when SQLite answers and the block store can round-trip
/// a probe file, 503 otherwise.
pub async fn readyz(State(service): State<UploadService>) -> (StatusCode, Json<Readiness>) {
    let sqlite = async {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*service.db)
            .await
            .map(|_| ())
    };
    let (sqlite, storage) = tokio::join!(sqlite, service.store.probe());

    let checks = BTreeMap::from([
        ("sqlite", Probe::from(sqlite)),
        ("storage", Probe::from(storage)),
    ]);
    let ready = checks.values().all(|probe| probe.ok);
    if !ready {
        tracing::warn!("readiness check failed");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(Readiness {
            status: if ready { "ok" } else { "unavailable" },
            checks,
        }),
    )
}
