// Copyright (c) 2026 FnPool Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use prometheus_client::encoding::text::encode;
use serde_json::json;

use crate::common::*;

use super::gpm::Gpm;
use super::metrics::METRICS_REGISTRY;

pub async fn MetricsHandler() -> impl IntoResponse {
    let state = METRICS_REGISTRY.lock().await;
    let mut buffer = String::new();
    encode(&mut buffer, &*state).unwrap();

    Response::builder()
        .status(StatusCode::OK)
        .header(
            CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )
        .body(Body::from(buffer))
        .unwrap()
}

async fn root() -> &'static str {
    "FnPool Pool Manager"
}

async fn Healthz() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn DumpState(State(gpm): State<Gpm>) -> impl IntoResponse {
    (StatusCode::OK, Json(gpm.DumpDebugInfo())).into_response()
}

// function-update hook: drop the cached service and its pods so the
// next invocation picks up the new revision
pub async fn RefreshPods(
    State(gpm): State<Gpm>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let fn_ = match gpm.poolPodC.GetFunc(&namespace, &name) {
        Err(_) => {
            let body = json!({ "error": format!("function {}/{} not found", namespace, name) });
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        }
        Ok(f) => f,
    };

    match gpm.RefreshFuncPods(&fn_).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "refreshed": true }))).into_response(),
        Err(e) => {
            let body = json!({ "error": format!("{:?}", e) });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

pub async fn AdminHttpSrv(gpm: Gpm, port: u16) -> Result<()> {
    let router = Router::new()
        .route("/metrics", get(MetricsHandler))
        .route("/debug/state", get(DumpState))
        .route("/healthz", get(Healthz))
        .route("/v1/refreshpods/:namespace/:name", post(RefreshPods))
        .route("/", get(root))
        .with_state(gpm);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    info!("admin http server listening on {}", port);

    axum::serve(listener, router)
        .await
        .map_err(|e| Error::CommonError(format!("admin http server fail {:?}", e)))?;

    return Ok(());
}
