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

use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_otlp::Protocol;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use tokio::sync::Mutex;

lazy_static::lazy_static! {
    pub static ref METRICS_REGISTRY: Mutex<Registry> = Mutex::new(Registry::default());
    pub static ref GPM_METRICS: Mutex<Metrics> = Mutex::new(Metrics::New());
}

pub async fn InitTracer() {
    let enableTracer = match std::env::var("ENABLE_TRACER") {
        Ok(s) => {
            info!("get ENABLE_TRACER from env ENABLE_TRACER: {}", &s);
            match s.parse::<bool>() {
                Err(_) => {
                    error!("invalid ENABLE_TRACER environment variable {}", &s);
                    false
                }
                Ok(s) => s,
            }
        }
        Err(_) => false,
    };

    if !enableTracer {
        return;
    }

    let endpoint = match std::env::var("OTLP_ENDPOINT") {
        Ok(s) if s.len() > 0 => s,
        _ => "http://jaeger:4318/v1/traces".to_owned(),
    };

    let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
        .unwrap();

    let resource = Resource::builder()
        .with_attribute(KeyValue::new("service.name", "fnpool-poolmgr"))
        .build();

    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(otlp_exporter)
        .with_resource(resource)
        .build();

    global::set_tracer_provider(tracer_provider.clone());
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FuncLabels {
    pub funcname: String,
    pub namespace: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum PoolEvent {
    Created,
    Destroyed,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PoolLabels {
    pub environment: String,
    pub namespace: String,
    pub event: PoolEvent,
}

#[derive(Debug)]
pub struct Metrics {
    // cold starts served by specializing a warm pod
    pub coldStartCnt: Family<FuncLabels, Counter>,
    // cold starts that failed before returning a function service
    pub coldStartErrorCnt: Family<FuncLabels, Counter>,
    pub poolLifecycleCnt: Family<PoolLabels, Counter>,
}

impl Metrics {
    pub fn New() -> Self {
        return Self {
            coldStartCnt: Family::default(),
            coldStartErrorCnt: Family::default(),
            poolLifecycleCnt: Family::default(),
        };
    }

    pub async fn Register(&self) {
        METRICS_REGISTRY.lock().await.register(
            "cold_starts",
            "function cold start count",
            self.coldStartCnt.clone(),
        );

        METRICS_REGISTRY.lock().await.register(
            "cold_start_errors",
            "function cold start error count",
            self.coldStartErrorCnt.clone(),
        );

        METRICS_REGISTRY.lock().await.register(
            "pool_lifecycle",
            "generic pool create/destroy count",
            self.poolLifecycleCnt.clone(),
        );
    }

    pub fn IncColdStart(&self, funcname: &str, namespace: &str) {
        self.coldStartCnt
            .get_or_create(&FuncLabels {
                funcname: funcname.to_owned(),
                namespace: namespace.to_owned(),
            })
            .inc();
    }

    pub fn IncColdStartError(&self, funcname: &str, namespace: &str) {
        self.coldStartErrorCnt
            .get_or_create(&FuncLabels {
                funcname: funcname.to_owned(),
                namespace: namespace.to_owned(),
            })
            .inc();
    }

    pub fn IncPoolEvent(&self, environment: &str, namespace: &str, event: PoolEvent) {
        self.poolLifecycleCnt
            .get_or_create(&PoolLabels {
                environment: environment.to_owned(),
                namespace: namespace.to_owned(),
                event: event,
            })
            .inc();
    }
}
