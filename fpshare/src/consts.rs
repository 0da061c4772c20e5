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

// labels the pool manager stamps on the objects it owns
pub const LABEL_EXECUTOR_TYPE: &str = "executor-type";
pub const LABEL_FUNCTION_NAME: &str = "function-name";
pub const LABEL_FUNCTION_NAMESPACE: &str = "function-namespace";
pub const LABEL_FUNCTION_UID: &str = "function-uid";
pub const LABEL_ENVIRONMENT_NAME: &str = "environment-name";
pub const LABEL_ENVIRONMENT_NAMESPACE: &str = "environment-namespace";
pub const LABEL_ENVIRONMENT_UID: &str = "environment-uid";
// "true" while the pod is an unspecialized member of a warm pool
pub const LABEL_MANAGED: &str = "managed";

// annotations
pub const ANNOTATION_INSTANCE_ID: &str = "executor-instanceid";
pub const ANNOTATION_FUNCTION_RESOURCE_VERSION: &str = "function-resource-version";
pub const ANNOTATION_SVC_HOST: &str = "svc-host";

pub const EXECUTOR_TYPE_POOLMGR: &str = "poolmgr";

// pod event reasons the background checkers react to
pub const EVENT_WS_CONNECTION_STARTED: &str = "WsConnectionStarted";
pub const EVENT_NO_ACTIVE_CONNECTIONS: &str = "NoActiveConnections";

pub const DEFAULT_NAMESPACE: &str = "default";

pub const DEFAULT_IDLE_POD_REAP_TIME_SECS: u64 = 120;
pub const DEFAULT_OBJECT_REAPER_INTERVAL_SECS: u64 = 5;
// entries younger than this are never even considered by the reaper
pub const POOL_CACHE_MIN_AGE_SECS: u64 = 5;
pub const ENV_CACHE_TTL_SECS: u64 = 10;
pub const SPECIALIZATION_FAILURE_TTL_SECS: u64 = 30;
// pause between orchestrator deletes to rate-limit the API server
pub const REAP_OBJECT_PAUSE_MS: u64 = 50;
// jitter ceiling for adoption-time API calls
pub const ADOPT_JITTER_MS: u64 = 30;

pub const POOL_READY_TIMEOUT_SECS: u64 = 30;
pub const POOL_READY_POLL_MS: u64 = 100;

pub const FETCHER_SPECIALIZE_PATH: &str = "/v2/specialize";
pub const DEFAULT_FETCHER_PORT: u16 = 8000;
pub const DEFAULT_FUNC_PORT: u16 = 8888;
pub const DEFAULT_ADMIN_PORT: u16 = 8080;
