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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::*;
use crate::consts::*;
use fnpoollib::obj_mgr::func_mgr::Function;

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    // port of the fetcher sidecar on every generic pod
    pub port: u16,
    pub specializeTimeoutSecs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        return Self {
            port: DEFAULT_FETCHER_PORT,
            specializeTimeoutSecs: 120,
        };
    }
}

/// Body of the specialization RPC: enough for the sidecar to fetch the
/// package and load the entrypoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpecializeReq {
    pub functionName: String,
    pub functionNamespace: String,
    pub functionUid: String,
    pub functionRevision: i64,
    pub packageUrl: String,
    pub packageChecksum: String,
    pub entrypoint: String,
}

#[derive(Debug, Clone)]
pub struct FetcherClient {
    pub config: FetcherConfig,
    client: reqwest::Client,
}

impl FetcherClient {
    pub fn New(config: FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.specializeTimeoutSecs))
            .build()?;

        return Ok(Self {
            config: config,
            client: client,
        });
    }

    // fetches the function package onto the pod and signals readiness
    pub async fn Specialize(&self, podIp: &str, fetcherPort: u16, fn_: &Function) -> Result<()> {
        let port = if fetcherPort > 0 {
            fetcherPort
        } else {
            self.config.port
        };
        let url = format!("http://{}:{}{}", podIp, port, FETCHER_SPECIALIZE_PATH);

        let req = SpecializeReq {
            functionName: fn_.name.clone(),
            functionNamespace: fn_.namespace.clone(),
            functionUid: fn_.uid.clone(),
            functionRevision: fn_.revision,
            packageUrl: fn_.object.pkg.url.clone(),
            packageChecksum: fn_.object.pkg.checksum.clone(),
            entrypoint: fn_.object.pkg.entrypoint.clone(),
        };

        let resp = match self.client.post(&url).json(&req).send().await {
            Err(e) => {
                return Err(Error::SpecializationFailure(format!(
                    "specialize call to {} fail with error {}",
                    &url, e
                )));
            }
            Ok(resp) => resp,
        };

        if !resp.status().is_success() {
            return Err(Error::SpecializationFailure(format!(
                "specialize call to {} returned {}",
                &url,
                resp.status()
            )));
        }

        return Ok(());
    }
}
