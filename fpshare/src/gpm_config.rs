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

use crate::common::*;
use crate::consts::*;

pub const ENABLE_ISTIO: &str = "ENABLE_ISTIO";
pub const OBJECT_REAPER_INTERVAL: &str = "OBJECT_REAPER_INTERVAL";
pub const FNPOOL_NAMESPACES: &str = "FNPOOL_NAMESPACES";
pub const FNPOOL_ADMIN_PORT: &str = "FNPOOL_ADMIN_PORT";

lazy_static::lazy_static! {
    pub static ref GPM_CONFIG: GpmConfig = GpmConfig::FromEnv().expect("invalid fnpool configuration");
}

#[derive(Debug, Clone)]
pub struct GpmConfig {
    // namespaces the manager enumerates for environments/functions/pods
    pub namespaces: Vec<String>,
    // mesh mode changes service address validation
    pub enableIstio: bool,
    pub objectReaperIntervalSecs: u64,
    pub defaultIdlePodReapTimeSecs: u64,
    pub fetcherPort: u16,
    pub funcPort: u16,
    pub adminPort: u16,
}

impl Default for GpmConfig {
    fn default() -> Self {
        return Self {
            namespaces: vec![DEFAULT_NAMESPACE.to_owned()],
            enableIstio: false,
            objectReaperIntervalSecs: DEFAULT_OBJECT_REAPER_INTERVAL_SECS,
            defaultIdlePodReapTimeSecs: DEFAULT_IDLE_POD_REAP_TIME_SECS,
            fetcherPort: DEFAULT_FETCHER_PORT,
            funcPort: DEFAULT_FUNC_PORT,
            adminPort: DEFAULT_ADMIN_PORT,
        };
    }
}

impl GpmConfig {
    pub fn FromEnv() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(s) = std::env::var(ENABLE_ISTIO) {
            if s.len() > 0 {
                match s.parse::<bool>() {
                    Ok(v) => config.enableIstio = v,
                    Err(_) => {
                        error!("failed to parse '{}' {}, set to false", ENABLE_ISTIO, &s);
                    }
                }
            }
        }

        if let Ok(s) = std::env::var(OBJECT_REAPER_INTERVAL) {
            if s.len() > 0 {
                match s.parse::<u64>() {
                    Ok(v) if v > 0 => config.objectReaperIntervalSecs = v,
                    _ => {
                        return Err(Error::ConfigError(format!(
                            "invalid {} '{}'",
                            OBJECT_REAPER_INTERVAL, &s
                        )));
                    }
                }
            }
        }

        if let Ok(s) = std::env::var(FNPOOL_NAMESPACES) {
            if s.len() > 0 {
                config.namespaces = s
                    .split(',')
                    .map(|ns| ns.trim().to_owned())
                    .filter(|ns| ns.len() > 0)
                    .collect();
                if config.namespaces.len() == 0 {
                    return Err(Error::ConfigError(format!(
                        "invalid {} '{}'",
                        FNPOOL_NAMESPACES, &s
                    )));
                }
            }
        }

        if let Ok(s) = std::env::var(FNPOOL_ADMIN_PORT) {
            if s.len() > 0 {
                match s.parse::<u16>() {
                    Ok(v) => config.adminPort = v,
                    Err(_) => {
                        return Err(Error::ConfigError(format!(
                            "invalid {} '{}'",
                            FNPOOL_ADMIN_PORT, &s
                        )));
                    }
                }
            }
        }

        return Ok(config);
    }
}
