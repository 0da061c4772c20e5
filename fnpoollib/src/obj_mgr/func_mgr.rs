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

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::*;
use crate::data_obj::*;

pub const DEFAULT_REQUESTS_PER_POD: i32 = 1;
pub const DEFAULT_CONCURRENCY: i32 = 500;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvRef {
    pub namespace: String,
    pub name: String,
}

/// Reference to the code archive a warm container is specialized with.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageRef {
    pub url: String,
    pub entrypoint: String,
    #[serde(default)]
    pub checksum: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FunctionSpec {
    pub environment: EnvRef,
    pub pkg: PackageRef,

    // seconds an idle function service survives; None uses the manager
    // default
    #[serde(default)]
    pub idleTimeout: Option<u64>,
    #[serde(default)]
    pub concurrency: i32,
    #[serde(default)]
    pub requestsPerPod: i32,
    #[serde(default)]
    pub retainPods: i32,
}

pub type Function = DataObject<FunctionSpec>;
pub type FunctionMgr = DataObjectMgr<FunctionSpec>;

impl Function {
    pub const KEY: &'static str = "function";

    pub fn FromDataObject(obj: DataObject<Value>) -> Result<Self> {
        return obj.To::<FunctionSpec>();
    }

    pub fn RequestsPerPod(&self) -> i32 {
        if self.object.requestsPerPod <= 0 {
            return DEFAULT_REQUESTS_PER_POD;
        }

        return self.object.requestsPerPod;
    }

    pub fn Concurrency(&self) -> i32 {
        if self.object.concurrency <= 0 {
            return DEFAULT_CONCURRENCY;
        }

        return self.object.concurrency;
    }
}
