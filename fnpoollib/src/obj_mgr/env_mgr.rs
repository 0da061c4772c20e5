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
use crate::resource::ResourceReq;

/// How many different functions one generic container may serve over its
/// lifetime. `Infinite` containers are never reclaimed by the idle reaper.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FuncsPerContainer {
    Single,
    Infinite,
}

impl Default for FuncsPerContainer {
    fn default() -> Self {
        return Self::Single;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub version: i64,
    pub image: String,
    #[serde(default)]
    pub poolsize: i32,
    #[serde(default)]
    pub allowedFunctionsPerContainer: FuncsPerContainer,
    #[serde(default)]
    pub resources: ResourceReq,
}

pub type Environment = DataObject<EnvironmentSpec>;
pub type EnvironmentMgr = DataObjectMgr<EnvironmentSpec>;

impl Environment {
    pub const KEY: &'static str = "environment";

    pub fn FromDataObject(obj: DataObject<Value>) -> Result<Self> {
        return obj.To::<EnvironmentSpec>();
    }

    pub fn PoolSize(&self) -> i32 {
        if self.object.poolsize < 0 {
            return 0;
        }

        return self.object.poolsize;
    }
}
