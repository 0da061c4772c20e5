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

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodState {
    Pending,
    Ready,
    Terminating,
}

impl Default for PodState {
    fn default() -> Self {
        return Self::Pending;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PodSpec {
    pub image: String,
    #[serde(default)]
    pub nodename: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PodStatus {
    #[serde(default)]
    pub state: PodState,
    #[serde(default)]
    pub podIp: String,
    // port the function container listens on
    #[serde(default)]
    pub hostPort: u16,
    // port of the fetcher sidecar
    #[serde(default)]
    pub fetcherPort: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PodDef {
    pub spec: PodSpec,
    pub status: PodStatus,
}

pub type FuncPod = DataObject<PodDef>;
pub type PodMgr = DataObjectMgr<PodDef>;

impl FuncPod {
    pub const KEY: &'static str = "funcpod";

    pub fn FromDataObject(obj: DataObject<Value>) -> Result<Self> {
        return obj.To::<PodDef>();
    }

    pub fn IsReady(&self) -> bool {
        return self.object.status.state == PodState::Ready;
    }
}
