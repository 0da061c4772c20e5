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

/// Orchestrator event attached to a pod. Event objects are named
/// "{podname}.{suffix}" after the pod they describe.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PodEventSpec {
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

pub type PodEvent = DataObject<PodEventSpec>;
pub type PodEventMgr = DataObjectMgr<PodEventSpec>;

impl PodEvent {
    pub const KEY: &'static str = "podevent";

    pub fn FromDataObject(obj: DataObject<Value>) -> Result<Self> {
        return obj.To::<PodEventSpec>();
    }
}
