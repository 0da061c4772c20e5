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
use crate::selector::Labels;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PodTemplate {
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    pub image: String,
}

/// Replicated warm-pod workload. The substrate keeps as many ready pods
/// matching `selector` as `replicas` asks for; a pod whose labels stop
/// matching is orphaned and replaced.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DeploymentSpec {
    pub replicas: i32,
    pub selector: Labels,
    pub template: PodTemplate,
}

pub type Deployment = DataObject<DeploymentSpec>;
pub type DeploymentMgr = DataObjectMgr<DeploymentSpec>;

impl Deployment {
    pub const KEY: &'static str = "deployment";

    pub fn FromDataObject(obj: DataObject<Value>) -> Result<Self> {
        return obj.To::<DeploymentSpec>();
    }
}
