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

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::common::*;
use fnpoollib::data_obj::{DataObject, EventType};
use fnpoollib::selector::Labels;

#[derive(Debug, Clone, Default)]
pub struct ListOption {
    pub labelSelector: Labels,
}

impl ListOption {
    pub fn DeepCopy(&self) -> Self {
        return self.clone();
    }
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub type_: EventType,
    pub obj: DataObject<Value>,
}

#[derive(Debug, Default)]
pub struct ObjList {
    pub revision: i64,
    pub objs: Vec<DataObject<Value>>,
}

/// Verbs the pool manager needs from the orchestration substrate.
/// Namespace "" addresses all namespaces for List/Watch. Delete of a
/// missing object returns NotExist; cleanup paths tolerate it.
#[async_trait]
pub trait OrchClient: Debug + Send + Sync {
    async fn List(&self, objType: &str, namespace: &str, opts: &ListOption) -> Result<ObjList>;

    async fn Get(&self, objType: &str, namespace: &str, name: &str) -> Result<DataObject<Value>>;

    async fn Create(&self, obj: &DataObject<Value>) -> Result<DataObject<Value>>;

    async fn Update(&self, obj: &DataObject<Value>) -> Result<DataObject<Value>>;

    async fn Delete(&self, objType: &str, namespace: &str, name: &str) -> Result<()>;

    // strategic-merge of labels/annotations into the object's metadata
    async fn PatchMeta(
        &self,
        objType: &str,
        namespace: &str,
        name: &str,
        labels: &Labels,
        annotations: &Labels,
    ) -> Result<DataObject<Value>>;

    // events observed after the given revision; 0 means "from now on"
    async fn Watch(
        &self,
        objType: &str,
        namespace: &str,
        revision: i64,
    ) -> Result<mpsc::Receiver<WatchEvent>>;
}
