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

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::*;
use crate::selector::Labels;

/// Envelope shared by every object the orchestrator stores: identity,
/// revisions, labels/annotations and a typed spec payload.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DataObject<SpecType> {
    pub objType: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,

    // revision of the watch channel the object was observed at
    pub channelRev: i64,
    // revision of the object itself
    pub revision: i64,

    pub labels: Labels,
    pub annotations: Labels,

    pub object: SpecType,
}

impl<SpecType> DataObject<SpecType> {
    pub fn Key(&self) -> String {
        return format!("{}/{}", &self.namespace, &self.name);
    }

    pub fn Revision(&self) -> i64 {
        return self.revision;
    }
}

impl<SpecType: Serialize + Clone + Debug> DataObject<SpecType> {
    // type-erased form handed to the orchestrator client
    pub fn DataObject(&self) -> DataObject<Value> {
        return DataObject {
            objType: self.objType.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            channelRev: self.channelRev,
            revision: self.revision,
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            object: serde_json::to_value(&self.object).unwrap(),
        };
    }
}

impl DataObject<Value> {
    pub fn To<SpecType: DeserializeOwned + Clone + Debug>(&self) -> Result<DataObject<SpecType>> {
        let spec = serde_json::from_value::<SpecType>(self.object.clone())?;
        return Ok(DataObject {
            objType: self.objType.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            channelRev: self.channelRev,
            revision: self.revision,
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            object: spec,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    None,
    Added,
    Modified,
    Deleted,
    InitDone,
}

impl Default for EventType {
    fn default() -> Self {
        return Self::None;
    }
}

#[derive(Debug, Clone)]
pub struct DeltaEvent {
    pub type_: EventType,
    pub inInitialList: bool,
    pub obj: DataObject<Value>,
    pub oldObj: Option<DataObject<Value>>,
}

#[derive(Debug)]
pub struct DataObjectMgrInner<SpecType> {
    pub objs: BTreeMap<String, DataObject<SpecType>>,
}

/// Typed in-memory cache of one object kind, keyed "namespace/name".
/// Populated by informer delta events; read by listers.
#[derive(Debug)]
pub struct DataObjectMgr<SpecType>(Arc<Mutex<DataObjectMgrInner<SpecType>>>);

impl<SpecType> Deref for DataObjectMgr<SpecType> {
    type Target = Arc<Mutex<DataObjectMgrInner<SpecType>>>;

    fn deref(&self) -> &Arc<Mutex<DataObjectMgrInner<SpecType>>> {
        &self.0
    }
}

impl<SpecType> Default for DataObjectMgr<SpecType> {
    fn default() -> Self {
        return Self(Arc::new(Mutex::new(DataObjectMgrInner {
            objs: BTreeMap::new(),
        })));
    }
}

impl<SpecType> Clone for DataObjectMgr<SpecType> {
    fn clone(&self) -> Self {
        return Self(self.0.clone());
    }
}

impl<SpecType: Clone + Debug> DataObjectMgr<SpecType> {
    pub fn Add(&self, obj: DataObject<SpecType>) -> Result<()> {
        let key = obj.Key();
        let mut inner = self.lock().unwrap();
        if inner.objs.contains_key(&key) {
            return Err(Error::Exist(format!("DataObjectMgr::Add {}", &key)));
        }

        inner.objs.insert(key, obj);
        return Ok(());
    }

    pub fn Update(&self, obj: DataObject<SpecType>) -> Result<()> {
        let key = obj.Key();
        let mut inner = self.lock().unwrap();
        if !inner.objs.contains_key(&key) {
            return Err(Error::NotExist(format!("DataObjectMgr::Update {}", &key)));
        }

        inner.objs.insert(key, obj);
        return Ok(());
    }

    pub fn Remove(&self, obj: DataObject<SpecType>) -> Result<()> {
        let key = obj.Key();
        let mut inner = self.lock().unwrap();
        match inner.objs.remove(&key) {
            None => return Err(Error::NotExist(format!("DataObjectMgr::Remove {}", &key))),
            Some(_) => return Ok(()),
        }
    }

    pub fn Get(&self, namespace: &str, name: &str) -> Result<DataObject<SpecType>> {
        let key = format!("{}/{}", namespace, name);
        let inner = self.lock().unwrap();
        match inner.objs.get(&key) {
            None => return Err(Error::NotExist(format!("DataObjectMgr::Get {}", &key))),
            Some(obj) => return Ok(obj.clone()),
        }
    }

    pub fn Contains(&self, namespace: &str, name: &str) -> bool {
        let key = format!("{}/{}", namespace, name);
        return self.lock().unwrap().objs.contains_key(&key);
    }

    // namespace "" enumerates all namespaces
    pub fn GetObjects(&self, namespace: &str) -> Result<Vec<DataObject<SpecType>>> {
        let inner = self.lock().unwrap();
        let mut objs = Vec::new();
        for (_, obj) in &inner.objs {
            if namespace.len() == 0 || obj.namespace == namespace {
                objs.push(obj.clone());
            }
        }

        return Ok(objs);
    }

    pub fn GetObjectsByPrefix(
        &self,
        namespace: &str,
        prefix: &str,
    ) -> Result<Vec<DataObject<SpecType>>> {
        let inner = self.lock().unwrap();
        let mut objs = Vec::new();
        for (_, obj) in &inner.objs {
            if obj.namespace == namespace && obj.name.starts_with(prefix) {
                objs.push(obj.clone());
            }
        }

        return Ok(objs);
    }

    pub fn Count(&self) -> usize {
        return self.lock().unwrap().objs.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn TestDataObjectMgr() {
        let mgr = DataObjectMgr::<Value>::default();
        let obj = DataObject::<Value> {
            objType: "test".to_owned(),
            namespace: "default".to_owned(),
            name: "a".to_owned(),
            ..Default::default()
        };

        mgr.Add(obj.clone()).unwrap();
        assert!(mgr.Add(obj.clone()).unwrap_err().IsExist());
        assert!(mgr.Contains("default", "a"));
        assert_eq!(mgr.Get("default", "a").unwrap().name, "a");
        assert!(mgr.Get("default", "b").unwrap_err().IsNotExist());

        mgr.Remove(obj).unwrap();
        assert_eq!(mgr.Count(), 0);
    }
}
