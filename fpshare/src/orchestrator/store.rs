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
use std::ops::Deref;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::common::*;
use fnpoollib::data_obj::DataObject;

#[derive(Debug, Default)]
pub struct ThreadSafeStoreInner {
    pub map: BTreeMap<String, DataObject<Value>>,
}

/// Informer-side object cache, keyed "namespace/name".
#[derive(Debug, Default, Clone)]
pub struct ThreadSafeStore(Arc<RwLock<ThreadSafeStoreInner>>);

impl Deref for ThreadSafeStore {
    type Target = Arc<RwLock<ThreadSafeStoreInner>>;

    fn deref(&self) -> &Arc<RwLock<ThreadSafeStoreInner>> {
        &self.0
    }
}

impl ThreadSafeStore {
    pub fn Add(&self, obj: &DataObject<Value>) -> Result<()> {
        let mut inner = self.write().unwrap();
        inner.map.insert(obj.Key(), obj.clone());
        return Ok(());
    }

    pub fn Update(&self, obj: &DataObject<Value>) -> Result<DataObject<Value>> {
        let mut inner = self.write().unwrap();
        match inner.map.insert(obj.Key(), obj.clone()) {
            None => {
                return Err(Error::NotExist(format!(
                    "ThreadSafeStore::Update {}",
                    obj.Key()
                )))
            }
            Some(old) => return Ok(old),
        }
    }

    pub fn Delete(&self, obj: &DataObject<Value>) -> Result<DataObject<Value>> {
        let mut inner = self.write().unwrap();
        match inner.map.remove(&obj.Key()) {
            None => {
                return Err(Error::NotExist(format!(
                    "ThreadSafeStore::Delete {}",
                    obj.Key()
                )))
            }
            Some(old) => return Ok(old),
        }
    }

    pub fn Get(&self, key: &str) -> Option<DataObject<Value>> {
        return self.read().unwrap().map.get(key).cloned();
    }

    pub fn Contains(&self, key: &str) -> bool {
        return self.read().unwrap().map.contains_key(key);
    }

    pub fn List(&self) -> Vec<DataObject<Value>> {
        return self.read().unwrap().map.values().cloned().collect();
    }

    pub fn Len(&self) -> usize {
        return self.read().unwrap().map.len();
    }
}
