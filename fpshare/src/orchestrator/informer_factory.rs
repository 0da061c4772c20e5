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

use std::sync::atomic::AtomicBool;
use std::sync::RwLock;
use std::{collections::BTreeMap, ops::Deref, sync::Arc};

use futures::future::join_all;
use tokio::sync::Notify;

use super::client::{ListOption, OrchClient};
use super::informer::{EventHandler, Informer};
use crate::common::*;

#[derive(Debug)]
pub struct InformerFactoryInner {
    pub client: Arc<dyn OrchClient>,
    pub namespace: String,
    pub informers: BTreeMap<String, Informer>,
    pub closed: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct InformerFactory(Arc<RwLock<InformerFactoryInner>>);

impl Deref for InformerFactory {
    type Target = Arc<RwLock<InformerFactoryInner>>;

    fn deref(&self) -> &Arc<RwLock<InformerFactoryInner>> {
        &self.0
    }
}

impl InformerFactory {
    pub async fn New(client: Arc<dyn OrchClient>, namespace: &str) -> Result<Self> {
        let inner = InformerFactoryInner {
            client: client,
            namespace: namespace.to_owned(),
            informers: BTreeMap::new(),
            closed: AtomicBool::new(false),
        };

        return Ok(Self(Arc::new(RwLock::new(inner))));
    }

    pub fn AddInformer(&self, objType: &str, opts: &ListOption) -> Result<()> {
        let mut inner = self.write().unwrap();
        let informer = Informer::New(inner.client.clone(), objType, &inner.namespace, opts)?;
        inner.informers.insert(objType.to_string(), informer);
        return Ok(());
    }

    pub fn RemoveInformer(&self, objType: &str) -> Result<()> {
        let mut inner = self.write().unwrap();
        match inner.informers.remove(objType) {
            None => {
                return Err(Error::NotExist(format!(
                    "RemoveInformer doesn't exist {objType}"
                )))
            }
            Some(_) => return Ok(()),
        }
    }

    pub fn GetInformer(&self, objType: &str) -> Result<Informer> {
        let inner = self.read().unwrap();
        match inner.informers.get(objType) {
            None => {
                return Err(Error::NotExist(format!(
                    "GetInformer doesn't exist {objType}"
                )))
            }
            Some(i) => return Ok(i.clone()),
        }
    }

    pub async fn AddEventHandler(&self, h: Arc<dyn EventHandler>) -> Result<()> {
        let informers: Vec<Informer> = self.read().unwrap().informers.values().cloned().collect();
        for i in &informers {
            i.AddEventHandler(h.clone()).await?;
        }

        return Ok(());
    }

    // drives every informer until close; each informer reports its
    // initial listing through InitDone events and the shared notify
    pub async fn Process(&self, notify: Arc<Notify>) -> Result<()> {
        let informers: Vec<Informer> = self.read().unwrap().informers.values().cloned().collect();

        let mut futures = Vec::new();
        for i in informers.iter() {
            futures.push(i.Process(notify.clone()));
        }

        let res = join_all(futures).await;
        for r in res {
            r?;
        }

        return Ok(());
    }

    pub fn Closed(&self) -> bool {
        return self
            .read()
            .unwrap()
            .closed
            .load(std::sync::atomic::Ordering::SeqCst);
    }

    pub fn Close(&self) -> Result<()> {
        let inner = self.read().unwrap();
        for (_, informer) in &inner.informers {
            informer.Close()?;
        }

        inner
            .closed
            .store(true, std::sync::atomic::Ordering::SeqCst);

        return Ok(());
    }
}
