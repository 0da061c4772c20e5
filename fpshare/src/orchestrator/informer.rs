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

use core::ops::Deref;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::sync::RwLock;

use super::client::*;
use super::store::ThreadSafeStore;
use crate::common::*;
use fnpoollib::data_obj::*;

#[async_trait]
pub trait EventHandler: Debug + Send + Sync {
    async fn handle(&self, store: &ThreadSafeStore, event: &DeltaEvent);
}

#[derive(Debug)]
pub struct InformerInner {
    pub objType: String,
    pub namespace: String,
    pub opts: ListOption,

    pub revision: AtomicI64,

    pub client: Arc<dyn OrchClient>,

    pub lastEventHandlerId: AtomicU64,
    pub store: ThreadSafeStore,
    pub handlers: RwLock<BTreeMap<u64, Arc<dyn EventHandler>>>,

    pub closeNotify: Arc<Notify>,
    pub closed: AtomicBool,
    pub listDone: AtomicBool,
}

/// List-then-watch cache of one object kind; distributes delta events to
/// registered handlers.
#[derive(Debug, Clone)]
pub struct Informer(Arc<InformerInner>);

impl Deref for Informer {
    type Target = Arc<InformerInner>;

    fn deref(&self) -> &Arc<InformerInner> {
        &self.0
    }
}

impl Informer {
    pub fn New(
        client: Arc<dyn OrchClient>,
        objType: &str,
        namespace: &str,
        opts: &ListOption,
    ) -> Result<Self> {
        let inner = InformerInner {
            objType: objType.to_owned(),
            namespace: namespace.to_owned(),
            opts: opts.DeepCopy(),
            revision: AtomicI64::new(0),
            client: client,
            store: ThreadSafeStore::default(),
            lastEventHandlerId: AtomicU64::new(0),
            handlers: RwLock::new(BTreeMap::new()),
            closeNotify: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            listDone: AtomicBool::new(false),
        };

        return Ok(Self(Arc::new(inner)));
    }

    pub fn Close(&self) -> Result<()> {
        self.closeNotify.notify_waiters();
        return Ok(());
    }

    pub async fn AddEventHandler(&self, h: Arc<dyn EventHandler>) -> Result<u64> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::CommonError("the informer is closed".to_owned()));
        }

        let id = self.lastEventHandlerId.fetch_add(1, Ordering::SeqCst);

        // replay the current store so late handlers observe all objects
        let objs = self.store.List();
        for obj in objs {
            let event = DeltaEvent {
                type_: EventType::Added,
                inInitialList: true,
                obj: obj,
                oldObj: None,
            };

            h.handle(&self.store, &event).await;
        }

        self.handlers.write().await.insert(id, h.clone());

        return Ok(id);
    }

    pub async fn RemoveEventHandler(&self, id: u64) -> Option<Arc<dyn EventHandler>> {
        return self.handlers.write().await.remove(&id);
    }

    // diff a fresh listing against the store, emitting Added/Modified/
    // Deleted for everything that changed while the watch was down
    async fn Merge(&self, first: bool, newstore: &ThreadSafeStore) -> Result<Vec<DeltaEvent>> {
        let mut events = BTreeMap::new();
        let mut l = self.store.write().unwrap();
        let newl = newstore.read().unwrap();

        for (k, v) in &newl.map {
            match l.map.get(k) {
                None => {
                    events.insert(
                        (v.Revision(), k.clone()),
                        DeltaEvent {
                            type_: EventType::Added,
                            inInitialList: first,
                            obj: v.clone(),
                            oldObj: None,
                        },
                    );
                }
                Some(old) => {
                    if old.Revision() < v.Revision() {
                        events.insert(
                            (v.Revision(), k.clone()),
                            DeltaEvent {
                                type_: EventType::Modified,
                                inInitialList: first,
                                obj: v.clone(),
                                oldObj: Some(old.clone()),
                            },
                        );
                    }
                }
            }
        }

        for (k, v) in &l.map {
            if !newl.map.contains_key(k) {
                events.insert(
                    (v.Revision(), k.clone()),
                    DeltaEvent {
                        type_: EventType::Deleted,
                        inInitialList: false,
                        obj: v.clone(),
                        oldObj: Some(v.clone()),
                    },
                );
            }
        }

        l.map.clear();
        for (k, v) in &newl.map {
            l.map.insert(k.clone(), v.clone());
        }

        return Ok(events.values().cloned().collect());
    }

    async fn InitList(&self, first: bool) -> Result<()> {
        let objs = self
            .client
            .List(&self.objType, &self.namespace, &self.opts)
            .await?;
        self.revision.store(objs.revision, Ordering::SeqCst);

        let store = ThreadSafeStore::default();
        for o in objs.objs {
            store.Add(&o)?;
        }

        let events = self.Merge(first, &store).await?;

        debug!(
            "InitList first {} {} events {}",
            first,
            &self.objType,
            events.len()
        );

        for e in &events {
            self.Distribute(e).await;
        }

        if first {
            let o = DataObject {
                objType: self.objType.clone(),
                ..Default::default()
            };

            self.Distribute(&DeltaEvent {
                type_: EventType::InitDone,
                inInitialList: true,
                obj: o,
                oldObj: None,
            })
            .await;
        }

        return Ok(());
    }

    async fn WatchUpdate(&self, rx: &mut mpsc::Receiver<WatchEvent>) -> Result<()> {
        loop {
            let event = tokio::select! {
                e = rx.recv() => {
                    e
                }
                _ = self.closeNotify.notified() => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Ok(());
                }
            };

            let event = match event {
                None => {
                    return Err(Error::CommonError(format!(
                        "watch channel for {} closed",
                        &self.objType
                    )));
                }
                Some(e) => e,
            };

            self.revision.store(event.obj.channelRev, Ordering::SeqCst);

            // suppress events older than what the store already holds
            if let Some(old) = self.store.Get(&event.obj.Key()) {
                if old.Revision() >= event.obj.Revision() && event.type_ != EventType::Deleted {
                    continue;
                }
            }

            let de = match event.type_ {
                EventType::Added => {
                    self.store.Add(&event.obj)?;
                    DeltaEvent {
                        type_: event.type_,
                        inInitialList: false,
                        obj: event.obj.clone(),
                        oldObj: None,
                    }
                }
                EventType::Modified => {
                    let oldObj = match self.store.Update(&event.obj) {
                        Ok(old) => Some(old),
                        Err(_) => None,
                    };
                    DeltaEvent {
                        type_: event.type_,
                        inInitialList: false,
                        obj: event.obj.clone(),
                        oldObj: oldObj,
                    }
                }
                EventType::Deleted => {
                    let oldObj = match self.store.Delete(&event.obj) {
                        Ok(old) => Some(old),
                        // already gone, nothing to tell the handlers
                        Err(_) => continue,
                    };
                    DeltaEvent {
                        type_: event.type_,
                        inInitialList: false,
                        obj: event.obj.clone(),
                        oldObj: oldObj,
                    }
                }
                _ => {
                    return Err(Error::CommonError(format!(
                        "Informer::WatchUpdate unexpected type {:?}",
                        event.type_
                    )));
                }
            };

            self.Distribute(&de).await;
        }
    }

    pub async fn Process(&self, notify: Arc<Notify>) -> Result<()> {
        let mut first = true;
        loop {
            // subscribe before listing so nothing slips between the two
            let mut rx = match self
                .client
                .Watch(&self.objType, &self.namespace, 0)
                .await
            {
                Ok(rx) => rx,
                Err(e) => {
                    error!("informer {} watch fail with error {:?}", &self.objType, e);
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(1000)) => continue,
                        _ = self.closeNotify.notified() => {
                            self.closed.store(true, Ordering::SeqCst);
                            return Ok(());
                        }
                    }
                }
            };

            match self.InitList(first).await {
                Err(e) => {
                    error!("informer {} initlist fail with error {:?}", &self.objType, e);
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(1000)) => continue,
                        _ = self.closeNotify.notified() => {
                            self.closed.store(true, Ordering::SeqCst);
                            return Ok(());
                        }
                    }
                }
                Ok(()) => (),
            }

            if first {
                self.listDone.store(true, Ordering::SeqCst);
                notify.notify_waiters();
                first = false;
            }

            match self.WatchUpdate(&mut rx).await {
                Err(e) => {
                    error!(
                        "informer {} WatchUpdate fail with error {:?}, relisting",
                        &self.objType, e
                    );
                }
                Ok(()) => return Ok(()),
            }
        }
    }

    pub async fn Distribute(&self, event: &DeltaEvent) {
        let handlers = self.handlers.read().await;
        for h in handlers.values() {
            h.handle(&self.store, event).await;
        }
    }
}
