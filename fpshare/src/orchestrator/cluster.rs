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
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::Notify;

use super::client::*;
use super::unique_id::{NewSuffix, NewUid};
use crate::common::*;
use fnpoollib::data_obj::*;
use fnpoollib::obj_mgr::deployment_mgr::Deployment;
use fnpoollib::obj_mgr::pod_mgr::{FuncPod, PodDef, PodSpec, PodState, PodStatus};
use fnpoollib::selector::Labels;

pub const WATCH_CHANNEL_SIZE: usize = 4096;
pub const RECONCILE_INTERVAL_MS: u64 = 20;
pub const POD_PORT_BASE: u32 = 20000;

/// Single-node orchestration substrate: one process owns the whole
/// object space. Backs the onenode deployment of the service binary and
/// the integration tests. Pods it schedules run on the local host, so
/// every pod IP is 127.0.0.1 with a per-pod port.
#[derive(Debug)]
pub struct MemClusterInner {
    // objType -> "namespace/name" -> object
    pub objs: Mutex<BTreeMap<String, BTreeMap<String, DataObject<Value>>>>,
    pub revision: AtomicI64,
    pub eventTx: broadcast::Sender<WatchEvent>,

    pub podSeq: AtomicU64,
    pub fetcherPort: u16,

    pub closeNotify: Arc<Notify>,
    pub stop: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct MemCluster(Arc<MemClusterInner>);

impl Deref for MemCluster {
    type Target = Arc<MemClusterInner>;

    fn deref(&self) -> &Arc<MemClusterInner> {
        &self.0
    }
}

impl MemCluster {
    pub fn New(fetcherPort: u16) -> Self {
        let (eventTx, _) = broadcast::channel(WATCH_CHANNEL_SIZE);
        let inner = MemClusterInner {
            objs: Mutex::new(BTreeMap::new()),
            revision: AtomicI64::new(0),
            eventTx: eventTx,
            podSeq: AtomicU64::new(0),
            fetcherPort: fetcherPort,
            closeNotify: Arc::new(Notify::new()),
            stop: AtomicBool::new(false),
        };

        let cluster = Self(Arc::new(inner));

        let clone = cluster.clone();
        tokio::spawn(async move {
            clone.ReconcileProcess().await;
        });

        return cluster;
    }

    pub fn Close(&self) {
        self.closeNotify.notify_waiters();
    }

    fn NextRevision(&self) -> i64 {
        return self.revision.fetch_add(1, Ordering::SeqCst) + 1;
    }

    fn Broadcast(&self, type_: EventType, obj: &DataObject<Value>) {
        // no receivers is fine, watchers come and go
        self.eventTx
            .send(WatchEvent {
                type_: type_,
                obj: obj.clone(),
            })
            .ok();
    }

    fn RemoveLocked(
        &self,
        objs: &mut BTreeMap<String, BTreeMap<String, DataObject<Value>>>,
        objType: &str,
        key: &str,
    ) -> Option<DataObject<Value>> {
        let mut removed = match objs.get_mut(objType) {
            None => None,
            Some(m) => m.remove(key),
        };

        if let Some(obj) = &mut removed {
            obj.channelRev = self.NextRevision();
            self.Broadcast(EventType::Deleted, obj);
        }

        return removed;
    }

    // keeps ready pods matching each deployment selector at the declared
    // replica count; pods patched out of the selector are replaced
    async fn ReconcileProcess(&self) {
        loop {
            tokio::select! {
                _ = self.closeNotify.notified() => {
                    self.stop.store(true, Ordering::SeqCst);
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(RECONCILE_INTERVAL_MS)) => {
                    self.ReconcileDeployments();
                }
            }
        }
    }

    fn ReconcileDeployments(&self) {
        let deployments: Vec<Deployment> = {
            let objs = self.objs.lock().unwrap();
            match objs.get(Deployment::KEY) {
                None => Vec::new(),
                Some(m) => m
                    .values()
                    .filter_map(|o| Deployment::FromDataObject(o.clone()).ok())
                    .collect(),
            }
        };

        for deploy in &deployments {
            let matching = {
                let objs = self.objs.lock().unwrap();
                match objs.get(FuncPod::KEY) {
                    None => 0,
                    Some(m) => m
                        .values()
                        .filter(|p| {
                            p.namespace == deploy.namespace
                                && p.labels.Matches(&deploy.object.selector)
                        })
                        .count() as i32,
                }
            };

            let want = deploy.object.replicas;
            if matching < want {
                for _ in 0..(want - matching) {
                    self.SchedulePod(deploy);
                }
            } else if matching > want {
                self.EvictSurplusPods(deploy, (matching - want) as usize);
            }
        }
    }

    fn SchedulePod(&self, deploy: &Deployment) {
        let seq = self.podSeq.fetch_add(1, Ordering::SeqCst);
        let hostPort = (POD_PORT_BASE + (seq as u32 % 30000)) as u16;

        let pod = FuncPod {
            objType: FuncPod::KEY.to_owned(),
            namespace: deploy.namespace.clone(),
            name: format!("{}-{}", &deploy.name, NewSuffix(6)),
            uid: NewUid(),
            labels: deploy.object.template.labels.clone(),
            annotations: deploy.object.template.annotations.clone(),
            object: PodDef {
                spec: PodSpec {
                    image: deploy.object.template.image.clone(),
                    nodename: "onenode".to_owned(),
                },
                status: PodStatus {
                    state: PodState::Ready,
                    podIp: "127.0.0.1".to_owned(),
                    hostPort: hostPort,
                    fetcherPort: self.fetcherPort,
                },
            },
            ..Default::default()
        };

        let mut obj = pod.DataObject();
        obj.revision = self.NextRevision();
        obj.channelRev = obj.revision;

        let key = obj.Key();
        {
            let mut objs = self.objs.lock().unwrap();
            objs.entry(FuncPod::KEY.to_owned())
                .or_insert_with(BTreeMap::new)
                .insert(key, obj.clone());
        }
        self.Broadcast(EventType::Added, &obj);
    }

    fn EvictSurplusPods(&self, deploy: &Deployment, count: usize) {
        let victims: Vec<String> = {
            let objs = self.objs.lock().unwrap();
            match objs.get(FuncPod::KEY) {
                None => Vec::new(),
                Some(m) => m
                    .values()
                    .filter(|p| {
                        p.namespace == deploy.namespace
                            && p.labels.Matches(&deploy.object.selector)
                    })
                    .rev()
                    .take(count)
                    .map(|p| p.Key())
                    .collect(),
            }
        };

        let mut objs = self.objs.lock().unwrap();
        for key in &victims {
            self.RemoveLocked(&mut objs, FuncPod::KEY, key);
        }
    }
}

#[async_trait]
impl OrchClient for MemCluster {
    async fn List(&self, objType: &str, namespace: &str, opts: &ListOption) -> Result<ObjList> {
        let objs = self.objs.lock().unwrap();
        let mut list = Vec::new();
        if let Some(m) = objs.get(objType) {
            for obj in m.values() {
                if namespace.len() > 0 && obj.namespace != namespace {
                    continue;
                }

                if !obj.labels.Matches(&opts.labelSelector) {
                    continue;
                }

                list.push(obj.clone());
            }
        }

        return Ok(ObjList {
            revision: self.revision.load(Ordering::SeqCst),
            objs: list,
        });
    }

    async fn Get(&self, objType: &str, namespace: &str, name: &str) -> Result<DataObject<Value>> {
        let key = format!("{}/{}", namespace, name);
        let objs = self.objs.lock().unwrap();
        match objs.get(objType).and_then(|m| m.get(&key)) {
            None => {
                return Err(Error::NotExist(format!(
                    "MemCluster::Get {} {}",
                    objType, &key
                )))
            }
            Some(obj) => return Ok(obj.clone()),
        }
    }

    async fn Create(&self, obj: &DataObject<Value>) -> Result<DataObject<Value>> {
        let mut obj = obj.clone();
        if obj.uid.len() == 0 {
            obj.uid = NewUid();
        }
        obj.revision = self.NextRevision();
        obj.channelRev = obj.revision;

        let key = obj.Key();
        {
            let mut objs = self.objs.lock().unwrap();
            let m = objs.entry(obj.objType.clone()).or_insert_with(BTreeMap::new);
            if m.contains_key(&key) {
                return Err(Error::Exist(format!(
                    "MemCluster::Create {} {}",
                    &obj.objType, &key
                )));
            }

            m.insert(key, obj.clone());
        }

        self.Broadcast(EventType::Added, &obj);
        return Ok(obj);
    }

    async fn Update(&self, obj: &DataObject<Value>) -> Result<DataObject<Value>> {
        let mut obj = obj.clone();
        let key = obj.Key();
        {
            let mut objs = self.objs.lock().unwrap();
            let m = match objs.get_mut(&obj.objType) {
                None => {
                    return Err(Error::NotExist(format!(
                        "MemCluster::Update {} {}",
                        &obj.objType, &key
                    )))
                }
                Some(m) => m,
            };

            let old = match m.get(&key) {
                None => {
                    return Err(Error::NotExist(format!(
                        "MemCluster::Update {} {}",
                        &obj.objType, &key
                    )))
                }
                Some(o) => o,
            };

            if obj.uid.len() == 0 {
                obj.uid = old.uid.clone();
            }
            obj.revision = self.NextRevision();
            obj.channelRev = obj.revision;
            m.insert(key, obj.clone());
        }

        self.Broadcast(EventType::Modified, &obj);
        return Ok(obj);
    }

    async fn Delete(&self, objType: &str, namespace: &str, name: &str) -> Result<()> {
        let key = format!("{}/{}", namespace, name);

        let removed = {
            let mut objs = self.objs.lock().unwrap();
            self.RemoveLocked(&mut objs, objType, &key)
        };

        let removed = match removed {
            None => {
                return Err(Error::NotExist(format!(
                    "MemCluster::Delete {} {}",
                    objType, &key
                )))
            }
            Some(o) => o,
        };

        // deleting a deployment tears down the pods it still selects
        if objType == Deployment::KEY {
            if let Ok(deploy) = Deployment::FromDataObject(removed) {
                let victims: Vec<String> = {
                    let objs = self.objs.lock().unwrap();
                    match objs.get(FuncPod::KEY) {
                        None => Vec::new(),
                        Some(m) => m
                            .values()
                            .filter(|p| {
                                p.namespace == deploy.namespace
                                    && p.labels.Matches(&deploy.object.selector)
                            })
                            .map(|p| p.Key())
                            .collect(),
                    }
                };

                let mut objs = self.objs.lock().unwrap();
                for key in &victims {
                    self.RemoveLocked(&mut objs, FuncPod::KEY, key);
                }
            }
        }

        return Ok(());
    }

    async fn PatchMeta(
        &self,
        objType: &str,
        namespace: &str,
        name: &str,
        labels: &Labels,
        annotations: &Labels,
    ) -> Result<DataObject<Value>> {
        let key = format!("{}/{}", namespace, name);
        let patched = {
            let mut objs = self.objs.lock().unwrap();
            let m = match objs.get_mut(objType) {
                None => {
                    return Err(Error::NotExist(format!(
                        "MemCluster::PatchMeta {} {}",
                        objType, &key
                    )))
                }
                Some(m) => m,
            };

            let obj = match m.get_mut(&key) {
                None => {
                    return Err(Error::NotExist(format!(
                        "MemCluster::PatchMeta {} {}",
                        objType, &key
                    )))
                }
                Some(o) => o,
            };

            obj.labels.Merge(labels);
            obj.annotations.Merge(annotations);
            obj.revision = self.NextRevision();
            obj.channelRev = obj.revision;
            obj.clone()
        };

        self.Broadcast(EventType::Modified, &patched);
        return Ok(patched);
    }

    async fn Watch(
        &self,
        objType: &str,
        namespace: &str,
        revision: i64,
    ) -> Result<mpsc::Receiver<WatchEvent>> {
        let mut brx = self.eventTx.subscribe();
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_SIZE);

        let objType = objType.to_owned();
        let namespace = namespace.to_owned();
        tokio::spawn(async move {
            loop {
                match brx.recv().await {
                    Ok(event) => {
                        if event.obj.objType != objType {
                            continue;
                        }

                        if namespace.len() > 0 && event.obj.namespace != namespace {
                            continue;
                        }

                        if event.obj.channelRev <= revision {
                            continue;
                        }

                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        error!("MemCluster watch for {} lagged {} events", &objType, n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        return Ok(rx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnpoollib::obj_mgr::deployment_mgr::{DeploymentSpec, PodTemplate};

    fn TestDeployment(name: &str, replicas: i32) -> Deployment {
        let selector = Labels::NewFromSlice(&[("pool", name)]);
        return Deployment {
            objType: Deployment::KEY.to_owned(),
            namespace: "default".to_owned(),
            name: name.to_owned(),
            object: DeploymentSpec {
                replicas: replicas,
                selector: selector.clone(),
                template: PodTemplate {
                    labels: selector,
                    annotations: Labels::New(),
                    image: "env-image:1".to_owned(),
                },
            },
            ..Default::default()
        };
    }

    #[tokio::test]
    async fn TestReconcileDeployment() {
        let cluster = MemCluster::New(0);
        let deploy = TestDeployment("pool-a", 3);
        cluster.Create(&deploy.DataObject()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let opts = ListOption {
            labelSelector: Labels::NewFromSlice(&[("pool", "pool-a")]),
        };
        let pods = cluster.List(FuncPod::KEY, "default", &opts).await.unwrap();
        assert_eq!(pods.objs.len(), 3);

        // patching a pod out of the selector orphans it and triggers a
        // replacement
        let victim = pods.objs[0].clone();
        let mut labels = Labels::New();
        labels.Set("pool", "none");
        cluster
            .PatchMeta(
                FuncPod::KEY,
                &victim.namespace,
                &victim.name,
                &labels,
                &Labels::New(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let pods = cluster.List(FuncPod::KEY, "default", &opts).await.unwrap();
        assert_eq!(pods.objs.len(), 3);

        let all = cluster
            .List(FuncPod::KEY, "default", &ListOption::default())
            .await
            .unwrap();
        assert_eq!(all.objs.len(), 4);

        // deleting the deployment tears down the matching pods but not
        // the orphan
        cluster
            .Delete(Deployment::KEY, "default", "pool-a")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let all = cluster
            .List(FuncPod::KEY, "default", &ListOption::default())
            .await
            .unwrap();
        assert_eq!(all.objs.len(), 1);

        cluster.Close();
    }
}
