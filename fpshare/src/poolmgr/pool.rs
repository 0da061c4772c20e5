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
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::common::*;
use crate::consts::*;
use crate::orchestrator::client::{ListOption, OrchClient};
use crate::orchestrator::unique_id::ShortUid;
use fnpoollib::obj_mgr::deployment_mgr::{Deployment, DeploymentSpec, PodTemplate};
use fnpoollib::obj_mgr::env_mgr::Environment;
use fnpoollib::obj_mgr::func_mgr::Function;
use fnpoollib::obj_mgr::pod_mgr::FuncPod;
use fnpoollib::selector::Labels;

use super::fetcher::FetcherClient;
use super::fscache::*;

pub const DEFAULT_POOL_SIZE: i32 = 3;

// broadcast one-shot shared by every caller waiting on one in-flight
// specialization
#[derive(Debug, Default)]
pub struct SpecSlotInner {
    pub notify: Notify,
    pub done: AtomicBool,
    pub result: Mutex<Option<core::result::Result<FuncSvc, String>>>,
}

#[derive(Debug, Clone, Default)]
pub struct SpecSlot(Arc<SpecSlotInner>);

impl Deref for SpecSlot {
    type Target = Arc<SpecSlotInner>;

    fn deref(&self) -> &Arc<SpecSlotInner> {
        &self.0
    }
}

impl SpecSlot {
    pub fn New() -> Self {
        return Self::default();
    }

    pub fn Finish(&self, res: core::result::Result<FuncSvc, String>) {
        *self.result.lock().unwrap() = Some(res);
        self.done.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn Wait(&self) -> Result<FuncSvc> {
        loop {
            let notified = self.notify.notified();
            if self.done.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
        }

        match &*self.result.lock().unwrap() {
            Some(Ok(svc)) => return Ok(svc.clone()),
            Some(Err(e)) => return Err(Error::SpecializationFailure(e.clone())),
            None => {
                return Err(Error::CommonError(
                    "SpecSlot finished without result".to_owned(),
                ))
            }
        }
    }
}

#[derive(Debug)]
pub struct GenericPoolInner {
    pub env: Environment,
    // namespace the warm pods and deployment live in
    pub namespace: String,
    pub poolName: String,
    pub poolSize: i32,

    pub orch: Arc<dyn OrchClient>,
    pub fsCache: FuncSvcCache,
    pub fetcherClient: FetcherClient,

    pub funcPort: u16,
    pub instanceId: String,
    pub enableIstio: bool,

    pub stopped: AtomicBool,
    // in-flight specializations keyed by function identity
    pub pendingSpecs: Mutex<BTreeMap<String, SpecSlot>>,
    // warm pods currently being specialized, so two functions never
    // claim the same pod
    pub claimedPods: Mutex<BTreeSet<String>>,
}

/// Warm-container pool for one environment. At most one exists per
/// environment UID (enforced by the manager's service loop); a destroyed
/// pool is never reused.
#[derive(Debug, Clone)]
pub struct GenericPool(Arc<GenericPoolInner>);

impl Deref for GenericPool {
    type Target = Arc<GenericPoolInner>;

    fn deref(&self) -> &Arc<GenericPoolInner> {
        &self.0
    }
}

impl GenericPool {
    pub fn New(
        orch: &Arc<dyn OrchClient>,
        env: &Environment,
        namespace: &str,
        fsCache: &FuncSvcCache,
        fetcherClient: &FetcherClient,
        funcPort: u16,
        instanceId: &str,
        enableIstio: bool,
    ) -> Self {
        let poolName = format!(
            "poolmgr-{}-{}-{}",
            &env.name,
            &env.namespace,
            ShortUid(&env.uid)
        );

        let poolSize = if env.PoolSize() > 0 {
            env.PoolSize()
        } else {
            DEFAULT_POOL_SIZE
        };

        let inner = GenericPoolInner {
            env: env.clone(),
            namespace: namespace.to_owned(),
            poolName: poolName,
            poolSize: poolSize,
            orch: orch.clone(),
            fsCache: fsCache.clone(),
            fetcherClient: fetcherClient.clone(),
            funcPort: funcPort,
            instanceId: instanceId.to_owned(),
            enableIstio: enableIstio,
            stopped: AtomicBool::new(false),
            pendingSpecs: Mutex::new(BTreeMap::new()),
            claimedPods: Mutex::new(BTreeSet::new()),
        };

        return Self(Arc::new(inner));
    }

    pub fn Stopped(&self) -> bool {
        return self.stopped.load(Ordering::SeqCst);
    }

    // labels every object of this pool carries while unspecialized
    pub fn PoolLabels(&self) -> Labels {
        let mut labels = Labels::New();
        labels.Set(LABEL_EXECUTOR_TYPE, EXECUTOR_TYPE_POOLMGR);
        labels.Set(LABEL_ENVIRONMENT_NAME, &self.env.name);
        labels.Set(LABEL_ENVIRONMENT_NAMESPACE, &self.env.namespace);
        labels.Set(LABEL_ENVIRONMENT_UID, &self.env.uid);
        labels.Set(LABEL_MANAGED, "true");
        return labels;
    }

    // canonical label set used to discover pods specialized for a
    // function
    pub fn LabelsForFunction(&self, function: &FuncRef) -> Labels {
        let mut labels = Labels::New();
        labels.Set(LABEL_EXECUTOR_TYPE, EXECUTOR_TYPE_POOLMGR);
        labels.Set(LABEL_FUNCTION_NAME, &function.name);
        labels.Set(LABEL_FUNCTION_NAMESPACE, &function.namespace);
        labels.Set(LABEL_FUNCTION_UID, &function.uid);
        return labels;
    }

    // creates the backing deployment and waits for warm pods; idempotent
    // against a deployment that survived a manager restart
    pub async fn Setup(&self) -> Result<()> {
        let opts = ListOption {
            labelSelector: self.PoolLabels(),
        };

        let existing = self
            .orch
            .List(Deployment::KEY, &self.namespace, &opts)
            .await?;

        if existing.objs.len() == 0 {
            let mut annotations = Labels::New();
            annotations.Set(ANNOTATION_INSTANCE_ID, &self.instanceId);

            let deploy = Deployment {
                objType: Deployment::KEY.to_owned(),
                namespace: self.namespace.clone(),
                name: self.poolName.clone(),
                labels: self.PoolLabels(),
                annotations: annotations.clone(),
                object: DeploymentSpec {
                    replicas: self.poolSize,
                    selector: self.PoolLabels(),
                    template: PodTemplate {
                        labels: self.PoolLabels(),
                        annotations: annotations,
                        image: self.env.object.image.clone(),
                    },
                },
                ..Default::default()
            };

            match self.orch.Create(&deploy.DataObject()).await {
                Ok(_) => (),
                // someone raced us to it, adopt theirs
                Err(Error::Exist(_)) => (),
                Err(e) => return Err(e),
            }
        }

        self.WaitForWarmPods().await?;

        info!(
            "pool {} ready with size {} for environment {}/{}",
            &self.poolName, self.poolSize, &self.env.namespace, &self.env.name
        );

        return Ok(());
    }

    pub async fn ReadyWarmPods(&self) -> Result<Vec<FuncPod>> {
        let opts = ListOption {
            labelSelector: self.PoolLabels(),
        };

        let objs = self.orch.List(FuncPod::KEY, &self.namespace, &opts).await?;
        let mut pods = Vec::new();
        for obj in objs.objs {
            let pod = match FuncPod::FromDataObject(obj) {
                Err(e) => {
                    error!("pool {} can't decode pod: {:?}", &self.poolName, e);
                    continue;
                }
                Ok(p) => p,
            };

            if pod.IsReady() {
                pods.push(pod);
            }
        }

        return Ok(pods);
    }

    async fn WaitForWarmPods(&self) -> Result<()> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(POOL_READY_TIMEOUT_SECS);
        loop {
            if self.Stopped() {
                return Err(Error::CommonError(format!(
                    "pool {} destroyed while waiting for pods",
                    &self.poolName
                )));
            }

            let ready = self.ReadyWarmPods().await?;
            if ready.len() > 0 {
                return Ok(());
            }

            if tokio::time::Instant::now() > deadline {
                return Err(Error::Timeout);
            }

            tokio::time::sleep(Duration::from_millis(POOL_READY_POLL_MS)).await;
        }
    }

    // claims any ready warm pod, waiting for the deployment to catch up
    // when the pool is momentarily drained; the claim keeps concurrent
    // specializations off the same pod
    async fn ChoosePod(&self) -> Result<FuncPod> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(POOL_READY_TIMEOUT_SECS);
        loop {
            if self.Stopped() {
                return Err(Error::CommonError(format!(
                    "pool {} destroyed",
                    &self.poolName
                )));
            }

            let ready = self.ReadyWarmPods().await?;
            {
                let mut claimed = self.claimedPods.lock().unwrap();
                for pod in ready {
                    if claimed.insert(pod.name.clone()) {
                        return Ok(pod);
                    }
                }
            }

            if tokio::time::Instant::now() > deadline {
                return Err(Error::CommonError(format!(
                    "pool {}: no ready generic pod within {}s",
                    &self.poolName, POOL_READY_TIMEOUT_SECS
                )));
            }

            tokio::time::sleep(Duration::from_millis(POOL_READY_POLL_MS)).await;
        }
    }

    fn ReleasePod(&self, name: &str) {
        self.claimedPods.lock().unwrap().remove(name);
    }

    /// Specializes one warm pod for the function and registers the
    /// resulting service in the cache. Concurrent calls for the same
    /// function share a single specialization; calls for different
    /// functions proceed in parallel.
    pub async fn GetFuncSvc(&self, fn_: &Function) -> Result<FuncSvc> {
        if self.Stopped() {
            return Err(Error::CommonError(format!(
                "pool {} destroyed",
                &self.poolName
            )));
        }

        let function = FuncRef::ForFunction(fn_);
        let key = function.Key();

        let (slot, leader) = {
            let mut pending = self.pendingSpecs.lock().unwrap();
            match pending.get(&key) {
                Some(slot) => (slot.clone(), false),
                None => {
                    let slot = SpecSlot::New();
                    pending.insert(key.clone(), slot.clone());
                    (slot, true)
                }
            }
        };

        if !leader {
            return slot.Wait().await;
        }

        let res = self.Specialize(fn_, &function).await;
        self.pendingSpecs.lock().unwrap().remove(&key);
        match &res {
            Ok(svc) => slot.Finish(Ok(svc.clone())),
            Err(e) => slot.Finish(Err(format!("{:?}", e))),
        }

        return res;
    }

    async fn Specialize(&self, fn_: &Function, function: &FuncRef) -> Result<FuncSvc> {
        let pod = self.ChoosePod().await?;
        let res = self.SpecializePod(&pod, fn_, function).await;
        self.ReleasePod(&pod.name);
        return res;
    }

    async fn SpecializePod(
        &self,
        pod: &FuncPod,
        fn_: &Function,
        function: &FuncRef,
    ) -> Result<FuncSvc> {
        let podIp = pod.object.status.podIp.clone();

        debug!(
            "pool {} specializing pod {} for function {}",
            &self.poolName,
            &pod.name,
            function.Key()
        );

        match self
            .fetcherClient
            .Specialize(&podIp, pod.object.status.fetcherPort, fn_)
            .await
        {
            Err(e) => {
                // the pod may be wedged half-specialized, discard it
                self.orch
                    .Delete(FuncPod::KEY, &pod.namespace, &pod.name)
                    .await
                    .ok();
                return Err(e);
            }
            Ok(()) => (),
        }

        let podPort = if pod.object.status.hostPort > 0 {
            pod.object.status.hostPort
        } else {
            self.funcPort
        };

        let address = if self.enableIstio {
            format!("http://{}.{}:{}", &fn_.name, &fn_.namespace, self.funcPort)
        } else {
            format!("http://{}:{}", &podIp, podPort)
        };

        let mut labels = self.LabelsForFunction(function);
        labels.Set(LABEL_ENVIRONMENT_NAME, &self.env.name);
        labels.Set(LABEL_ENVIRONMENT_NAMESPACE, &self.env.namespace);
        // drop the pod out of the warm set; the deployment replaces it
        labels.Set(LABEL_MANAGED, "false");

        let mut annotations = Labels::New();
        annotations.Set(
            ANNOTATION_FUNCTION_RESOURCE_VERSION,
            &format!("{}", function.revision),
        );
        annotations.Set(ANNOTATION_SVC_HOST, &address);
        annotations.Set(ANNOTATION_INSTANCE_ID, &self.instanceId);

        let patched = match self
            .orch
            .PatchMeta(FuncPod::KEY, &pod.namespace, &pod.name, &labels, &annotations)
            .await
        {
            Err(e) => {
                self.orch
                    .Delete(FuncPod::KEY, &pod.namespace, &pod.name)
                    .await
                    .ok();
                return Err(e);
            }
            Ok(p) => p,
        };

        let svc = FuncSvc::New(
            &pod.name,
            function.clone(),
            self.env.clone(),
            &address,
            vec![ObjectRef {
                kind: "pod".to_owned(),
                namespace: patched.namespace.clone(),
                name: patched.name.clone(),
                uid: patched.uid.clone(),
            }],
            ExecutorType::PoolMgr,
        );

        self.fsCache.Add(svc.clone())?;

        info!(
            "pool {} specialized pod {} for function {} at {}",
            &self.poolName,
            &pod.name,
            function.Key(),
            &address
        );

        return Ok(svc);
    }

    // deletes the backing deployment and every unspecialized pod;
    // idempotent
    pub async fn Destroy(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match self
            .orch
            .Delete(Deployment::KEY, &self.namespace, &self.poolName)
            .await
        {
            Ok(()) => (),
            Err(e) if e.IsNotExist() => (),
            Err(e) => {
                error!(
                    "pool {} failed to delete deployment: {:?}",
                    &self.poolName, e
                );
                return Err(e);
            }
        }

        let opts = ListOption {
            labelSelector: self.PoolLabels(),
        };
        let pods = self.orch.List(FuncPod::KEY, &self.namespace, &opts).await?;
        for pod in &pods.objs {
            match self.orch.Delete(FuncPod::KEY, &pod.namespace, &pod.name).await {
                Ok(()) => (),
                Err(e) if e.IsNotExist() => (),
                Err(e) => {
                    error!(
                        "pool {} failed to delete pod {}: {:?}",
                        &self.poolName, &pod.name, e
                    );
                }
            }
        }

        return Ok(());
    }
}
