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
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opentelemetry::trace::{Span, Tracer};
use rand::Rng;
use serde_json::json;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::common::*;
use crate::consts::*;
use crate::gpm_config::GpmConfig;
use crate::orchestrator::client::{ListOption, OrchClient};
use fnpoollib::data_obj::EventType;
use fnpoollib::obj_mgr::env_mgr::{Environment, FuncsPerContainer};
use fnpoollib::obj_mgr::event_mgr::PodEvent;
use fnpoollib::obj_mgr::func_mgr::Function;
use fnpoollib::obj_mgr::pod_mgr::FuncPod;
use fnpoollib::selector::Labels;

use super::cache::TtlCache;
use super::fetcher::{FetcherClient, FetcherConfig};
use super::fscache::*;
use super::metrics::{PoolEvent as PoolMetricEvent, GPM_METRICS};
use super::pool::GenericPool;
use super::pool_pod_controller::PoolPodController;
use super::reaper;

// event objects are named "{podname}.{suffix}"; this recovers the pod
// name explicitly
pub fn PodNameFromEventName(name: &str) -> &str {
    match name.split('.').next() {
        Some(prefix) if prefix.len() > 0 => return prefix,
        _ => return name,
    }
}

fn StartSpan(name: &'static str) -> opentelemetry::global::BoxedSpan {
    let tracer = opentelemetry::global::tracer("poolmgr");
    return tracer.start(name);
}

#[derive(Debug)]
pub enum PoolRequest {
    // synchronous: construct+setup on miss, never two pools per env UID
    GetPool {
        env: Environment,
        resp: oneshot::Sender<Result<(GenericPool, bool)>>,
    },
    // fire-and-forget: unregister then destroy
    CleanupPool {
        env: Environment,
    },
}

#[derive(Debug)]
pub struct GpmInner {
    pub closeNotify: Arc<Notify>,
    pub stop: AtomicBool,

    pub orch: Arc<dyn OrchClient>,
    pub fsCache: FuncSvcCache,
    pub poolPodC: PoolPodController,
    pub fetcherClient: FetcherClient,

    pub config: GpmConfig,
    pub instanceId: String,

    // short-TTL env lookaside keyed by function identity
    pub funcEnvCache: TtlCache<Environment>,

    pub reqTx: mpsc::Sender<PoolRequest>,
    pub reqRx: Mutex<Option<mpsc::Receiver<PoolRequest>>>,

    pub poolCount: AtomicUsize,
}

/// Top-level coordinator. Owns the pool registry through its service
/// task; everything else passes through the request channel so pool
/// lifecycle stays totally ordered per environment UID.
#[derive(Debug, Clone)]
pub struct Gpm(Arc<GpmInner>);

impl Deref for Gpm {
    type Target = Arc<GpmInner>;

    fn deref(&self) -> &Arc<GpmInner> {
        &self.0
    }
}

impl Gpm {
    pub fn New(
        orch: &Arc<dyn OrchClient>,
        poolPodC: &PoolPodController,
        config: &GpmConfig,
        instanceId: &str,
    ) -> Result<Self> {
        let fetcherClient = FetcherClient::New(FetcherConfig {
            port: config.fetcherPort,
            ..Default::default()
        })?;

        let (reqTx, reqRx) = mpsc::channel(128);

        let inner = GpmInner {
            closeNotify: Arc::new(Notify::new()),
            stop: AtomicBool::new(false),
            orch: orch.clone(),
            fsCache: FuncSvcCache::New(),
            poolPodC: poolPodC.clone(),
            fetcherClient: fetcherClient,
            config: config.clone(),
            instanceId: instanceId.to_owned(),
            funcEnvCache: TtlCache::New(Duration::from_secs(ENV_CACHE_TTL_SECS)),
            reqTx: reqTx,
            reqRx: Mutex::new(Some(reqRx)),
            poolCount: AtomicUsize::new(0),
        };

        return Ok(Self(Arc::new(inner)));
    }

    pub fn Close(&self) {
        self.closeNotify.notify_waiters();
        self.poolPodC.Close().ok();
    }

    /// Runs the service loop, the background reapers/checkers and the
    /// controller until Close.
    pub async fn Run(&self) -> Result<()> {
        let notify = Arc::new(Notify::new());

        tokio::select! {
            res = self.Service() => {
                info!("gpm service loop finish {:?}", res.is_ok());
            }
            res = self.IdleObjectReaper() => {
                info!("gpm idle reaper finish {:?}", res.is_ok());
            }
            res = self.WebsocketStartEventChecker() => {
                error!("gpm websocket event checker finish {:?}", res.is_ok());
            }
            res = self.NoActiveConnectionEventChecker() => {
                error!("gpm inactivity event checker finish {:?}", res.is_ok());
            }
            res = self.poolPodC.Run(notify.clone()) => {
                error!("pool pod controller finish {:?}", res.is_ok());
            }
        }

        return Ok(());
    }

    // the only task that touches the pool registry
    async fn Service(&self) -> Result<()> {
        let mut rx = match self.reqRx.lock().unwrap().take() {
            None => {
                return Err(Error::CommonError(
                    "gpm service loop already running".to_owned(),
                ))
            }
            Some(rx) => rx,
        };

        let mut pools: BTreeMap<String, GenericPool> = BTreeMap::new();
        let closeNotify = self.closeNotify.clone();

        loop {
            let req = tokio::select! {
                _ = closeNotify.notified() => {
                    self.stop.store(true, Ordering::SeqCst);
                    break;
                }
                req = rx.recv() => {
                    match req {
                        None => break,
                        Some(req) => req,
                    }
                }
            };

            match req {
                PoolRequest::GetPool { env, resp } => {
                    let key = env.uid.clone();
                    match pools.get(&key) {
                        Some(pool) => {
                            resp.send(Ok((pool.clone(), false))).ok();
                        }
                        None => {
                            let pool = GenericPool::New(
                                &self.orch,
                                &env,
                                // pools live in the environment's namespace
                                &env.namespace,
                                &self.fsCache,
                                &self.fetcherClient,
                                self.config.funcPort,
                                &self.instanceId,
                                self.config.enableIstio,
                            );

                            match pool.Setup().await {
                                Err(e) => {
                                    // setup failures do not register
                                    resp.send(Err(e)).ok();
                                }
                                Ok(()) => {
                                    pools.insert(key, pool.clone());
                                    self.poolCount.store(pools.len(), Ordering::SeqCst);
                                    GPM_METRICS.lock().await.IncPoolEvent(
                                        &env.name,
                                        &env.namespace,
                                        PoolMetricEvent::Created,
                                    );
                                    resp.send(Ok((pool, true))).ok();
                                }
                            }
                        }
                    }
                }
                PoolRequest::CleanupPool { env } => {
                    info!(
                        "destroying pool for environment {}/{}",
                        &env.namespace, &env.name
                    );

                    match pools.remove(&env.uid) {
                        None => {
                            error!(
                                "could not find pool for environment {}/{}",
                                &env.namespace, &env.name
                            );
                        }
                        Some(pool) => {
                            self.poolCount.store(pools.len(), Ordering::SeqCst);
                            match pool.Destroy().await {
                                Err(e) => {
                                    error!(
                                        "failed to destroy pool for environment {}/{}: {:?}",
                                        &env.namespace, &env.name, e
                                    );
                                }
                                Ok(()) => {
                                    GPM_METRICS.lock().await.IncPoolEvent(
                                        &env.name,
                                        &env.namespace,
                                        PoolMetricEvent::Destroyed,
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }

        return Ok(());
    }

    pub async fn GetPool(&self, env: &Environment) -> Result<(GenericPool, bool)> {
        let (tx, rx) = oneshot::channel();
        self.reqTx
            .send(PoolRequest::GetPool {
                env: env.clone(),
                resp: tx,
            })
            .await
            .map_err(|_| Error::CommonError("gpm service loop closed".to_owned()))?;

        match rx.await {
            Err(_) => return Err(Error::CommonError("gpm service loop closed".to_owned())),
            Ok(res) => return res,
        }
    }

    pub async fn CleanupPool(&self, env: &Environment) {
        self.reqTx
            .send(PoolRequest::CleanupPool { env: env.clone() })
            .await
            .ok();
    }

    async fn GetFunctionEnv(&self, fn_: &Function) -> Result<Environment> {
        let cacheKey = format!("{}/{}/{}", &fn_.namespace, &fn_.name, fn_.revision);
        if let Some(env) = self.funcEnvCache.Get(&cacheKey) {
            return Ok(env);
        }

        let envRef = &fn_.object.environment;
        let env = match self.poolPodC.GetEnv(&envRef.namespace, &envRef.name) {
            Ok(env) => env,
            // lister may lag right after startup, fall through to the
            // orchestrator
            Err(_) => {
                let obj = self
                    .orch
                    .Get(Environment::KEY, &envRef.namespace, &envRef.name)
                    .await?;
                Environment::FromDataObject(obj)?
            }
        };

        self.funcEnvCache.Set(&cacheKey, env.clone());
        return Ok(env);
    }

    /// Cold-start path: resolve the environment, get-or-create its pool
    /// and specialize one warm pod.
    pub async fn GetFuncSvc(&self, fn_: &Function) -> Result<FuncSvc> {
        let mut span = StartSpan("GetFuncSvc");

        let res = self.DoGetFuncSvc(fn_).await;
        match &res {
            Ok(_) => {
                GPM_METRICS
                    .lock()
                    .await
                    .IncColdStart(&fn_.name, &fn_.namespace);
            }
            Err(e) => {
                GPM_METRICS
                    .lock()
                    .await
                    .IncColdStartError(&fn_.name, &fn_.namespace);

                // negative-cache the failure so cache lookups back off
                // instead of handing out a broken binding
                if e.IsSpecializationFailure() {
                    self.fsCache
                        .MarkSpecializationFailure(&FuncRef::ForFunction(fn_).Key());
                }
            }
        }

        span.end();
        return res;
    }

    async fn DoGetFuncSvc(&self, fn_: &Function) -> Result<FuncSvc> {
        debug!(
            "getting environment for function {}/{}",
            &fn_.namespace, &fn_.name
        );
        let env = self.GetFunctionEnv(fn_).await?;

        let (pool, created) = self.GetPool(&env).await?;
        if created {
            info!(
                "created pool for environment {}/{}",
                &env.namespace, &env.name
            );
        }

        debug!(
            "getting function service from pool for {}/{}",
            &fn_.namespace, &fn_.name
        );
        return pool.GetFuncSvc(fn_).await;
    }

    /// Cache-only lookup; never materializes a new instance.
    pub fn GetFuncSvcFromCache(&self, fn_: &Function) -> Result<FuncSvc> {
        let mut span = StartSpan("GetFuncSvcFromCache");
        let res = self.fsCache.GetFuncSvc(
            &FuncRef::ForFunction(fn_),
            fn_.RequestsPerPod(),
            fn_.Concurrency(),
        );
        span.end();
        return res;
    }

    pub fn DeleteFuncSvcFromCache(&self, svc: &FuncSvc) {
        let mut span = StartSpan("DeleteFuncSvcFromCache");
        self.fsCache.DeleteFunctionSvc(svc);
        span.end();
    }

    pub fn TapService(&self, address: &str) -> Result<()> {
        let mut span = StartSpan("TapService");
        let res = self.fsCache.TouchByAddress(address);
        span.end();
        return res;
    }

    pub fn UnTapService(&self, function: &FuncRef, address: &str) {
        let mut span = StartSpan("UnTapService");
        self.fsCache.MarkAvailable(&function.Key(), address);
        span.end();
    }

    pub fn MarkSpecializationFailure(&self, function: &FuncRef) {
        let mut span = StartSpan("MarkSpecializationFailure");
        info!("marking specialization failure for {}", function.Key());
        self.fsCache.MarkSpecializationFailure(&function.Key());
        span.end();
    }

    /// True iff one of the entry's pods exists, is ready, and the cached
    /// address still points at it (mesh mode skips the address check).
    pub fn IsValid(&self, svc: &FuncSvc) -> bool {
        for obj in &svc.kubeObjects {
            if obj.kind != "pod" {
                continue;
            }

            let pod = match self.poolPodC.GetPod(&obj.namespace, &obj.name) {
                Err(_) => continue,
                Ok(pod) => pod,
            };

            if !pod.IsReady() {
                continue;
            }

            if self.config.enableIstio || svc.address.contains(&pod.object.status.podIp) {
                debug!(
                    "valid address {} for function {}",
                    &svc.address,
                    svc.FuncKey()
                );
                return true;
            }
        }

        return false;
    }

    /// Deletes every pod bearing the function's labels and drops the
    /// cache entry; the next invocation re-specializes from scratch.
    pub async fn RefreshFuncPods(&self, fn_: &Function) -> Result<()> {
        let mut span = StartSpan("RefreshFuncPods");
        let res = self.DoRefreshFuncPods(fn_).await;
        span.end();
        return res;
    }

    async fn DoRefreshFuncPods(&self, fn_: &Function) -> Result<()> {
        let envRef = &fn_.object.environment;
        let obj = self
            .orch
            .Get(Environment::KEY, &envRef.namespace, &envRef.name)
            .await?;
        let env = Environment::FromDataObject(obj)?;

        let (pool, created) = self.GetPool(&env).await?;
        if created {
            info!(
                "created pool for environment {}/{}",
                &env.namespace, &env.name
            );
        }

        let function = FuncRef::ForFunction(fn_);
        match self.fsCache.GetByFunction(&function) {
            Ok(svc) => self.fsCache.DeleteEntry(&svc),
            // nothing cached is fine
            Err(_) => (),
        }

        let opts = ListOption {
            labelSelector: pool.LabelsForFunction(&function),
        };
        let pods = self
            .orch
            .List(FuncPod::KEY, &pool.namespace, &opts)
            .await?;

        for pod in &pods.objs {
            match self.orch.Delete(FuncPod::KEY, &pod.namespace, &pod.name).await {
                Ok(()) => (),
                // goal state reached
                Err(e) if e.IsNotExist() => return Ok(()),
                Err(e) => return Err(e),
            }
        }

        return Ok(());
    }

    /// Startup-time reconciliation: rebuild pools for every environment
    /// with a pool-size hint, re-own surviving pods and synthesize cache
    /// entries for the specialized ones.
    pub async fn AdoptExistingResources(&self) {
        let mut span = StartSpan("AdoptExistingResources");

        let mut envMap: BTreeMap<String, Environment> = BTreeMap::new();
        let mut js: JoinSet<()> = JoinSet::new();

        for namespace in &self.config.namespaces {
            let envs = match self
                .orch
                .List(Environment::KEY, namespace, &ListOption::default())
                .await
            {
                Err(e) => {
                    error!("error getting environment list: {:?}", e);
                    span.end();
                    return;
                }
                Ok(l) => l,
            };

            for obj in envs.objs {
                let env = match Environment::FromDataObject(obj) {
                    Err(e) => {
                        error!("can't decode environment: {:?}", e);
                        continue;
                    }
                    Ok(env) => env,
                };

                if env.PoolSize() > 0 {
                    let gpm = self.clone();
                    let env = env.clone();
                    js.spawn(async move {
                        match gpm.GetPool(&env).await {
                            Err(e) => {
                                error!("adopt pool failed: {:?}", e);
                            }
                            Ok((_, created)) => {
                                if created {
                                    info!(
                                        "created pool for environment {}/{}",
                                        &env.namespace, &env.name
                                    );
                                }
                            }
                        }
                    });
                }

                envMap.insert(env.Key(), env);
            }
        }

        let selector = Labels::NewFromSlice(&[(LABEL_EXECUTOR_TYPE, EXECUTOR_TYPE_POOLMGR)]);
        let opts = ListOption {
            labelSelector: selector,
        };

        for namespace in &self.config.namespaces {
            let pods = match self.orch.List(FuncPod::KEY, namespace, &opts).await {
                Err(e) => {
                    error!("error getting pod list: {:?}", e);
                    span.end();
                    return;
                }
                Ok(l) => l,
            };

            for obj in pods.objs {
                let pod = match FuncPod::FromDataObject(obj) {
                    Err(e) => {
                        error!("can't decode pod: {:?}", e);
                        continue;
                    }
                    Ok(pod) => pod,
                };

                if !pod.IsReady() {
                    continue;
                }

                let gpm = self.clone();
                let envMap = envMap.clone();
                js.spawn(async move {
                    gpm.AdoptPod(pod, &envMap).await;
                });
            }
        }

        while js.join_next().await.is_some() {}
        span.end();
    }

    async fn AdoptPod(&self, pod: FuncPod, envMap: &BTreeMap<String, Environment>) {
        // spread the patch calls so a restart doesn't burst the API
        // server
        let jitter: u64 = rand::thread_rng().gen_range(0..ADOPT_JITTER_MS);
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let mut annotations = Labels::New();
        annotations.Set(ANNOTATION_INSTANCE_ID, &self.instanceId);
        let pod = match self
            .orch
            .PatchMeta(
                FuncPod::KEY,
                &pod.namespace,
                &pod.name,
                &Labels::New(),
                &annotations,
            )
            .await
        {
            Err(e) => {
                // won't affect function serving, just note it
                warn!(
                    "error patching executor instance ID of pod {}/{}: {:?}",
                    &pod.namespace, &pod.name, e
                );
                return;
            }
            Ok(obj) => match FuncPod::FromDataObject(obj) {
                Err(e) => {
                    warn!("can't decode patched pod: {:?}", e);
                    return;
                }
                Ok(pod) => pod,
            },
        };

        // unspecialized warm pods only needed the ownership annotation
        if pod.labels.Get(LABEL_MANAGED).as_deref() == Some("true") {
            return;
        }

        let fnName = pod.labels.Get(LABEL_FUNCTION_NAME);
        let fnNamespace = pod.labels.Get(LABEL_FUNCTION_NAMESPACE);
        let fnUid = pod.labels.Get(LABEL_FUNCTION_UID);
        let envName = pod.labels.Get(LABEL_ENVIRONMENT_NAME);
        let envNamespace = pod.labels.Get(LABEL_ENVIRONMENT_NAMESPACE);
        let fnRevision = pod.annotations.Get(ANNOTATION_FUNCTION_RESOURCE_VERSION);
        let svcHost = pod.annotations.Get(ANNOTATION_SVC_HOST);

        let (fnName, fnNamespace, fnUid, envName, envNamespace, fnRevision, svcHost) = match (
            fnName,
            fnNamespace,
            fnUid,
            envName,
            envNamespace,
            fnRevision,
            svcHost,
        ) {
            (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f), Some(g)) => {
                (a, b, c, d, e, f, g)
            }
            _ => {
                warn!(
                    "failed to adopt pod {}/{} for function due to lack of necessary information",
                    &pod.namespace, &pod.name
                );
                return;
            }
        };

        let env = match envMap.get(&format!("{}/{}", &envNamespace, &envName)) {
            None => {
                warn!(
                    "failed to adopt pod {}/{}: environment {}/{} unknown",
                    &pod.namespace, &pod.name, &envNamespace, &envName
                );
                return;
            }
            Some(env) => env.clone(),
        };

        let revision = match fnRevision.parse::<i64>() {
            Err(_) => {
                warn!(
                    "failed to adopt pod {}/{}: bad resource version {}",
                    &pod.namespace, &pod.name, &fnRevision
                );
                return;
            }
            Ok(v) => v,
        };

        let svc = FuncSvc::New(
            &pod.name,
            FuncRef {
                namespace: fnNamespace,
                name: fnName,
                uid: fnUid,
                revision: revision,
            },
            env,
            &svcHost,
            vec![ObjectRef {
                kind: "pod".to_owned(),
                namespace: pod.namespace.clone(),
                name: pod.name.clone(),
                uid: pod.uid.clone(),
            }],
            ExecutorType::PoolMgr,
        );

        match self.fsCache.Add(svc) {
            Ok(()) => {
                info!("adopted function pod {}/{}", &pod.namespace, &pod.name);
            }
            // a duplicate just means several pods serve this function;
            // the reaper recycles the redundant ones
            Err(e) if e.IsNameExists() => (),
            Err(e) => {
                warn!(
                    "failed to adopt pod {}/{}: {:?}",
                    &pod.namespace, &pod.name, e
                );
            }
        }
    }

    /// Deletes deployments and pods left behind by a previous manager
    /// process; runs once at startup before the informers come up.
    pub async fn CleanupOldExecutorObjects(&self) {
        info!(
            "pool manager starts to clean orphaned resources, instanceId {}",
            &self.instanceId
        );

        let opts = ListOption {
            labelSelector: Labels::NewFromSlice(&[(LABEL_EXECUTOR_TYPE, EXECUTOR_TYPE_POOLMGR)]),
        };

        let mut errs = Vec::new();

        if let Err(e) = reaper::CleanupDeployments(
            &self.orch,
            &self.instanceId,
            &opts,
            &self.config.namespaces,
        )
        .await
        {
            errs.push(e);
        }

        if let Err(e) =
            reaper::CleanupPods(&self.orch, &self.instanceId, &opts, &self.config.namespaces)
                .await
        {
            errs.push(e);
        }

        if errs.len() > 0 {
            // keep starting up; the reaper gets another shot later
            error!("failed to cleanup old executor objects: {:?}", errs);
        }
    }

    async fn IdleObjectReaper(&self) -> Result<()> {
        self.poolPodC.WaitListDone().await;

        let mut interval = tokio::time::interval(Duration::from_secs(
            self.config.objectReaperIntervalSecs,
        ));
        // the first tick fires immediately, skip it
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.closeNotify.notified() => {
                    return Ok(());
                }
                _ = interval.tick() => {
                    self.DoIdleObjectReaper().await;
                }
            }
        }
    }

    async fn DoIdleObjectReaper(&self) {
        let mut envUids: BTreeSet<String> = BTreeSet::new();
        for env in self.poolPodC.GetEnvs() {
            envUids.insert(env.uid.clone());
        }

        let mut fnByUid: BTreeMap<String, Function> = BTreeMap::new();
        for f in self.poolPodC.GetFuncs() {
            fnByUid.insert(f.uid.clone(), f);
        }

        let funcSvcs = self
            .fsCache
            .ListOldForPool(Duration::from_secs(POOL_CACHE_MIN_AGE_SECS));

        for svc in funcSvcs {
            if svc.executor != ExecutorType::PoolMgr {
                continue;
            }

            // a held websocket exempts the entry from idle reaping
            if self.fsCache.websocketFsvc.contains_key(&svc.name) {
                continue;
            }

            // the pod is reaped as usual, the log just tells the user why
            // their function went away
            if !envUids.contains(&svc.environment.uid) {
                warn!(
                    "function environment {}/{} no longer exists for service {}",
                    &svc.environment.namespace, &svc.environment.name, &svc.name
                );
            }

            if svc.environment.object.allowedFunctionsPerContainer == FuncsPerContainer::Infinite {
                continue;
            }

            let mut idleTimeout = Duration::from_secs(self.config.defaultIdlePodReapTimeSecs);
            if let Some(f) = fnByUid.get(&svc.function.uid) {
                if let Some(secs) = f.object.idleTimeout {
                    idleTimeout = Duration::from_secs(secs);
                }
            }

            if svc.TimeSinceAtime() < idleTimeout {
                continue;
            }

            let gpm = self.clone();
            tokio::spawn(async move {
                match gpm.fsCache.DeleteOldPoolCache(&svc, idleTimeout) {
                    Err(e) => {
                        error!(
                            "error deleting cache entry for function service {}: {:?}",
                            &svc.name, e
                        );
                    }
                    // another reaper call won the race
                    Ok(false) => (),
                    Ok(true) => {
                        for obj in &svc.kubeObjects {
                            info!(
                                "release idle function resources: function {} address {} pod {}",
                                svc.function.Key(),
                                &svc.address,
                                &svc.name
                            );
                            reaper::CleanupKubeObject(&gpm.orch, obj).await;
                            tokio::time::sleep(Duration::from_millis(REAP_OBJECT_PAUSE_MS)).await;
                        }
                    }
                }
            });
        }
    }

    // flags services whose pod reported a websocket connection so the
    // idle reaper leaves them alone
    async fn WebsocketStartEventChecker(&self) -> Result<()> {
        self.poolPodC.WaitListDone().await;

        loop {
            let mut rx = match self.orch.Watch(PodEvent::KEY, "", 0).await {
                Err(e) => {
                    error!("websocket event checker watch fail: {:?}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(1000)) => continue,
                        _ = self.closeNotify.notified() => return Ok(()),
                    }
                }
                Ok(rx) => rx,
            };

            loop {
                let event = tokio::select! {
                    _ = self.closeNotify.notified() => return Ok(()),
                    ev = rx.recv() => {
                        match ev {
                            None => break,
                            Some(ev) => ev,
                        }
                    }
                };

                if event.type_ != EventType::Added {
                    continue;
                }

                let event = match PodEvent::FromDataObject(event.obj) {
                    Err(e) => {
                        error!("can't decode pod event: {:?}", e);
                        continue;
                    }
                    Ok(ev) => ev,
                };

                if event.object.reason != EVENT_WS_CONNECTION_STARTED {
                    continue;
                }

                info!("websocket event detected for pod {}", &event.name);

                let podName = PodNameFromEventName(&event.name).to_owned();
                let svcName = match self.fsCache.podToFsvc.get(&podName) {
                    None => continue,
                    Some(svc) => svc.value().name.clone(),
                };

                self.fsCache.websocketFsvc.insert(svcName, true);
            }
        }
    }

    // evicts services whose pod reported it has no active connections
    // left
    async fn NoActiveConnectionEventChecker(&self) -> Result<()> {
        self.poolPodC.WaitListDone().await;

        loop {
            let mut rx = match self.orch.Watch(PodEvent::KEY, "", 0).await {
                Err(e) => {
                    error!("inactivity event checker watch fail: {:?}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(1000)) => continue,
                        _ = self.closeNotify.notified() => return Ok(()),
                    }
                }
                Ok(rx) => rx,
            };

            loop {
                let event = tokio::select! {
                    _ = self.closeNotify.notified() => return Ok(()),
                    ev = rx.recv() => {
                        match ev {
                            None => break,
                            Some(ev) => ev,
                        }
                    }
                };

                if event.type_ != EventType::Added {
                    continue;
                }

                let event = match PodEvent::FromDataObject(event.obj) {
                    Err(e) => {
                        error!("can't decode pod event: {:?}", e);
                        continue;
                    }
                    Ok(ev) => ev,
                };

                if event.object.reason != EVENT_NO_ACTIVE_CONNECTIONS {
                    continue;
                }

                info!("inactive event detected for pod {}", &event.name);

                let podName = PodNameFromEventName(&event.name).to_owned();
                let svc = match self.fsCache.podToFsvc.get(&podName) {
                    None => continue,
                    Some(svc) => svc.value().clone(),
                };

                self.fsCache.DeleteFunctionSvc(&svc);
                for obj in &svc.kubeObjects {
                    info!(
                        "release function resources due to inactivity: function {} address {} pod {}",
                        svc.function.Key(),
                        &svc.address,
                        &svc.name
                    );
                    reaper::CleanupKubeObject(&self.orch, obj).await;
                    tokio::time::sleep(Duration::from_millis(REAP_OBJECT_PAUSE_MS)).await;
                }
            }
        }
    }

    pub fn DumpDebugInfo(&self) -> Value {
        return json!({
            "instanceId": &self.instanceId,
            "pools": self.poolCount.load(Ordering::SeqCst),
            "fsCache": self.fsCache.DumpDebugInfo(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn TestPodNameFromEventName() {
        assert_eq!(PodNameFromEventName("pod-abc.17f2"), "pod-abc");
        assert_eq!(PodNameFromEventName("pod-abc.17f2.9c"), "pod-abc");
        assert_eq!(PodNameFromEventName("pod-abc"), "pod-abc");
        assert_eq!(PodNameFromEventName(".17f2"), ".17f2");
    }
}
