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

#![allow(non_snake_case)]
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use fnpoollib::obj_mgr::deployment_mgr::Deployment;
use fnpoollib::obj_mgr::env_mgr::*;
use fnpoollib::obj_mgr::event_mgr::*;
use fnpoollib::obj_mgr::func_mgr::*;
use fnpoollib::obj_mgr::pod_mgr::*;
use fnpoollib::selector::Labels;

use fpshare::common::Error;
use fpshare::consts::*;
use fpshare::gpm_config::GpmConfig;
use fpshare::orchestrator::client::{ListOption, OrchClient};
use fpshare::orchestrator::cluster::MemCluster;
use fpshare::poolmgr::fscache::{ExecutorType, FuncRef};
use fpshare::poolmgr::gpm::Gpm;
use fpshare::poolmgr::pool_pod_controller::PoolPodController;

// fetcher sidecar stand-in: fails packages containing "bad", stalls on
// packages containing "slow"
async fn SpecializeHandler(Json(body): Json<Value>) -> StatusCode {
    let url = body
        .get("packageUrl")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    if url.contains("bad") {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    if url.contains("slow") {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    return StatusCode::OK;
}

async fn StartFetcherStub() -> u16 {
    let app = Router::new().route("/v2/specialize", post(SpecializeHandler));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    return port;
}

struct TestStack {
    cluster: MemCluster,
    orch: Arc<dyn OrchClient>,
    controller: PoolPodController,
    gpm: Gpm,
}

async fn Setup(instanceId: &str) -> TestStack {
    let port = StartFetcherStub().await;
    let cluster = MemCluster::New(port);
    let orch: Arc<dyn OrchClient> = Arc::new(cluster.clone());

    let mut config = GpmConfig::default();
    config.objectReaperIntervalSecs = 1;
    config.fetcherPort = port;

    let controller = PoolPodController::New(&orch).await.unwrap();
    let gpm = Gpm::New(&orch, &controller, &config, instanceId).unwrap();
    controller.InjectGpm(&gpm);

    let runGpm = gpm.clone();
    tokio::spawn(async move {
        runGpm.Run().await.ok();
    });

    controller.WaitListDone().await;

    return TestStack {
        cluster: cluster,
        orch: orch,
        controller: controller,
        gpm: gpm,
    };
}

async fn CreateEnv(orch: &Arc<dyn OrchClient>, name: &str, poolsize: i32) -> Environment {
    let env = Environment {
        objType: Environment::KEY.to_owned(),
        namespace: "default".to_owned(),
        name: name.to_owned(),
        object: EnvironmentSpec {
            image: "env-image:1".to_owned(),
            poolsize: poolsize,
            ..Default::default()
        },
        ..Default::default()
    };

    let created = orch.Create(&env.DataObject()).await.unwrap();
    return Environment::FromDataObject(created).unwrap();
}

async fn CreateFunc(
    orch: &Arc<dyn OrchClient>,
    name: &str,
    envName: &str,
    pkgUrl: &str,
    idleTimeout: Option<u64>,
) -> Function {
    let f = Function {
        objType: Function::KEY.to_owned(),
        namespace: "default".to_owned(),
        name: name.to_owned(),
        object: FunctionSpec {
            environment: EnvRef {
                namespace: "default".to_owned(),
                name: envName.to_owned(),
            },
            pkg: PackageRef {
                url: pkgUrl.to_owned(),
                entrypoint: "main.handler".to_owned(),
                ..Default::default()
            },
            idleTimeout: idleTimeout,
            ..Default::default()
        },
        ..Default::default()
    };

    let created = orch.Create(&f.DataObject()).await.unwrap();
    return Function::FromDataObject(created).unwrap();
}

fn FuncPodsSelector(fn_: &Function) -> ListOption {
    return ListOption {
        labelSelector: Labels::NewFromSlice(&[(LABEL_FUNCTION_UID, fn_.uid.as_str())]),
    };
}

async fn FuncPodCount(orch: &Arc<dyn OrchClient>, fn_: &Function) -> usize {
    let pods = orch
        .List(FuncPod::KEY, "default", &FuncPodsSelector(fn_))
        .await
        .unwrap();
    return pods.objs.len();
}

async fn EnvDeploymentCount(orch: &Arc<dyn OrchClient>, env: &Environment) -> usize {
    let opts = ListOption {
        labelSelector: Labels::NewFromSlice(&[(LABEL_ENVIRONMENT_UID, env.uid.as_str())]),
    };
    let deployments = orch.List(Deployment::KEY, "default", &opts).await.unwrap();
    return deployments.objs.len();
}

async fn InjectPodEvent(orch: &Arc<dyn OrchClient>, podName: &str, reason: &str) {
    let event = PodEvent {
        objType: PodEvent::KEY.to_owned(),
        namespace: "default".to_owned(),
        name: format!("{}.17f2a9c", podName),
        object: PodEventSpec {
            reason: reason.to_owned(),
            message: "".to_owned(),
        },
        ..Default::default()
    };

    orch.Create(&event.DataObject()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestColdStartAndCacheHit() {
    let stack = Setup("instance-cold").await;
    let env = CreateEnv(&stack.orch, "env-a", 3).await;
    let fn_ = CreateFunc(&stack.orch, "fn-a", "env-a", "http://pkgs/fn-a.zip", None).await;

    let svc = stack.gpm.GetFuncSvc(&fn_).await.unwrap();
    assert_eq!(svc.executor, ExecutorType::PoolMgr);
    assert!(svc.address.contains("127.0.0.1"));

    // second call hits the cache and returns the same address
    let cached = stack.gpm.GetFuncSvcFromCache(&fn_).unwrap();
    assert_eq!(cached.address, svc.address);

    // entry validates against a live ready pod once the informer caught
    // up
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(stack.gpm.IsValid(&svc));

    // exactly one deployment backs the environment
    assert_eq!(EnvDeploymentCount(&stack.orch, &env).await, 1);

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestConcurrentColdStartsSinglePool() {
    let stack = Setup("instance-herd").await;
    let env = CreateEnv(&stack.orch, "env-herd", 2).await;

    let mut fns = Vec::new();
    for i in 0..8 {
        fns.push(
            CreateFunc(
                &stack.orch,
                &format!("fn-herd-{}", i),
                "env-herd",
                "http://pkgs/fn.zip",
                None,
            )
            .await,
        );
    }

    let mut js: JoinSet<bool> = JoinSet::new();
    for f in &fns {
        let gpm = stack.gpm.clone();
        let f = f.clone();
        js.spawn(async move {
            return gpm.GetFuncSvc(&f).await.is_ok();
        });
    }

    let mut ok = 0;
    while let Some(res) = js.join_next().await {
        if res.unwrap() {
            ok += 1;
        }
    }

    assert_eq!(ok, 8);

    // a thundering herd still constructs exactly one pool per env UID
    assert_eq!(EnvDeploymentCount(&stack.orch, &env).await, 1);

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestSameFunctionSpecializationDeduped() {
    let stack = Setup("instance-dedup").await;
    CreateEnv(&stack.orch, "env-dedup", 3).await;
    // slow package keeps the first specialization in flight while the
    // other callers attach to it
    let fn_ = CreateFunc(
        &stack.orch,
        "fn-dedup",
        "env-dedup",
        "http://pkgs/slow.zip",
        None,
    )
    .await;

    let mut js: JoinSet<String> = JoinSet::new();
    for _ in 0..10 {
        let gpm = stack.gpm.clone();
        let f = fn_.clone();
        js.spawn(async move {
            return gpm.GetFuncSvc(&f).await.unwrap().address.clone();
        });
    }

    let mut addresses = std::collections::BTreeSet::new();
    while let Some(res) = js.join_next().await {
        addresses.insert(res.unwrap());
    }

    // every caller shared the single in-flight specialization
    assert_eq!(addresses.len(), 1);
    assert_eq!(FuncPodCount(&stack.orch, &fn_).await, 1);

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestSpecializationFailure() {
    let stack = Setup("instance-fail").await;
    CreateEnv(&stack.orch, "env-fail", 2).await;
    let fn_ = CreateFunc(
        &stack.orch,
        "fn-fail",
        "env-fail",
        "http://pkgs/bad.zip",
        None,
    )
    .await;

    match stack.gpm.GetFuncSvc(&fn_).await {
        Err(Error::SpecializationFailure(_)) => (),
        r => panic!("expected SpecializationFailure, got ok={}", r.is_ok()),
    }

    // the router records the failure so lookups back off
    let function = FuncRef::ForFunction(&fn_);
    stack.gpm.MarkSpecializationFailure(&function);
    match stack.gpm.GetFuncSvcFromCache(&fn_) {
        Err(Error::SpecializationFailure(_)) => (),
        r => panic!("expected SpecializationFailure, got ok={}", r.is_ok()),
    }

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestIdleReap() {
    let stack = Setup("instance-reap").await;
    CreateEnv(&stack.orch, "env-reap", 2).await;
    let fn_ = CreateFunc(
        &stack.orch,
        "fn-reap",
        "env-reap",
        "http://pkgs/fn.zip",
        Some(1),
    )
    .await;

    let svc = stack.gpm.GetFuncSvc(&fn_).await.unwrap();
    assert_eq!(FuncPodCount(&stack.orch, &fn_).await, 1);

    // entries become visible to the reaper only past the list threshold
    tokio::time::sleep(Duration::from_secs(POOL_CACHE_MIN_AGE_SECS + 3)).await;

    match stack.gpm.GetFuncSvcFromCache(&fn_) {
        Err(Error::NotExist(_)) => (),
        r => panic!("expected NotExist after reap, got ok={}", r.is_ok()),
    }

    // the pod is gone at the orchestrator too
    assert_eq!(FuncPodCount(&stack.orch, &fn_).await, 0);
    let _ = svc;

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestWebsocketHold() {
    let stack = Setup("instance-ws").await;
    CreateEnv(&stack.orch, "env-ws", 2).await;
    let fn_ = CreateFunc(
        &stack.orch,
        "fn-ws",
        "env-ws",
        "http://pkgs/fn.zip",
        Some(1),
    )
    .await;

    let svc = stack.gpm.GetFuncSvc(&fn_).await.unwrap();

    InjectPodEvent(&stack.orch, &svc.name, EVENT_WS_CONNECTION_STARTED).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    // wait an order of magnitude past the idle timeout; the held entry
    // must survive the reaper
    tokio::time::sleep(Duration::from_secs(POOL_CACHE_MIN_AGE_SECS + 5)).await;

    let function = FuncRef::ForFunction(&fn_);
    let held = stack.gpm.fsCache.GetByFunction(&function).unwrap();
    assert_eq!(held.name, svc.name);
    assert_eq!(FuncPodCount(&stack.orch, &fn_).await, 1);

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestInactivityEviction() {
    let stack = Setup("instance-inactive").await;
    CreateEnv(&stack.orch, "env-inactive", 2).await;
    let fn_ = CreateFunc(
        &stack.orch,
        "fn-inactive",
        "env-inactive",
        "http://pkgs/fn.zip",
        None,
    )
    .await;

    let svc = stack.gpm.GetFuncSvc(&fn_).await.unwrap();

    InjectPodEvent(&stack.orch, &svc.name, EVENT_NO_ACTIVE_CONNECTIONS).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    match stack.gpm.GetFuncSvcFromCache(&fn_) {
        Err(Error::NotExist(_)) => (),
        r => panic!("expected NotExist after eviction, got ok={}", r.is_ok()),
    }

    assert_eq!(FuncPodCount(&stack.orch, &fn_).await, 0);

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestAdoption() {
    let stack = Setup("instance-new").await;
    let env = CreateEnv(&stack.orch, "env-adopt", 1).await;
    let fn_ = CreateFunc(
        &stack.orch,
        "fn-adopt",
        "env-adopt",
        "http://pkgs/fn.zip",
        None,
    )
    .await;

    // a specialized pod left behind by a previous manager instance
    let podName = "poolmgr-env-adopt-old-x7k2p1";
    let mut labels = Labels::New();
    labels.Set(LABEL_EXECUTOR_TYPE, EXECUTOR_TYPE_POOLMGR);
    labels.Set(LABEL_FUNCTION_NAME, &fn_.name);
    labels.Set(LABEL_FUNCTION_NAMESPACE, &fn_.namespace);
    labels.Set(LABEL_FUNCTION_UID, &fn_.uid);
    labels.Set(LABEL_ENVIRONMENT_NAME, &env.name);
    labels.Set(LABEL_ENVIRONMENT_NAMESPACE, &env.namespace);

    let mut annotations = Labels::New();
    annotations.Set(
        ANNOTATION_FUNCTION_RESOURCE_VERSION,
        &format!("{}", fn_.revision),
    );
    annotations.Set(ANNOTATION_SVC_HOST, "http://127.0.0.1:23456");
    annotations.Set(ANNOTATION_INSTANCE_ID, "instance-old");

    let pod = FuncPod {
        objType: FuncPod::KEY.to_owned(),
        namespace: "default".to_owned(),
        name: podName.to_owned(),
        labels: labels,
        annotations: annotations,
        object: PodDef {
            spec: PodSpec {
                image: "env-image:1".to_owned(),
                nodename: "onenode".to_owned(),
            },
            status: PodStatus {
                state: PodState::Ready,
                podIp: "127.0.0.1".to_owned(),
                hostPort: 23456,
                fetcherPort: 0,
            },
        },
        ..Default::default()
    };
    stack.orch.Create(&pod.DataObject()).await.unwrap();

    stack.gpm.AdoptExistingResources().await;

    // the cache serves the adopted entry
    let cached = stack
        .gpm
        .fsCache
        .GetByFunction(&FuncRef::ForFunction(&fn_))
        .unwrap();
    assert_eq!(cached.name, podName);
    assert_eq!(cached.address, "http://127.0.0.1:23456");

    // ownership moved to the new instance
    let obj = stack
        .orch
        .Get(FuncPod::KEY, "default", podName)
        .await
        .unwrap();
    assert_eq!(
        obj.annotations.Get(ANNOTATION_INSTANCE_ID).as_deref(),
        Some("instance-new")
    );

    // the pool-size hint rebuilt the pool during adoption
    assert_eq!(EnvDeploymentCount(&stack.orch, &env).await, 1);

    // adopting again tolerates the duplicate silently
    stack.gpm.AdoptExistingResources().await;
    assert_eq!(stack.gpm.fsCache.Len(), 1);

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestCleanupOldExecutorObjects() {
    let stack = Setup("instance-live").await;

    let mut deadLabels = Labels::New();
    deadLabels.Set(LABEL_EXECUTOR_TYPE, EXECUTOR_TYPE_POOLMGR);
    let mut deadAnnotations = Labels::New();
    deadAnnotations.Set(ANNOTATION_INSTANCE_ID, "instance-dead");

    let pod = FuncPod {
        objType: FuncPod::KEY.to_owned(),
        namespace: "default".to_owned(),
        name: "poolmgr-dead-pod".to_owned(),
        labels: deadLabels.clone(),
        annotations: deadAnnotations.clone(),
        ..Default::default()
    };
    stack.orch.Create(&pod.DataObject()).await.unwrap();

    let mut liveAnnotations = Labels::New();
    liveAnnotations.Set(ANNOTATION_INSTANCE_ID, "instance-live");
    let livePod = FuncPod {
        objType: FuncPod::KEY.to_owned(),
        namespace: "default".to_owned(),
        name: "poolmgr-live-pod".to_owned(),
        labels: deadLabels.clone(),
        annotations: liveAnnotations,
        ..Default::default()
    };
    stack.orch.Create(&livePod.DataObject()).await.unwrap();

    stack.gpm.CleanupOldExecutorObjects().await;

    assert!(stack
        .orch
        .Get(FuncPod::KEY, "default", "poolmgr-dead-pod")
        .await
        .is_err());
    assert!(stack
        .orch
        .Get(FuncPod::KEY, "default", "poolmgr-live-pod")
        .await
        .is_ok());

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestEnvChangeRecyclesPool() {
    let stack = Setup("instance-envchange").await;
    let env = CreateEnv(&stack.orch, "env-change", 2).await;
    let fn_ = CreateFunc(
        &stack.orch,
        "fn-change",
        "env-change",
        "http://pkgs/fn.zip",
        None,
    )
    .await;

    stack.gpm.GetFuncSvc(&fn_).await.unwrap();
    assert_eq!(EnvDeploymentCount(&stack.orch, &env).await, 1);

    // a changed image invalidates the warm pool
    let mut changed = stack
        .orch
        .Get(Environment::KEY, "default", "env-change")
        .await
        .unwrap();
    let mut spec = Environment::FromDataObject(changed.clone()).unwrap();
    spec.object.image = "env-image:2".to_owned();
    changed = spec.DataObject();
    stack.orch.Update(&changed).await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(EnvDeploymentCount(&stack.orch, &env).await, 0);

    // environment deletion tears the rebuilt pool down as well
    stack.gpm.GetFuncSvc(&fn_).await.unwrap();
    assert_eq!(EnvDeploymentCount(&stack.orch, &env).await, 1);

    stack
        .orch
        .Delete(Environment::KEY, "default", "env-change")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(EnvDeploymentCount(&stack.orch, &env).await, 0);

    stack.gpm.Close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn TestEnvDeletionRacesInvocation() {
    let stack = Setup("instance-race").await;
    let env = CreateEnv(&stack.orch, "env-race", 1).await;
    let fn_ = CreateFunc(
        &stack.orch,
        "fn-race",
        "env-race",
        "http://pkgs/fn.zip",
        None,
    )
    .await;

    for _ in 0..100 {
        let g1 = stack.gpm.clone();
        let env1 = env.clone();
        let cleanup = tokio::spawn(async move {
            g1.CleanupPool(&env1).await;
        });

        let g2 = stack.gpm.clone();
        let f2 = fn_.clone();
        let get = tokio::spawn(async move {
            return g2.GetFuncSvc(&f2).await;
        });

        cleanup.await.unwrap();
        match get.await.unwrap() {
            // fresh pool won the race
            Ok(svc) => assert!(svc.address.len() > 0),
            // pool destroyed under the call; an error, never a zombie
            Err(_) => (),
        }
    }

    // the registry converges: one fresh pool serves the next call
    let svc = stack.gpm.GetFuncSvc(&fn_).await.unwrap();
    assert!(svc.address.len() > 0);
    assert_eq!(EnvDeploymentCount(&stack.orch, &env).await, 1);

    stack.gpm.Close();
}
