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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::common::*;
use crate::orchestrator::client::{ListOption, OrchClient};
use crate::orchestrator::informer::EventHandler;
use crate::orchestrator::informer_factory::InformerFactory;
use crate::orchestrator::store::ThreadSafeStore;
use fnpoollib::data_obj::*;
use fnpoollib::obj_mgr::env_mgr::*;
use fnpoollib::obj_mgr::func_mgr::*;
use fnpoollib::obj_mgr::pod_mgr::*;

use super::gpm::Gpm;

enum ListType {
    env,
    func,
    pod,
}

#[derive(Debug)]
pub struct PoolPodControllerInner {
    pub envMgr: EnvironmentMgr,
    pub funcMgr: FunctionMgr,
    pub podMgr: PodMgr,

    pub factory: InformerFactory,

    pub envListDone: AtomicBool,
    pub funcListDone: AtomicBool,
    pub podListDone: AtomicBool,
    pub listDone: AtomicBool,
    pub listNotify: Arc<Notify>,

    // back-reference installed after construction to break the cycle
    pub gpm: Mutex<Option<Gpm>>,
}

/// Event-driven derived state: local caches of environments, functions
/// and pods, plus the environment-deletion hook that tears pools down.
#[derive(Debug, Clone)]
pub struct PoolPodController(Arc<PoolPodControllerInner>);

impl Deref for PoolPodController {
    type Target = Arc<PoolPodControllerInner>;

    fn deref(&self) -> &Arc<PoolPodControllerInner> {
        &self.0
    }
}

impl PoolPodController {
    pub async fn New(orch: &Arc<dyn OrchClient>) -> Result<Self> {
        let factory = InformerFactory::New(orch.clone(), "").await?;

        factory.AddInformer(Environment::KEY, &ListOption::default())?;
        factory.AddInformer(Function::KEY, &ListOption::default())?;
        factory.AddInformer(FuncPod::KEY, &ListOption::default())?;

        let inner = PoolPodControllerInner {
            envMgr: EnvironmentMgr::default(),
            funcMgr: FunctionMgr::default(),
            podMgr: PodMgr::default(),
            factory: factory,
            envListDone: AtomicBool::new(false),
            funcListDone: AtomicBool::new(false),
            podListDone: AtomicBool::new(false),
            listDone: AtomicBool::new(false),
            listNotify: Arc::new(Notify::new()),
            gpm: Mutex::new(None),
        };

        let controller = Self(Arc::new(inner));
        controller
            .factory
            .AddEventHandler(Arc::new(controller.clone()))
            .await?;

        return Ok(controller);
    }

    pub fn InjectGpm(&self, gpm: &Gpm) {
        *self.gpm.lock().unwrap() = Some(gpm.clone());
    }

    pub fn Gpm(&self) -> Option<Gpm> {
        return self.gpm.lock().unwrap().clone();
    }

    pub fn GetEnv(&self, namespace: &str, name: &str) -> Result<Environment> {
        let env = self.envMgr.Get(namespace, name)?;
        return Ok(env);
    }

    pub fn GetEnvs(&self) -> Vec<Environment> {
        return self.envMgr.GetObjects("").unwrap_or_default();
    }

    pub fn GetFunc(&self, namespace: &str, name: &str) -> Result<Function> {
        let f = self.funcMgr.Get(namespace, name)?;
        return Ok(f);
    }

    pub fn GetFuncs(&self) -> Vec<Function> {
        return self.funcMgr.GetObjects("").unwrap_or_default();
    }

    pub fn GetPod(&self, namespace: &str, name: &str) -> Result<FuncPod> {
        let pod = self.podMgr.Get(namespace, name)?;
        return Ok(pod);
    }

    pub fn ListDone(&self) -> bool {
        return self.listDone.load(Ordering::Relaxed);
    }

    pub async fn WaitListDone(&self) {
        loop {
            let notified = self.listNotify.notified();
            if self.ListDone() {
                return;
            }
            notified.await;
        }
    }

    fn SetListDone(&self, type_: ListType) {
        match type_ {
            ListType::env => {
                self.envListDone.store(true, Ordering::SeqCst);
            }
            ListType::func => {
                self.funcListDone.store(true, Ordering::SeqCst);
            }
            ListType::pod => {
                self.podListDone.store(true, Ordering::SeqCst);
            }
        }

        if self.envListDone.load(Ordering::Relaxed)
            && self.funcListDone.load(Ordering::Relaxed)
            && self.podListDone.load(Ordering::Relaxed)
        {
            self.listDone.store(true, Ordering::SeqCst);
            self.listNotify.notify_waiters();
        }
    }

    // a changed image or pool size invalidates every warm pod, so the
    // old pool is destroyed and the next GetFuncSvc builds a fresh one
    fn EnvNeedsPoolRebuild(old: &Environment, new: &Environment) -> bool {
        if old.object.image != new.object.image {
            return true;
        }

        if old.PoolSize() != new.PoolSize() {
            return true;
        }

        return false;
    }

    async fn EnvDelete(&self, env: Environment) {
        info!(
            "environment {}/{} deleted, cleaning up pool",
            &env.namespace, &env.name
        );

        match self.Gpm() {
            None => {
                error!("PoolPodController: no gpm injected, dropping env delete");
            }
            Some(gpm) => {
                gpm.CleanupPool(&env).await;
            }
        }
    }

    async fn EnvUpdate(&self, old: Environment, new: Environment) {
        if !Self::EnvNeedsPoolRebuild(&old, &new) {
            return;
        }

        info!(
            "environment {}/{} changed, recycling pool",
            &new.namespace, &new.name
        );

        match self.Gpm() {
            None => {
                error!("PoolPodController: no gpm injected, dropping env update");
            }
            Some(gpm) => {
                gpm.CleanupPool(&new).await;
            }
        }
    }

    pub async fn ProcessDeltaEvent(&self, event: &DeltaEvent) -> Result<()> {
        let obj = event.obj.clone();
        match &event.type_ {
            EventType::Added => match &obj.objType as &str {
                Environment::KEY => {
                    let env = Environment::FromDataObject(obj)?;
                    match self.envMgr.Add(env) {
                        Ok(()) => (),
                        Err(e) if e.IsExist() => (),
                        Err(e) => return Err(e.into()),
                    }
                }
                Function::KEY => {
                    let f = Function::FromDataObject(obj)?;
                    match self.funcMgr.Add(f) {
                        Ok(()) => (),
                        Err(e) if e.IsExist() => (),
                        Err(e) => return Err(e.into()),
                    }
                }
                FuncPod::KEY => {
                    let pod = FuncPod::FromDataObject(obj)?;
                    match self.podMgr.Add(pod) {
                        Ok(()) => (),
                        Err(e) if e.IsExist() => (),
                        Err(e) => return Err(e.into()),
                    }
                }
                _ => {
                    return Err(Error::CommonError(format!(
                        "PoolPodController::ProcessDeltaEvent {:?}",
                        event
                    )));
                }
            },
            EventType::Modified => match &obj.objType as &str {
                Environment::KEY => {
                    let env = Environment::FromDataObject(obj)?;
                    match self.envMgr.Update(env.clone()) {
                        Ok(()) => (),
                        Err(e) if e.IsNotExist() => {
                            self.envMgr.Add(env.clone()).ok();
                        }
                        Err(e) => return Err(e.into()),
                    }

                    if let Some(oldObj) = &event.oldObj {
                        let old = Environment::FromDataObject(oldObj.clone())?;
                        self.EnvUpdate(old, env).await;
                    }
                }
                Function::KEY => {
                    let f = Function::FromDataObject(obj)?;
                    match self.funcMgr.Update(f.clone()) {
                        Ok(()) => (),
                        Err(e) if e.IsNotExist() => {
                            self.funcMgr.Add(f).ok();
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                FuncPod::KEY => {
                    let pod = FuncPod::FromDataObject(obj)?;
                    match self.podMgr.Update(pod.clone()) {
                        Ok(()) => (),
                        Err(e) if e.IsNotExist() => {
                            self.podMgr.Add(pod).ok();
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                _ => {
                    return Err(Error::CommonError(format!(
                        "PoolPodController::ProcessDeltaEvent {:?}",
                        event
                    )));
                }
            },
            EventType::Deleted => match &obj.objType as &str {
                Environment::KEY => {
                    let env = Environment::FromDataObject(obj)?;
                    self.envMgr.Remove(env.clone()).ok();
                    self.EnvDelete(env).await;
                }
                Function::KEY => {
                    let f = Function::FromDataObject(obj)?;
                    self.funcMgr.Remove(f).ok();
                }
                FuncPod::KEY => {
                    let pod = FuncPod::FromDataObject(obj)?;
                    self.podMgr.Remove(pod).ok();
                }
                _ => {
                    return Err(Error::CommonError(format!(
                        "PoolPodController::ProcessDeltaEvent {:?}",
                        event
                    )));
                }
            },
            EventType::InitDone => match &obj.objType as &str {
                Environment::KEY => {
                    self.SetListDone(ListType::env);
                }
                Function::KEY => {
                    self.SetListDone(ListType::func);
                }
                FuncPod::KEY => {
                    self.SetListDone(ListType::pod);
                }
                _ => {
                    return Err(Error::CommonError(format!(
                        "PoolPodController::InitDone {:?}",
                        event
                    )));
                }
            },
            _ => {
                return Err(Error::CommonError(format!(
                    "PoolPodController::ProcessDeltaEvent {:?}",
                    event
                )));
            }
        }

        return Ok(());
    }

    // drives the informer event loops until close
    pub async fn Run(&self, notify: Arc<Notify>) -> Result<()> {
        return self.factory.Process(notify).await;
    }

    pub fn Close(&self) -> Result<()> {
        return self.factory.Close();
    }
}

#[async_trait]
impl EventHandler for PoolPodController {
    async fn handle(&self, _store: &ThreadSafeStore, event: &DeltaEvent) {
        match self.ProcessDeltaEvent(event).await {
            Err(e) => {
                error!(
                    "PoolPodController::handle fail for event {:?} with error {:?}",
                    event, e
                );
            }
            Ok(()) => (),
        }
    }
}
