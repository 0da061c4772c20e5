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
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use serde_json::Value;

use crate::common::*;
use crate::consts::*;
use fnpoollib::obj_mgr::env_mgr::Environment;
use fnpoollib::obj_mgr::func_mgr::Function;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorType {
    PoolMgr,
    NewDeploy,
}

impl ExecutorType {
    pub fn AsStr(&self) -> &'static str {
        match self {
            ExecutorType::PoolMgr => return EXECUTOR_TYPE_POOLMGR,
            ExecutorType::NewDeploy => return "newdeploy",
        }
    }
}

/// Identity of one function revision; the cache key of a FuncSvc.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncRef {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub revision: i64,
}

impl FuncRef {
    pub fn ForFunction(f: &Function) -> Self {
        return Self {
            namespace: f.namespace.clone(),
            name: f.name.clone(),
            uid: f.uid.clone(),
            revision: f.revision,
        };
    }

    pub fn Key(&self) -> String {
        return format!(
            "{}/{}/{}/{}",
            &self.namespace, &self.name, &self.uid, self.revision
        );
    }
}

/// Coordinates of an orchestrator object the manager owns through a
/// FuncSvc entry.
#[derive(Debug, Clone, Default)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

fn NowMillis() -> i64 {
    return Utc::now().timestamp_millis();
}

#[derive(Debug)]
pub struct FuncSvcInner {
    // container identity, unique across the cache
    pub name: String,
    pub function: FuncRef,
    pub environment: Environment,
    pub address: String,
    pub kubeObjects: Vec<ObjectRef>,
    pub executor: ExecutorType,

    pub ctime: i64,
    // unix millis, monotonically non-decreasing except on explicit reset
    atime: AtomicI64,
    pub activeRequests: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct FuncSvc(Arc<FuncSvcInner>);

impl Deref for FuncSvc {
    type Target = Arc<FuncSvcInner>;

    fn deref(&self) -> &Arc<FuncSvcInner> {
        &self.0
    }
}

impl FuncSvc {
    pub fn New(
        name: &str,
        function: FuncRef,
        environment: Environment,
        address: &str,
        kubeObjects: Vec<ObjectRef>,
        executor: ExecutorType,
    ) -> Self {
        let now = NowMillis();
        let inner = FuncSvcInner {
            name: name.to_owned(),
            function: function,
            environment: environment,
            address: address.to_owned(),
            kubeObjects: kubeObjects,
            executor: executor,
            ctime: now,
            atime: AtomicI64::new(now),
            activeRequests: AtomicUsize::new(0),
        };

        return Self(Arc::new(inner));
    }

    pub fn Atime(&self) -> i64 {
        return self.atime.load(Ordering::SeqCst);
    }

    pub fn Touch(&self) {
        self.atime.fetch_max(NowMillis(), Ordering::SeqCst);
    }

    pub fn ResetAtime(&self, millis: i64) {
        self.atime.store(millis, Ordering::SeqCst);
    }

    pub fn TimeSinceAtime(&self) -> Duration {
        let age = NowMillis() - self.Atime();
        if age <= 0 {
            return Duration::from_millis(0);
        }

        return Duration::from_millis(age as u64);
    }

    pub fn FuncKey(&self) -> String {
        return self.function.Key();
    }
}

#[derive(Debug, Default)]
pub struct FuncSvcMaps {
    pub byName: BTreeMap<String, FuncSvc>,
    pub byFunction: BTreeMap<String, FuncSvc>,
    pub byAddress: BTreeMap<String, FuncSvc>,
    // negative results from failed specializations, keyed by FuncRef key
    pub specializationFailures: BTreeMap<String, Instant>,
}

#[derive(Debug)]
pub struct FuncSvcCacheInner {
    pub entries: RwLock<FuncSvcMaps>,

    // secondary indices for event correlation, atomic per key
    pub podToFsvc: DashMap<String, FuncSvc>,
    pub websocketFsvc: DashMap<String, bool>,
}

/// Cache of live function→container bindings. One coarse lock over the
/// primary indices; the side maps are maintained inside the same
/// critical sections so event-driven lookups never observe a partially
/// updated entry.
#[derive(Debug, Clone)]
pub struct FuncSvcCache(Arc<FuncSvcCacheInner>);

impl Deref for FuncSvcCache {
    type Target = Arc<FuncSvcCacheInner>;

    fn deref(&self) -> &Arc<FuncSvcCacheInner> {
        &self.0
    }
}

impl FuncSvcCache {
    pub fn New() -> Self {
        let inner = FuncSvcCacheInner {
            entries: RwLock::new(FuncSvcMaps::default()),
            podToFsvc: DashMap::new(),
            websocketFsvc: DashMap::new(),
        };

        return Self(Arc::new(inner));
    }

    pub fn Add(&self, svc: FuncSvc) -> Result<()> {
        let mut maps = self.entries.write().unwrap();
        if maps.byName.contains_key(&svc.name) {
            return Err(Error::NameExists(format!(
                "FuncSvcCache::Add duplicate entry {}",
                &svc.name
            )));
        }

        maps.byName.insert(svc.name.clone(), svc.clone());
        maps.byFunction.insert(svc.FuncKey(), svc.clone());
        maps.byAddress.insert(svc.address.clone(), svc.clone());
        maps.specializationFailures.remove(&svc.FuncKey());
        self.podToFsvc.insert(svc.name.clone(), svc.clone());

        return Ok(());
    }

    pub fn GetFuncSvc(
        &self,
        function: &FuncRef,
        requestsPerPod: i32,
        concurrency: i32,
    ) -> Result<FuncSvc> {
        let maps = self.entries.write().unwrap();
        let key = function.Key();

        if let Some(failedAt) = maps.specializationFailures.get(&key) {
            if failedAt.elapsed() < Duration::from_secs(SPECIALIZATION_FAILURE_TTL_SECS) {
                return Err(Error::SpecializationFailure(format!(
                    "function {} specialization recently failed",
                    &key
                )));
            }
        }

        let svc = match maps.byFunction.get(&key) {
            None => {
                return Err(Error::NotExist(format!(
                    "FuncSvcCache::GetFuncSvc no entry for {}",
                    &key
                )))
            }
            Some(svc) => svc.clone(),
        };

        let cap = (requestsPerPod as i64) * (concurrency as i64);
        let active = svc.activeRequests.load(Ordering::SeqCst) as i64;
        if active >= cap {
            return Err(Error::TooManyRequests(format!(
                "function {} at capacity: {} active, cap {}",
                &key, active, cap
            )));
        }

        svc.activeRequests.fetch_add(1, Ordering::SeqCst);
        svc.Touch();
        return Ok(svc);
    }

    pub fn GetByFunction(&self, function: &FuncRef) -> Result<FuncSvc> {
        let maps = self.entries.read().unwrap();
        match maps.byFunction.get(&function.Key()) {
            None => {
                return Err(Error::NotExist(format!(
                    "FuncSvcCache::GetByFunction no entry for {}",
                    function.Key()
                )))
            }
            Some(svc) => return Ok(svc.clone()),
        }
    }

    pub fn TouchByAddress(&self, address: &str) -> Result<()> {
        let maps = self.entries.read().unwrap();
        match maps.byAddress.get(address) {
            None => {
                return Err(Error::NotExist(format!(
                    "FuncSvcCache::TouchByAddress no entry at {}",
                    address
                )))
            }
            Some(svc) => {
                svc.Touch();
                return Ok(());
            }
        }
    }

    pub fn MarkAvailable(&self, funcKey: &str, address: &str) {
        let maps = self.entries.write().unwrap();
        match maps.byAddress.get(address) {
            None => {
                error!(
                    "FuncSvcCache::MarkAvailable no entry at {} for {}",
                    address, funcKey
                );
            }
            Some(svc) => {
                if svc.FuncKey() != funcKey {
                    error!(
                        "FuncSvcCache::MarkAvailable entry at {} belongs to {}, not {}",
                        address,
                        svc.FuncKey(),
                        funcKey
                    );
                    return;
                }

                let mut active = svc.activeRequests.load(Ordering::SeqCst);
                while active > 0 {
                    match svc.activeRequests.compare_exchange(
                        active,
                        active - 1,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        Ok(_) => break,
                        Err(cur) => active = cur,
                    }
                }
            }
        }
    }

    pub fn MarkSpecializationFailure(&self, funcKey: &str) {
        let mut maps = self.entries.write().unwrap();
        maps.specializationFailures
            .insert(funcKey.to_owned(), Instant::now());
    }

    fn SameEntry(a: &FuncSvc, b: &FuncSvc) -> bool {
        return Arc::ptr_eq(&a.0, &b.0);
    }

    // drops every index of the entry; secondary indices are only removed
    // while they still point at this entry, so reaping a superseded
    // binding never unlinks its replacement
    fn DeleteEntryLocked(maps: &mut FuncSvcMaps, svc: &FuncSvc) {
        maps.byName.remove(&svc.name);
        if let Some(cur) = maps.byFunction.get(&svc.FuncKey()) {
            if Self::SameEntry(cur, svc) {
                maps.byFunction.remove(&svc.FuncKey());
            }
        }
        if let Some(cur) = maps.byAddress.get(&svc.address) {
            if Self::SameEntry(cur, svc) {
                maps.byAddress.remove(&svc.address);
            }
        }
    }

    pub fn DeleteEntry(&self, svc: &FuncSvc) {
        let mut maps = self.entries.write().unwrap();
        Self::DeleteEntryLocked(&mut maps, svc);
        self.podToFsvc.remove(&svc.name);
        self.websocketFsvc.remove(&svc.name);
    }

    // alias used by the inactivity eviction path
    pub fn DeleteFunctionSvc(&self, svc: &FuncSvc) {
        self.DeleteEntry(svc);
    }

    pub fn ListOldForPool(&self, minAge: Duration) -> Vec<FuncSvc> {
        let maps = self.entries.read().unwrap();
        let mut old = Vec::new();
        for (_, svc) in &maps.byName {
            if svc.executor != ExecutorType::PoolMgr {
                continue;
            }

            if svc.TimeSinceAtime() > minAge {
                old.push(svc.clone());
            }
        }

        return old;
    }

    // re-checks age under the exclusive lock and deletes; exactly one
    // concurrent caller gets true and owns the backing-object reap
    pub fn DeleteOldPoolCache(&self, svc: &FuncSvc, minAge: Duration) -> Result<bool> {
        let mut maps = self.entries.write().unwrap();
        let current = match maps.byName.get(&svc.name) {
            None => return Ok(false),
            Some(cur) => cur.clone(),
        };

        if current.TimeSinceAtime() < minAge {
            return Ok(false);
        }

        Self::DeleteEntryLocked(&mut maps, &current);
        self.podToFsvc.remove(&current.name);
        self.websocketFsvc.remove(&current.name);

        return Ok(true);
    }

    pub fn Len(&self) -> usize {
        return self.entries.read().unwrap().byName.len();
    }

    pub fn DumpDebugInfo(&self) -> Value {
        let maps = self.entries.read().unwrap();
        return json!({
            "entries": maps.byName.len(),
            "functions": maps.byFunction.len(),
            "addresses": maps.byAddress.len(),
            "specializationFailures": maps.specializationFailures.len(),
            "podIndex": self.podToFsvc.len(),
            "websocketHeld": self.websocketFsvc.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn TestSvc(name: &str, fnName: &str, addr: &str) -> FuncSvc {
        let function = FuncRef {
            namespace: "default".to_owned(),
            name: fnName.to_owned(),
            uid: format!("uid-{}", fnName),
            revision: 1,
        };

        return FuncSvc::New(
            name,
            function,
            Environment::default(),
            addr,
            vec![ObjectRef {
                kind: "pod".to_owned(),
                namespace: "default".to_owned(),
                name: name.to_owned(),
                uid: format!("pod-uid-{}", name),
            }],
            ExecutorType::PoolMgr,
        );
    }

    #[test]
    fn TestAddDuplicateName() {
        let cache = FuncSvcCache::New();
        let svc = TestSvc("pod-1", "fn-a", "http://127.0.0.1:20001");
        cache.Add(svc.clone()).unwrap();

        let dup = TestSvc("pod-1", "fn-b", "http://127.0.0.1:20002");
        assert!(cache.Add(dup).unwrap_err().IsNameExists());
    }

    #[test]
    fn TestAtimeNeverBehindCtime() {
        let cache = FuncSvcCache::New();
        let svc = TestSvc("pod-1", "fn-a", "http://127.0.0.1:20001");
        cache.Add(svc.clone()).unwrap();

        assert!(svc.Atime() >= svc.ctime);
        cache.TouchByAddress("http://127.0.0.1:20001").unwrap();
        assert!(svc.Atime() >= svc.ctime);

        // touches never move atime backwards
        let before = svc.Atime();
        svc.Touch();
        assert!(svc.Atime() >= before);
    }

    #[test]
    fn TestTouchByAddressMissing() {
        let cache = FuncSvcCache::New();
        assert!(cache
            .TouchByAddress("http://127.0.0.1:1")
            .unwrap_err()
            .IsNotExist());
    }

    #[test]
    fn TestGetFuncSvcCapacity() {
        let cache = FuncSvcCache::New();
        let svc = TestSvc("pod-1", "fn-a", "http://127.0.0.1:20001");
        cache.Add(svc.clone()).unwrap();

        let function = svc.function.clone();
        cache.GetFuncSvc(&function, 1, 2).unwrap();
        cache.GetFuncSvc(&function, 1, 2).unwrap();
        match cache.GetFuncSvc(&function, 1, 2) {
            Err(Error::TooManyRequests(_)) => (),
            r => panic!("expected TooManyRequests, got {:?}", r.is_ok()),
        }

        cache.MarkAvailable(&function.Key(), &svc.address);
        cache.GetFuncSvc(&function, 1, 2).unwrap();
    }

    #[test]
    fn TestSpecializationFailureNegativeCache() {
        let cache = FuncSvcCache::New();
        let function = FuncRef {
            namespace: "default".to_owned(),
            name: "fn-a".to_owned(),
            uid: "uid-a".to_owned(),
            revision: 3,
        };

        cache.MarkSpecializationFailure(&function.Key());
        match cache.GetFuncSvc(&function, 1, 1) {
            Err(Error::SpecializationFailure(_)) => (),
            r => panic!("expected SpecializationFailure, got {:?}", r.is_ok()),
        }

        // a successful add clears the negative result
        let svc = TestSvc("pod-1", "fn-a", "http://127.0.0.1:20001");
        let svc = FuncSvc::New(
            &svc.name,
            function.clone(),
            Environment::default(),
            &svc.address,
            Vec::new(),
            ExecutorType::PoolMgr,
        );
        cache.Add(svc).unwrap();
        cache.GetFuncSvc(&function, 1, 1).unwrap();
    }

    #[test]
    fn TestDeleteOldPoolCacheSingleWinner() {
        let cache = FuncSvcCache::New();
        let svc = TestSvc("pod-1", "fn-a", "http://127.0.0.1:20001");
        svc.ResetAtime(svc.ctime - 60_000);
        cache.Add(svc.clone()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let svc = svc.clone();
            handles.push(std::thread::spawn(move || {
                return cache
                    .DeleteOldPoolCache(&svc, Duration::from_secs(1))
                    .unwrap();
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.join().unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(cache.Len(), 0);
    }

    #[test]
    fn TestDeleteOldPoolCacheFreshEntry() {
        let cache = FuncSvcCache::New();
        let svc = TestSvc("pod-1", "fn-a", "http://127.0.0.1:20001");
        cache.Add(svc.clone()).unwrap();

        // freshly touched entries survive the re-check
        assert!(!cache
            .DeleteOldPoolCache(&svc, Duration::from_secs(60))
            .unwrap());
        assert_eq!(cache.Len(), 1);
    }
}
