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

#![allow(dead_code)]
#![allow(non_snake_case)]
#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

#[macro_use]
extern crate fpshare;

use std::sync::Arc;

use fpshare::common::*;
use fpshare::gpm_config::GPM_CONFIG;
use fpshare::orchestrator::client::OrchClient;
use fpshare::orchestrator::cluster::MemCluster;
use fpshare::orchestrator::unique_id::{NewUid, INSTANCE_ID};
use fpshare::poolmgr::admin::AdminHttpSrv;
use fpshare::poolmgr::gpm::Gpm;
use fpshare::poolmgr::metrics::{InitTracer, GPM_METRICS};
use fpshare::poolmgr::pool_pod_controller::PoolPodController;
use fpshare::print::LOG;

pub fn LogPanic(info: &str) {
    error!("{}", info);
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|info: &std::panic::PanicHookInfo<'_>| {
        let backtrace: backtrace::Backtrace = backtrace::Backtrace::new();
        if let Some(s) = info.payload().downcast_ref::<&str>() {
            eprintln!("Panic message: {}", s);
            LogPanic(&format!("Panic message: {}", s));
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            eprintln!("Panic message: {}", s);
            LogPanic(&format!("Panic message: {}", s));
        } else {
            eprintln!("Panic occurred but can't get the message.");
        }
        eprintln!("Panic occurred: {:?}", info);
        eprintln!("Backtrace:\n{:?}", backtrace);
        LogPanic(&format!("Panic occurred: {:?}", info));
        LogPanic(&format!("Backtrace:\n{:?}", backtrace));
        unsafe {
            libc::exit(1);
        }
    }));

    LOG.SetServiceName("poolmgr");
    info!("poolmgr start ...");

    InitTracer().await;
    GPM_METRICS.lock().await.Register().await;

    let config = GPM_CONFIG.clone();

    let instanceId = NewUid();
    INSTANCE_ID.set(instanceId.clone()).unwrap();
    info!("poolmgr instance id {}", &instanceId);

    // onenode: the orchestration substrate runs in-process
    let orch: Arc<dyn OrchClient> = Arc::new(MemCluster::New(config.fetcherPort));

    let poolPodC = PoolPodController::New(&orch).await?;
    let gpm = Gpm::New(&orch, &poolPodC, &config, &instanceId)?;
    poolPodC.InjectGpm(&gpm);

    // reclaim whatever a previous process left behind before informers
    // come up
    gpm.CleanupOldExecutorObjects().await;

    // adopt surviving pods once the caches are warm
    let adoptGpm = gpm.clone();
    tokio::spawn(async move {
        adoptGpm.poolPodC.WaitListDone().await;
        adoptGpm.AdoptExistingResources().await;
        info!("adoption of existing resources done");
    });

    tokio::select! {
        res = gpm.Run() => {
            error!("gpm finish with res {:?}", &res.is_ok());
        }
        res = AdminHttpSrv(gpm.clone(), config.adminPort) => {
            error!("admin http server finish with res {:?}", &res.is_ok());
        }
    }

    return Ok(());
}
