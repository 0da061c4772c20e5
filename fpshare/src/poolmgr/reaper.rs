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

use std::sync::Arc;

use crate::common::*;
use crate::consts::*;
use crate::orchestrator::client::{ListOption, OrchClient};
use fnpoollib::obj_mgr::deployment_mgr::Deployment;
use fnpoollib::obj_mgr::pod_mgr::FuncPod;

use super::fscache::ObjectRef;

/// Kind-aware delete of one owned orchestrator object. A missing object
/// is the goal state, not an error.
pub async fn CleanupKubeObject(orch: &Arc<dyn OrchClient>, obj: &ObjectRef) {
    let res = match obj.kind.as_str() {
        "pod" => orch.Delete(FuncPod::KEY, &obj.namespace, &obj.name).await,
        "deployment" => {
            orch.Delete(Deployment::KEY, &obj.namespace, &obj.name)
                .await
        }
        other => {
            error!("could not identify object type {} to clean up", other);
            return;
        }
    };

    match res {
        Ok(()) => (),
        Err(e) if e.IsNotExist() => (),
        Err(e) => {
            error!(
                "error cleaning up {} {}/{}: {:?}",
                &obj.kind, &obj.namespace, &obj.name, e
            );
        }
    }
}

// deletes deployments whose instance-id annotation belongs to a dead
// manager process
pub async fn CleanupDeployments(
    orch: &Arc<dyn OrchClient>,
    instanceId: &str,
    opts: &ListOption,
    namespaces: &[String],
) -> Result<()> {
    let mut errs = Vec::new();

    for ns in namespaces {
        let deployments = match orch.List(Deployment::KEY, ns, opts).await {
            Err(e) => {
                errs.push(e);
                continue;
            }
            Ok(l) => l,
        };

        for deploy in &deployments.objs {
            let id = deploy
                .annotations
                .Get(ANNOTATION_INSTANCE_ID)
                .unwrap_or_default();
            if id == instanceId {
                continue;
            }

            info!(
                "cleaning up orphaned deployment {}/{} (instance {})",
                &deploy.namespace, &deploy.name, &id
            );

            match orch.Delete(Deployment::KEY, &deploy.namespace, &deploy.name).await {
                Ok(()) => (),
                Err(e) if e.IsNotExist() => (),
                Err(e) => errs.push(e),
            }
        }
    }

    if errs.len() > 0 {
        return Err(Error::CommonError(format!(
            "CleanupDeployments: {:?}",
            errs
        )));
    }

    return Ok(());
}

// same for pods
pub async fn CleanupPods(
    orch: &Arc<dyn OrchClient>,
    instanceId: &str,
    opts: &ListOption,
    namespaces: &[String],
) -> Result<()> {
    let mut errs = Vec::new();

    for ns in namespaces {
        let pods = match orch.List(FuncPod::KEY, ns, opts).await {
            Err(e) => {
                errs.push(e);
                continue;
            }
            Ok(l) => l,
        };

        for pod in &pods.objs {
            let id = pod
                .annotations
                .Get(ANNOTATION_INSTANCE_ID)
                .unwrap_or_default();
            if id == instanceId {
                continue;
            }

            info!(
                "cleaning up orphaned pod {}/{} (instance {})",
                &pod.namespace, &pod.name, &id
            );

            match orch.Delete(FuncPod::KEY, &pod.namespace, &pod.name).await {
                Ok(()) => (),
                Err(e) if e.IsNotExist() => (),
                Err(e) => errs.push(e),
            }
        }
    }

    if errs.len() > 0 {
        return Err(Error::CommonError(format!("CleanupPods: {:?}", errs)));
    }

    return Ok(());
}
