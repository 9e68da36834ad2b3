// Query API backend registration endpoints
//
// Four-layer listeners bind backends directly; seven-layer listeners
// bind them per rule, identified by `locationId`. Backends are
// addressed by private IP and port.

use tracing::debug;

use crate::error::Error;
use crate::rest::client::{Params, RestClient};
use crate::rest::models::{BackendTarget, Data, ListenerBackends, ListenerHealth};

fn push_backends(params: &mut Params, backends: &[BackendTarget], with_weight: bool) {
    for (i, backend) in backends.iter().enumerate() {
        params.insert(format!("backends.{i}.lanIp"), &backend.ip);
        params.insert(format!("backends.{i}.port"), backend.port);
        if with_weight {
            params.insert(format!("backends.{i}.weight"), backend.weight);
        }
    }
}

impl RestClient {
    /// List backends bound to a listener (and to each of its rules).
    ///
    /// Action: `DescribeForwardLBBackends`
    pub async fn describe_backends(
        &self,
        lb_id: &str,
        listener_id: &str,
    ) -> Result<Vec<ListenerBackends>, Error> {
        debug!(lb_id, listener_id, "describing backends");
        let params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerIds.0", listener_id);
        let resp: Data<Vec<ListenerBackends>> =
            self.call("DescribeForwardLBBackends", params).await?;
        Ok(resp.data)
    }

    /// Action: `RegisterInstancesWithForwardLBFourthListener`
    pub async fn register_4layer_backends(
        &self,
        lb_id: &str,
        listener_id: &str,
        backends: &[BackendTarget],
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, count = backends.len(), "registering backends");
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id);
        push_backends(&mut params, backends, true);
        self.call_task("RegisterInstancesWithForwardLBFourthListener", params)
            .await
    }

    /// Action: `DeregisterInstancesFromForwardLBFourthListener`
    pub async fn deregister_4layer_backends(
        &self,
        lb_id: &str,
        listener_id: &str,
        backends: &[BackendTarget],
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, count = backends.len(), "deregistering backends");
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id);
        push_backends(&mut params, backends, false);
        self.call_task("DeregisterInstancesFromForwardLBFourthListener", params)
            .await
    }

    /// Action: `RegisterInstancesWithForwardLBSeventhListener`
    pub async fn register_7layer_backends(
        &self,
        lb_id: &str,
        listener_id: &str,
        location_id: &str,
        backends: &[BackendTarget],
    ) -> Result<Option<String>, Error> {
        debug!(
            lb_id,
            listener_id,
            location_id,
            count = backends.len(),
            "registering rule backends"
        );
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id)
            .set("locationId", location_id);
        push_backends(&mut params, backends, true);
        self.call_task("RegisterInstancesWithForwardLBSeventhListener", params)
            .await
    }

    /// Action: `DeregisterInstancesFromForwardLB`
    pub async fn deregister_7layer_backends(
        &self,
        lb_id: &str,
        listener_id: &str,
        location_id: &str,
        backends: &[BackendTarget],
    ) -> Result<Option<String>, Error> {
        debug!(
            lb_id,
            listener_id,
            location_id,
            count = backends.len(),
            "deregistering rule backends"
        );
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id)
            .set("locationId", location_id);
        push_backends(&mut params, backends, false);
        self.call_task("DeregisterInstancesFromForwardLB", params)
            .await
    }

    /// Change weights of backends already bound to a four-layer listener.
    ///
    /// Action: `ModifyForwardFourthBackendsWeight`
    pub async fn modify_4layer_backend_weights(
        &self,
        lb_id: &str,
        listener_id: &str,
        backends: &[BackendTarget],
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, count = backends.len(), "modifying backend weights");
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id);
        push_backends(&mut params, backends, true);
        self.call_task("ModifyForwardFourthBackendsWeight", params)
            .await
    }

    /// Change weights of backends already bound to a rule.
    ///
    /// Action: `ModifyForwardSeventhBackends`
    pub async fn modify_7layer_backend_weights(
        &self,
        lb_id: &str,
        listener_id: &str,
        location_id: &str,
        backends: &[BackendTarget],
    ) -> Result<Option<String>, Error> {
        debug!(
            lb_id,
            listener_id,
            location_id,
            count = backends.len(),
            "modifying rule backend weights"
        );
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id)
            .set("locationId", location_id);
        push_backends(&mut params, backends, true);
        self.call_task("ModifyForwardSeventhBackends", params).await
    }

    /// Health of every backend behind the load balancer.
    ///
    /// Action: `DescribeForwardLBHealthStatus`
    pub async fn describe_health(&self, lb_id: &str) -> Result<Vec<ListenerHealth>, Error> {
        debug!(lb_id, "describing backend health");
        let params = Params::new().set("loadBalancerId", lb_id);
        let resp: Data<Vec<ListenerHealth>> =
            self.call("DescribeForwardLBHealthStatus", params).await?;
        Ok(resp.data)
    }
}
