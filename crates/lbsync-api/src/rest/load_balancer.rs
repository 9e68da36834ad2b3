// Query API load balancer endpoints

use tracing::debug;

use crate::error::Error;
use crate::rest::client::{Params, RestClient};
use crate::rest::models::{CreateLoadBalancerResponse, LoadBalancer, LoadBalancerSet};
use crate::task::Created;

impl RestClient {
    /// Create one application load balancer.
    ///
    /// Action: `CreateLoadBalancer` (`forward=1`, `number=1`)
    pub async fn create_load_balancer(
        &self,
        name: &str,
        lb_type: i64,
        vpc_id: Option<&str>,
        subnet_id: Option<&str>,
    ) -> Result<Created, Error> {
        debug!(name, lb_type, "creating load balancer");
        let mut params = Params::new()
            .set("loadBalancerName", name)
            .set("loadBalancerType", lb_type)
            .set("forward", 1)
            .set("number", 1);
        params.insert_opt("vpcId", vpc_id);
        params.insert_opt("subnetId", subnet_id);

        let resp: CreateLoadBalancerResponse = self.call("CreateLoadBalancer", params).await?;
        let id = resp.first_id().ok_or(Error::MissingField {
            action: "CreateLoadBalancer",
            field: "unLoadBalancerIds",
        })?;
        Ok(Created {
            id: id.to_owned(),
            task_id: resp.request_id.map(|id| id.to_string()),
        })
    }

    /// Look up application load balancers by exact name.
    ///
    /// Action: `DescribeLoadBalancers`
    pub async fn describe_load_balancers_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<LoadBalancer>, Error> {
        debug!(name, "describing load balancers");
        let params = Params::new()
            .set("loadBalancerName", name)
            .set("forward", 1);
        let resp: LoadBalancerSet = self.call("DescribeLoadBalancers", params).await?;
        // The name filter is a fuzzy match on the provider side.
        Ok(resp
            .load_balancer_set
            .into_iter()
            .filter(|lb| lb.load_balancer_name == name)
            .collect())
    }
}
