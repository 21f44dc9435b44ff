use std::collections::HashMap;

use serde::Serialize;

pub const PROXY_ENVS: [&str; 3] = ["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"];

/// Proxy settings discovered on the host that should be passed to the nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyDetails {
    pub envs: HashMap<String, String>,
}
