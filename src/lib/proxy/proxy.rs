use super::types::{PROXY_ENVS, ProxyDetails};
use crate::lib::env::types::EnvSource;

/// Collects the host proxy settings. The upper-case variable wins when set and
/// non-empty, otherwise its lower-case alias is used.
pub fn get_proxy_details(env: &impl EnvSource) -> ProxyDetails {
    let envs = PROXY_ENVS
        .iter()
        .filter_map(|name| {
            non_empty(env.var(name))
                .or_else(|| non_empty(env.var(&name.to_lowercase())))
                .map(|value| (name.to_string(), value))
        })
        .collect();
    ProxyDetails { envs }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
