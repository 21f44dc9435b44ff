use super::types::{NodeCache, NodeFacts};

// Every field moves from unset to set at most once; later writes of the
// same fact are ignored.
impl NodeCache {
    pub async fn kube_version(&self) -> Option<String> {
        let facts = self.facts.read().await;
        non_empty(&facts.kubernetes_version)
    }

    pub async fn ip(&self) -> Option<String> {
        let facts = self.facts.read().await;
        non_empty(&facts.ip)
    }

    pub async fn host_port(&self, container_port: u16) -> Option<u16> {
        self.facts.read().await.ports.get(&container_port).copied()
    }

    pub async fn role(&self) -> Option<String> {
        let facts = self.facts.read().await;
        non_empty(&facts.role)
    }

    pub async fn set_kube_version(&self, version: &str) {
        self.update(|facts| set_if_unset(&mut facts.kubernetes_version, version))
            .await;
    }

    pub async fn set_ip(&self, ip: &str) {
        self.update(|facts| set_if_unset(&mut facts.ip, ip)).await;
    }

    pub async fn set_host_port(&self, container_port: u16, host_port: u16) {
        self.update(|facts| {
            facts.ports.entry(container_port).or_insert(host_port);
        })
        .await;
    }

    pub async fn set_role(&self, role: &str) {
        self.update(|facts| set_if_unset(&mut facts.role, role)).await;
    }

    /// Runs `setter` under the write lock. It must not block.
    async fn update(&self, setter: impl FnOnce(&mut NodeFacts)) {
        let mut facts = self.facts.write().await;
        setter(&mut facts);
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn set_if_unset(field: &mut String, value: &str) {
    if field.is_empty() {
        *field = value.to_string();
    }
}
