/// Naming scheme for every key the engine touches.
///
/// All keys share a configurable prefix so several deployments can share one
/// store without colliding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn balance(&self, user: &str) -> String {
        format!("{}:balance:{}", self.prefix, user)
    }

    pub fn history(&self, user: &str) -> String {
        format!("{}:history:{}", self.prefix, user)
    }

    /// Lease key for `user` within a lock namespace.
    pub fn lock(&self, namespace: &str, user: &str) -> String {
        format!("{}:lock:{}:{}", self.prefix, namespace, user)
    }
}
