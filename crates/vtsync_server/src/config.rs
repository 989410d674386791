//! Server configuration.

use vtsync_protocol::{Acl, AclSet};

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of revisions returned by one advance.
    pub max_advance_batch: usize,
    /// Maximum number of values returned by one fetch.
    pub max_fetch_batch: usize,
    /// ACLs known at startup.
    pub acls: AclSet,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            max_advance_batch: 100,
            max_fetch_batch: 100,
            acls: AclSet::new(),
        }
    }

    /// Sets the maximum advance batch size.
    pub fn with_max_advance_batch(mut self, size: usize) -> Self {
        self.max_advance_batch = size.max(1);
        self
    }

    /// Sets the maximum fetch batch size.
    pub fn with_max_fetch_batch(mut self, size: usize) -> Self {
        self.max_fetch_batch = size.max(1);
        self
    }

    /// Adds an ACL.
    pub fn with_acl(mut self, acl: Acl) -> Self {
        self.acls.insert(acl);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtsync_protocol::AclId;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_advance_batch, 100);
        assert!(config.acls.is_empty());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_advance_batch(2)
            .with_max_fetch_batch(0)
            .with_acl(Acl::new(AclId::new("staff"), vec!["ana".into()]));

        assert_eq!(config.max_advance_batch, 2);
        assert_eq!(config.max_fetch_batch, 1);
        assert!(config.acls.get(&AclId::new("staff")).is_some());
    }
}
