//! ACL command implementation.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use vtsync_engine::ClientConfig;
use vtsync_protocol::{Acl, AclId};
use vtsync_server::{ServerConfig, SyncServer};

/// An ACL as printed.
#[derive(Debug, Serialize)]
pub struct AclEntry {
    /// ACL id.
    pub id: String,
    /// Principals granted by the ACL.
    pub principals: Vec<String>,
}

/// Parses `id=principal,principal` (principals optional).
pub fn parse_acl(arg: &str) -> Result<Acl, String> {
    let (id, principals) = arg.split_once('=').unwrap_or((arg, ""));
    if id.is_empty() {
        return Err(format!("invalid acl {arg:?}: empty id"));
    }
    let principals = principals
        .split(',')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Acl::new(AclId::new(id), principals))
}

/// Runs the acls command.
pub async fn run(acls: Vec<Acl>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = acls
        .into_iter()
        .fold(ServerConfig::default(), |config, acl| config.with_acl(acl));
    let server = Arc::new(SyncServer::new(config));
    let client = super::connect(&server, ClientConfig::default());

    let op = client.refresh_acls();
    tokio::time::timeout(Duration::from_secs(10), op.wait_finished())
        .await
        .map_err(|_| "timed out waiting for acls")?;
    if let Some(e) = op.error() {
        return Err(e.into());
    }

    let entries: Vec<AclEntry> = client
        .acls()
        .iter()
        .map(|acl| AclEntry {
            id: acl.id.to_string(),
            principals: acl.principals.clone(),
        })
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            if entries.is_empty() {
                println!("No ACLs defined");
            }
            for entry in &entries {
                println!("{:<16} {}", entry.id, entry.principals.join(", "));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_acl_arguments() {
        let acl = parse_acl("staff=ana,bo").unwrap();
        assert_eq!(acl.id, AclId::new("staff"));
        assert_eq!(acl.principals, vec!["ana".to_string(), "bo".to_string()]);

        let acl = parse_acl("guests").unwrap();
        assert!(acl.principals.is_empty());

        assert!(parse_acl("=ana").is_err());
    }

    #[tokio::test]
    async fn acls_round_trip_through_server() {
        run(vec![parse_acl("staff=ana").unwrap()], "text")
            .await
            .unwrap();
    }
}
