//! Refreshing the ACL cache.

use super::OperationKind;
use crate::context::ClientContext;
use crate::error::{SyncError, SyncResult};
use vtsync_protocol::{Request, Response};

/// Fetches the ACL set and replaces the cached copy.
#[derive(Debug, Default)]
pub struct GetAclsOp;

impl GetAclsOp {
    /// Creates the operation.
    pub fn new() -> Self {
        Self
    }

    pub(super) fn build_request(&self) -> SyncResult<Option<Request>> {
        Ok(Some(Request::GetAcls))
    }

    pub(super) fn handle_response(
        &mut self,
        ctx: &ClientContext,
        response: Response,
    ) -> SyncResult<()> {
        match response {
            Response::Acls { acls: Some(acls) } => {
                ctx.replace_acls(acls);
                Ok(())
            }
            Response::Acls { acls: None } => Err(SyncError::MalformedResponse(
                "acl response without an acl set".into(),
            )),
            other => Err(SyncError::MalformedResponse(format!(
                "unexpected {} response to get-acls",
                other.kind()
            ))),
        }
    }
}

impl From<GetAclsOp> for OperationKind {
    fn from(op: GetAclsOp) -> Self {
        OperationKind::GetAcls(op)
    }
}
