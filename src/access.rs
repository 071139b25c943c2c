//! Access-check collaborator interface.
//!
//! The dispatcher delegates policy evaluation (comparing requested access
//! against security descriptors and an access token) to a host-supplied
//! implementation of [`AccessControl`]. Only the interface is fixed here;
//! descriptor construction and ACL evaluation live with the host.

use widestring::U16Str;

use crate::status::Status;
use crate::wire::abi::{CreateFlags, CreateOptions};

/// Owned self-relative security descriptor. Dropping the value releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDescriptor(Vec<u8>);

impl SecurityDescriptor {
    /// Wrap descriptor bytes produced by the host.
    pub fn new(bytes: Vec<u8>) -> Self {
        SecurityDescriptor(bytes)
    }

    /// The raw descriptor bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// One access-check evaluation request.
///
/// `check_parent` asks for the check to run against the parent directory of
/// `file_name` instead of the file itself; `allow_traverse` permits the
/// checker to perform (and charge for) traversal of intermediate
/// directories.
#[derive(Debug)]
#[allow(missing_docs)]
pub struct AccessCheckInput<'a> {
    pub file_name: &'a U16Str,
    pub desired_access: u32,
    pub access_token: u64,
    pub create_options: CreateOptions,
    pub flags: CreateFlags,
    pub check_parent: bool,
    pub allow_traverse: bool,
}

/// Successful outcome of an access check.
#[derive(Debug)]
pub enum AccessCheckReply {
    /// Access granted with the given mask. Parent-directory checks also
    /// return the parent's security descriptor for descendant synthesis.
    Granted {
        access: u32,
        descriptor: Option<SecurityDescriptor>,
    },
    /// Traversal hit a reparse point; `index` locates the reparse component
    /// within the checked path and is handed to the reparse resolver.
    Reparse { index: u16 },
}

/// Host-supplied policy evaluation.
///
/// All other failures surface as `Err`: `ACCESS_DENIED` for policy
/// rejection, `OBJECT_NAME_NOT_FOUND`/`OBJECT_PATH_NOT_FOUND` for missing
/// path components.
pub trait AccessControl: Send + Sync {
    /// Evaluate the desired access of a create/open request.
    fn access_check(&self, input: &AccessCheckInput<'_>) -> Result<AccessCheckReply, Status>;

    /// Synthesise the security descriptor of a new object from its parent's
    /// descriptor and the creating request.
    fn create_security_descriptor(
        &self,
        input: &AccessCheckInput<'_>,
        parent: Option<&SecurityDescriptor>,
    ) -> Result<Option<SecurityDescriptor>, Status>;
}
