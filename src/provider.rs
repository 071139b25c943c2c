//! Provider operation table.
//!
//! A provider implements the actual file-system semantics behind the
//! dispatcher. Every operation is optional: [`Provider::caps`] declares the
//! entries a provider supplies, and the dispatcher reports
//! `INVALID_DEVICE_REQUEST` for any request whose required entries are
//! absent. Default method bodies back this up for entries that are called
//! despite an inaccurate capability declaration.

use bitflags::bitflags;
use widestring::U16Str;

use crate::access::SecurityDescriptor;
use crate::status::Status;
use crate::wire::abi::{FileInfo, VolumeInfo};
use crate::wire::request::Request;

pub use crate::wire::request::UserContext;

bitflags! {
    /// Operation-table entries a provider supplies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[allow(missing_docs)]
    pub struct ProviderCaps: u32 {
        const GET_SECURITY_BY_NAME = 1 << 0;
        const CREATE = 1 << 1;
        const OPEN = 1 << 2;
        const OVERWRITE = 1 << 3;
        const CLEANUP = 1 << 4;
        const CLOSE = 1 << 5;
        const READ = 1 << 6;
        const WRITE = 1 << 7;
        const FLUSH = 1 << 8;
        const GET_FILE_INFO = 1 << 9;
        const SET_BASIC_INFO = 1 << 10;
        const SET_FILE_SIZE = 1 << 11;
        const CAN_DELETE = 1 << 12;
        const RENAME = 1 << 13;
        const GET_VOLUME_INFO = 1 << 14;
        const SET_VOLUME_LABEL = 1 << 15;
        const READ_DIRECTORY = 1 << 16;
        const RESOLVE_REPARSE_POINTS = 1 << 17;
        const GET_REPARSE_POINT = 1 << 18;
        const SET_REPARSE_POINT = 1 << 19;
        const DELETE_REPARSE_POINT = 1 << 20;
        const GET_SECURITY = 1 << 21;
        const SET_SECURITY = 1 << 22;
    }
}

/// Successful completion of a transfer operation, either immediate or
/// deferred by the provider for out-of-band completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome<T> {
    /// The operation completed with this result.
    Done(T),
    /// The provider completes the operation out-of-band.
    Pending,
}

/// Reparse payload produced by a provider's resolve hook: the terminating
/// reparse tag and the encoded reparse record for the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReparse {
    /// Terminating reparse tag, reported as the response information.
    pub information: u64,
    /// Encoded reparse record for the response buffer.
    pub data: Vec<u8>,
}

/// File-system semantics supplied by the host.
///
/// Handle-producing operations return the provider-chosen [`UserContext`];
/// the kernel carries it verbatim on every subsequent operation for that
/// handle until the matching close.
#[allow(unused_variables)]
pub trait Provider: Send + Sync {
    /// The operation-table entries this provider supplies.
    fn caps(&self) -> ProviderCaps;

    /// Look up the security descriptor of a file by name. Passing `None`
    /// for `descriptor` probes existence only.
    fn get_security_by_name(
        &self,
        file_name: &U16Str,
        descriptor: Option<&mut Vec<u8>>,
    ) -> Result<(), Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn create(
        &self,
        req: &Request<'_>,
        file_name: &U16Str,
        case_sensitive: bool,
        create_options: u32,
        file_attributes: u32,
        security_descriptor: Option<&SecurityDescriptor>,
        allocation_size: u64,
    ) -> Result<(UserContext, FileInfo), Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn open(
        &self,
        req: &Request<'_>,
        file_name: &U16Str,
        case_sensitive: bool,
        create_options: u32,
    ) -> Result<(UserContext, FileInfo), Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn overwrite(
        &self,
        req: &Request<'_>,
        context: UserContext,
        file_attributes: u32,
        supersede: bool,
    ) -> Result<FileInfo, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn cleanup(
        &self,
        req: &Request<'_>,
        context: UserContext,
        file_name: Option<&U16Str>,
        delete: bool,
    ) {
    }

    fn close(&self, req: &Request<'_>, context: UserContext) {}

    fn read(
        &self,
        req: &Request<'_>,
        context: UserContext,
        address: u64,
        offset: u64,
        length: u32,
    ) -> Result<OpOutcome<u32>, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn write(
        &self,
        req: &Request<'_>,
        context: UserContext,
        address: u64,
        offset: u64,
        length: u32,
        write_to_end: bool,
        constrained_io: bool,
    ) -> Result<OpOutcome<(u32, FileInfo)>, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn flush(&self, req: &Request<'_>, context: UserContext) -> Result<(), Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn get_file_info(&self, req: &Request<'_>, context: UserContext) -> Result<FileInfo, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn set_basic_info(
        &self,
        req: &Request<'_>,
        context: UserContext,
        file_attributes: u32,
        creation_time: u64,
        last_access_time: u64,
        last_write_time: u64,
    ) -> Result<FileInfo, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    /// Set the file or allocation size; `set_allocation_size` selects which.
    fn set_file_size(
        &self,
        req: &Request<'_>,
        context: UserContext,
        new_size: u64,
        set_allocation_size: bool,
    ) -> Result<FileInfo, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn can_delete(
        &self,
        req: &Request<'_>,
        context: UserContext,
        file_name: &U16Str,
    ) -> Result<(), Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn rename(
        &self,
        req: &Request<'_>,
        context: UserContext,
        file_name: &U16Str,
        new_file_name: &U16Str,
        replace_if_exists: bool,
    ) -> Result<(), Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn get_volume_info(&self, req: &Request<'_>) -> Result<VolumeInfo, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn set_volume_label(&self, req: &Request<'_>, label: &U16Str) -> Result<VolumeInfo, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn read_directory(
        &self,
        req: &Request<'_>,
        context: UserContext,
        address: u64,
        offset: u64,
        length: u32,
        pattern: Option<&U16Str>,
    ) -> Result<OpOutcome<u32>, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    /// Resolve reparse points along `file_name`, starting at the component
    /// the access check reported. Providers typically delegate to
    /// [`crate::reparse::resolve_reparse_points`] with their own probe.
    fn resolve_reparse_points(
        &self,
        file_name: &U16Str,
        reparse_index: u16,
        open_reparse_point: bool,
        max_size: usize,
    ) -> Result<ResolvedReparse, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    /// Read the reparse data of a file. In symbolic-links-only mode the
    /// provider writes the substitute path into `buffer`; otherwise the
    /// whole reparse record. Returns the number of bytes written.
    fn get_reparse_point(
        &self,
        req: &Request<'_>,
        context: UserContext,
        file_name: &U16Str,
        buffer: &mut [u8],
    ) -> Result<usize, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    /// Set the reparse data of a file; `data` mirrors the form used by
    /// [`Provider::get_reparse_point`].
    fn set_reparse_point(
        &self,
        req: &Request<'_>,
        context: UserContext,
        file_name: &U16Str,
        data: &[u8],
    ) -> Result<(), Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn delete_reparse_point(
        &self,
        req: &Request<'_>,
        context: UserContext,
        file_name: &U16Str,
        data: &[u8],
    ) -> Result<(), Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    /// Write the security descriptor of an open file into `descriptor`,
    /// returning its size. `BUFFER_OVERFLOW` reports a descriptor too large
    /// for the response.
    fn get_security(
        &self,
        req: &Request<'_>,
        context: UserContext,
        descriptor: &mut [u8],
    ) -> Result<usize, Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }

    fn set_security(
        &self,
        req: &Request<'_>,
        context: UserContext,
        security_information: u32,
        descriptor: &[u8],
    ) -> Result<(), Status> {
        Err(Status::INVALID_DEVICE_REQUEST)
    }
}
