//! Kernel driver transaction interface.
//!
//! Types and definitions shared between the kernel file-system driver and
//! the user-mode dispatcher. A transaction request carries a fixed header,
//! a per-kind parameter block and a trailing variable-length buffer holding
//! the UTF-16 file name and any auxiliary payload (rename target, search
//! pattern, reparse data, security descriptor). Offsets and sizes into the
//! trailing buffer are little-endian 16-bit values.

#![allow(missing_docs)]

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Maximum size of a transaction request record, including the buffer.
pub const TRANSACT_REQ_SIZEMAX: usize = 16 * 1024;
/// Maximum size of a transaction response record, including the buffer.
pub const TRANSACT_RSP_SIZEMAX: usize = 16 * 1024;
/// Maximum size of the variable response buffer.
pub const TRANSACT_RSP_BUFFER_SIZEMAX: usize =
    TRANSACT_RSP_SIZEMAX - size_of::<ResponseHeader>() - size_of::<OpenedRsp>();
/// Maximum size of a path carried in a transaction, in bytes.
pub const TRANSACT_PATH_SIZEMAX: usize = 1024 * size_of::<u16>();

/// Directory entries are packed at this alignment.
pub const DEFAULT_ALIGNMENT: usize = 8;

/// Path separator in the driver namespace.
pub const PATH_SEP: u16 = b'\\' as u16;

/// Transaction request kinds.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum RequestKind {
    Create = 1,
    Overwrite = 2,
    Cleanup = 3,
    Close = 4,
    Read = 5,
    Write = 6,
    QueryInformation = 7,
    SetInformation = 8,
    FlushBuffers = 9,
    QueryVolumeInformation = 10,
    SetVolumeInformation = 11,
    QueryDirectory = 12,
    FileSystemControl = 13,
    QuerySecurity = 14,
    SetSecurity = 15,
}

/// Create disposition, decoded from the top byte of the create-options word.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
pub enum CreateDisposition {
    Supersede = 0,
    Open = 1,
    Create = 2,
    OpenIf = 3,
    Overwrite = 4,
    OverwriteIf = 5,
}

bitflags! {
    /// Create-options flag bits (low 24 bits of the create-options word).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CreateOptions: u32 {
        const DIRECTORY_FILE = 0x0000_0001;
        const WRITE_THROUGH = 0x0000_0002;
        const NON_DIRECTORY_FILE = 0x0000_0040;
        const DELETE_ON_CLOSE = 0x0000_1000;
        const OPEN_REPARSE_POINT = 0x0020_0000;

        const _ = !0;
    }
}

bitflags! {
    /// Request-level flag bits of a create request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CreateFlags: u32 {
        const USER_MODE = 0x0000_0001;
        const HAS_TRAVERSE_PRIVILEGE = 0x0000_0002;
        const OPEN_TARGET_DIRECTORY = 0x0000_0004;
        const CASE_SENSITIVE = 0x0000_0008;
    }
}

/// Access-mask bits used by the dispatcher contract.
pub mod access {
    pub const FILE_READ_DATA: u32 = 0x0000_0001;
    pub const FILE_WRITE_DATA: u32 = 0x0000_0002;
    pub const FILE_ADD_FILE: u32 = 0x0000_0002;
    pub const FILE_ADD_SUBDIRECTORY: u32 = 0x0000_0004;
    pub const FILE_TRAVERSE: u32 = 0x0000_0020;
    pub const DELETE: u32 = 0x0001_0000;
    pub const READ_CONTROL: u32 = 0x0002_0000;
    pub const WRITE_DAC: u32 = 0x0004_0000;
    pub const WRITE_OWNER: u32 = 0x0008_0000;
    pub const SYNCHRONIZE: u32 = 0x0010_0000;
    pub const MAXIMUM_ALLOWED: u32 = 0x0200_0000;

    /// Generic-all mapping for file objects.
    pub const FILE_ALL_ACCESS: u32 = 0x001F_01FF;
}

/// File-attribute bits used by the dispatcher contract.
pub mod attributes {
    pub const FILE_ATTRIBUTE_READONLY: u32 = 0x0000_0001;
    pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;
    pub const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x0000_0400;
}

/// `IoStatus.Information` values of a completed create.
pub mod create_action {
    pub const FILE_SUPERSEDED: u64 = 0;
    pub const FILE_OPENED: u64 = 1;
    pub const FILE_CREATED: u64 = 2;
    pub const FILE_OVERWRITTEN: u64 = 3;
    pub const FILE_EXISTS: u64 = 4;
    pub const FILE_DOES_NOT_EXIST: u64 = 5;
}

/// File-information classes dispatched by SetInformation.
pub mod info_class {
    pub const FILE_BASIC_INFORMATION: u32 = 4;
    pub const FILE_RENAME_INFORMATION: u32 = 10;
    pub const FILE_DISPOSITION_INFORMATION: u32 = 13;
    pub const FILE_ALLOCATION_INFORMATION: u32 = 19;
    pub const FILE_END_OF_FILE_INFORMATION: u32 = 20;
}

/// Volume-information classes dispatched by SetVolumeInformation.
pub mod fs_info_class {
    pub const FILE_FS_LABEL_INFORMATION: u32 = 2;
}

/// File-system control codes handled by the dispatcher.
pub mod fsctl {
    pub const FSCTL_SET_REPARSE_POINT: u32 = 0x000900A4;
    pub const FSCTL_GET_REPARSE_POINT: u32 = 0x000900A8;
    pub const FSCTL_DELETE_REPARSE_POINT: u32 = 0x000900AC;
}

/// Reparse tag of symbolic links.
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;
/// Tag bit distinguishing Microsoft tags from third-party tags.
pub const IO_REPARSE_TAG_MICROSOFT: u32 = 0x8000_0000;
/// Symlink reparse flag: the substitute name is relative to its parent.
pub const SYMLINK_FLAG_RELATIVE: u32 = 1;

/// Offset and size of a field inside the trailing request buffer, in bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct BufRange {
    pub offset: u16,
    pub size: u16,
}

impl BufRange {
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct RequestHeader {
    /// Total record size, including the trailing buffer.
    pub size: u32,
    pub kind: u32,
    /// Kernel completion hint, echoed verbatim in the response.
    pub hint: u64,
    /// File name location in the trailing buffer (UTF-16, no terminator).
    pub file_name: BufRange,
    pub padding: u32,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct CreateReq {
    pub create_options: u32,
    pub desired_access: u32,
    pub file_attributes: u32,
    pub flags: u32,
    pub allocation_size: u64,
    pub access_token: u64,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct OverwriteReq {
    pub user_context: u64,
    pub user_context2: u64,
    pub file_attributes: u32,
    pub supersede: u32,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct CleanupReq {
    pub user_context: u64,
    pub user_context2: u64,
    /// Bit 0: delete the file on cleanup.
    pub flags: u32,
    pub padding: u32,
}

impl CleanupReq {
    pub const FLAG_DELETE: u32 = 0x0000_0001;
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct CloseReq {
    pub user_context: u64,
    pub user_context2: u64,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct ReadReq {
    pub user_context: u64,
    pub user_context2: u64,
    /// Kernel-mapped transfer address, opaque to the dispatcher.
    pub address: u64,
    pub offset: u64,
    pub length: u32,
    pub key: u32,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct WriteReq {
    pub user_context: u64,
    pub user_context2: u64,
    pub address: u64,
    /// All-ones offset requests a write to end-of-file.
    pub offset: u64,
    pub length: u32,
    pub key: u32,
    pub flags: u32,
    pub padding: u32,
}

impl WriteReq {
    pub const FLAG_CONSTRAINED_IO: u32 = 0x0000_0001;
    pub const OFFSET_WRITE_TO_END: u64 = u64::MAX;
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct FlushBuffersReq {
    pub user_context: u64,
    pub user_context2: u64,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct QueryInformationReq {
    pub user_context: u64,
    pub user_context2: u64,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct SetInformationReq {
    pub user_context: u64,
    pub user_context2: u64,
    pub class: u32,
    pub padding: u32,
    /// Per-class information, decoded according to `class`.
    pub info: [u64; 4],
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct BasicInfo {
    pub file_attributes: u32,
    pub padding: u32,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct AllocationInfo {
    pub allocation_size: u64,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct EndOfFileInfo {
    pub file_size: u64,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct DispositionInfo {
    pub delete: u32,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct RenameInfo {
    pub new_file_name: BufRange,
    pub padding: u32,
    pub access_token: u64,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct SetVolumeInformationReq {
    pub class: u32,
    pub padding: u32,
    pub buffer: BufRange,
    pub padding2: u32,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct QueryDirectoryReq {
    pub user_context: u64,
    pub user_context2: u64,
    pub address: u64,
    pub offset: u64,
    pub length: u32,
    pub padding: u32,
    /// Optional search pattern in the trailing buffer.
    pub pattern: BufRange,
    pub padding2: u32,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct FileSystemControlReq {
    pub user_context: u64,
    pub user_context2: u64,
    pub control_code: u32,
    pub padding: u32,
    /// Input data (e.g. a reparse record) in the trailing buffer.
    pub buffer: BufRange,
    pub padding2: u32,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct QuerySecurityReq {
    pub user_context: u64,
    pub user_context2: u64,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct SetSecurityReq {
    pub user_context: u64,
    pub user_context2: u64,
    pub security_information: u32,
    pub padding: u32,
    pub buffer: BufRange,
    pub padding2: u32,
}

/// File metadata exchanged with the provider and copied into responses.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct FileInfo {
    pub file_attributes: u32,
    pub reparse_tag: u32,
    pub allocation_size: u64,
    pub file_size: u64,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub index_number: u64,
}

/// Volume metadata exchanged with the provider and copied into responses.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct VolumeInfo {
    pub total_size: u64,
    pub free_size: u64,
    pub volume_label_length: u16,
    pub volume_label: [u16; 32],
    pub padding: [u16; 3],
}

impl Default for VolumeInfo {
    fn default() -> Self {
        Self {
            total_size: 0,
            free_size: 0,
            volume_label_length: 0,
            volume_label: [0; 32],
            padding: [0; 3],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct IoStatusWire {
    pub status: u32,
    pub information: u32,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct ResponseHeader {
    pub size: u32,
    pub kind: u32,
    pub hint: u64,
    pub io_status: IoStatusWire,
}

/// Response detail of a completed create: the opened handle.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct OpenedRsp {
    pub user_context: u64,
    pub user_context2: u64,
    pub granted_access: u32,
    pub padding: u32,
    pub file_info: FileInfo,
}

/// Header of a packed directory entry; the UTF-16 name follows.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct DirInfoHeader {
    /// Size of header plus name, in bytes, before alignment padding.
    pub size: u16,
    pub padding: [u16; 3],
    pub file_info: FileInfo,
}

/// Leading fields of a reparse record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct ReparseDataHeader {
    pub reparse_tag: u32,
    pub reparse_data_length: u16,
    pub reserved: u16,
}

/// Symlink-specific fields following `ReparseDataHeader`; the path buffer
/// holding the substitute and print names follows.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
pub struct SymlinkReparseHeader {
    pub substitute_name_offset: u16,
    pub substitute_name_length: u16,
    pub print_name_offset: u16,
    pub print_name_length: u16,
    pub flags: u32,
}

/// Size of the GUID that qualifies third-party reparse tags.
pub const REPARSE_GUID_SIZE: usize = 16;

/// Align a directory-entry size up to the packing unit.
#[inline]
pub const fn align_up(size: usize) -> usize {
    (size + DEFAULT_ALIGNMENT - 1) & !(DEFAULT_ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_keep_buffer_aligned() {
        // The trailing buffer must start at a u16-aligned offset for every
        // request kind, so all parameter blocks have even sizes.
        assert_eq!(size_of::<RequestHeader>() % 8, 0);
        assert_eq!(size_of::<CreateReq>() % 8, 0);
        assert_eq!(size_of::<OverwriteReq>() % 8, 0);
        assert_eq!(size_of::<CleanupReq>() % 8, 0);
        assert_eq!(size_of::<ReadReq>() % 8, 0);
        assert_eq!(size_of::<WriteReq>() % 8, 0);
        assert_eq!(size_of::<SetInformationReq>() % 8, 0);
        assert_eq!(size_of::<QueryDirectoryReq>() % 8, 0);
        assert_eq!(size_of::<FileSystemControlReq>() % 8, 0);
        assert_eq!(size_of::<SetSecurityReq>() % 8, 0);
    }

    #[test]
    fn set_information_info_fits() {
        assert!(size_of::<BasicInfo>() <= 32);
        assert!(size_of::<AllocationInfo>() <= 32);
        assert!(size_of::<EndOfFileInfo>() <= 32);
        assert!(size_of::<DispositionInfo>() <= 32);
        assert!(size_of::<RenameInfo>() <= 32);
    }

    #[test]
    fn disposition_round_trip() {
        assert_eq!(CreateDisposition::try_from(1), Ok(CreateDisposition::Open));
        assert_eq!(CreateDisposition::try_from(5), Ok(CreateDisposition::OverwriteIf));
        assert!(CreateDisposition::try_from(6).is_err());
    }

    #[test]
    fn align_up_unit() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 8);
        assert_eq!(align_up(8), 8);
        assert_eq!(align_up(9), 16);
    }
}
