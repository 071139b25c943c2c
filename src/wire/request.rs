//! Transaction operation request.
//!
//! A request represents a file-system transaction the kernel driver wants
//! the user-mode file system to perform.

use std::convert::TryFrom;
use std::{error, fmt, mem};

use widestring::U16Str;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

use super::abi::*;
use super::argument::{fetch_u16_str, ArgumentIterator};

/// Error that may occur while reading and parsing a request from the kernel
/// driver.
#[derive(Debug)]
pub enum RequestError {
    /// Not enough data for parsing the header (short read).
    ShortReadHeader(usize),
    /// Kernel requested an unknown operation.
    UnknownKind(u32),
    /// Not enough data for arguments (short read).
    ShortRead(usize, usize),
    /// Insufficient or malformed argument data.
    InsufficientData,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::ShortReadHeader(len) => write!(
                f,
                "Short read of transaction header ({} < {})",
                len,
                mem::size_of::<RequestHeader>()
            ),
            RequestError::UnknownKind(kind) => {
                write!(f, "Unknown transaction kind ({})", kind)
            }
            RequestError::ShortRead(len, total) => {
                write!(f, "Short read of transaction request ({} < {})", len, total)
            }
            RequestError::InsufficientData => write!(f, "Insufficient argument data"),
        }
    }
}

impl error::Error for RequestError {}

/// Opaque 128-bit identifier chosen by the provider on open/create and
/// carried verbatim on every subsequent request for that handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UserContext {
    /// First context word.
    pub context: u64,
    /// Second context word.
    pub context2: u64,
}

impl UserContext {
    /// Context of a volume-level request (no open handle).
    pub const NONE: UserContext = UserContext {
        context: 0,
        context2: 0,
    };

    pub(crate) fn from_words(context: u64, context2: u64) -> Self {
        UserContext { context, context2 }
    }

    /// Whether both context words are zero, i.e. no handle is attached.
    pub fn is_none(&self) -> bool {
        self.context == 0 && self.context2 == 0
    }
}

#[allow(missing_docs)]
mod op {
    use super::*;

    #[derive(Debug)]
    pub struct CreateOp<'a> {
        pub arg: &'a CreateReq,
    }

    impl CreateOp<'_> {
        /// Raw disposition byte from the top of the create-options word.
        pub fn disposition_byte(&self) -> u8 {
            (self.arg.create_options >> 24) as u8
        }

        /// Decoded disposition; `None` for values outside the contract.
        pub fn disposition(&self) -> Option<CreateDisposition> {
            CreateDisposition::try_from(self.disposition_byte()).ok()
        }

        /// Create-option flag bits (the disposition byte masked off).
        pub fn options(&self) -> CreateOptions {
            CreateOptions::from_bits_retain(self.arg.create_options & 0x00FF_FFFF)
        }

        pub fn flags(&self) -> CreateFlags {
            CreateFlags::from_bits_retain(self.arg.flags)
        }

        pub fn case_sensitive(&self) -> bool {
            self.flags().contains(CreateFlags::CASE_SENSITIVE)
        }

        pub fn user_mode(&self) -> bool {
            self.flags().contains(CreateFlags::USER_MODE)
        }

        pub fn has_traverse_privilege(&self) -> bool {
            self.flags().contains(CreateFlags::HAS_TRAVERSE_PRIVILEGE)
        }

        pub fn open_target_directory(&self) -> bool {
            self.flags().contains(CreateFlags::OPEN_TARGET_DIRECTORY)
        }
    }

    #[derive(Debug)]
    pub struct OverwriteOp<'a> {
        pub arg: &'a OverwriteReq,
    }

    impl OverwriteOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }

        pub fn supersede(&self) -> bool {
            self.arg.supersede != 0
        }
    }

    #[derive(Debug)]
    pub struct CleanupOp<'a> {
        pub arg: &'a CleanupReq,
    }

    impl CleanupOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }

        pub fn delete(&self) -> bool {
            self.arg.flags & CleanupReq::FLAG_DELETE != 0
        }
    }

    #[derive(Debug)]
    pub struct CloseOp<'a> {
        pub arg: &'a CloseReq,
    }

    impl CloseOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }
    }

    #[derive(Debug)]
    pub struct ReadOp<'a> {
        pub arg: &'a ReadReq,
    }

    impl ReadOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }
    }

    #[derive(Debug)]
    pub struct WriteOp<'a> {
        pub arg: &'a WriteReq,
    }

    impl WriteOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }

        pub fn write_to_end(&self) -> bool {
            self.arg.offset == WriteReq::OFFSET_WRITE_TO_END
        }

        pub fn constrained_io(&self) -> bool {
            self.arg.flags & WriteReq::FLAG_CONSTRAINED_IO != 0
        }
    }

    #[derive(Debug)]
    pub struct FlushBuffersOp<'a> {
        pub arg: &'a FlushBuffersReq,
    }

    impl FlushBuffersOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }
    }

    #[derive(Debug)]
    pub struct QueryInformationOp<'a> {
        pub arg: &'a QueryInformationReq,
    }

    impl QueryInformationOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }
    }

    /// Per-class payload of a SetInformation request.
    #[derive(Debug)]
    pub enum SetInfo<'a> {
        Basic(&'a BasicInfo),
        Allocation(&'a AllocationInfo),
        EndOfFile(&'a EndOfFileInfo),
        Disposition { delete: bool },
        Rename {
            new_file_name: &'a U16Str,
            access_token: u64,
        },
        /// An information class outside the dispatcher contract.
        Other(u32),
    }

    #[derive(Debug)]
    pub struct SetInformationOp<'a> {
        pub arg: &'a SetInformationReq,
        pub info: SetInfo<'a>,
    }

    impl SetInformationOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }
    }

    #[derive(Debug)]
    pub struct QueryVolumeInformationOp();

    #[derive(Debug)]
    pub struct SetVolumeInformationOp<'a> {
        pub arg: &'a SetVolumeInformationReq,
        /// Volume label, populated for the label information class.
        pub label: &'a U16Str,
    }

    #[derive(Debug)]
    pub struct QueryDirectoryOp<'a> {
        pub arg: &'a QueryDirectoryReq,
        pub pattern: Option<&'a U16Str>,
    }

    impl QueryDirectoryOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }
    }

    #[derive(Debug)]
    pub struct FileSystemControlOp<'a> {
        pub arg: &'a FileSystemControlReq,
        /// Control input data (e.g. the reparse record of a set operation).
        pub data: &'a [u8],
    }

    impl FileSystemControlOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }
    }

    #[derive(Debug)]
    pub struct QuerySecurityOp<'a> {
        pub arg: &'a QuerySecurityReq,
    }

    impl QuerySecurityOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }
    }

    #[derive(Debug)]
    pub struct SetSecurityOp<'a> {
        pub arg: &'a SetSecurityReq,
        pub descriptor: &'a [u8],
    }

    impl SetSecurityOp<'_> {
        pub fn user_context(&self) -> UserContext {
            UserContext::from_words(self.arg.user_context, self.arg.user_context2)
        }
    }
}
pub use op::*;

/// Transaction operation (and arguments) the kernel driver wants the file
/// system to perform.
#[derive(Debug)]
#[allow(missing_docs)]
pub enum Operation<'a> {
    Create(CreateOp<'a>),
    Overwrite(OverwriteOp<'a>),
    Cleanup(CleanupOp<'a>),
    Close(CloseOp<'a>),
    Read(ReadOp<'a>),
    Write(WriteOp<'a>),
    QueryInformation(QueryInformationOp<'a>),
    SetInformation(SetInformationOp<'a>),
    FlushBuffers(FlushBuffersOp<'a>),
    QueryVolumeInformation(QueryVolumeInformationOp),
    SetVolumeInformation(SetVolumeInformationOp<'a>),
    QueryDirectory(QueryDirectoryOp<'a>),
    FileSystemControl(FileSystemControlOp<'a>),
    QuerySecurity(QuerySecurityOp<'a>),
    SetSecurity(SetSecurityOp<'a>),
}

impl fmt::Display for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create(x) => write!(
                f,
                "CREATE disposition {:#04x}, options {:#x}, access {:#x}",
                x.disposition_byte(),
                x.options().bits(),
                x.arg.desired_access
            ),
            Operation::Overwrite(x) => write!(
                f,
                "OVERWRITE ctx {:#x}, supersede {}",
                x.arg.user_context,
                x.supersede()
            ),
            Operation::Cleanup(x) => {
                write!(f, "CLEANUP ctx {:#x}, delete {}", x.arg.user_context, x.delete())
            }
            Operation::Close(x) => write!(f, "CLOSE ctx {:#x}", x.arg.user_context),
            Operation::Read(x) => write!(
                f,
                "READ ctx {:#x}, offset {}, length {}",
                x.arg.user_context, x.arg.offset, x.arg.length
            ),
            Operation::Write(x) => write!(
                f,
                "WRITE ctx {:#x}, offset {}, length {}, constrained {}",
                x.arg.user_context,
                x.arg.offset,
                x.arg.length,
                x.constrained_io()
            ),
            Operation::QueryInformation(x) => {
                write!(f, "QUERYINFORMATION ctx {:#x}", x.arg.user_context)
            }
            Operation::SetInformation(x) => write!(
                f,
                "SETINFORMATION ctx {:#x}, class {}",
                x.arg.user_context, x.arg.class
            ),
            Operation::FlushBuffers(x) => {
                write!(f, "FLUSHBUFFERS ctx {:#x}", x.arg.user_context)
            }
            Operation::QueryVolumeInformation(_) => write!(f, "QUERYVOLUMEINFORMATION"),
            Operation::SetVolumeInformation(x) => {
                write!(f, "SETVOLUMEINFORMATION class {}", x.arg.class)
            }
            Operation::QueryDirectory(x) => write!(
                f,
                "QUERYDIRECTORY ctx {:#x}, offset {}, length {}, pattern {}",
                x.arg.user_context,
                x.arg.offset,
                x.arg.length,
                x.pattern.is_some()
            ),
            Operation::FileSystemControl(x) => write!(
                f,
                "FILESYSTEMCONTROL ctx {:#x}, code {:#x}",
                x.arg.user_context, x.arg.control_code
            ),
            Operation::QuerySecurity(x) => {
                write!(f, "QUERYSECURITY ctx {:#x}", x.arg.user_context)
            }
            Operation::SetSecurity(x) => write!(
                f,
                "SETSECURITY ctx {:#x}, information {:#x}",
                x.arg.user_context, x.arg.security_information
            ),
        }
    }
}

impl<'a> Operation<'a> {
    fn parse(
        kind: RequestKind,
        data: &mut ArgumentIterator<'a>,
        file_name_range: BufRange,
    ) -> Option<(Self, &'a U16Str)> {
        let op = match kind {
            RequestKind::Create => Operation::Create(CreateOp { arg: data.fetch()? }),
            RequestKind::Overwrite => Operation::Overwrite(OverwriteOp { arg: data.fetch()? }),
            RequestKind::Cleanup => Operation::Cleanup(CleanupOp { arg: data.fetch()? }),
            RequestKind::Close => Operation::Close(CloseOp { arg: data.fetch()? }),
            RequestKind::Read => Operation::Read(ReadOp { arg: data.fetch()? }),
            RequestKind::Write => Operation::Write(WriteOp { arg: data.fetch()? }),
            RequestKind::QueryInformation => {
                Operation::QueryInformation(QueryInformationOp { arg: data.fetch()? })
            }
            RequestKind::SetInformation => {
                let arg: &SetInformationReq = data.fetch()?;
                let buffer = data.fetch_all();
                let info = Self::parse_set_info(arg, buffer)?;
                let file_name = Self::file_name(buffer, file_name_range)?;
                return Some((
                    Operation::SetInformation(SetInformationOp { arg, info }),
                    file_name,
                ));
            }
            RequestKind::FlushBuffers => {
                Operation::FlushBuffers(FlushBuffersOp { arg: data.fetch()? })
            }
            RequestKind::QueryVolumeInformation => {
                Operation::QueryVolumeInformation(QueryVolumeInformationOp())
            }
            RequestKind::SetVolumeInformation => {
                let arg: &SetVolumeInformationReq = data.fetch()?;
                let buffer = data.fetch_all();
                let label = if arg.class == fs_info_class::FILE_FS_LABEL_INFORMATION {
                    fetch_u16_str(buffer, arg.buffer.offset as usize, arg.buffer.size as usize)?
                } else {
                    U16Str::from_slice(&[])
                };
                let file_name = Self::file_name(buffer, file_name_range)?;
                return Some((
                    Operation::SetVolumeInformation(SetVolumeInformationOp { arg, label }),
                    file_name,
                ));
            }
            RequestKind::QueryDirectory => {
                let arg: &QueryDirectoryReq = data.fetch()?;
                let buffer = data.fetch_all();
                let pattern = if arg.pattern.is_empty() {
                    None
                } else {
                    Some(fetch_u16_str(
                        buffer,
                        arg.pattern.offset as usize,
                        arg.pattern.size as usize,
                    )?)
                };
                let file_name = Self::file_name(buffer, file_name_range)?;
                return Some((
                    Operation::QueryDirectory(QueryDirectoryOp { arg, pattern }),
                    file_name,
                ));
            }
            RequestKind::FileSystemControl => {
                let arg: &FileSystemControlReq = data.fetch()?;
                let buffer = data.fetch_all();
                let range = arg.buffer;
                let data = buffer
                    .get(range.offset as usize..range.offset as usize + range.size as usize)?;
                let file_name = Self::file_name(buffer, file_name_range)?;
                return Some((
                    Operation::FileSystemControl(FileSystemControlOp { arg, data }),
                    file_name,
                ));
            }
            RequestKind::QuerySecurity => {
                Operation::QuerySecurity(QuerySecurityOp { arg: data.fetch()? })
            }
            RequestKind::SetSecurity => {
                let arg: &SetSecurityReq = data.fetch()?;
                let buffer = data.fetch_all();
                let range = arg.buffer;
                let descriptor = buffer
                    .get(range.offset as usize..range.offset as usize + range.size as usize)?;
                let file_name = Self::file_name(buffer, file_name_range)?;
                return Some((
                    Operation::SetSecurity(SetSecurityOp { arg, descriptor }),
                    file_name,
                ));
            }
        };
        let buffer = data.fetch_all();
        let file_name = Self::file_name(buffer, file_name_range)?;
        Some((op, file_name))
    }

    fn file_name(buffer: &'a [u8], range: BufRange) -> Option<&'a U16Str> {
        if range.is_empty() {
            Some(U16Str::from_slice(&[]))
        } else {
            fetch_u16_str(buffer, range.offset as usize, range.size as usize)
        }
    }

    fn parse_set_info(arg: &'a SetInformationReq, buffer: &'a [u8]) -> Option<SetInfo<'a>> {
        let info = arg.info.as_bytes();
        Some(match arg.class {
            info_class::FILE_BASIC_INFORMATION => {
                SetInfo::Basic(BasicInfo::ref_from_prefix(info).ok()?.0)
            }
            info_class::FILE_ALLOCATION_INFORMATION => {
                SetInfo::Allocation(AllocationInfo::ref_from_prefix(info).ok()?.0)
            }
            info_class::FILE_END_OF_FILE_INFORMATION => {
                SetInfo::EndOfFile(EndOfFileInfo::ref_from_prefix(info).ok()?.0)
            }
            info_class::FILE_DISPOSITION_INFORMATION => {
                let disposition = DispositionInfo::ref_from_prefix(info).ok()?.0;
                SetInfo::Disposition {
                    delete: disposition.delete != 0,
                }
            }
            info_class::FILE_RENAME_INFORMATION => {
                let rename = RenameInfo::ref_from_prefix(info).ok()?.0;
                let new_file_name = fetch_u16_str(
                    buffer,
                    rename.new_file_name.offset as usize,
                    rename.new_file_name.size as usize,
                )?;
                SetInfo::Rename {
                    new_file_name,
                    access_token: rename.access_token,
                }
            }
            class => SetInfo::Other(class),
        })
    }

    /// The user context carried by this operation, if it targets a handle.
    pub fn user_context(&self) -> Option<UserContext> {
        match self {
            Operation::Create(_)
            | Operation::QueryVolumeInformation(_)
            | Operation::SetVolumeInformation(_) => None,
            Operation::Overwrite(x) => Some(x.user_context()),
            Operation::Cleanup(x) => Some(x.user_context()),
            Operation::Close(x) => Some(x.user_context()),
            Operation::Read(x) => Some(x.user_context()),
            Operation::Write(x) => Some(x.user_context()),
            Operation::QueryInformation(x) => Some(x.user_context()),
            Operation::SetInformation(x) => Some(x.user_context()),
            Operation::FlushBuffers(x) => Some(x.user_context()),
            Operation::QueryDirectory(x) => Some(x.user_context()),
            Operation::FileSystemControl(x) => Some(x.user_context()),
            Operation::QuerySecurity(x) => Some(x.user_context()),
            Operation::SetSecurity(x) => Some(x.user_context()),
        }
    }
}

/// Transaction request the kernel driver wants the file system to perform.
#[derive(Debug)]
pub struct Request<'a> {
    header: &'a RequestHeader,
    kind: RequestKind,
    file_name: &'a U16Str,
    operation: Operation<'a>,
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WINUFS({:3}) name {:?}: {}",
            self.header.hint,
            self.file_name.to_string_lossy(),
            self.operation
        )
    }
}

impl<'a> TryFrom<&'a [u8]> for Request<'a> {
    type Error = RequestError;

    fn try_from(data: &'a [u8]) -> Result<Self, Self::Error> {
        // Parse a raw record as sent by the kernel driver into typed data.
        // Every request begins with a `RequestHeader` followed by a per-kind
        // parameter block and the trailing buffer.
        let data_len = data.len();
        let mut data = ArgumentIterator::new(data);
        let header: &RequestHeader = data
            .fetch()
            .ok_or_else(|| RequestError::ShortReadHeader(data.len()))?;
        let kind = RequestKind::try_from(header.kind)
            .map_err(|_| RequestError::UnknownKind(header.kind))?;
        if data_len < header.size as usize {
            return Err(RequestError::ShortRead(data_len, header.size as usize));
        }
        let (operation, file_name) = Operation::parse(kind, &mut data, header.file_name)
            .ok_or(RequestError::InsufficientData)?;
        Ok(Self {
            header,
            kind,
            file_name,
            operation,
        })
    }
}

impl<'a> Request<'a> {
    /// Returns the kind of this request.
    #[inline]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Returns the kernel completion hint, echoed in the response.
    #[inline]
    pub fn hint(&self) -> u64 {
        self.header.hint
    }

    /// Returns the file name carried in the request buffer (may be empty).
    #[inline]
    pub fn file_name(&self) -> &'a U16Str {
        self.file_name
    }

    /// Returns the operation (and its arguments) of this request.
    #[inline]
    pub fn operation(&self) -> &Operation<'a> {
        &self.operation
    }
}

#[cfg(test)]
mod tests {
    use super::super::test::AlignedData;
    use super::*;

    const CREATE_REQUEST: AlignedData<[u8; 60]> = AlignedData([
        0x3c, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, // size, kind
        0x0d, 0xf0, 0xad, 0xba, 0xef, 0xbe, 0xad, 0xde, // hint
        0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, // file_name, padding
        0x00, 0x00, 0x00, 0x01, 0x89, 0x00, 0x12, 0x00, // create_options, desired_access
        0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, // file_attributes, flags
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // allocation_size
        0xab, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // access_token
        0x5c, 0x00, 0x61, 0x00, // "\a"
    ]);

    const CLEANUP_REQUEST: AlignedData<[u8; 52]> = AlignedData([
        0x34, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, // size, kind
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // hint
        0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, // file_name, padding
        0x11, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // user_context
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // user_context2
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // flags, padding
        0x5c, 0x00, 0x61, 0x00, // "\a"
    ]);

    #[test]
    fn short_read_header() {
        match Request::try_from(&CREATE_REQUEST[..16]) {
            Err(RequestError::ShortReadHeader(16)) => (),
            _ => panic!("Unexpected request parsing result"),
        }
    }

    #[test]
    fn short_read() {
        match Request::try_from(&CREATE_REQUEST[..48]) {
            Err(RequestError::ShortRead(48, 60)) => (),
            _ => panic!("Unexpected request parsing result"),
        }
    }

    #[test]
    fn unknown_kind() {
        let mut data = CREATE_REQUEST.0;
        data[4] = 0xff;
        match Request::try_from(&AlignedData(data)[..]) {
            Err(RequestError::UnknownKind(0xff)) => (),
            _ => panic!("Unexpected request parsing result"),
        }
    }

    #[test]
    fn create() {
        let req = Request::try_from(&CREATE_REQUEST[..]).unwrap();
        assert_eq!(req.kind(), RequestKind::Create);
        assert_eq!(req.hint(), 0xdead_beef_baad_f00d);
        assert_eq!(req.file_name().as_slice(), [0x5c, 0x61]);
        match req.operation() {
            Operation::Create(x) => {
                assert_eq!(x.disposition(), Some(CreateDisposition::Open));
                assert_eq!(x.arg.desired_access, 0x0012_0089);
                assert_eq!(x.arg.access_token, 0xab);
                assert!(x.case_sensitive());
                assert!(!x.open_target_directory());
            }
            _ => panic!("Unexpected request operation"),
        }
    }

    #[test]
    fn cleanup() {
        let req = Request::try_from(&CLEANUP_REQUEST[..]).unwrap();
        assert_eq!(req.kind(), RequestKind::Cleanup);
        match req.operation() {
            Operation::Cleanup(x) => {
                assert_eq!(x.user_context().context, 0x1111);
                assert!(x.delete());
            }
            _ => panic!("Unexpected request operation"),
        }
        assert_eq!(
            req.operation().user_context(),
            Some(UserContext::from_words(0x1111, 0))
        );
    }
}
