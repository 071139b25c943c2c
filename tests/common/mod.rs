//! Shared fixtures: raw request encoding and scripted provider/access mocks.

#![allow(dead_code)]

use std::convert::TryFrom;
use std::sync::Mutex;

use widestring::{U16Str, U16String};
use zerocopy::IntoBytes;

use winufs::wire::abi::*;
use winufs::wire::Request;
use winufs::{
    AccessCheckInput, AccessCheckReply, AccessControl, FileInfo, OpOutcome, Provider,
    ProviderCaps, ResolvedReparse, SecurityDescriptor, Status, UserContext, VolumeInfo,
};

/// Request bytes with the alignment of a real transaction record.
pub struct RequestBuf {
    words: Vec<u64>,
    len: usize,
}

impl RequestBuf {
    pub fn new(bytes: Vec<u8>) -> Self {
        let mut words = vec![0u64; bytes.len().div_ceil(8)];
        words.as_mut_bytes()[..bytes.len()].copy_from_slice(&bytes);
        RequestBuf {
            words,
            len: bytes.len(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.words.as_bytes()[..self.len]
    }

    pub fn parse(&self) -> Request<'_> {
        Request::try_from(self.as_slice()).expect("request must parse")
    }
}

pub fn path(s: &str) -> U16String {
    U16String::from_str(s)
}

pub fn encode_request(
    kind: RequestKind,
    block: &[u8],
    buffer: &[u8],
    file_name: BufRange,
) -> RequestBuf {
    let size = size_of::<RequestHeader>() + block.len() + buffer.len();
    let header = RequestHeader {
        size: size as u32,
        kind: kind.into(),
        hint: 7,
        file_name,
        padding: 0,
    };
    let mut bytes = Vec::with_capacity(size);
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(block);
    bytes.extend_from_slice(buffer);
    RequestBuf::new(bytes)
}

fn name_buffer(file_name: &str) -> (Vec<u8>, BufRange) {
    let name = path(file_name);
    let bytes = name.as_slice().as_bytes().to_vec();
    let range = BufRange {
        offset: 0,
        size: bytes.len() as u16,
    };
    (bytes, range)
}

pub struct CreateParams {
    pub disposition: CreateDisposition,
    pub options: u32,
    pub desired_access: u32,
    pub file_attributes: u32,
    pub allocation_size: u64,
    pub access_token: u64,
    pub flags: CreateFlags,
}

impl Default for CreateParams {
    fn default() -> Self {
        CreateParams {
            disposition: CreateDisposition::Open,
            options: 0,
            desired_access: access::FILE_READ_DATA,
            file_attributes: 0,
            allocation_size: 0,
            access_token: t0_token(),
            flags: CreateFlags::USER_MODE,
        }
    }
}

const fn t0_token() -> u64 {
    0x1000
}

pub fn create_request(file_name: &str, params: CreateParams) -> RequestBuf {
    let (buffer, range) = name_buffer(file_name);
    let block = CreateReq {
        create_options: params.options | (u32::from(u8::from(params.disposition)) << 24),
        desired_access: params.desired_access,
        file_attributes: params.file_attributes,
        flags: params.flags.bits(),
        allocation_size: params.allocation_size,
        access_token: params.access_token,
    };
    encode_request(RequestKind::Create, block.as_bytes(), &buffer, range)
}

pub fn create_request_raw_disposition(file_name: &str, disposition: u8) -> RequestBuf {
    let (buffer, range) = name_buffer(file_name);
    let block = CreateReq {
        create_options: u32::from(disposition) << 24,
        desired_access: access::FILE_READ_DATA,
        file_attributes: 0,
        flags: CreateFlags::USER_MODE.bits(),
        allocation_size: 0,
        access_token: t0_token(),
    };
    encode_request(RequestKind::Create, block.as_bytes(), &buffer, range)
}

pub fn overwrite_request(context: UserContext, file_attributes: u32, supersede: bool) -> RequestBuf {
    let block = OverwriteReq {
        user_context: context.context,
        user_context2: context.context2,
        file_attributes,
        supersede: supersede as u32,
    };
    encode_request(
        RequestKind::Overwrite,
        block.as_bytes(),
        &[],
        BufRange::default(),
    )
}

pub fn cleanup_request(file_name: &str, context: UserContext, delete: bool) -> RequestBuf {
    let (buffer, range) = name_buffer(file_name);
    let block = CleanupReq {
        user_context: context.context,
        user_context2: context.context2,
        flags: if delete { CleanupReq::FLAG_DELETE } else { 0 },
        padding: 0,
    };
    encode_request(RequestKind::Cleanup, block.as_bytes(), &buffer, range)
}

pub fn close_request(context: UserContext) -> RequestBuf {
    let block = CloseReq {
        user_context: context.context,
        user_context2: context.context2,
    };
    encode_request(
        RequestKind::Close,
        block.as_bytes(),
        &[],
        BufRange::default(),
    )
}

pub fn flush_request(context: UserContext) -> RequestBuf {
    let block = FlushBuffersReq {
        user_context: context.context,
        user_context2: context.context2,
    };
    encode_request(
        RequestKind::FlushBuffers,
        block.as_bytes(),
        &[],
        BufRange::default(),
    )
}

pub fn read_request(context: UserContext, offset: u64, length: u32) -> RequestBuf {
    let block = ReadReq {
        user_context: context.context,
        user_context2: context.context2,
        address: 0xbeef,
        offset,
        length,
        key: 0,
    };
    encode_request(
        RequestKind::Read,
        block.as_bytes(),
        &[],
        BufRange::default(),
    )
}

pub fn query_directory_request(context: UserContext, pattern: Option<&str>) -> RequestBuf {
    let (buffer, pattern_range) = match pattern {
        Some(pattern) => {
            let (bytes, range) = name_buffer(pattern);
            (bytes, range)
        }
        None => (Vec::new(), BufRange::default()),
    };
    let block = QueryDirectoryReq {
        user_context: context.context,
        user_context2: context.context2,
        address: 0xbeef,
        offset: 0,
        length: 4096,
        padding: 0,
        pattern: pattern_range,
        padding2: 0,
    };
    encode_request(
        RequestKind::QueryDirectory,
        block.as_bytes(),
        &buffer,
        BufRange::default(),
    )
}

fn set_information_request(
    file_name: &str,
    context: UserContext,
    class: u32,
    info: [u64; 4],
    extra: &[u8],
) -> RequestBuf {
    let (mut buffer, range) = name_buffer(file_name);
    buffer.extend_from_slice(extra);
    let block = SetInformationReq {
        user_context: context.context,
        user_context2: context.context2,
        class,
        padding: 0,
        info,
    };
    encode_request(RequestKind::SetInformation, block.as_bytes(), &buffer, range)
}

pub fn set_disposition_request(file_name: &str, context: UserContext, delete: bool) -> RequestBuf {
    let mut info = [0u64; 4];
    info.as_mut_bytes()[..4].copy_from_slice(&(delete as u32).to_le_bytes());
    set_information_request(
        file_name,
        context,
        info_class::FILE_DISPOSITION_INFORMATION,
        info,
        &[],
    )
}

pub fn set_rename_request(
    file_name: &str,
    context: UserContext,
    new_file_name: &str,
    access_token: u64,
) -> RequestBuf {
    let name_len = 2 * file_name.chars().count();
    let new_name = path(new_file_name);
    let rename = RenameInfo {
        new_file_name: BufRange {
            offset: name_len as u16,
            size: (2 * new_name.len()) as u16,
        },
        padding: 0,
        access_token,
    };
    let mut info = [0u64; 4];
    info.as_mut_bytes()[..size_of::<RenameInfo>()].copy_from_slice(rename.as_bytes());
    set_information_request(
        file_name,
        context,
        info_class::FILE_RENAME_INFORMATION,
        info,
        new_name.as_slice().as_bytes(),
    )
}

pub fn query_volume_information_request() -> RequestBuf {
    encode_request(
        RequestKind::QueryVolumeInformation,
        &[],
        &[],
        BufRange::default(),
    )
}

pub fn set_volume_label_request(label: &str) -> RequestBuf {
    let label = path(label);
    let bytes = label.as_slice().as_bytes().to_vec();
    let block = SetVolumeInformationReq {
        class: fs_info_class::FILE_FS_LABEL_INFORMATION,
        padding: 0,
        buffer: BufRange {
            offset: 0,
            size: bytes.len() as u16,
        },
        padding2: 0,
    };
    encode_request(
        RequestKind::SetVolumeInformation,
        block.as_bytes(),
        &bytes,
        BufRange::default(),
    )
}

pub fn query_security_request(context: UserContext) -> RequestBuf {
    let block = QuerySecurityReq {
        user_context: context.context,
        user_context2: context.context2,
    };
    encode_request(
        RequestKind::QuerySecurity,
        block.as_bytes(),
        &[],
        BufRange::default(),
    )
}

pub fn fsctl_request(
    file_name: &str,
    context: UserContext,
    control_code: u32,
    data: &[u8],
) -> RequestBuf {
    let (mut buffer, range) = name_buffer(file_name);
    let data_range = BufRange {
        offset: buffer.len() as u16,
        size: data.len() as u16,
    };
    buffer.extend_from_slice(data);
    let block = FileSystemControlReq {
        user_context: context.context,
        user_context2: context.context2,
        control_code,
        padding: 0,
        buffer: data_range,
        padding2: 0,
    };
    encode_request(
        RequestKind::FileSystemControl,
        block.as_bytes(),
        &buffer,
        range,
    )
}

// Scripted provider

type OpenFn =
    dyn Fn(&U16Str, u32) -> Result<(UserContext, FileInfo), Status> + Send + Sync;
type CreateFn = dyn Fn(&U16Str, Option<&SecurityDescriptor>) -> Result<(UserContext, FileInfo), Status>
    + Send
    + Sync;
type ResolveFn =
    dyn Fn(&U16Str, u16, bool) -> Result<ResolvedReparse, Status> + Send + Sync;

pub struct MockProvider {
    pub caps: ProviderCaps,
    pub on_open: Option<Box<OpenFn>>,
    pub on_create: Option<Box<CreateFn>>,
    pub on_overwrite: Option<Box<dyn Fn(UserContext) -> Result<FileInfo, Status> + Send + Sync>>,
    pub on_flush: Option<Box<dyn Fn(UserContext) -> Result<(), Status> + Send + Sync>>,
    pub on_get_file_info: Option<Box<dyn Fn(UserContext) -> Result<FileInfo, Status> + Send + Sync>>,
    pub on_can_delete: Option<Box<dyn Fn(&U16Str) -> Result<(), Status> + Send + Sync>>,
    pub on_rename: Option<Box<dyn Fn(&U16Str, &U16Str, bool) -> Result<(), Status> + Send + Sync>>,
    pub on_read: Option<Box<dyn Fn(u64, u32) -> Result<OpOutcome<u32>, Status> + Send + Sync>>,
    pub on_get_security_by_name: Option<Box<dyn Fn(&U16Str) -> Result<(), Status> + Send + Sync>>,
    pub on_get_security: Option<Box<dyn Fn(&mut [u8]) -> Result<usize, Status> + Send + Sync>>,
    pub on_set_volume_label:
        Option<Box<dyn Fn(&U16Str) -> Result<VolumeInfo, Status> + Send + Sync>>,
    pub on_resolve_reparse_points: Option<Box<ResolveFn>>,
    pub on_get_reparse_point:
        Option<Box<dyn Fn(&U16Str, &mut [u8]) -> Result<usize, Status> + Send + Sync>>,
    pub on_set_reparse_point: Option<Box<dyn Fn(&U16Str, &[u8]) -> Result<(), Status> + Send + Sync>>,
    pub closed: Mutex<Vec<UserContext>>,
    pub cleaned_up: Mutex<Vec<(Option<U16String>, bool)>>,
    pub renamed: Mutex<Vec<(U16String, U16String, bool)>>,
    pub opened_names: Mutex<Vec<U16String>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        MockProvider {
            caps: ProviderCaps::empty(),
            on_open: None,
            on_create: None,
            on_overwrite: None,
            on_flush: None,
            on_get_file_info: None,
            on_can_delete: None,
            on_rename: None,
            on_read: None,
            on_get_security_by_name: None,
            on_get_security: None,
            on_set_volume_label: None,
            on_resolve_reparse_points: None,
            on_get_reparse_point: None,
            on_set_reparse_point: None,
            closed: Mutex::new(Vec::new()),
            cleaned_up: Mutex::new(Vec::new()),
            renamed: Mutex::new(Vec::new()),
            opened_names: Mutex::new(Vec::new()),
        }
    }
}

impl MockProvider {
    pub fn with_caps(caps: ProviderCaps) -> Self {
        MockProvider {
            caps,
            ..MockProvider::default()
        }
    }
}

impl Provider for MockProvider {
    fn caps(&self) -> ProviderCaps {
        self.caps
    }

    fn get_security_by_name(
        &self,
        file_name: &U16Str,
        _descriptor: Option<&mut Vec<u8>>,
    ) -> Result<(), Status> {
        match &self.on_get_security_by_name {
            Some(f) => f(file_name),
            None => Ok(()),
        }
    }

    fn create(
        &self,
        _req: &Request<'_>,
        file_name: &U16Str,
        _case_sensitive: bool,
        _create_options: u32,
        _file_attributes: u32,
        security_descriptor: Option<&SecurityDescriptor>,
        _allocation_size: u64,
    ) -> Result<(UserContext, FileInfo), Status> {
        match &self.on_create {
            Some(f) => f(file_name, security_descriptor),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn open(
        &self,
        _req: &Request<'_>,
        file_name: &U16Str,
        _case_sensitive: bool,
        create_options: u32,
    ) -> Result<(UserContext, FileInfo), Status> {
        self.opened_names.lock().unwrap().push(file_name.to_ustring());
        match &self.on_open {
            Some(f) => f(file_name, create_options),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn overwrite(
        &self,
        _req: &Request<'_>,
        context: UserContext,
        _file_attributes: u32,
        _supersede: bool,
    ) -> Result<FileInfo, Status> {
        match &self.on_overwrite {
            Some(f) => f(context),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn cleanup(
        &self,
        _req: &Request<'_>,
        _context: UserContext,
        file_name: Option<&U16Str>,
        delete: bool,
    ) {
        self.cleaned_up
            .lock()
            .unwrap()
            .push((file_name.map(|n| n.to_ustring()), delete));
    }

    fn close(&self, _req: &Request<'_>, context: UserContext) {
        self.closed.lock().unwrap().push(context);
    }

    fn read(
        &self,
        _req: &Request<'_>,
        _context: UserContext,
        _address: u64,
        offset: u64,
        length: u32,
    ) -> Result<OpOutcome<u32>, Status> {
        match &self.on_read {
            Some(f) => f(offset, length),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn flush(&self, _req: &Request<'_>, context: UserContext) -> Result<(), Status> {
        match &self.on_flush {
            Some(f) => f(context),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn get_file_info(&self, _req: &Request<'_>, context: UserContext) -> Result<FileInfo, Status> {
        match &self.on_get_file_info {
            Some(f) => f(context),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn can_delete(
        &self,
        _req: &Request<'_>,
        _context: UserContext,
        file_name: &U16Str,
    ) -> Result<(), Status> {
        match &self.on_can_delete {
            Some(f) => f(file_name),
            None => Ok(()),
        }
    }

    fn rename(
        &self,
        _req: &Request<'_>,
        _context: UserContext,
        file_name: &U16Str,
        new_file_name: &U16Str,
        replace_if_exists: bool,
    ) -> Result<(), Status> {
        self.renamed.lock().unwrap().push((
            file_name.to_ustring(),
            new_file_name.to_ustring(),
            replace_if_exists,
        ));
        match &self.on_rename {
            Some(f) => f(file_name, new_file_name, replace_if_exists),
            None => Ok(()),
        }
    }

    fn get_volume_info(&self, _req: &Request<'_>) -> Result<VolumeInfo, Status> {
        Ok(VolumeInfo {
            total_size: 1 << 30,
            free_size: 1 << 29,
            ..VolumeInfo::default()
        })
    }

    fn set_volume_label(&self, _req: &Request<'_>, label: &U16Str) -> Result<VolumeInfo, Status> {
        match &self.on_set_volume_label {
            Some(f) => f(label),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn resolve_reparse_points(
        &self,
        file_name: &U16Str,
        reparse_index: u16,
        open_reparse_point: bool,
        _max_size: usize,
    ) -> Result<ResolvedReparse, Status> {
        match &self.on_resolve_reparse_points {
            Some(f) => f(file_name, reparse_index, open_reparse_point),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn get_reparse_point(
        &self,
        _req: &Request<'_>,
        _context: UserContext,
        file_name: &U16Str,
        buffer: &mut [u8],
    ) -> Result<usize, Status> {
        match &self.on_get_reparse_point {
            Some(f) => f(file_name, buffer),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn set_reparse_point(
        &self,
        _req: &Request<'_>,
        _context: UserContext,
        file_name: &U16Str,
        data: &[u8],
    ) -> Result<(), Status> {
        match &self.on_set_reparse_point {
            Some(f) => f(file_name, data),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }

    fn get_security(
        &self,
        _req: &Request<'_>,
        _context: UserContext,
        descriptor: &mut [u8],
    ) -> Result<usize, Status> {
        match &self.on_get_security {
            Some(f) => f(descriptor),
            None => Err(Status::INVALID_DEVICE_REQUEST),
        }
    }
}

// Scripted access control

type CheckFn = dyn Fn(&AccessCheckInput<'_>) -> Result<AccessCheckReply, Status> + Send + Sync;

pub struct MockAccessControl {
    pub on_check: Box<CheckFn>,
    pub descriptor: Option<SecurityDescriptor>,
}

impl MockAccessControl {
    /// Grants every check its requested access.
    pub fn allow_all() -> Self {
        MockAccessControl {
            on_check: Box::new(|input| {
                Ok(AccessCheckReply::Granted {
                    access: input.desired_access,
                    descriptor: input
                        .check_parent
                        .then(|| SecurityDescriptor::new(vec![0x01, 0x02])),
                })
            }),
            descriptor: Some(SecurityDescriptor::new(vec![0x03, 0x04])),
        }
    }

    pub fn scripted(on_check: Box<CheckFn>) -> Self {
        MockAccessControl {
            on_check,
            descriptor: Some(SecurityDescriptor::new(vec![0x03, 0x04])),
        }
    }
}

impl AccessControl for MockAccessControl {
    fn access_check(&self, input: &AccessCheckInput<'_>) -> Result<AccessCheckReply, Status> {
        (self.on_check)(input)
    }

    fn create_security_descriptor(
        &self,
        _input: &AccessCheckInput<'_>,
        _parent: Option<&SecurityDescriptor>,
    ) -> Result<Option<SecurityDescriptor>, Status> {
        Ok(self.descriptor.clone())
    }
}
