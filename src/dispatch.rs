//! Per-request-kind operation dispatch.
//!
//! [`FileSystem`] ties a provider, an access-control collaborator and the
//! operation guard together. Each incoming transaction request is guarded,
//! translated into one or more provider calls, and its results are packed
//! into the response record. The create handler is the interesting one: it
//! realises the six disposition semantics out of the provider's open and
//! create primitives plus access checks, security-descriptor synthesis and
//! reparse-point interception.

use log::debug;
use parking_lot::RwLock;
use widestring::U16Str;
use zerocopy::{FromBytes, IntoBytes};

use crate::access::{AccessCheckInput, AccessCheckReply, AccessControl, SecurityDescriptor};
use crate::guard::{self, GuardStrategy, OpGuard};
use crate::path::path_suffix;
use crate::provider::{OpOutcome, Provider, ProviderCaps, UserContext};
use crate::status::Status;
use crate::wire::abi::{
    access as mask, attributes, create_action, fsctl, CreateDisposition, CreateFlags,
    CreateOptions, FileInfo, ReparseDataHeader, SymlinkReparseHeader, IO_REPARSE_TAG_SYMLINK,
    PATH_SEP, SYMLINK_FLAG_RELATIVE,
};
use crate::wire::request::{
    CreateOp, FileSystemControlOp, Operation, Request, SetInfo, SetInformationOp,
};
use crate::wire::response::{Response, ResponseDetail};

/// File-system creation-time configuration.
#[derive(Debug, Clone)]
pub struct FileSystemOptions {
    /// Operation-guard strategy.
    pub guard_strategy: GuardStrategy,
    /// Whether the provider stores its handle in the second context word.
    /// Both words are preserved verbatim on the wire either way.
    pub user_context2: bool,
    /// Restrict the reparse-point ioctls to symbolic links, exchanging bare
    /// substitute paths with the provider instead of raw reparse records.
    pub symbolic_links_only: bool,
}

impl Default for FileSystemOptions {
    fn default() -> Self {
        FileSystemOptions {
            guard_strategy: GuardStrategy::default(),
            user_context2: false,
            symbolic_links_only: true,
        }
    }
}

/// A user-mode file system: the dispatcher host object.
pub struct FileSystem<P> {
    provider: P,
    access: Box<dyn AccessControl>,
    options: FileSystemOptions,
    op_guard_lock: RwLock<()>,
}

impl<P> std::fmt::Debug for FileSystem<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<P: Provider> FileSystem<P> {
    /// Create a file system over the given provider and access-control
    /// collaborator.
    pub fn new(provider: P, access: Box<dyn AccessControl>, options: FileSystemOptions) -> Self {
        FileSystem {
            provider,
            access,
            options,
            op_guard_lock: RwLock::new(()),
        }
    }

    /// The provider behind this file system.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The creation-time configuration.
    pub fn options(&self) -> &FileSystemOptions {
        &self.options
    }

    /// Acquire the operation guard for a request. Dropping the returned
    /// guard releases it in the acquisition mode.
    pub fn op_enter(&self, req: &Request<'_>) -> OpGuard<'_> {
        guard::enter(&self.op_guard_lock, self.options.guard_strategy, req)
    }

    /// Guard and dispatch one request, filling in the response. The
    /// returned status is also stored in the response's I/O status; a
    /// `PENDING` response must not be shipped, the provider completes it
    /// out-of-band.
    pub fn process(&self, req: &Request<'_>, rsp: &mut Response) -> Status {
        debug!("{}", req);
        let _guard = self.op_enter(req);
        let status = self.dispatch(req, rsp);
        rsp.io_status.status = status;
        status
    }

    /// Dispatch one request without touching the operation guard.
    pub fn dispatch(&self, req: &Request<'_>, rsp: &mut Response) -> Status {
        match req.operation() {
            Operation::Create(x) => self.op_create(req, x, rsp),
            Operation::Overwrite(x) => self.op_overwrite(req, x.user_context(), x.arg, rsp),
            Operation::Cleanup(x) => self.op_cleanup(req, x.user_context(), x.delete()),
            Operation::Close(x) => self.op_close(req, x.user_context()),
            Operation::Read(x) => self.op_read(req, x.user_context(), x.arg, rsp),
            Operation::Write(x) => self.op_write(req, x, rsp),
            Operation::QueryInformation(x) => {
                self.op_query_information(req, x.user_context(), rsp)
            }
            Operation::SetInformation(x) => self.op_set_information(req, x, rsp),
            Operation::FlushBuffers(x) => self.op_flush_buffers(req, x.user_context()),
            Operation::QueryVolumeInformation(_) => self.op_query_volume_information(req, rsp),
            Operation::SetVolumeInformation(x) => {
                self.op_set_volume_information(req, x.arg.class, x.label, rsp)
            }
            Operation::QueryDirectory(x) => self.op_query_directory(req, x, rsp),
            Operation::FileSystemControl(x) => self.op_file_system_control(req, x, rsp),
            Operation::QuerySecurity(x) => self.op_query_security(req, x.user_context(), rsp),
            Operation::SetSecurity(x) => self.op_set_security(
                req,
                x.user_context(),
                x.arg.security_information,
                x.descriptor,
            ),
        }
    }

    fn caps(&self) -> ProviderCaps {
        self.provider.caps()
    }

    // Create

    fn op_create(&self, req: &Request<'_>, x: &CreateOp<'_>, rsp: &mut Response) -> Status {
        if !self
            .caps()
            .contains(ProviderCaps::CREATE | ProviderCaps::OPEN | ProviderCaps::OVERWRITE)
        {
            return Status::INVALID_DEVICE_REQUEST;
        }

        if x.open_target_directory() {
            return self.create_open_target_directory(req, x, rsp);
        }

        match x.disposition() {
            Some(CreateDisposition::Create) => self.create_new(req, x, rsp),
            Some(CreateDisposition::Open) => self.create_open(req, x, rsp),
            Some(CreateDisposition::OpenIf) => self.create_open_if(req, x, rsp),
            Some(CreateDisposition::Overwrite) | Some(CreateDisposition::Supersede) => {
                self.create_overwrite(req, x, rsp)
            }
            Some(CreateDisposition::OverwriteIf) => self.create_overwrite_if(req, x, rsp),
            None => Status::INVALID_PARAMETER,
        }
    }

    fn check_input<'a>(
        &self,
        req: &Request<'a>,
        x: &CreateOp<'_>,
        desired_access: u32,
        check_parent: bool,
        allow_traverse: bool,
    ) -> AccessCheckInput<'a> {
        AccessCheckInput {
            file_name: req.file_name(),
            desired_access,
            access_token: x.arg.access_token,
            create_options: x.options(),
            flags: x.flags(),
            check_parent,
            allow_traverse,
        }
    }

    /// Hand a reparse report from an access check to the provider's
    /// resolver; the payload becomes the response body.
    fn resolve_reparse(
        &self,
        req: &Request<'_>,
        x: &CreateOp<'_>,
        index: u16,
        rsp: &mut Response,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::RESOLVE_REPARSE_POINTS) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        let open_reparse_point = x.options().contains(CreateOptions::OPEN_REPARSE_POINT);
        match self.provider.resolve_reparse_points(
            req.file_name(),
            index,
            open_reparse_point,
            rsp.buffer_space(),
        ) {
            Ok(resolved) => {
                rsp.io_status.information = resolved.information;
                rsp.buffer.extend_from_slice(&resolved.data);
                Status::REPARSE
            }
            Err(status) => status,
        }
    }

    /// Check the parent directory for add-file/add-subdirectory access and
    /// return the granted mask plus the parent descriptor for synthesis.
    fn create_check(
        &self,
        req: &Request<'_>,
        x: &CreateOp<'_>,
        allow_traverse: bool,
        rsp: &mut Response,
    ) -> Result<(u32, Option<SecurityDescriptor>), Status> {
        let desired = if x.options().contains(CreateOptions::DIRECTORY_FILE) {
            mask::FILE_ADD_SUBDIRECTORY
        } else {
            mask::FILE_ADD_FILE
        };
        let input = self.check_input(req, x, desired, true, allow_traverse);
        match self.access.access_check(&input)? {
            AccessCheckReply::Reparse { index } => Err(self.resolve_reparse(req, x, index, rsp)),
            AccessCheckReply::Granted { descriptor, .. } => {
                // The creator gets everything when MAXIMUM_ALLOWED was
                // requested, otherwise exactly the requested access.
                let granted = if x.arg.desired_access & mask::MAXIMUM_ALLOWED != 0 {
                    mask::FILE_ALL_ACCESS
                } else {
                    x.arg.desired_access
                };
                Ok((granted, descriptor))
            }
        }
    }

    /// Check the file itself for the desired access, with DELETE implied by
    /// DELETE_ON_CLOSE and masked back out unless actually requested.
    fn open_check(
        &self,
        req: &Request<'_>,
        x: &CreateOp<'_>,
        allow_traverse: bool,
        rsp: &mut Response,
    ) -> Result<u32, Status> {
        let delete_on_close = x.options().contains(CreateOptions::DELETE_ON_CLOSE);
        let desired =
            x.arg.desired_access | if delete_on_close { mask::DELETE } else { 0 };
        let input = self.check_input(req, x, desired, false, allow_traverse);
        match self.access.access_check(&input)? {
            AccessCheckReply::Reparse { index } => Err(self.resolve_reparse(req, x, index, rsp)),
            AccessCheckReply::Granted { access, .. } => {
                let mut granted = access;
                if x.arg.desired_access & mask::MAXIMUM_ALLOWED == 0 {
                    granted &= !mask::DELETE | (x.arg.desired_access & mask::DELETE);
                }
                Ok(granted)
            }
        }
    }

    /// Open check that additionally requires DELETE (supersede) or
    /// FILE_WRITE_DATA (overwrite), with the same mask-back-out rule.
    fn overwrite_check(
        &self,
        req: &Request<'_>,
        x: &CreateOp<'_>,
        allow_traverse: bool,
        rsp: &mut Response,
    ) -> Result<u32, Status> {
        let supersede = x.disposition() == Some(CreateDisposition::Supersede);
        let delete_on_close = x.options().contains(CreateOptions::DELETE_ON_CLOSE);
        let desired = x.arg.desired_access
            | if supersede { mask::DELETE } else { mask::FILE_WRITE_DATA }
            | if delete_on_close { mask::DELETE } else { 0 };
        let input = self.check_input(req, x, desired, false, allow_traverse);
        match self.access.access_check(&input)? {
            AccessCheckReply::Reparse { index } => Err(self.resolve_reparse(req, x, index, rsp)),
            AccessCheckReply::Granted { access, .. } => {
                let mut granted = access;
                if x.arg.desired_access & mask::MAXIMUM_ALLOWED == 0 {
                    granted &= !(mask::DELETE | mask::FILE_WRITE_DATA)
                        | (x.arg.desired_access & (mask::DELETE | mask::FILE_WRITE_DATA));
                }
                Ok(granted)
            }
        }
    }

    fn open_target_directory_check(
        &self,
        req: &Request<'_>,
        x: &CreateOp<'_>,
        rsp: &mut Response,
    ) -> Result<u32, Status> {
        let input = self.check_input(req, x, x.arg.desired_access, true, true);
        match self.access.access_check(&input)? {
            AccessCheckReply::Reparse { index } => Err(self.resolve_reparse(req, x, index, rsp)),
            AccessCheckReply::Granted { access, .. } => Ok(access),
        }
    }

    /// The shared create path: parent check, descriptor synthesis, provider
    /// create. Release points of the two descriptors follow the synthesis
    /// and create calls regardless of their outcome.
    fn checked_create(
        &self,
        req: &Request<'_>,
        x: &CreateOp<'_>,
        allow_traverse: bool,
        rsp: &mut Response,
    ) -> Result<(u32, UserContext, FileInfo), Status> {
        let (granted, parent_descriptor) = self.create_check(req, x, allow_traverse, rsp)?;

        let input = self.check_input(req, x, x.arg.desired_access, true, allow_traverse);
        let object_descriptor = self
            .access
            .create_security_descriptor(&input, parent_descriptor.as_ref());
        drop(parent_descriptor);
        let object_descriptor = object_descriptor?;

        let result = self.provider.create(
            req,
            req.file_name(),
            x.case_sensitive(),
            x.arg.create_options,
            x.arg.file_attributes,
            object_descriptor.as_ref(),
            x.arg.allocation_size,
        );
        drop(object_descriptor);
        let (context, file_info) = result?;
        Ok((granted, context, file_info))
    }

    fn reply_opened(
        rsp: &mut Response,
        information: u64,
        context: UserContext,
        granted_access: u32,
        file_info: FileInfo,
    ) -> Status {
        rsp.io_status.information = information;
        rsp.detail = ResponseDetail::Opened {
            user_context: context,
            granted_access,
            file_info,
        };
        Status::SUCCESS
    }

    fn create_new(&self, req: &Request<'_>, x: &CreateOp<'_>, rsp: &mut Response) -> Status {
        let (granted, context, file_info) = match self.checked_create(req, x, true, rsp) {
            Ok(v) => v,
            Err(status) => return status,
        };
        Self::reply_opened(rsp, create_action::FILE_CREATED, context, granted, file_info)
    }

    fn create_open(&self, req: &Request<'_>, x: &CreateOp<'_>, rsp: &mut Response) -> Status {
        let granted = match self.open_check(req, x, true, rsp) {
            Ok(granted) => granted,
            Err(status) => return status,
        };
        let (context, file_info) = match self.provider.open(
            req,
            req.file_name(),
            x.case_sensitive(),
            x.arg.create_options,
        ) {
            Ok(v) => v,
            Err(status) => return status,
        };
        Self::reply_opened(rsp, create_action::FILE_OPENED, context, granted, file_info)
    }

    fn create_open_if(&self, req: &Request<'_>, x: &CreateOp<'_>, rsp: &mut Response) -> Status {
        let opened = match self.open_check(req, x, true, rsp) {
            Ok(granted) => match self.provider.open(
                req,
                req.file_name(),
                x.case_sensitive(),
                x.arg.create_options,
            ) {
                Ok((context, file_info)) => Some((granted, context, file_info)),
                Err(Status::OBJECT_NAME_NOT_FOUND) => None,
                Err(status) => return status,
            },
            Err(Status::OBJECT_NAME_NOT_FOUND) => None,
            Err(status) => return status,
        };

        match opened {
            Some((granted, context, file_info)) => {
                Self::reply_opened(rsp, create_action::FILE_OPENED, context, granted, file_info)
            }
            None => {
                // Traversal was already charged by the open check.
                match self.checked_create(req, x, false, rsp) {
                    Ok((granted, context, file_info)) => Self::reply_opened(
                        rsp,
                        create_action::FILE_CREATED,
                        context,
                        granted,
                        file_info,
                    ),
                    Err(status) => status,
                }
            }
        }
    }

    fn create_overwrite(&self, req: &Request<'_>, x: &CreateOp<'_>, rsp: &mut Response) -> Status {
        let supersede = x.disposition() == Some(CreateDisposition::Supersede);
        let granted = match self.overwrite_check(req, x, true, rsp) {
            Ok(granted) => granted,
            Err(status) => return status,
        };
        let (context, file_info) = match self.provider.open(
            req,
            req.file_name(),
            x.case_sensitive(),
            x.arg.create_options,
        ) {
            Ok(v) => v,
            Err(status) => return status,
        };
        let information = if supersede {
            create_action::FILE_SUPERSEDED
        } else {
            create_action::FILE_OVERWRITTEN
        };
        Self::reply_opened(rsp, information, context, granted, file_info)
    }

    fn create_overwrite_if(
        &self,
        req: &Request<'_>,
        x: &CreateOp<'_>,
        rsp: &mut Response,
    ) -> Status {
        let opened = match self.overwrite_check(req, x, true, rsp) {
            Ok(granted) => match self.provider.open(
                req,
                req.file_name(),
                x.case_sensitive(),
                x.arg.create_options,
            ) {
                Ok((context, file_info)) => Some((granted, context, file_info)),
                Err(Status::OBJECT_NAME_NOT_FOUND) => None,
                Err(status) => return status,
            },
            Err(Status::OBJECT_NAME_NOT_FOUND) => None,
            Err(status) => return status,
        };

        match opened {
            Some((granted, context, file_info)) => Self::reply_opened(
                rsp,
                create_action::FILE_OVERWRITTEN,
                context,
                granted,
                file_info,
            ),
            None => match self.checked_create(req, x, false, rsp) {
                Ok((granted, context, file_info)) => Self::reply_opened(
                    rsp,
                    create_action::FILE_CREATED,
                    context,
                    granted,
                    file_info,
                ),
                Err(status) => status,
            },
        }
    }

    fn create_open_target_directory(
        &self,
        req: &Request<'_>,
        x: &CreateOp<'_>,
        rsp: &mut Response,
    ) -> Status {
        let granted = match self.open_target_directory_check(req, x, rsp) {
            Ok(granted) => granted,
            Err(status) => return status,
        };

        let (parent, _suffix) = path_suffix(req.file_name());
        let (context, file_info) = match self.provider.open(
            req,
            parent,
            x.case_sensitive(),
            x.arg.create_options,
        ) {
            Ok(v) => v,
            Err(status) => return status,
        };

        // Report whether the target itself exists; without a probe the
        // caller is told it does.
        let information = if self.caps().contains(ProviderCaps::GET_SECURITY_BY_NAME) {
            match self.provider.get_security_by_name(req.file_name(), None) {
                Ok(()) => create_action::FILE_EXISTS,
                Err(_) => create_action::FILE_DOES_NOT_EXIST,
            }
        } else {
            create_action::FILE_EXISTS
        };

        Self::reply_opened(rsp, information, context, granted, file_info)
    }

    // Handle operations

    fn op_overwrite(
        &self,
        req: &Request<'_>,
        context: UserContext,
        arg: &crate::wire::abi::OverwriteReq,
        rsp: &mut Response,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::OVERWRITE) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self
            .provider
            .overwrite(req, context, arg.file_attributes, arg.supersede != 0)
        {
            Ok(file_info) => {
                rsp.detail = ResponseDetail::FileInfo(file_info);
                Status::SUCCESS
            }
            Err(status) => {
                // The kernel considers this open unacknowledged and will not
                // send a close for it; drop the handle here.
                if self.caps().contains(ProviderCaps::CLOSE) {
                    self.provider.close(req, context);
                }
                status
            }
        }
    }

    fn op_cleanup(&self, req: &Request<'_>, context: UserContext, delete: bool) -> Status {
        if self.caps().contains(ProviderCaps::CLEANUP) {
            let file_name = (!req.file_name().is_empty()).then(|| req.file_name());
            self.provider.cleanup(req, context, file_name, delete);
        }
        Status::SUCCESS
    }

    fn op_close(&self, req: &Request<'_>, context: UserContext) -> Status {
        if self.caps().contains(ProviderCaps::CLOSE) {
            self.provider.close(req, context);
        }
        Status::SUCCESS
    }

    fn op_read(
        &self,
        req: &Request<'_>,
        context: UserContext,
        arg: &crate::wire::abi::ReadReq,
        rsp: &mut Response,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::READ) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self
            .provider
            .read(req, context, arg.address, arg.offset, arg.length)
        {
            Ok(OpOutcome::Done(transferred)) => {
                rsp.io_status.information = transferred as u64;
                Status::SUCCESS
            }
            Ok(OpOutcome::Pending) => Status::PENDING,
            Err(status) => status,
        }
    }

    fn op_write(
        &self,
        req: &Request<'_>,
        x: &crate::wire::request::WriteOp<'_>,
        rsp: &mut Response,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::WRITE) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self.provider.write(
            req,
            x.user_context(),
            x.arg.address,
            x.arg.offset,
            x.arg.length,
            x.write_to_end(),
            x.constrained_io(),
        ) {
            Ok(OpOutcome::Done((transferred, file_info))) => {
                rsp.io_status.information = transferred as u64;
                rsp.detail = ResponseDetail::FileInfo(file_info);
                Status::SUCCESS
            }
            Ok(OpOutcome::Pending) => Status::PENDING,
            Err(status) => status,
        }
    }

    fn op_flush_buffers(&self, req: &Request<'_>, context: UserContext) -> Status {
        if !self.caps().contains(ProviderCaps::FLUSH) {
            return Status::SUCCESS; /* liar! */
        }
        match self.provider.flush(req, context) {
            Ok(()) => Status::SUCCESS,
            Err(status) => status,
        }
    }

    fn op_query_information(
        &self,
        req: &Request<'_>,
        context: UserContext,
        rsp: &mut Response,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::GET_FILE_INFO) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self.provider.get_file_info(req, context) {
            Ok(file_info) => {
                rsp.detail = ResponseDetail::FileInfo(file_info);
                Status::SUCCESS
            }
            Err(status) => status,
        }
    }

    fn op_set_information(
        &self,
        req: &Request<'_>,
        x: &SetInformationOp<'_>,
        rsp: &mut Response,
    ) -> Status {
        let context = x.user_context();
        let mut file_info = FileInfo::default();

        let status = match &x.info {
            SetInfo::Basic(basic) => {
                if !self.caps().contains(ProviderCaps::SET_BASIC_INFO) {
                    return Status::INVALID_DEVICE_REQUEST;
                }
                match self.provider.set_basic_info(
                    req,
                    context,
                    basic.file_attributes,
                    basic.creation_time,
                    basic.last_access_time,
                    basic.last_write_time,
                ) {
                    Ok(info) => {
                        file_info = info;
                        Status::SUCCESS
                    }
                    Err(status) => status,
                }
            }
            SetInfo::Allocation(allocation) => {
                self.set_file_size(req, context, allocation.allocation_size, true, &mut file_info)
            }
            SetInfo::EndOfFile(end_of_file) => {
                self.set_file_size(req, context, end_of_file.file_size, false, &mut file_info)
            }
            SetInfo::Disposition { delete } => {
                self.set_disposition(req, context, *delete)
            }
            SetInfo::Rename {
                new_file_name,
                access_token,
            } => self.set_rename(req, context, new_file_name, *access_token),
            SetInfo::Other(_) => Status::INVALID_DEVICE_REQUEST,
        };

        if status.is_error() {
            return status;
        }
        rsp.detail = ResponseDetail::FileInfo(file_info);
        status
    }

    fn set_file_size(
        &self,
        req: &Request<'_>,
        context: UserContext,
        new_size: u64,
        set_allocation_size: bool,
        file_info: &mut FileInfo,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::SET_FILE_SIZE) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self
            .provider
            .set_file_size(req, context, new_size, set_allocation_size)
        {
            Ok(info) => {
                *file_info = info;
                Status::SUCCESS
            }
            Err(status) => status,
        }
    }

    fn set_disposition(&self, req: &Request<'_>, context: UserContext, delete: bool) -> Status {
        if !self.caps().contains(ProviderCaps::CAN_DELETE) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        if !delete {
            return Status::SUCCESS;
        }
        // Providers without GetFileInfo forgo the READONLY precondition.
        if self.caps().contains(ProviderCaps::GET_FILE_INFO) {
            if let Ok(info) = self.provider.get_file_info(req, context) {
                if info.file_attributes & attributes::FILE_ATTRIBUTE_READONLY != 0 {
                    return Status::CANNOT_DELETE;
                }
            }
        }
        match self.provider.can_delete(req, context, req.file_name()) {
            Ok(()) => Status::SUCCESS,
            Err(status) => status,
        }
    }

    fn set_rename(
        &self,
        req: &Request<'_>,
        context: UserContext,
        new_file_name: &U16Str,
        access_token: u64,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::RENAME) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        if access_token != 0 {
            let status = self.rename_check(new_file_name, access_token);
            if status.is_error()
                && status != Status::OBJECT_PATH_NOT_FOUND
                && status != Status::OBJECT_NAME_NOT_FOUND
            {
                return status;
            }
        }
        match self.provider.rename(
            req,
            context,
            req.file_name(),
            new_file_name,
            access_token != 0,
        ) {
            Ok(()) => Status::SUCCESS,
            Err(status) => status,
        }
    }

    /// Check the rename destination for DELETE access. The destination may
    /// legitimately not exist; the caller tolerates the not-found statuses.
    fn rename_check(&self, new_file_name: &U16Str, access_token: u64) -> Status {
        // The checker works on create parameters, so state the destination
        // as the equivalent create: DELETE_ON_CLOSE forces the read-only
        // check and OPEN_REPARSE_POINT allows renaming over a reparse
        // point. Traversal was already charged when the file was opened
        // under its existing name (or by the open-target-directory create).
        let input = AccessCheckInput {
            file_name: new_file_name,
            desired_access: mask::DELETE,
            access_token,
            create_options: CreateOptions::DELETE_ON_CLOSE | CreateOptions::OPEN_REPARSE_POINT,
            flags: CreateFlags::USER_MODE,
            check_parent: false,
            allow_traverse: false,
        };
        match self.access.access_check(&input) {
            // A file system must not ask the kernel to reparse during
            // rename resolution.
            Ok(AccessCheckReply::Reparse { .. }) => Status::SUCCESS,
            Ok(AccessCheckReply::Granted { .. }) => Status::SUCCESS,
            Err(status) => status,
        }
    }

    // Volume operations

    fn op_query_volume_information(&self, req: &Request<'_>, rsp: &mut Response) -> Status {
        if !self.caps().contains(ProviderCaps::GET_VOLUME_INFO) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self.provider.get_volume_info(req) {
            Ok(volume_info) => {
                rsp.detail = ResponseDetail::VolumeInfo(volume_info);
                Status::SUCCESS
            }
            Err(status) => status,
        }
    }

    fn op_set_volume_information(
        &self,
        req: &Request<'_>,
        class: u32,
        label: &U16Str,
        rsp: &mut Response,
    ) -> Status {
        if class != crate::wire::abi::fs_info_class::FILE_FS_LABEL_INFORMATION
            || !self.caps().contains(ProviderCaps::SET_VOLUME_LABEL)
        {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self.provider.set_volume_label(req, label) {
            Ok(volume_info) => {
                rsp.detail = ResponseDetail::VolumeInfo(volume_info);
                Status::SUCCESS
            }
            Err(status) => status,
        }
    }

    fn op_query_directory(
        &self,
        req: &Request<'_>,
        x: &crate::wire::request::QueryDirectoryOp<'_>,
        rsp: &mut Response,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::READ_DIRECTORY) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self.provider.read_directory(
            req,
            x.user_context(),
            x.arg.address,
            x.arg.offset,
            x.arg.length,
            x.pattern,
        ) {
            Ok(OpOutcome::Done(transferred)) => {
                rsp.io_status.information = transferred as u64;
                Status::SUCCESS
            }
            Ok(OpOutcome::Pending) => Status::PENDING,
            Err(status) => status,
        }
    }

    // Reparse-point ioctls

    fn op_file_system_control(
        &self,
        req: &Request<'_>,
        x: &FileSystemControlOp<'_>,
        rsp: &mut Response,
    ) -> Status {
        match x.arg.control_code {
            fsctl::FSCTL_GET_REPARSE_POINT => self.fsctl_get_reparse_point(req, x, rsp),
            fsctl::FSCTL_SET_REPARSE_POINT => self.fsctl_set_reparse_point(req, x),
            fsctl::FSCTL_DELETE_REPARSE_POINT => self.fsctl_delete_reparse_point(req, x),
            _ => Status::INVALID_DEVICE_REQUEST,
        }
    }

    fn fsctl_get_reparse_point(
        &self,
        req: &Request<'_>,
        x: &FileSystemControlOp<'_>,
        rsp: &mut Response,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::GET_REPARSE_POINT) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        let context = x.user_context();

        if self.options.symbolic_links_only {
            let header_len = size_of::<ReparseDataHeader>() + size_of::<SymlinkReparseHeader>();
            // The record carries the path twice (substitute and print name).
            let max_path = (rsp.buffer_space() - header_len) / 2;
            let mut path = vec![0u8; max_path];
            let size = match self
                .provider
                .get_reparse_point(req, context, req.file_name(), &mut path)
            {
                Ok(size) => size.min(max_path),
                Err(status) => return status,
            };
            let path = &path[..size];

            // A print name drops the NT namespace prefix of the substitute.
            let nt_prefix: [u8; 8] = {
                let p = [PATH_SEP, b'?' as u16, b'?' as u16, PATH_SEP];
                let mut bytes = [0u8; 8];
                for (i, unit) in p.iter().enumerate() {
                    bytes[2 * i..2 * i + 2].copy_from_slice(&unit.to_le_bytes());
                }
                bytes
            };
            let print_offset = if size > 8 && path[..8] == nt_prefix { 8 } else { 0 };
            let relative = !(size > 2 && path[..2] == PATH_SEP.to_le_bytes());

            let symlink_len =
                size_of::<SymlinkReparseHeader>() + size + (size - print_offset);
            let header = ReparseDataHeader {
                reparse_tag: IO_REPARSE_TAG_SYMLINK,
                reparse_data_length: symlink_len as u16,
                reserved: 0,
            };
            let symlink = SymlinkReparseHeader {
                substitute_name_offset: 0,
                substitute_name_length: size as u16,
                print_name_offset: size as u16,
                print_name_length: (size - print_offset) as u16,
                flags: if relative { SYMLINK_FLAG_RELATIVE } else { 0 },
            };

            rsp.buffer.extend_from_slice(header.as_bytes());
            rsp.buffer.extend_from_slice(symlink.as_bytes());
            rsp.buffer.extend_from_slice(path);
            rsp.buffer.extend_from_slice(&path[print_offset..]);
            rsp.detail = ResponseDetail::Ioctl {
                size: (size_of::<ReparseDataHeader>() + symlink_len) as u16,
            };
            Status::SUCCESS
        } else {
            let mut record = vec![0u8; rsp.buffer_space()];
            let size = match self
                .provider
                .get_reparse_point(req, context, req.file_name(), &mut record)
            {
                Ok(size) => size.min(record.len()),
                Err(status) => return status,
            };
            rsp.buffer.extend_from_slice(&record[..size]);
            rsp.detail = ResponseDetail::Ioctl { size: size as u16 };
            Status::SUCCESS
        }
    }

    fn fsctl_set_reparse_point(&self, req: &Request<'_>, x: &FileSystemControlOp<'_>) -> Status {
        if !self.caps().contains(ProviderCaps::SET_REPARSE_POINT) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        let context = x.user_context();

        if self.options.symbolic_links_only {
            let header_len = size_of::<ReparseDataHeader>() + size_of::<SymlinkReparseHeader>();
            if x.data.len() < header_len {
                return Status::IO_REPARSE_DATA_INVALID;
            }
            let (header, rest) = match ReparseDataHeader::read_from_prefix(x.data) {
                Ok(v) => v,
                Err(_) => return Status::IO_REPARSE_DATA_INVALID,
            };
            if header.reparse_tag != IO_REPARSE_TAG_SYMLINK {
                return Status::IO_REPARSE_TAG_MISMATCH;
            }
            let (symlink, path_buffer) = match SymlinkReparseHeader::read_from_prefix(rest) {
                Ok(v) => v,
                Err(_) => return Status::IO_REPARSE_DATA_INVALID,
            };
            let offset = symlink.substitute_name_offset as usize;
            let length = symlink.substitute_name_length as usize;
            let substitute = match path_buffer.get(offset..offset + length) {
                Some(substitute) => substitute,
                None => return Status::IO_REPARSE_DATA_INVALID,
            };
            match self
                .provider
                .set_reparse_point(req, context, req.file_name(), substitute)
            {
                Ok(()) => Status::SUCCESS,
                Err(status) => status,
            }
        } else {
            match self
                .provider
                .set_reparse_point(req, context, req.file_name(), x.data)
            {
                Ok(()) => Status::SUCCESS,
                Err(status) => status,
            }
        }
    }

    fn fsctl_delete_reparse_point(
        &self,
        req: &Request<'_>,
        x: &FileSystemControlOp<'_>,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::DELETE_REPARSE_POINT) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self
            .provider
            .delete_reparse_point(req, x.user_context(), req.file_name(), x.data)
        {
            Ok(()) => Status::SUCCESS,
            Err(status) => status,
        }
    }

    // Security

    fn op_query_security(
        &self,
        req: &Request<'_>,
        context: UserContext,
        rsp: &mut Response,
    ) -> Status {
        if !self.caps().contains(ProviderCaps::GET_SECURITY) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        let mut descriptor = vec![0u8; rsp.buffer_space()];
        match self.provider.get_security(req, context, &mut descriptor) {
            Ok(size) => {
                let size = size.min(descriptor.len());
                rsp.buffer.extend_from_slice(&descriptor[..size]);
                rsp.detail = ResponseDetail::Security { size: size as u16 };
                Status::SUCCESS
            }
            // A descriptor that does not fit the response is indistinguishable
            // from a malformed one to the kernel.
            Err(Status::BUFFER_OVERFLOW) => Status::INVALID_SECURITY_DESCR,
            Err(status) => status,
        }
    }

    fn op_set_security(
        &self,
        req: &Request<'_>,
        context: UserContext,
        security_information: u32,
        descriptor: &[u8],
    ) -> Status {
        if !self.caps().contains(ProviderCaps::SET_SECURITY) {
            return Status::INVALID_DEVICE_REQUEST;
        }
        match self
            .provider
            .set_security(req, context, security_information, descriptor)
        {
            Ok(()) => Status::SUCCESS,
            Err(status) => status,
        }
    }
}
