//! User-mode file-system dispatch library.
//!
//! This crate sits between a kernel file-system driver and a user-supplied
//! file-system provider. The kernel driver hands it transaction requests
//! (create/open, read, write, directory enumeration, security, reparse
//! points); the dispatcher enforces cross-cutting policy — access checks,
//! reparse-point resolution, reader/writer operation ordering — and
//! translates each request into calls on the provider's operation table,
//! packing the results into the response record the driver consumes.
//!
//! The interesting machinery:
//!
//! - [`FileSystem`] dispatches requests per kind; its create handler
//!   realises the six create dispositions out of the provider's open and
//!   create primitives plus access checks and security-descriptor
//!   synthesis.
//! - [`reparse`] walks paths and rewrites symbolic links into the reparse
//!   payloads the kernel uses to restart an open.
//! - [`guard`] serialises name-space-mutating operations against the rest
//!   of the file system.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub use widestring::{U16Str, U16String};

pub use crate::access::{AccessCheckInput, AccessCheckReply, AccessControl, SecurityDescriptor};
pub use crate::dirbuf::add_dir_info;
pub use crate::dispatch::{FileSystem, FileSystemOptions};
pub use crate::guard::{fine_guard_mode, guard_mode, GuardMode, GuardStrategy, OpGuard};
pub use crate::path::path_suffix;
pub use crate::provider::{OpOutcome, Provider, ProviderCaps, ResolvedReparse, UserContext};
pub use crate::reparse::{
    can_replace_reparse_point, find_reparse_point, resolve_reparse_points, ReparseData,
    ReparseProbe,
};
pub use crate::status::Status;
pub use crate::wire::abi::{FileInfo, VolumeInfo};
pub use crate::wire::{IoStatus, Operation, Request, RequestError, Response, ResponseDetail};

mod access;
mod dirbuf;
mod dispatch;
pub mod guard;
mod path;
mod provider;
pub mod reparse;
mod status;
pub mod wire;
