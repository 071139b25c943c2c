//! Per-file-system operation guard.
//!
//! Name-space-mutating requests (create-new, rename, delete, volume label,
//! volume flush) exclude all other requests; handle-local mutations run
//! shared against the name space; everything else runs unlocked. The
//! acquisition mode is a pure function of the request, so acquire and
//! release always agree.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::wire::abi::{info_class, CreateDisposition};
use crate::wire::request::{Operation, Request};

/// Locking strategy of a file system, chosen at creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GuardStrategy {
    /// Requests run unguarded.
    None,
    /// Every request acquires the guard exclusively.
    Coarse,
    /// The acquisition mode is derived per request from the table below.
    #[default]
    Fine,
}

/// Acquisition mode of the operation guard for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    /// Excludes every other guarded request.
    Exclusive,
    /// Runs in parallel with other shared requests.
    Shared,
    /// Runs unguarded.
    None,
}

/// Classify a request under the fine-grained strategy.
pub fn fine_guard_mode(req: &Request<'_>) -> GuardMode {
    match req.operation() {
        Operation::Create(x) => {
            if x.disposition_byte() != u8::from(CreateDisposition::Open) {
                GuardMode::Exclusive
            } else {
                GuardMode::Shared
            }
        }
        Operation::Cleanup(x) => {
            if x.delete() {
                GuardMode::Exclusive
            } else {
                GuardMode::None
            }
        }
        Operation::SetInformation(x) => match x.arg.class {
            info_class::FILE_RENAME_INFORMATION => GuardMode::Exclusive,
            info_class::FILE_DISPOSITION_INFORMATION => GuardMode::Shared,
            _ => GuardMode::None,
        },
        Operation::SetVolumeInformation(_) => GuardMode::Exclusive,
        // A flush without an attached handle flushes the whole volume.
        Operation::FlushBuffers(x) => {
            if x.user_context().is_none() {
                GuardMode::Exclusive
            } else {
                GuardMode::None
            }
        }
        Operation::QueryDirectory(_) => GuardMode::Shared,
        Operation::QueryVolumeInformation(_) => GuardMode::Shared,
        _ => GuardMode::None,
    }
}

/// Classify a request under the given strategy.
pub fn guard_mode(strategy: GuardStrategy, req: &Request<'_>) -> GuardMode {
    match strategy {
        GuardStrategy::None => GuardMode::None,
        GuardStrategy::Coarse => GuardMode::Exclusive,
        GuardStrategy::Fine => fine_guard_mode(req),
    }
}

/// Held operation guard; dropping it releases in the acquisition mode.
#[derive(Debug)]
#[allow(missing_docs)]
pub enum OpGuard<'a> {
    Exclusive(RwLockWriteGuard<'a, ()>),
    Shared(RwLockReadGuard<'a, ()>),
    Unguarded,
}

impl OpGuard<'_> {
    /// The mode this guard was acquired in.
    pub fn mode(&self) -> GuardMode {
        match self {
            OpGuard::Exclusive(_) => GuardMode::Exclusive,
            OpGuard::Shared(_) => GuardMode::Shared,
            OpGuard::Unguarded => GuardMode::None,
        }
    }
}

pub(crate) fn enter<'a>(
    lock: &'a RwLock<()>,
    strategy: GuardStrategy,
    req: &Request<'_>,
) -> OpGuard<'a> {
    match guard_mode(strategy, req) {
        GuardMode::Exclusive => OpGuard::Exclusive(lock.write()),
        GuardMode::Shared => OpGuard::Shared(lock.read()),
        GuardMode::None => OpGuard::Unguarded,
    }
}
