//! Reparse-point resolution.
//!
//! The resolver walks a driver-namespace path, probing each prefix for a
//! reparse point. Symbolic links rewrite the path in place (bounded by a
//! hop counter) until the walk reaches the end of the path or a non-symlink
//! reparse point; the result is a reparse payload the kernel driver uses to
//! restart the open.

use widestring::{U16Str, U16String};
use zerocopy::IntoBytes;

use crate::provider::ResolvedReparse;
use crate::status::Status;
use crate::wire::abi::{
    ReparseDataHeader, SymlinkReparseHeader, IO_REPARSE_TAG_MICROSOFT, IO_REPARSE_TAG_SYMLINK,
    PATH_SEP, REPARSE_GUID_SIZE, SYMLINK_FLAG_RELATIVE, TRANSACT_PATH_SIZEMAX,
};

const DOT: u16 = b'.' as u16;

/// Rewrites are abandoned after this many symlink hops.
const MAX_HOPS: u32 = 32;

/// Reparse data reported by a probe for one path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReparseData {
    /// A symbolic link with its substitute path and reparse flags.
    Symlink { substitute: U16String, flags: u32 },
    /// Any other reparse point, as the verbatim wire record.
    Raw { data: Vec<u8> },
}

/// Prefix probe: reports the reparse data of `path`, `NOT_A_REPARSE_POINT`
/// for ordinary files and directories, or a lookup failure.
pub type ReparseProbe<'a> = dyn FnMut(&U16Str, bool) -> Result<ReparseData, Status> + 'a;

/// Scan `file_name` left to right for the first prefix that is a reparse
/// point, excluding the final component (which is left to the caller).
///
/// Returns the index of the component at which the prefix reparses, in
/// UTF-16 units; this is the index [`resolve_reparse_points`] resumes from.
/// Probe failures other than `NOT_A_REPARSE_POINT` end the scan.
pub fn find_reparse_point(file_name: &U16Str, probe: &mut ReparseProbe<'_>) -> Option<u16> {
    let s = file_name.as_slice();
    let mut i = 0;

    loop {
        while i < s.len() && s[i] == PATH_SEP {
            i += 1;
        }
        let last_comp = i;
        while i < s.len() && s[i] != PATH_SEP {
            i += 1;
        }
        if i == s.len() {
            return None;
        }

        match probe(U16Str::from_slice(&s[..i]), true) {
            Err(Status::NOT_A_REPARSE_POINT) => continue,
            Ok(_) => return Some(last_comp as u16),
            Err(_) => return None,
        }
    }
}

/// Resolve the reparse points of `file_name` starting at `reparse_index`,
/// producing the reparse payload for the kernel driver.
///
/// `resolve_last_path_component` asks for the trailing component to be
/// resolved as well (it is re-armed after every rewrite, so only fresh
/// paths resolve their tail). `max_size` bounds the emitted payload.
pub fn resolve_reparse_points(
    file_name: &U16Str,
    reparse_index: u16,
    resolve_last_path_component: bool,
    max_size: usize,
    probe: &mut ReparseProbe<'_>,
) -> Result<ResolvedReparse, Status> {
    let scratch_units = TRANSACT_PATH_SIZEMAX / size_of::<u16>();
    let mut target: Vec<u16> = file_name.as_slice().to_vec();
    if target.len() > scratch_units {
        return Err(Status::REPARSE_POINT_NOT_RESOLVED);
    }

    let resolve_last_initial = resolve_last_path_component;
    let mut resolve_last = resolve_last_path_component;
    let mut hops = MAX_HOPS;
    let mut i = (reparse_index as usize).min(target.len());

    loop {
        while i < target.len() && target[i] == PATH_SEP {
            i += 1;
        }
        let last_comp = i;
        while i < target.len() && target[i] != PATH_SEP {
            i += 1;
        }
        if i == target.len() {
            if !resolve_last {
                // End of path: the fully rewritten target is the result.
                return emit_symlink_payload(&target, true, max_size);
            }
            resolve_last = false;
        }

        if i - last_comp == 1 && target[last_comp] == DOT {
            // Dot component: splice it out together with its separators.
            let mut next = i;
            while next < target.len() && target[next] == PATH_SEP {
                next += 1;
            }
            target.drain(last_comp..next);
            i = last_comp;
            continue;
        }
        if i - last_comp == 2 && target[last_comp] == DOT && target[last_comp + 1] == DOT {
            // Dot-dot component: also remove the preceding component.
            let mut q = last_comp;
            while q > 0 && target[q - 1] == PATH_SEP {
                q -= 1;
            }
            while q > 0 && target[q - 1] != PATH_SEP {
                q -= 1;
            }
            let mut next = i;
            while next < target.len() && target[next] == PATH_SEP {
                next += 1;
            }
            target.drain(q..next);
            i = q;
            continue;
        }

        let is_directory = i != target.len();
        let probed = probe(U16Str::from_slice(&target[..i]), is_directory);
        match probed {
            Err(Status::NOT_A_REPARSE_POINT) => continue,
            Err(status) => {
                // A missing intermediate component is a path failure, a
                // missing tip is a name failure.
                if status == Status::OBJECT_NAME_NOT_FOUND && i != target.len() {
                    return Err(Status::OBJECT_PATH_NOT_FOUND);
                }
                return Err(status);
            }
            Ok(ReparseData::Raw { data }) => {
                if data.len() > max_size {
                    return Err(Status::REPARSE_POINT_NOT_RESOLVED);
                }
                let information = raw_reparse_tag(&data) as u64;
                return Ok(ResolvedReparse { information, data });
            }
            Ok(ReparseData::Symlink { substitute, flags }) => {
                hops -= 1;
                if hops == 0 {
                    return Err(Status::REPARSE_POINT_NOT_RESOLVED);
                }

                let substitute = substitute.as_slice();
                // A substitute starting with a separator replaces the whole
                // target path, otherwise only the current component.
                let device_relative = substitute.first() == Some(&PATH_SEP);
                let start = if device_relative { 0 } else { last_comp };
                let new_len = target.len() - (i - start) + substitute.len();
                if new_len > scratch_units {
                    return Err(Status::REPARSE_POINT_NOT_RESOLVED);
                }
                target.splice(start..i, substitute.iter().copied());

                if device_relative && flags & SYMLINK_FLAG_RELATIVE == 0 {
                    // Absolute in the driver namespace: hand the rewritten
                    // path back to the kernel as-is.
                    return emit_symlink_payload(&target, false, max_size);
                }

                i = start;
                resolve_last = resolve_last_initial;
            }
        }
    }
}

/// Encode the target path as a symlink reparse record with substitute and
/// print name both equal to the path.
fn emit_symlink_payload(
    target: &[u16],
    relative: bool,
    max_size: usize,
) -> Result<ResolvedReparse, Status> {
    let path_bytes = target.as_bytes();
    let symlink_len = size_of::<SymlinkReparseHeader>() + path_bytes.len();
    let total = size_of::<ReparseDataHeader>() + symlink_len;
    if total > max_size {
        return Err(Status::REPARSE_POINT_NOT_RESOLVED);
    }

    let header = ReparseDataHeader {
        reparse_tag: IO_REPARSE_TAG_SYMLINK,
        reparse_data_length: symlink_len as u16,
        reserved: 0,
    };
    let symlink = SymlinkReparseHeader {
        substitute_name_offset: 0,
        substitute_name_length: path_bytes.len() as u16,
        print_name_offset: 0,
        print_name_length: path_bytes.len() as u16,
        flags: if relative { SYMLINK_FLAG_RELATIVE } else { 0 },
    };

    let mut data = Vec::with_capacity(total);
    data.extend_from_slice(header.as_bytes());
    data.extend_from_slice(symlink.as_bytes());
    data.extend_from_slice(path_bytes);
    Ok(ResolvedReparse {
        information: IO_REPARSE_TAG_SYMLINK as u64,
        data,
    })
}

fn raw_reparse_tag(data: &[u8]) -> u32 {
    match data.get(..4) {
        Some(bytes) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        None => 0,
    }
}

/// Decide whether a reparse point may be replaced by new reparse data.
///
/// Tags must match; third-party tags additionally require matching reparse
/// GUIDs. Records shorter than their required header are malformed.
pub fn can_replace_reparse_point(current: &[u8], replacement: &[u8]) -> Status {
    let header_len = size_of::<ReparseDataHeader>();
    if current.len() < header_len || replacement.len() < header_len {
        return Status::IO_REPARSE_DATA_INVALID;
    }

    let current_tag = raw_reparse_tag(current);
    let replacement_tag = raw_reparse_tag(replacement);
    if current_tag != replacement_tag {
        return Status::IO_REPARSE_TAG_MISMATCH;
    }

    if current_tag & IO_REPARSE_TAG_MICROSOFT == 0 {
        // Third-party tags carry a GUID after the header.
        let guid_end = header_len + REPARSE_GUID_SIZE;
        if current.len() < guid_end || replacement.len() < guid_end {
            return Status::IO_REPARSE_DATA_INVALID;
        }
        if current[header_len..guid_end] != replacement[header_len..guid_end] {
            return Status::REPARSE_ATTRIBUTE_CONFLICT;
        }
    }

    Status::SUCCESS
}
