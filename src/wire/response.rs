//! Transaction operation response.
//!
//! A response carries the I/O status of a completed transaction, a per-kind
//! result block and a variable trailing buffer (reparse payload, security
//! descriptor). The record is assembled in memory and encoded for the
//! kernel driver on hand-off.

use smallvec::SmallVec;
use zerocopy::IntoBytes;

use super::abi::*;
use super::request::{Request, UserContext};
use crate::Status;

/// Completion status of a transaction: status code plus the per-kind
/// information word (transferred bytes, create action, reparse tag).
#[derive(Debug, Clone, Copy)]
pub struct IoStatus {
    /// Completion status code.
    pub status: Status,
    /// Per-kind information word.
    pub information: u64,
}

impl Default for IoStatus {
    fn default() -> Self {
        IoStatus {
            status: Status::SUCCESS,
            information: 0,
        }
    }
}

/// Per-kind result block of a response.
#[derive(Debug, Default)]
pub enum ResponseDetail {
    /// No per-kind result fields.
    #[default]
    None,
    /// A create request completed with an open handle.
    Opened {
        user_context: UserContext,
        granted_access: u32,
        file_info: FileInfo,
    },
    /// The operation reports updated file metadata.
    FileInfo(FileInfo),
    /// The operation reports volume metadata.
    VolumeInfo(VolumeInfo),
    /// A security descriptor of the given size is in the buffer.
    Security { size: u16 },
    /// File-system control output of the given size is in the buffer.
    Ioctl { size: u16 },
}

pub(crate) type ResponseBuf = SmallVec<[u8; 64]>;

/// Response record under assembly for a single transaction request.
#[derive(Debug)]
pub struct Response {
    kind: u32,
    hint: u64,
    /// Completion status; the information word obeys the success-only rule.
    pub io_status: IoStatus,
    /// Per-kind result fields.
    pub detail: ResponseDetail,
    /// Trailing variable-length payload.
    pub buffer: ResponseBuf,
}

impl Response {
    /// Start a response for the given request, echoing its kind and hint.
    pub fn for_request(req: &Request<'_>) -> Self {
        Response {
            kind: req.kind().into(),
            hint: req.hint(),
            io_status: IoStatus::default(),
            detail: ResponseDetail::None,
            buffer: ResponseBuf::new(),
        }
    }

    /// Remaining space in the variable buffer.
    pub fn buffer_space(&self) -> usize {
        TRANSACT_RSP_BUFFER_SIZEMAX - self.buffer.len()
    }

    /// Encode the record for the kernel driver.
    pub fn encode(&self) -> Vec<u8> {
        let mut detail: SmallVec<[u8; 96]> = SmallVec::new();
        match &self.detail {
            ResponseDetail::None => {}
            ResponseDetail::Opened {
                user_context,
                granted_access,
                file_info,
            } => {
                let opened = OpenedRsp {
                    user_context: user_context.context,
                    user_context2: user_context.context2,
                    granted_access: *granted_access,
                    padding: 0,
                    file_info: *file_info,
                };
                detail.extend_from_slice(opened.as_bytes());
            }
            ResponseDetail::FileInfo(file_info) => detail.extend_from_slice(file_info.as_bytes()),
            ResponseDetail::VolumeInfo(volume_info) => {
                detail.extend_from_slice(volume_info.as_bytes())
            }
            ResponseDetail::Security { size } | ResponseDetail::Ioctl { size } => {
                let range = BufRange {
                    offset: 0,
                    size: *size,
                };
                detail.extend_from_slice(range.as_bytes());
                detail.extend_from_slice(&[0u8; 4]);
            }
        }

        let header = ResponseHeader {
            size: (size_of::<ResponseHeader>() + detail.len() + self.buffer.len()) as u32,
            kind: self.kind,
            hint: self.hint,
            io_status: IoStatusWire {
                status: self.io_status.status.code(),
                information: self.io_status.information as u32,
            },
        };

        let mut out = Vec::with_capacity(header.size as usize);
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&detail);
        out.extend_from_slice(&self.buffer);
        out
    }
}
