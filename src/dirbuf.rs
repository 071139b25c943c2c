//! Directory-entry packing for ReadDirectory results.

use widestring::U16Str;
use zerocopy::IntoBytes;

use crate::wire::abi::{align_up, DirInfoHeader, FileInfo};

/// Pack one directory entry into `buffer` at offset `*transferred`, padding
/// the transferred counter up to the packing alignment. A `None` entry
/// writes the zero-size terminator record instead.
///
/// Returns `false` without moving the counter if the packed record would
/// not fit.
pub fn add_dir_info(
    entry: Option<(&FileInfo, &U16Str)>,
    buffer: &mut [u8],
    transferred: &mut u32,
) -> bool {
    let start = *transferred as usize;
    match entry {
        Some((file_info, file_name)) => {
            let name_bytes = file_name.as_slice().as_bytes();
            let src_len = size_of::<DirInfoHeader>() + name_bytes.len();
            let dst_len = align_up(src_len);
            if start + dst_len > buffer.len() {
                return false;
            }
            let header = DirInfoHeader {
                size: src_len as u16,
                padding: [0; 3],
                file_info: *file_info,
            };
            let header_len = size_of::<DirInfoHeader>();
            buffer[start..start + header_len].copy_from_slice(header.as_bytes());
            buffer[start + header_len..start + src_len].copy_from_slice(name_bytes);
            buffer[start + src_len..start + dst_len].fill(0);
            *transferred += dst_len as u32;
        }
        None => {
            let dst_len = size_of::<u16>();
            if start + dst_len > buffer.len() {
                return false;
            }
            buffer[start..start + dst_len].fill(0);
            *transferred += dst_len as u32;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use widestring::u16str;

    #[test]
    fn packed_sizes_add_up() {
        let mut buffer = [0u8; 512];
        let mut transferred = 0;
        let info = FileInfo::default();

        let names = [u16str!("a"), u16str!("file.txt"), u16str!("sub")];
        let mut expected = 0;
        for name in names {
            assert!(add_dir_info(Some((&info, name)), &mut buffer, &mut transferred));
            expected += align_up(size_of::<DirInfoHeader>() + 2 * name.len());
        }
        assert!(add_dir_info(None, &mut buffer, &mut transferred));
        expected += size_of::<u16>();
        assert_eq!(transferred as usize, expected);
    }

    #[test]
    fn entry_layout() {
        let mut buffer = [0u8; 128];
        let mut transferred = 0;
        let info = FileInfo {
            file_size: 42,
            ..FileInfo::default()
        };
        assert!(add_dir_info(Some((&info, u16str!("ab"))), &mut buffer, &mut transferred));
        let src_len = size_of::<DirInfoHeader>() + 4;
        assert_eq!(
            u16::from_le_bytes([buffer[0], buffer[1]]) as usize,
            src_len
        );
        // Name follows the header.
        let name_at = size_of::<DirInfoHeader>();
        assert_eq!(&buffer[name_at..name_at + 4], &[0x61, 0x00, 0x62, 0x00]);
        assert_eq!(transferred as usize, align_up(src_len));
    }

    #[test]
    fn overflow_leaves_counter() {
        let mut buffer = [0u8; 80];
        let mut transferred = 0;
        let info = FileInfo::default();
        assert!(add_dir_info(Some((&info, u16str!("x"))), &mut buffer, &mut transferred));
        let before = transferred;
        assert!(!add_dir_info(Some((&info, u16str!("y"))), &mut buffer, &mut transferred));
        assert_eq!(transferred, before);
        // The terminator no longer fits either.
        assert!(!add_dir_info(None, &mut buffer, &mut transferred));
        assert_eq!(transferred, before);
    }
}
