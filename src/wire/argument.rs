//! Argument decomposition for transaction requests.
//!
//! Helper to decompose a slice of binary data (an incoming transaction
//! request) into multiple data structures (request arguments).

use widestring::U16Str;
use zerocopy::error::ConvertError;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::KnownLayout;

/// An iterator that can be used to fetch typed arguments from a byte slice.
pub(crate) struct ArgumentIterator<'a> {
    data: &'a [u8],
}

impl<'a> ArgumentIterator<'a> {
    /// Create a new argument iterator for the given byte slice.
    pub(crate) fn new(data: &'a [u8]) -> ArgumentIterator<'a> {
        ArgumentIterator { data }
    }

    /// Returns the size of the remaining data.
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Fetch a slice of all remaining bytes.
    pub(crate) fn fetch_all(&mut self) -> &'a [u8] {
        let bytes = self.data;
        self.data = &[];
        bytes
    }

    /// Fetch a typed argument. Returns `None` if there's not enough data left.
    pub(crate) fn fetch<T: FromBytes + KnownLayout + Immutable>(&mut self) -> Option<&'a T> {
        match zerocopy::Ref::<_, T>::from_prefix(self.data) {
            Err(ConvertError::Alignment(_)) => {
                // Panic on alignment errors as this is under the control
                // of the programmer, we can still return None for size
                // failures as this may be caused by insufficient external
                // data.
                panic!("Data unaligned");
            }
            Err(ConvertError::Size(_)) => None,
            Err(ConvertError::Validity(infallible)) => match infallible {},
            Ok((x, rest)) => {
                self.data = rest;
                Some(zerocopy::Ref::<&[u8], T>::into_ref(x))
            }
        }
    }
}

/// Borrow a UTF-16 string out of a request buffer. `offset` and `size` are
/// in bytes; both must be even and in bounds. The buffer itself must be
/// u16-aligned (transaction records always are).
pub(crate) fn fetch_u16_str(buffer: &[u8], offset: usize, size: usize) -> Option<&U16Str> {
    if offset % 2 != 0 || size % 2 != 0 {
        return None;
    }
    let bytes = buffer.get(offset..offset.checked_add(size)?)?;
    match zerocopy::Ref::<_, [u16]>::from_bytes(bytes) {
        Err(ConvertError::Alignment(_)) => panic!("Data unaligned"),
        Err(_) => None,
        Ok(x) => Some(U16Str::from_slice(zerocopy::Ref::<&[u8], [u16]>::into_ref(
            x,
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::KnownLayout;

    use super::super::test::AlignedData;
    use super::*;

    const TEST_DATA: AlignedData<[u8; 12]> = AlignedData([
        0x66, 0x6f, 0x6f, 0x00, 0x61, 0x00, 0x62, 0x00, 0x5c, 0x00, 0x63, 0x00,
    ]);

    #[repr(C)]
    #[derive(FromBytes, KnownLayout, Immutable)]
    struct TestArgument {
        p1: u8,
        p2: u8,
        p3: u16,
    }

    #[test]
    fn generic_argument() {
        let mut it = ArgumentIterator::new(&*TEST_DATA);
        let arg: &TestArgument = it.fetch().unwrap();
        assert_eq!(arg.p1, 0x66);
        assert_eq!(arg.p2, 0x6f);
        assert_eq!(arg.p3, 0x006f);
        assert_eq!(it.len(), 8);
    }

    #[test]
    fn all_data() {
        let mut it = ArgumentIterator::new(&*TEST_DATA);
        it.fetch::<u32>().unwrap();
        let arg = it.fetch_all();
        assert_eq!(arg.len(), 8);
        assert_eq!(it.len(), 0);
    }

    #[test]
    fn out_of_data() {
        let mut it = ArgumentIterator::new(&*TEST_DATA);
        it.fetch::<u64>().unwrap();
        let arg: Option<&u64> = it.fetch();
        assert!(arg.is_none());
        assert_eq!(it.len(), 4);
    }

    #[test]
    fn u16_str() {
        let s = fetch_u16_str(&TEST_DATA[..], 4, 8).unwrap();
        assert_eq!(s.as_slice(), [0x61, 0x62, 0x5c, 0x63]);
        // Odd offsets and out-of-bounds ranges are rejected.
        assert!(fetch_u16_str(&TEST_DATA[..], 5, 2).is_none());
        assert!(fetch_u16_str(&TEST_DATA[..], 4, 10).is_none());
        assert!(fetch_u16_str(&TEST_DATA[..], 4, 3).is_none());
    }
}
