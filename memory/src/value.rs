use std::fmt::Display;

use crate::Pointer;

/// Byte content of an allocation.
///
/// A value is a tree: scalars hold raw bytes, records hold an ordered sequence of
/// component values, and pointers occupy a fixed number of bytes whose meaning is
/// the address of a [`crate::Location`] rather than the bytes themselves. Component
/// boundaries are significant: byte surgery can cut scalars anywhere, but it can
/// only drop record components whole, and it can never cut a pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalValue {
    Scalar(Vec<u8>),
    Record(Vec<LogicalValue>),
    Pointer { pointer: Pointer, size: u32 },
}

/// Error returned when a byte range cannot be removed from a [`LogicalValue`]
/// because it covers part of a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeNotRemovable {
    pub offset: u32,
    pub len: u32,
}

impl Display for RangeNotRemovable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "range {}..{} overlaps a pointer and cannot be removed", self.offset, self.offset + self.len)
    }
}

impl std::error::Error for RangeNotRemovable {}

impl LogicalValue {
    pub fn size(&self) -> u32 {
        match self {
            LogicalValue::Scalar(bytes) => bytes.len() as u32,
            LogicalValue::Record(parts) => parts.iter().map(LogicalValue::size).sum(),
            LogicalValue::Pointer { size, .. } => *size,
        }
    }

    /// Returns a copy of this value with `len` bytes removed starting at `offset`.
    ///
    /// Scalars lose the bytes outright. A record component entirely inside the range
    /// is dropped; a component the range only grazes is recursively trimmed. Removing
    /// any part of a pointer is structurally impossible and fails.
    pub fn remove_range(&self, offset: u32, len: u32) -> Result<LogicalValue, RangeNotRemovable> {
        assert!(offset + len <= self.size(), "removed range must lie within the value");
        if len == 0 {
            return Ok(self.clone());
        }
        match self {
            LogicalValue::Scalar(bytes) => {
                let mut bytes = bytes.clone();
                bytes.drain(offset as usize..(offset + len) as usize);
                Ok(LogicalValue::Scalar(bytes))
            }
            LogicalValue::Record(parts) => {
                let mut result = Vec::new();
                let mut start = 0;
                for part in parts {
                    let end = start + part.size();
                    if end <= offset || start >= offset + len {
                        result.push(part.clone());
                    } else if start >= offset && end <= offset + len {
                        // dropped whole
                    } else {
                        let lo = offset.max(start) - start;
                        let hi = (offset + len).min(end) - start;
                        let kept = part.remove_range(lo, hi - lo)?;
                        if kept.size() > 0 {
                            result.push(kept);
                        }
                    }
                    start = end;
                }
                Ok(LogicalValue::Record(result))
            }
            LogicalValue::Pointer { .. } => Err(RangeNotRemovable { offset, len }),
        }
    }

    /// Every pointer in this value together with its byte offset, in layout order.
    pub fn pointers(&self) -> Vec<(u32, Pointer)> {
        fn walk(value: &LogicalValue, offset: u32, result: &mut Vec<(u32, Pointer)>) {
            match value {
                LogicalValue::Scalar(_) => (),
                LogicalValue::Record(parts) => {
                    let mut at = offset;
                    for part in parts {
                        walk(part, at, result);
                        at += part.size();
                    }
                }
                LogicalValue::Pointer { pointer, .. } => result.push((offset, *pointer)),
            }
        }
        let mut result = Vec::new();
        walk(self, 0, &mut result);
        result
    }
}

impl From<Vec<u8>> for LogicalValue {
    fn from(bytes: Vec<u8>) -> Self {
        LogicalValue::Scalar(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ptr(index: usize, size: u32) -> LogicalValue {
        LogicalValue::Pointer { pointer: Pointer::from_index(index), size }
    }

    #[test]
    fn test_size() {
        assert_eq!(LogicalValue::Scalar(vec![1, 2, 3]).size(), 3);
        assert_eq!(ptr(0, 4).size(), 4);
        assert_eq!(LogicalValue::Record(vec![LogicalValue::Scalar(vec![0; 2]), ptr(0, 4)]).size(), 6);
        assert_eq!(LogicalValue::Record(vec![]).size(), 0);
    }

    #[test]
    fn test_remove_scalar() {
        let value = LogicalValue::Scalar(vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(value.remove_range(0, 2), Ok(LogicalValue::Scalar(vec![2, 3, 4, 5])));
        assert_eq!(value.remove_range(4, 2), Ok(LogicalValue::Scalar(vec![0, 1, 2, 3])));
        assert_eq!(value.remove_range(2, 2), Ok(LogicalValue::Scalar(vec![0, 1, 4, 5])));
        assert_eq!(value.remove_range(0, 6), Ok(LogicalValue::Scalar(vec![])));
        assert_eq!(value.remove_range(3, 0), Ok(value.clone()));
    }

    #[test]
    fn test_remove_record_component() {
        let value = LogicalValue::Record(vec![
            LogicalValue::Scalar(vec![0, 1]),
            LogicalValue::Scalar(vec![2, 3]),
            LogicalValue::Scalar(vec![4, 5]),
        ]);
        assert_eq!(
            value.remove_range(2, 2),
            Ok(LogicalValue::Record(vec![LogicalValue::Scalar(vec![0, 1]), LogicalValue::Scalar(vec![4, 5])]))
        );
    }

    #[test]
    fn test_remove_record_straddle() {
        let value = LogicalValue::Record(vec![LogicalValue::Scalar(vec![0, 1, 2]), LogicalValue::Scalar(vec![3, 4])]);
        assert_eq!(
            value.remove_range(2, 2),
            Ok(LogicalValue::Record(vec![LogicalValue::Scalar(vec![0, 1]), LogicalValue::Scalar(vec![4])]))
        );
    }

    #[test]
    fn test_remove_whole_pointer() {
        let value = LogicalValue::Record(vec![LogicalValue::Scalar(vec![0, 1]), ptr(0, 4)]);
        assert_eq!(value.remove_range(2, 4), Ok(LogicalValue::Record(vec![LogicalValue::Scalar(vec![0, 1])])));
    }

    #[test]
    fn test_remove_partial_pointer() {
        let value = LogicalValue::Record(vec![LogicalValue::Scalar(vec![0, 1]), ptr(0, 4)]);
        assert_eq!(value.remove_range(4, 2), Err(RangeNotRemovable { offset: 2, len: 2 }));
        assert_eq!(ptr(0, 4).remove_range(0, 4), Err(RangeNotRemovable { offset: 0, len: 4 }));
    }

    #[test]
    fn test_pointers() {
        let value = LogicalValue::Record(vec![
            LogicalValue::Scalar(vec![0, 1]),
            ptr(3, 4),
            LogicalValue::Record(vec![ptr(7, 2)]),
        ]);
        assert_eq!(value.pointers(), vec![(2, Pointer::from_index(3)), (6, Pointer::from_index(7))]);
    }
}
