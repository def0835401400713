//! Loops running a body graph over chunks of their inputs.
use crate::errors::{invalid, shape_mismatch};
use crate::internal::*;

mod tensor_iterator;

pub use self::tensor_iterator::TensorIterator;

/// How an outer input feeds a body parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InputMapping {
    /// Each iteration sees the next `part_size` wide window along `axis`.
    Sliced {
        outer: usize,
        body_param: usize,
        axis: usize,
        start: i64,
        end: i64,
        stride: i64,
        part_size: usize,
    },
    /// Each iteration sees the whole outer input.
    Invariant { outer: usize, body_param: usize },
    /// Back-edge: the outer input initializes the body parameter, later
    /// iterations see `body_result` from the previous one.
    Merged { outer: usize, body_param: usize, body_result: usize },
}

impl InputMapping {
    pub fn outer(&self) -> usize {
        match self {
            InputMapping::Sliced { outer, .. }
            | InputMapping::Invariant { outer, .. }
            | InputMapping::Merged { outer, .. } => *outer,
        }
    }

    pub fn body_param(&self) -> usize {
        match self {
            InputMapping::Sliced { body_param, .. }
            | InputMapping::Invariant { body_param, .. }
            | InputMapping::Merged { body_param, .. } => *body_param,
        }
    }

    /// Chunk windows for a sliced input, `None` for other mappings or
    /// when they depend on an unknown axis length.
    pub fn chunks(&self, axis_len: Option<usize>) -> GraftResult<Option<Chunks>> {
        if let InputMapping::Sliced { start, end, stride, part_size, .. } = self {
            Chunks::new(axis_len, *start, *end, *stride, *part_size)
        } else {
            Ok(None)
        }
    }
}

/// How a body result becomes an outer output.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutputMapping {
    /// The value computed by the final iteration.
    LastIteration { body_result: usize },
    /// All iteration values, concatenated along `axis`. A negative stride
    /// stores them in reverse iteration order.
    Concatenated { body_result: usize, axis: usize, stride: i64, part_size: usize },
}

impl OutputMapping {
    pub fn body_result(&self) -> usize {
        match self {
            OutputMapping::LastIteration { body_result }
            | OutputMapping::Concatenated { body_result, .. } => *body_result,
        }
    }
}

/// Resolved iteration windows over a sliced axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunks {
    /// begin of the first window
    pub first: i64,
    pub stride: i64,
    pub part_size: usize,
    /// trip count
    pub count: usize,
}

impl Chunks {
    /// Negative `start` and `end` count from the end of the axis. Both
    /// bounds are inclusive: `start = 0, end = -1` covers the whole axis.
    pub fn new(
        axis_len: Option<usize>,
        start: i64,
        end: i64,
        stride: i64,
        part_size: usize,
    ) -> GraftResult<Option<Chunks>> {
        ensure!(
            stride != 0 && part_size > 0,
            invalid(format!("Invalid slicing: stride {stride}, part size {part_size}"))
        );
        let normalize = |v: i64| if v < 0 { axis_len.map(|l| l as i64 + v) } else { Some(v) };
        let (Some(start), Some(end)) = (normalize(start), normalize(end)) else {
            return Ok(None);
        };
        let part = part_size as i64;
        ensure!(
            start == end || (stride > 0) == (end > start),
            invalid(format!("Slicing from {start} to {end} with stride {stride}"))
        );
        let span = (end - start).abs() + 1;
        ensure!(
            span >= part,
            invalid(format!("Slicing span {span} is smaller than part size {part_size}"))
        );
        let count = ((span - part) / stride.abs() + 1) as usize;
        let first = if stride > 0 { start } else { start + 1 - part };
        let last = first + (count as i64 - 1) * stride;
        let (lowest, highest) = (first.min(last), first.max(last));
        ensure!(lowest >= 0, invalid(format!("Slicing window begins at {lowest}")));
        if let Some(len) = axis_len {
            ensure!(
                highest + part <= len as i64,
                shape_mismatch(format!("Slicing window ends past axis length {len}"))
            );
        }
        Ok(Some(Chunks { first, stride, part_size, count }))
    }

    /// Window of iteration `i`, as `[begin, end)`.
    pub fn range(&self, i: usize) -> (usize, usize) {
        let begin = (self.first + i as i64 * self.stride) as usize;
        (begin, begin + self.part_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_chunks() -> GraftResult<()> {
        let chunks = Chunks::new(Some(40), 0, 39, 2, 2)?.unwrap();
        assert_eq!(chunks.count, 20);
        assert_eq!(chunks.range(0), (0, 2));
        assert_eq!(chunks.range(19), (38, 40));
        assert_eq!(Chunks::new(Some(40), 0, -1, 2, 2)?, Some(chunks));
        Ok(())
    }

    #[test]
    fn backward_chunks() -> GraftResult<()> {
        let chunks = Chunks::new(Some(10), -1, 0, -1, 1)?.unwrap();
        assert_eq!(chunks.count, 10);
        assert_eq!(chunks.range(0), (9, 10));
        assert_eq!(chunks.range(9), (0, 1));
        Ok(())
    }

    #[test]
    fn dynamic_axis() -> GraftResult<()> {
        assert_eq!(Chunks::new(None, 0, -1, 1, 1)?, None);
        assert_eq!(Chunks::new(None, 0, 9, 1, 1)?.map(|c| c.count), Some(10));
        Ok(())
    }

    #[test]
    fn out_of_bounds() {
        assert!(Chunks::new(Some(8), 0, 9, 1, 1).is_err());
        assert!(Chunks::new(Some(8), 0, 7, 0, 1).is_err());
    }
}
