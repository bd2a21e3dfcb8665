//! Output size bounds
//!
//! A conversion may grow its input. Callers reserve `padding(input)` extra bytes
//! so the output always fits. Bounds are linear in the input length: a schema
//! contributes a constant part for structure that is printed regardless of the
//! payload, and a per-byte factor for everything the payload bytes pay for.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaddingBound {
    /// Output bytes independent of the input
    pub fixed: usize,
    /// Output bytes per input byte
    pub per_byte: usize,
}

impl PaddingBound {
    pub const ZERO: PaddingBound = PaddingBound {
        fixed: 0,
        per_byte: 0,
    };

    pub fn new(fixed: usize, per_byte: usize) -> Self {
        Self { fixed, per_byte }
    }

    /// Largest output for an input of `input_length` bytes
    pub fn output_bound(&self, input_length: usize) -> usize {
        self.fixed
            .saturating_add(self.per_byte.saturating_mul(input_length))
    }

    /// Largest growth over an input of `input_length` bytes
    pub fn padding(&self, input_length: usize) -> usize {
        self.output_bound(input_length).saturating_sub(input_length)
    }

    /// Bound that holds wherever either bound holds
    pub fn max(self, other: PaddingBound) -> PaddingBound {
        PaddingBound {
            fixed: self.fixed.max(other.fixed),
            per_byte: self.per_byte.max(other.per_byte),
        }
    }
}

/// Length of `text` as a quoted JSON string key plus `:` and `,`
pub(crate) fn member_overhead(name: &str) -> usize {
    name.len() + 4
}

pub(crate) fn div_ceil(value: usize, divisor: usize) -> usize {
    value.div_ceil(divisor.max(1))
}
