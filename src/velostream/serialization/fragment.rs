//! Fragment re-assembly
//!
//! Transports may hand a message over in several fragments. Every fragment
//! carries flags: `INIT` marks the first fragment of a message and `FIN` the last.
//! A message that arrives whole carries both.

use std::borrow::Cow;
use std::ops::BitOr;

use crate::velostream::serialization::SerializationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FragmentFlags(u8);

impl FragmentFlags {
    pub const NONE: FragmentFlags = FragmentFlags(0x00);
    pub const FIN: FragmentFlags = FragmentFlags(0x01);
    pub const INIT: FragmentFlags = FragmentFlags(0x02);
    pub const COMPLETE: FragmentFlags = FragmentFlags(0x03);

    pub fn from_bits(bits: u8) -> Self {
        FragmentFlags(bits & Self::COMPLETE.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_init(self) -> bool {
        self.0 & Self::INIT.0 != 0
    }

    pub fn is_final(self) -> bool {
        self.0 & Self::FIN.0 != 0
    }
}

impl BitOr for FragmentFlags {
    type Output = FragmentFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        FragmentFlags(self.0 | rhs.0)
    }
}

/// Outcome of offering one fragment to a [`FragmentAccumulator`]
#[derive(Debug)]
pub enum Fragment<'a> {
    /// More fragments are needed
    Pending,
    /// The whole message, borrowed when it arrived in one piece
    Complete(Cow<'a, [u8]>),
    Rejected(SerializationError),
}

/// Per-stream buffer joining fragments into whole messages
#[derive(Debug)]
pub struct FragmentAccumulator {
    buffer: Vec<u8>,
    accumulating: bool,
    max_message_bytes: usize,
}

impl FragmentAccumulator {
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            accumulating: false,
            max_message_bytes,
        }
    }

    pub fn accept<'a>(&mut self, data: &'a [u8], flags: FragmentFlags) -> Fragment<'a> {
        if flags.is_init() {
            self.reset();
            self.accumulating = true;
        } else if !self.accumulating {
            return Fragment::Rejected(SerializationError::Fragment {
                message: "continuation fragment without a preceding init fragment".to_string(),
            });
        }

        let size = self.buffer.len() + data.len();
        if size > self.max_message_bytes {
            self.reset();
            return Fragment::Rejected(SerializationError::MessageTooLarge {
                size,
                limit: self.max_message_bytes,
            });
        }

        if flags.is_final() {
            self.accumulating = false;
            if self.buffer.is_empty() {
                return Fragment::Complete(Cow::Borrowed(data));
            }
            self.buffer.extend_from_slice(data);
            return Fragment::Complete(Cow::Owned(std::mem::take(&mut self.buffer)));
        }

        self.buffer.extend_from_slice(data);
        Fragment::Pending
    }

    /// Drop any partially received message
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.accumulating = false;
    }

    pub fn is_accumulating(&self) -> bool {
        self.accumulating
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
