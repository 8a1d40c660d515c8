use std::sync::atomic::{AtomicU32, Ordering};

pub const MAX_SEQ: u32 = 0x00_ff_ff_ff;

/// 24-bit PFCP transaction sequence numbers, starting at 1 and skipping 0 on wrap.
#[derive(Debug, Default)]
pub struct SequenceCounter {
	current: AtomicU32,
}

impl SequenceCounter {
	pub fn new() -> SequenceCounter {
		SequenceCounter::default()
	}

	/// Next value is `start + 1`
	pub fn starting_after(start: u32) -> SequenceCounter {
		SequenceCounter {
			current: AtomicU32::new(start & MAX_SEQ),
		}
	}

	pub fn next(&self) -> u32 {
		let prev = self
			.current
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| Some(Self::advance(cur)))
			.unwrap_or_else(|cur| cur);
		Self::advance(prev)
	}

	fn advance(cur: u32) -> u32 {
		if cur >= MAX_SEQ {
			1
		} else {
			cur + 1
		}
	}
}
