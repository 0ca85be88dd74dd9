//! Accumulated program output.

/// Text buffer that collects stdout chunks in arrival order.
///
/// With a byte limit the buffer keeps only the most recent output: when a
/// chunk pushes it over the limit the oldest bytes are dropped, cutting on a
/// UTF-8 character boundary so the snapshot is always valid text.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
	text: String,
	limit: Option<usize>,
	evicted: usize,
}

impl OutputBuffer {
	/// Create an unbounded output buffer.
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a buffer that retains at most `limit` bytes.
	pub fn with_limit(limit: usize) -> Self {
		Self {
			limit: Some(limit),
			..Self::default()
		}
	}

	/// Append a chunk after everything received so far.
	pub fn append(&mut self, chunk: &str) {
		self.text.push_str(chunk);

		let Some(limit) = self.limit else {
			return;
		};
		if self.text.len() <= limit {
			return;
		}

		let mut cut = self.text.len() - limit;
		while !self.text.is_char_boundary(cut) {
			cut += 1;
		}
		self.text.drain(..cut);
		self.evicted += cut;
	}

	/// Discard all output, including the eviction count.
	pub fn reset(&mut self) {
		self.text.clear();
		self.evicted = 0;
	}

	/// Copy of the retained output.
	pub fn snapshot(&self) -> String {
		self.text.clone()
	}

	/// Retained size in bytes.
	pub fn len(&self) -> usize {
		self.text.len()
	}

	pub fn is_empty(&self) -> bool {
		self.text.is_empty()
	}

	/// Bytes dropped by the limit since the last reset.
	pub fn evicted(&self) -> usize {
		self.evicted
	}

	pub fn limit(&self) -> Option<usize> {
		self.limit
	}
}
