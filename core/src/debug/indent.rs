/// Indent level of one debug context plus the cached indent string.
#[derive(Debug, Default, Clone)]
pub struct IndentState {
    level: usize,
    cached_width: usize,
    cached: String,
}

impl IndentState {
    pub fn level(&self) -> usize {
        self.level
    }

    /// Negative levels clamp to zero.
    pub fn set_level(&mut self, level: i64) {
        self.level = clamp_non_negative(level);
    }

    pub fn increment(&mut self) {
        self.level = self.level.saturating_add(1);
    }

    pub fn decrement(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Returns `level * size` spaces, rebuilding only when the width changed.
    pub fn indent_string(&mut self, size: usize) -> &str {
        let width = self.level.saturating_mul(size);
        if width != self.cached_width {
            self.cached = " ".repeat(width);
            self.cached_width = width;
        }
        &self.cached
    }
}

pub(crate) fn clamp_non_negative(value: i64) -> usize {
    usize::try_from(value.max(0)).unwrap_or(usize::MAX)
}
