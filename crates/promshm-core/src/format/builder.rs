//! Growable text buffer used while rendering exposition output.

use std::fmt;

/// Bytes reserved by a fresh builder.
pub const INITIAL_CAPACITY: usize = 32;

/// Append-only string buffer, reused between renders.
///
/// Unlike the metric store this lives in the calling process only, so it
/// uses the regular heap.
#[derive(Clone, Default)]
pub struct StringBuilder {
    buf: String,
}

impl StringBuilder {
    /// Create an empty builder with [`INITIAL_CAPACITY`] reserved.
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append a string.
    pub fn add_str(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    /// Append one character.
    pub fn add_char(&mut self, c: char) {
        self.buf.push(c);
    }

    /// Append a sample value in exposition syntax.
    pub fn add_value(&mut self, value: f64) {
        if value.is_nan() {
            self.buf.push_str("NaN");
        } else if value == f64::INFINITY {
            self.buf.push_str("+Inf");
        } else if value == f64::NEG_INFINITY {
            self.buf.push_str("-Inf");
        } else {
            self.buf.push_str(&value.to_string());
        }
    }

    /// Reset to empty, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been appended since the last clear.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The text built so far.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Take the text out of the builder.
    pub fn into_string(self) -> String {
        self.buf
    }
}

impl fmt::Write for StringBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.add_str(s);
        Ok(())
    }
}

impl fmt::Debug for StringBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.buf, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_add_and_clear() {
        let mut sb = StringBuilder::new();
        sb.add_str("http_requests");
        sb.add_char('_');
        write!(sb, "{}", "total").unwrap();
        assert_eq!(sb.as_str(), "http_requests_total");

        assert_eq!(sb.len(), 19);

        sb.clear();
        assert!(sb.is_empty());
    }

    #[test]
    fn test_value_rendering() {
        let mut sb = StringBuilder::new();
        for value in [3.0, 0.005, -1.5, f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            sb.add_value(value);
            sb.add_char(' ');
        }
        assert_eq!(sb.into_string(), "3 0.005 -1.5 +Inf -Inf NaN ");
    }
}
