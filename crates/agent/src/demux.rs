//! Stream demultiplexer — hides `<tool>...</tool>` blocks from live output.
//!
//! Fragments arrive with arbitrary boundaries, so the opening delimiter is
//! matched character by character against a small buffer that survives
//! between [`StreamDemux::feed`] calls. The raw response is kept intact for
//! command parsing; only the visible channel loses the hidden block.

pub const OPEN_TAG: &str = "<tool>";
pub const CLOSE_TAG: &str = "</tool>";

#[derive(Debug, Default)]
pub struct StreamDemux {
    /// Candidate prefix of `<tool>` not yet known to be visible text
    pending: String,
    /// Contents of the current hidden block, including the closing tag so far
    hidden: String,
    in_block: bool,
    raw: String,
    visible: String,
}

impl StreamDemux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one fragment; returns the text that became visible because of it.
    pub fn feed(&mut self, fragment: &str) -> String {
        self.raw.push_str(fragment);
        let mut out = String::new();

        for ch in fragment.chars() {
            if self.in_block {
                self.hidden.push(ch);
                if self.hidden.ends_with(CLOSE_TAG) {
                    self.in_block = false;
                    self.hidden.clear();
                }
                continue;
            }

            self.pending.push(ch);
            if self.pending == OPEN_TAG {
                self.in_block = true;
                self.pending.clear();
                continue;
            }
            // Release characters until what remains could still open a block ("<<tool>")
            while !self.pending.is_empty() && !OPEN_TAG.starts_with(self.pending.as_str()) {
                let first = self.pending.remove(0);
                out.push(first);
            }
        }

        self.visible.push_str(&out);
        out
    }

    /// End of stream. An unterminated block closes implicitly; a dangling
    /// delimiter prefix (e.g. a trailing `<to`) was visible text after all.
    pub fn finish(&mut self) -> String {
        let out = if self.in_block {
            String::new()
        } else {
            std::mem::take(&mut self.pending)
        };
        self.in_block = false;
        self.hidden.clear();
        self.pending.clear();
        self.visible.push_str(&out);
        out
    }

    /// True while inside a hidden block.
    pub fn in_block(&self) -> bool {
        self.in_block
    }

    /// Everything received, markup included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Everything emitted as visible so far.
    pub fn visible(&self) -> &str {
        &self.visible
    }

    pub fn into_parts(self) -> (String, String) {
        (self.raw, self.visible)
    }
}
