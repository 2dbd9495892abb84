//! Human-readable per-event transcript
//!
//! One block per event: the kind on its own line, then indented fields.
//! Write failures never stop the filter; the first one is kept and reported
//! by [`Transcript::finish`].

use std::fmt::{self, Display};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::warn;

const FIELD_INDENT: &str = "      ";
const RULE_WIDTH: usize = 120;

pub struct Transcript {
    out: Box<dyn Write>,
    error: Option<io::Error>,
}

impl Transcript {
    /// Create (truncate) the transcript file at `path`
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::from_writer(BufWriter::new(File::create(path)?)))
    }

    pub fn from_writer(out: impl Write + 'static) -> Self {
        Self {
            out: Box::new(out),
            error: None,
        }
    }

    pub fn begin_event(&mut self, title: &str) {
        self.write(format_args!("\n{}\n", title));
    }

    /// `label : value`, labels padded so values line up
    pub fn field(&mut self, label: &str, value: impl Display) {
        self.write(format_args!("{}{:<16}: {}\n", FIELD_INDENT, label, value));
    }

    /// A free-form indented line
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        self.write(format_args!("{}{}\n", FIELD_INDENT, args));
    }

    pub fn filtered(&mut self) {
        self.line(format_args!("== filtered =="));
    }

    /// Full-width separator with `text` centered in a run of `fill`
    pub fn rule(&mut self, text: &str, fill: char) {
        let pad = RULE_WIDTH.saturating_sub(text.chars().count());
        let left = pad / 2;
        let right = pad - left;
        let line: String = std::iter::repeat(fill)
            .take(left)
            .chain(text.chars())
            .chain(std::iter::repeat(fill).take(right))
            .collect();
        self.line(format_args!("{}", line));
    }

    /// Flush and surface the first write error, if any
    pub fn finish(mut self) -> io::Result<()> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()
    }

    fn write(&mut self, args: fmt::Arguments<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.out.write_fmt(args) {
            warn!("transcript write failed, further events are not logged: {}", e);
            self.error = Some(e);
        }
    }
}
