//! Line-oriented terminal I/O for the chat session.
//!
//! Generic over the reader and writer so sessions can be driven from tests.

use std::io::{BufRead, Stdout, StdinLock, Write};

use crossterm::style::Stylize;

use sowscribe_shared::{Result, SowscribeError};

/// Colored prompts plus plain output over any `BufRead` + `Write` pair.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<StdinLock<'static>, Stdout> {
    /// The process terminal.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Show a setup prompt (yellow) and read one line. `None` at end of input.
    pub fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{}", prompt.yellow()).map_err(console_err)?;
        self.read_line()
    }

    /// Show the chat prompt (magenta) and read one line. `None` at end of input.
    pub fn ask_user(&mut self) -> Result<Option<String>> {
        write!(self.output, "{}", "User: ".magenta()).map_err(console_err)?;
        self.read_line()
    }

    /// Print a status line.
    pub fn say(&mut self, line: impl std::fmt::Display) -> Result<()> {
        writeln!(self.output, "{line}").map_err(console_err)?;
        self.output.flush().map_err(console_err)
    }

    /// Raw writer, for streamed output.
    pub fn writer(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        self.output.flush().map_err(console_err)?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(console_err)?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

pub(crate) fn console_err(e: std::io::Error) -> SowscribeError {
    SowscribeError::io("<console>", e)
}
