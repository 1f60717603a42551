//! Sources for the group passphrase

use crate::error::{ErrorCategory, ErrorKind, HushchatError, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Something that can produce the group passphrase on demand.
pub trait PassphraseReader {
    /// Returns the passphrase bytes wrapped in `Zeroizing` so they are wiped
    /// from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Returns a fixed passphrase (for tests and embedding)
pub struct ConstantPassphraseReader {
    passphrase: Zeroizing<Vec<u8>>,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: impl Into<Vec<u8>>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(self.passphrase.clone())
    }
}

/// Reads the passphrase from any `io::Read` source, typically stdin.
///
/// One trailing line terminator (`\n` or `\r\n`) is dropped so that
/// `echo secret | hushchat ...` uses the same key as typing `secret`.
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader
            .read_to_end(&mut data)
            .map_err(|e| HushchatError::io(format!("error reading passphrase: {}", e), e))?;
        strip_line_terminator(&mut data);
        Ok(data)
    }
}

fn strip_line_terminator(data: &mut Vec<u8>) {
    if data.last() == Some(&b'\n') {
        data.pop();
        if data.last() == Some(&b'\r') {
            data.pop();
        }
    }
}

/// Prompts on the terminal and reads without echo
#[derive(Default)]
pub struct TerminalPassphraseReader;

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    /// Terminal input is limited to UTF-8 by `rpassword`; use a
    /// [`ReaderPassphraseReader`] for arbitrary bytes.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(HushchatError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read passphrase from terminal - stdin is not a terminal (try --passphrase-stdin)",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(b"Group passphrase: ")
            .and_then(|()| stderr.flush())
            .map_err(|e| HushchatError::io(format!("failed to write prompt: {}", e), e))?;

        let passphrase = rpassword::read_password().map_err(|e| {
            HushchatError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading passphrase: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(passphrase.into_bytes()))
    }
}

/// Asks the upstream reader at most once and replays the answer.
///
/// Failures are not cached, so a later call asks again.
pub struct CachingPassphraseReader {
    upstream: Box<dyn PassphraseReader>,
    cached: Option<Zeroizing<Vec<u8>>>,
}

impl CachingPassphraseReader {
    pub fn new(upstream: Box<dyn PassphraseReader>) -> Self {
        Self {
            upstream,
            cached: None,
        }
    }
}

impl PassphraseReader for CachingPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if let Some(cached) = &self.cached {
            return Ok(cached.clone());
        }
        let passphrase = self.upstream.read_passphrase()?;
        self.cached = Some(passphrase.clone());
        Ok(passphrase)
    }
}
