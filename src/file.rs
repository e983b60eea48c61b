use std::io::Write;

use crate::{
    error::{ErrorKind, PsResult},
    object::FileId,
};

/// Where an output file's bytes go. Tests capture instead of writing to the
/// process streams.
#[derive(Debug)]
pub enum OutputSink {
    Stdout,
    Stderr,
    Capture(Vec<u8>),
}

impl OutputSink {
    fn write(&mut self, bytes: &[u8]) -> PsResult<()> {
        match self {
            OutputSink::Stdout => {
                std::io::stdout()
                    .write_all(bytes)
                    .map_err(|_| anyhow::anyhow!(ErrorKind::IoError))?;
            }
            OutputSink::Stderr => {
                std::io::stderr()
                    .write_all(bytes)
                    .map_err(|_| anyhow::anyhow!(ErrorKind::IoError))?;
            }
            OutputSink::Capture(buffer) => buffer.extend_from_slice(bytes),
        }
        Ok(())
    }
}

#[derive(Debug)]
enum FileBody {
    /// Fully buffered input bytes with a read cursor.
    Input { data: Vec<u8>, cursor: usize },
    Output(OutputSink),
}

/// One entry of the file table.
#[derive(Debug)]
pub struct FileEntry {
    pub name: Vec<u8>,
    body: FileBody,
    pub open: bool,
}

/// The side registry holding every file object's real state. PostScript file
/// objects are small handles into this table, so save/restore snapshots never
/// copy an OS resource.
#[derive(Debug)]
pub struct FileTable {
    entries: Vec<FileEntry>,
}

pub const STDIN: FileId = FileId(0);
pub const STDOUT: FileId = FileId(1);
pub const STDERR: FileId = FileId(2);

impl FileTable {
    /// Seeds the three standard streams. When `capture` is set, stdout and
    /// stderr accumulate into buffers the host can inspect.
    pub fn new(capture: bool) -> Self {
        let sink = |default| {
            if capture {
                OutputSink::Capture(Vec::new())
            } else {
                default
            }
        };

        Self {
            entries: vec![
                FileEntry {
                    name: b"%stdin".to_vec(),
                    body: FileBody::Input { data: Vec::new(), cursor: 0 },
                    open: true,
                },
                FileEntry {
                    name: b"%stdout".to_vec(),
                    body: FileBody::Output(sink(OutputSink::Stdout)),
                    open: true,
                },
                FileEntry {
                    name: b"%stderr".to_vec(),
                    body: FileBody::Output(sink(OutputSink::Stderr)),
                    open: true,
                },
            ],
        }
    }

    pub fn open_input(&mut self, name: Vec<u8>, data: Vec<u8>) -> FileId {
        self.entries.push(FileEntry {
            name,
            body: FileBody::Input { data, cursor: 0 },
            open: true,
        });
        FileId(self.entries.len() - 1)
    }

    pub fn resolve_special(&self, name: &[u8]) -> Option<FileId> {
        match name {
            b"%stdin" => Some(STDIN),
            b"%stdout" => Some(STDOUT),
            b"%stderr" => Some(STDERR),
            _ => None,
        }
    }

    fn entry(&self, id: FileId) -> PsResult<&FileEntry> {
        self.entries
            .get(id.0)
            .ok_or_else(|| anyhow::anyhow!(ErrorKind::IoError))
    }

    fn entry_mut(&mut self, id: FileId) -> PsResult<&mut FileEntry> {
        self.entries
            .get_mut(id.0)
            .ok_or_else(|| anyhow::anyhow!(ErrorKind::IoError))
    }

    pub fn is_open(&self, id: FileId) -> bool {
        self.entries.get(id.0).map_or(false, |entry| entry.open)
    }

    pub fn close(&mut self, id: FileId) -> PsResult<()> {
        // closing an already-closed file has no effect
        if let Ok(entry) = self.entry_mut(id) {
            entry.open = false;
        }
        Ok(())
    }

    /// Random access for the tokenizer, which owns the cursor while lexing.
    pub fn byte_at(&self, id: FileId, pos: usize) -> Option<u8> {
        match &self.entries.get(id.0)?.body {
            FileBody::Input { data, .. } => data.get(pos).copied(),
            FileBody::Output(_) => None,
        }
    }

    pub fn cursor(&self, id: FileId) -> PsResult<usize> {
        match &self.entry(id)?.body {
            FileBody::Input { cursor, .. } => Ok(*cursor),
            FileBody::Output(_) => anyhow::bail!(ErrorKind::IoError),
        }
    }

    pub fn set_cursor(&mut self, id: FileId, pos: usize) -> PsResult<()> {
        match &mut self.entry_mut(id)?.body {
            FileBody::Input { cursor, .. } => {
                *cursor = pos;
                Ok(())
            }
            FileBody::Output(_) => anyhow::bail!(ErrorKind::IoError),
        }
    }

    pub fn bytes_available(&self, id: FileId) -> PsResult<i32> {
        match &self.entry(id)?.body {
            FileBody::Input { data, cursor } => Ok((data.len() - cursor) as i32),
            FileBody::Output(_) => Ok(-1),
        }
    }

    pub fn read_byte(&mut self, id: FileId) -> PsResult<Option<u8>> {
        let entry = self.entry_mut(id)?;
        if !entry.open {
            anyhow::bail!(ErrorKind::IoError);
        }
        match &mut entry.body {
            FileBody::Input { data, cursor } => {
                let byte = data.get(*cursor).copied();
                if byte.is_some() {
                    *cursor += 1;
                }
                Ok(byte)
            }
            FileBody::Output(_) => anyhow::bail!(ErrorKind::IoError),
        }
    }

    /// Reads up to `buffer.len()` bytes; returns the count read.
    pub fn read_into(&mut self, id: FileId, buffer: &mut [u8]) -> PsResult<usize> {
        let entry = self.entry_mut(id)?;
        if !entry.open {
            anyhow::bail!(ErrorKind::IoError);
        }
        match &mut entry.body {
            FileBody::Input { data, cursor } => {
                let available = data.len().saturating_sub(*cursor);
                let count = available.min(buffer.len());
                buffer[..count].copy_from_slice(&data[*cursor..*cursor + count]);
                *cursor += count;
                Ok(count)
            }
            FileBody::Output(_) => anyhow::bail!(ErrorKind::IoError),
        }
    }

    /// Reads one line, consuming but not returning the terminator. Returns
    /// the bytes and whether a terminator was found before EOF.
    pub fn read_line(&mut self, id: FileId) -> PsResult<(Vec<u8>, bool)> {
        let mut line = Vec::new();
        loop {
            match self.read_byte(id)? {
                Some(b'\n') => return Ok((line, true)),
                Some(b'\r') => {
                    // consume an LF that follows
                    let entry = self.entry_mut(id)?;
                    if let FileBody::Input { data, cursor } = &mut entry.body {
                        if data.get(*cursor) == Some(&b'\n') {
                            *cursor += 1;
                        }
                    }
                    return Ok((line, true));
                }
                Some(byte) => line.push(byte),
                None => return Ok((line, false)),
            }
        }
    }

    pub fn write(&mut self, id: FileId, bytes: &[u8]) -> PsResult<()> {
        let entry = self.entry_mut(id)?;
        if !entry.open {
            anyhow::bail!(ErrorKind::IoError);
        }
        match &mut entry.body {
            FileBody::Output(sink) => sink.write(bytes),
            FileBody::Input { .. } => anyhow::bail!(ErrorKind::InvalidFileAccess),
        }
    }

    pub fn flush(&mut self, id: FileId) -> PsResult<()> {
        if let FileBody::Output(OutputSink::Stdout) = &self.entry(id)?.body {
            let _ = std::io::stdout().flush();
        }
        Ok(())
    }

    /// Resets an input file's cursor (`resetfile`).
    pub fn reset(&mut self, id: FileId) -> PsResult<()> {
        self.set_cursor(id, 0)
    }

    /// Replaces an input file's remaining bytes, used by `eexec` to switch a
    /// source to its decrypted remainder.
    pub fn splice_input(&mut self, id: FileId, data: Vec<u8>) -> PsResult<()> {
        match &mut self.entry_mut(id)?.body {
            FileBody::Input { data: slot, cursor } => {
                *slot = data;
                *cursor = 0;
                Ok(())
            }
            FileBody::Output(_) => anyhow::bail!(ErrorKind::IoError),
        }
    }

    /// Captured stdout contents, when the table was built with capture on.
    pub fn captured_stdout(&self) -> Option<&[u8]> {
        match &self.entries[STDOUT.0].body {
            FileBody::Output(OutputSink::Capture(buffer)) => Some(buffer),
            _ => None,
        }
    }

    pub fn captured_stderr(&self) -> Option<&[u8]> {
        match &self.entries[STDERR.0].body {
            FileBody::Output(OutputSink::Capture(buffer)) => Some(buffer),
            _ => None,
        }
    }

    pub fn set_stdin(&mut self, data: Vec<u8>) {
        self.entries[STDIN.0].body = FileBody::Input { data, cursor: 0 };
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn standard_streams_resolve_by_name() {
        let table = FileTable::new(true);
        assert_eq!(table.resolve_special(b"%stdin"), Some(STDIN));
        assert_eq!(table.resolve_special(b"%stdout"), Some(STDOUT));
        assert_eq!(table.resolve_special(b"%lineedit"), None);
    }

    #[test]
    fn capture_collects_writes() {
        let mut table = FileTable::new(true);
        table.write(STDOUT, b"7\n").unwrap();
        assert_eq!(table.captured_stdout(), Some(&b"7\n"[..]));
    }

    #[test]
    fn read_line_handles_crlf() {
        let mut table = FileTable::new(true);
        let id = table.open_input(b"f".to_vec(), b"one\r\ntwo\n".to_vec());

        assert_eq!(table.read_line(id).unwrap(), (b"one".to_vec(), true));
        assert_eq!(table.read_line(id).unwrap(), (b"two".to_vec(), true));
        assert_eq!(table.read_line(id).unwrap(), (Vec::new(), false));
    }

    #[test]
    fn closed_file_refuses_reads() {
        let mut table = FileTable::new(true);
        let id = table.open_input(b"f".to_vec(), b"abc".to_vec());
        table.close(id).unwrap();
        assert!(table.read_byte(id).is_err());
    }
}
