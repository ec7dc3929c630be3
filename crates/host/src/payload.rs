//! Bulk JSON handed over through a descriptor instead of inline in a frame

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::os::fd::OwnedFd;

use osforge_errors::Error;
use serde_json::Value;

/// Write `value` into `file` and rewind it so the receiver reads from the
/// start. The file is usually an unlinked scratch file.
///
/// # Errors
/// Fails if the file cannot be written.
pub fn write_payload(file: File, value: &Value) -> Result<OwnedFd, Error> {
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    let mut file = writer.into_inner().map_err(|e| Error::from(e.into_error()))?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file.into())
}

/// Read a JSON payload from the start of `fd`.
///
/// # Errors
/// Fails on I/O errors or if the content is not JSON.
pub fn read_payload(fd: OwnedFd) -> Result<Value, Error> {
    let mut file = File::from(fd);
    file.seek(SeekFrom::Start(0))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(serde_json::from_slice(&data)?)
}
