use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::mem::{Memory, MEM_LEN};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoaderError {
    #[error("cannot read program image: {0}")]
    Io(String),
    #[error("line {line}: invalid binary literal `{text}`")]
    BadLiteral { line: usize, text: String },
    #[error("program image longer than 256 bytes")]
    TooLong,
}

/// Reads a `.ls8` program image from disk into a memory.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Memory, LoaderError> {
    let text = fs::read_to_string(path).map_err(|e| LoaderError::Io(e.to_string()))?;
    parse(&text)
}

/// Parses the text image format: a line whose first character is `0` or
/// `1` contributes one byte, read as an 8-bit binary literal from the
/// text before an optional `#` comment. Every other line is skipped.
/// Bytes land in memory from address 0 in file order; the rest stays 0.
pub fn parse(text: &str) -> Result<Memory, LoaderError> {
    let mut image = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if !line.starts_with('0') && !line.starts_with('1') {
            continue;
        }
        let literal = line.split('#').next().unwrap_or("").trim();
        let byte = u8::from_str_radix(literal, 2).map_err(|_| LoaderError::BadLiteral {
            line: i + 1,
            text: String::from(literal),
        })?;
        image.push(byte);
    }
    if image.len() > MEM_LEN {
        return Err(LoaderError::TooLong);
    }
    Ok(Memory::from_image(&image))
}
