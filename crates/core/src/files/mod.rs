//! File intake: type and size validation ahead of any decode attempt.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{FileConfig, PlayerError, Result};

/// A validated audio file held in memory.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl AudioFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lower-case extension of the file name, used as a decoder hint.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.name)
    }
}

/// Display metadata for the currently loaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: String,
    pub mime: String,
}

#[derive(Debug, Default)]
pub struct FileManager {
    config: FileConfig,
    current: Option<FileInfo>,
}

impl FileManager {
    pub fn new(config: FileConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Type first, then size, matching what the user is told first.
    pub fn validate(&self, mime: &str, size: u64) -> Result<()> {
        let supported = mime.starts_with("audio/")
            && self.config.supported_formats.iter().any(|format| {
                format
                    .split_once('/')
                    .map(|(_, subtype)| mime.contains(subtype))
                    .unwrap_or(false)
            });
        if !supported {
            return Err(PlayerError::UnsupportedFileType {
                mime: mime.to_string(),
            });
        }

        if size > self.config.max_file_size {
            return Err(PlayerError::OversizeFile {
                size,
                limit: self.config.max_file_size,
            });
        }
        Ok(())
    }

    /// Validates bytes that were already read by the host.
    pub fn load_bytes(&mut self, name: &str, mime: &str, bytes: Vec<u8>) -> Result<AudioFile> {
        self.validate(mime, bytes.len() as u64)?;
        let file = AudioFile {
            name: name.to_string(),
            mime: mime.to_string(),
            bytes,
        };
        self.remember(&file);
        Ok(file)
    }

    /// Reads a file from disk; the MIME type is derived from its extension.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<AudioFile> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = file_extension(&name)
            .and_then(|extension| mime_for_extension(&extension))
            .unwrap_or("application/octet-stream");

        // Check the size before pulling the whole file into memory.
        let size = std::fs::metadata(path)?.len();
        self.validate(mime, size)?;

        let bytes = std::fs::read(path)?;
        tracing::info!(name = %name, mime, size, "audio file read");
        let file = AudioFile {
            name,
            mime: mime.to_string(),
            bytes,
        };
        self.remember(&file);
        Ok(file)
    }

    pub fn current_file(&self) -> Option<&FileInfo> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    fn remember(&mut self, file: &AudioFile) {
        self.current = Some(FileInfo {
            name: file.name.clone(),
            size: format_file_size(file.size()),
            mime: file.mime.clone(),
        });
    }
}

/// MIME type for a known audio file extension.
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "wav" | "wave" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "m4a" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        _ => return None,
    };
    Some(mime)
}

fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
}

/// Human readable byte count, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let exponent = ((bytes as f64).ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024_f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[exponent])
}
