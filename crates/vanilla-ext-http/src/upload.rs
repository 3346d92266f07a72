//! Uploaded files.
//!
//! Decoding a multipart body belongs to the hosting server; views receive the
//! result as a [`FileDict`] keyed by input name, exactly like submitted
//! field data.

use vanilla_ext_core::utils::MultiValueDict;

/// A file uploaded through a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// The original filename as provided by the client.
    pub name: String,
    /// The MIME content type of the file.
    pub content_type: String,
    /// The size of the file content in bytes.
    pub size: usize,
    /// The raw file content.
    pub content: Vec<u8>,
}

impl UploadedFile {
    /// Creates an upload from a filename, content type, and bytes.
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: content.len(),
            content,
        }
    }

    /// Returns the lowercase extension of the filename, if any.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Uploaded files keyed by input name.
pub type FileDict = MultiValueDict<String, UploadedFile>;
