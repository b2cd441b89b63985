//! Typed data carried between pipeline segments.

use serde::{Deserialize, Serialize};

/// Payload of a blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BlobContent {
    Text(String),
    Structured(serde_json::Value),
    Binary(Vec<u8>),
    /// Terminal: a pipeline stops at the first error blob.
    Error(String),
}

/// Where a blob came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    /// Index of the producing segment.
    pub source_segment: Option<usize>,
    pub exit_code: Option<i32>,
    /// Shell that produced the content, for native segments.
    pub shell: Option<String>,
}

/// Unit of data flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub content: BlobContent,
    #[serde(default)]
    pub meta: BlobMeta,
}

impl Blob {
    pub fn text(s: impl Into<String>) -> Self {
        Self::from_content(BlobContent::Text(s.into()))
    }

    pub fn structured(value: serde_json::Value) -> Self {
        Self::from_content(BlobContent::Structured(value))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::from_content(BlobContent::Error(message.into()))
    }

    pub fn empty() -> Self {
        Self::text(String::new())
    }

    fn from_content(content: BlobContent) -> Self {
        Self {
            content,
            meta: BlobMeta::default(),
        }
    }

    /// Wrap raw process output: valid UTF-8 becomes text, anything else binary.
    pub fn from_output(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(s) => Self::text(s),
            Err(e) => Self::from_content(BlobContent::Binary(e.into_bytes())),
        }
    }

    pub fn with_source(mut self, segment: usize) -> Self {
        self.meta.source_segment = Some(segment);
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.meta.exit_code = Some(code);
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.meta.shell = Some(shell.into());
        self
    }

    /// `text`, `structured_data`, `binary` or `error`.
    pub fn kind(&self) -> &'static str {
        match self.content {
            BlobContent::Text(_) => "text",
            BlobContent::Structured(_) => "structured_data",
            BlobContent::Binary(_) => "binary",
            BlobContent::Error(_) => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.content, BlobContent::Error(_))
    }

    /// Bytes fed to a native segment's stdin.
    pub fn to_stdin(&self) -> Vec<u8> {
        match &self.content {
            BlobContent::Text(s) | BlobContent::Error(s) => s.as_bytes().to_vec(),
            BlobContent::Structured(v) => serde_json::to_string_pretty(v)
                .unwrap_or_else(|_| v.to_string())
                .into_bytes(),
            BlobContent::Binary(b) => b.clone(),
        }
    }

    /// Human-readable rendering for the final pipeline result.
    pub fn render(&self) -> String {
        match &self.content {
            BlobContent::Text(s) | BlobContent::Error(s) => s.clone(),
            BlobContent::Structured(_) => String::from_utf8_lossy(&self.to_stdin()).into_owned(),
            BlobContent::Binary(b) => format!("<{} bytes of binary data>", b.len()),
        }
    }

    /// Text view used by line-oriented transformers. `None` for binary data.
    pub fn as_text(&self) -> Option<String> {
        match &self.content {
            BlobContent::Text(s) => Some(s.clone()),
            BlobContent::Structured(_) => Some(self.render()),
            BlobContent::Binary(_) | BlobContent::Error(_) => None,
        }
    }
}
