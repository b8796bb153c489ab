use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PdfToolsError {
    #[error("{0}")]
    InvalidSelection(String),

    #[error("Failed to read PDF: {0}")]
    CorruptDocument(String),

    #[error("At least 2 PDF files are required to merge, got {count}")]
    EmptyInputSet { count: usize },

    #[error("At most {max} PDF files can be merged at once, got {count}")]
    TooManyInputs { count: usize, max: usize },

    #[error("PDF operation failed: {0}")]
    OperationFailed(String),

    #[error("Failed to build ZIP bundle: {0}")]
    Bundle(String),
}

impl PdfToolsError {
    /// Stable machine-readable kind, shared with the HTTP error codes.
    pub fn kind(&self) -> &'static str {
        match self {
            PdfToolsError::InvalidSelection(_) => "INVALID_SELECTION",
            PdfToolsError::CorruptDocument(_) => "CORRUPT_DOCUMENT",
            PdfToolsError::EmptyInputSet { .. } => "EMPTY_INPUT_SET",
            PdfToolsError::TooManyInputs { .. } => "TOO_MANY_INPUTS",
            PdfToolsError::OperationFailed(_) | PdfToolsError::Bundle(_) => "INTERNAL_ERROR",
        }
    }
}
