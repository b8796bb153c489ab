//! Multipart upload handling

use std::collections::HashMap;

use axum::extract::Multipart;
use tracing::debug;

use crate::error::ApiError;

/// An uploaded file
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Reject anything that is not a non-empty PDF upload
    pub fn validate_pdf(&self) -> Result<(), ApiError> {
        if !self.filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(ApiError::InvalidRequest(format!(
                "Only PDF files are allowed, got '{}'",
                self.filename
            )));
        }

        if let Some(content_type) = &self.content_type {
            let essence = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim();
            if !essence.eq_ignore_ascii_case("application/pdf") {
                return Err(ApiError::InvalidRequest(format!(
                    "Invalid content type '{}', expected application/pdf",
                    content_type
                )));
            }
        }

        if self.bytes.is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "File '{}' is empty",
                self.filename
            )));
        }

        Ok(())
    }
}

/// All parts of a multipart form: files by field name, in arrival order, and
/// text fields
#[derive(Debug, Default)]
pub struct UploadForm {
    files: HashMap<String, Vec<Upload>>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to read upload: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);

            let bytes = field.bytes().await.map_err(|e| {
                ApiError::InvalidRequest(format!("Failed to read field '{}': {}", name, e))
            })?;

            match filename {
                Some(filename) => {
                    debug!(
                        "Received file field '{}': {} ({} bytes)",
                        name,
                        filename,
                        bytes.len()
                    );
                    form.files.entry(name).or_default().push(Upload {
                        filename,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let value = String::from_utf8(bytes.to_vec()).map_err(|_| {
                        ApiError::InvalidRequest(format!("Field '{}' is not valid UTF-8", name))
                    })?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// The single validated PDF in field `name`
    pub fn pdf(&mut self, name: &str) -> Result<Upload, ApiError> {
        let mut uploads = self.files.remove(name).unwrap_or_default();
        if uploads.len() > 1 {
            return Err(ApiError::InvalidRequest(format!(
                "Expected one file in field '{}', got {}",
                name,
                uploads.len()
            )));
        }
        let upload = uploads
            .pop()
            .ok_or_else(|| ApiError::InvalidRequest(format!("Missing file field '{}'", name)))?;
        upload.validate_pdf()?;
        Ok(upload)
    }

    /// Every file in field `name`, unvalidated, in arrival order
    pub fn files(&mut self, name: &str) -> Vec<Upload> {
        self.files.remove(name).unwrap_or_default()
    }

    /// A required, non-blank text field
    pub fn text(&self, name: &str) -> Result<&str, ApiError> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest(format!("Missing field '{}'", name)))
    }
}
