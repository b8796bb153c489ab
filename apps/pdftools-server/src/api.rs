//! API handlers for the PDF tools server
//!
//! Provides REST endpoints for:
//! - PDF to DOCX conversion, direct or gated behind an emailed download link
//! - Download token redemption
//! - Inspection, split, extract and merge

use axum::{
    extract::{Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use download_gate::{download_notice, RedemptionPolicy};
use pdftools_core::{
    extract_pages, file_stem, inspect, merge_documents, page_entry_name, parse_page_list,
    parse_range_list, range_entry_name, split_by_page, split_by_ranges, zip_bundle, DocumentInfo,
    PdfDocument, PdfToolsError, MAX_MERGE_INPUTS,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::convert::{convert_in_scratch, PendingArtifact};
use crate::error::ApiError;
use crate::state::AppState;
use crate::upload::{Upload, UploadForm};

pub const PDF_MIME: &str = "application/pdf";
pub const ZIP_MIME: &str = "application/zip";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Build a file download response
fn attachment(bytes: Vec<u8>, content_type: &str, filename: &str) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", header_safe(filename));
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

/// Replace anything that cannot appear in a quoted header parameter
fn header_safe(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Service banner response
#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub version: &'static str,
}

/// Handler: GET /
pub async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "PDF tools API",
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdftools-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler: POST /convert
pub async fn handle_convert(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.pdf("file")?;
    let filename = format!("{}.docx", file_stem(&upload.filename));
    info!("Convert request: {} ({} bytes)", upload.filename, upload.bytes.len());

    let renderer = state.renderer.clone();
    let work_dir = state.work_dir.clone();
    let docx = state
        .pool
        .run(move || {
            PdfDocument::load(&upload.bytes)?.require_pages()?;
            convert_in_scratch(renderer.as_ref(), &work_dir, &upload.bytes)?.read()
        })
        .await?;

    Ok(attachment(docx, DOCX_MIME, &filename))
}

/// Gated conversion response
#[derive(Serialize)]
pub struct GatedConvertResponse {
    pub success: bool,
    pub artifact_id: String,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

/// Handler: POST /convert/gated
///
/// The converted file is not returned. It is registered for its owner and a
/// download link is mailed to them.
pub async fn handle_convert_gated(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<GatedConvertResponse>, ApiError> {
    let gated = state.gated.clone().ok_or(ApiError::GatedDeliveryDisabled)?;

    let mut form = UploadForm::read(multipart).await?;
    let email = form.text("email")?.to_string();
    let upload = form.pdf("file")?;
    info!("Gated convert request from {}: {}", email, upload.filename);

    let principal = gated
        .directory
        .lookup(&email)
        .await?
        .ok_or_else(|| ApiError::UnauthorizedPrincipal(email.clone()))?;

    let artifact_id = Uuid::new_v4().to_string();
    let filename = format!("{}.docx", file_stem(&upload.filename));
    // Deletes the file on any exit before registration, including one the
    // job writes after this request has timed out or gone away
    let pending = PendingArtifact::new(gated.artifact_dir.join(format!("{}.docx", artifact_id)));

    let renderer = state.renderer.clone();
    let work_dir = state.work_dir.clone();
    let writer = pending.writer();
    state
        .pool
        .run(move || {
            PdfDocument::load(&upload.bytes)?.require_pages()?;
            let converted = convert_in_scratch(renderer.as_ref(), &work_dir, &upload.bytes)?;
            writer.store(converted)
        })
        .await?;

    state
        .registry
        .register(
            &artifact_id,
            pending.path().to_path_buf(),
            &principal.id,
            &filename,
        )
        .await;
    pending.disarm();

    let issued = match gated.tokens.issue(&principal, &artifact_id) {
        Ok(issued) => issued,
        Err(e) => {
            state.registry.release(&artifact_id).await;
            return Err(e.into());
        }
    };

    let link = format!("{}/download?token={}", gated.public_url, issued.token);
    let message = download_notice(&principal, &filename, &link, gated.tokens.ttl());

    // Nobody could ever fetch an artifact whose link was not delivered
    if let Err(e) = gated.mailer.send(&message).await {
        state.registry.release(&artifact_id).await;
        return Err(e.into());
    }

    info!("Artifact {} ready for {}", artifact_id, principal.id);

    Ok(Json(GatedConvertResponse {
        success: true,
        artifact_id,
        expires_at: issued.claims.expires_at(),
        message: format!("Download link sent to {}", principal.email),
    }))
}

/// Download query parameters
#[derive(Deserialize)]
pub struct DownloadQuery {
    pub token: Option<String>,
}

/// Handler: GET /download?token=
pub async fn handle_download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let gated = state.gated.clone().ok_or(ApiError::GatedDeliveryDisabled)?;

    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::InvalidClaim("Missing token".to_string()))?;

    let claims = gated.tokens.redeem(&token)?;
    let entry = state.registry.resolve(&claims.file_id, &claims.sub).await?;

    let bytes = tokio::fs::read(&entry.location).await.map_err(|e| {
        warn!("Artifact {} could not be read: {}", claims.file_id, e);
        ApiError::ArtifactUnavailable
    })?;

    if gated.tokens.policy() == RedemptionPolicy::SingleUse {
        state.registry.release(&claims.file_id).await;
    }

    info!("Artifact {} downloaded by {}", claims.file_id, claims.sub);
    Ok(attachment(bytes, DOCX_MIME, &entry.filename))
}

/// Inspection response
#[derive(Serialize)]
pub struct InfoResponse {
    pub success: bool,
    pub filename: String,
    pub info: DocumentInfo,
}

/// Handler: POST /pdf/info
pub async fn handle_info(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<InfoResponse>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.pdf("file")?;
    let filename = upload.filename.clone();

    let info = state
        .pool
        .run(move || {
            let doc = PdfDocument::load(&upload.bytes)?;
            Ok(inspect(&doc))
        })
        .await?;

    debug!("{} has {} pages", filename, info.total_pages);
    Ok(Json(InfoResponse {
        success: true,
        filename,
        info,
    }))
}

/// Handler: POST /pdf/split/pages
pub async fn handle_split_pages(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.pdf("file")?;
    let stem = file_stem(&upload.filename).to_string();
    let bundle_name = format!("split_{}.zip", stem);

    let archive = state
        .pool
        .run(move || {
            let doc = PdfDocument::load(&upload.bytes)?;
            let total = doc.page_count();
            let entries = split_by_page(&doc)?
                .into_iter()
                .zip(1..)
                .map(|(part, page)| Ok((page_entry_name(&stem, page, total), part.into_bytes()?)))
                .collect::<Result<Vec<_>, PdfToolsError>>()?;
            info!("Split {} into {} pages", stem, entries.len());
            Ok(zip_bundle(&entries)?)
        })
        .await?;

    Ok(attachment(archive, ZIP_MIME, &bundle_name))
}

/// Handler: POST /pdf/split/ranges
pub async fn handle_split_ranges(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let ranges = parse_range_list(form.text("ranges")?)?;
    let upload = form.pdf("file")?;
    let stem = file_stem(&upload.filename).to_string();
    let bundle_name = format!("split_{}.zip", stem);

    let archive = state
        .pool
        .run(move || {
            let doc = PdfDocument::load(&upload.bytes)?;
            let entries = split_by_ranges(&doc, &ranges)?
                .into_iter()
                .map(|(range, part)| Ok((range_entry_name(&stem, &range), part.into_bytes()?)))
                .collect::<Result<Vec<_>, PdfToolsError>>()?;
            info!("Split {} into {} ranges", stem, entries.len());
            Ok(zip_bundle(&entries)?)
        })
        .await?;

    Ok(attachment(archive, ZIP_MIME, &bundle_name))
}

/// Handler: POST /pdf/extract/pages
pub async fn handle_extract_pages(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let pages = parse_page_list(form.text("pages")?)?;
    let upload = form.pdf("file")?;
    let filename = format!("extracted_{}", upload.filename);

    let pdf = state
        .pool
        .run(move || {
            let doc = PdfDocument::load(&upload.bytes)?;
            let (selected, extracted) = extract_pages(&doc, &pages)?;
            info!("Extracted pages {:?} from {}", selected, upload.filename);
            Ok(extracted.into_bytes()?)
        })
        .await?;

    Ok(attachment(pdf, PDF_MIME, &filename))
}

/// Handler: POST /pdf/merge
pub async fn handle_merge(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let uploads = form.files("files");

    // Cardinality is checked before any file is looked at
    if uploads.len() < 2 {
        return Err(ApiError::EmptyInputSet(uploads.len()));
    }
    if uploads.len() > MAX_MERGE_INPUTS {
        return Err(ApiError::TooManyInputs {
            count: uploads.len(),
            max: MAX_MERGE_INPUTS,
        });
    }
    uploads.iter().try_for_each(Upload::validate_pdf)?;

    let pdf = state
        .pool
        .run(move || {
            let docs = uploads
                .iter()
                .map(|upload| {
                    PdfDocument::load(&upload.bytes).map_err(|e| match e {
                        PdfToolsError::CorruptDocument(msg) => {
                            ApiError::CorruptDocument(format!("{}: {}", upload.filename, msg))
                        }
                        other => other.into(),
                    })
                })
                .collect::<Result<Vec<_>, ApiError>>()?;

            let merged = merge_documents(&docs)?;
            info!(
                "Merged {} files into {} pages",
                docs.len(),
                merged.page_count()
            );
            Ok(merged.into_bytes()?)
        })
        .await?;

    Ok(attachment(pdf, PDF_MIME, "merged_document.pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_safe() {
        assert_eq!(header_safe("report (1).pdf"), "report (1).pdf");
        assert_eq!(header_safe("a\"b\r\n.pdf"), "a_b__.pdf");
        assert_eq!(header_safe("informe_año.pdf"), "informe_a_o.pdf");
    }
}
