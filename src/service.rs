//! Upload validation and response-contract constants.
//!
//! The library does not bind a listener; embedders bring their own HTTP
//! layer and call [`validate_upload`] before handing the body to
//! [`crate::orchestrator::JobOrchestrator::submit`]. Keeping the contract
//! here (rather than in each embedder) pins down the accepted content type
//! and the download headers in one tested place.

/// Content type required on uploads.
pub const UPLOAD_CONTENT_TYPE: &str = "application/zip";

/// Filename offered to clients downloading a finished font.
pub const FONT_ATTACHMENT_FILENAME: &str = "generated_font.ttf";

/// Content type for font downloads.
pub const FONT_CONTENT_TYPE: &str = "application/octet-stream";

/// Why an upload was rejected before a job was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    /// Missing or non-ZIP content type.
    WrongContentType { received: Option<String> },
    /// Zero-length body.
    EmptyBody,
}

impl std::fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongContentType { received } => write!(
                f,
                "expected Content-Type {UPLOAD_CONTENT_TYPE}, received {}",
                received.as_deref().unwrap_or("nothing")
            ),
            Self::EmptyBody => f.write_str("request body is empty"),
        }
    }
}

/// Check an upload's content type and size before admission.
///
/// The media type is matched case-insensitively and parameters after `;`
/// (such as `boundary` or `charset`) are ignored, per how clients actually
/// send it.
pub fn validate_upload(
    content_type: Option<&str>,
    body_len: u64,
) -> Result<(), UploadRejection> {
    let media_type = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
        .unwrap_or("");
    if !media_type.eq_ignore_ascii_case(UPLOAD_CONTENT_TYPE) {
        return Err(UploadRejection::WrongContentType {
            received: content_type.map(str::to_string),
        });
    }
    if body_len == 0 {
        return Err(UploadRejection::EmptyBody);
    }
    Ok(())
}

/// `Content-Disposition` header value for font downloads.
pub fn content_disposition() -> String {
    format!("attachment; filename=\"{FONT_ATTACHMENT_FILENAME}\"")
}
