//! Uploaded images: multipart intake, size caps, generated names.

use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub mod saga;

pub use saga::AttachmentSaga;

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

impl UploadItem {
    /// Fails with `TooLarge` when the body exceeds `max_bytes`; exactly `max_bytes` is fine.
    pub fn ensure_within(&self, max_bytes: usize, too_large: &str) -> ApiResult<()> {
        if self.body.len() > max_bytes {
            return Err(ApiError::TooLarge(too_large.to_string()));
        }
        Ok(())
    }

    pub fn generated_name(&self) -> String {
        generate_name(&self.file_name, &self.content_type)
    }
}

/// Text fields plus the single file field of a multipart form.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadItem>,
}

impl MultipartForm {
    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(|s| s.trim()).unwrap_or("")
    }
}

pub async fn read_form(mut mp: Multipart, file_field: &str) -> ApiResult<MultipartForm> {
    let mut form = MultipartForm::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == file_field {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let body = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            // browsers send an empty part when no file was chosen
            if !body.is_empty() {
                form.file = Some(UploadItem {
                    file_name,
                    content_type,
                    body,
                });
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

/// `<base><uuid>.<ext>` where base is the original name up to its first dot and
/// ext is what follows its last dot.
pub fn generate_name(original: &str, content_type: &str) -> String {
    let file = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let base: String = file
        .split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let ext = match file.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            Some(ext.to_ascii_lowercase())
        }
        _ => ext_from_mime(content_type).map(str::to_string),
    };

    let id = Uuid::new_v4();
    match ext {
        Some(ext) => format!("{base}{id}.{ext}"),
        None => format!("{base}{id}"),
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}
