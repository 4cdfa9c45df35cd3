use crate::error::app_error::AppError;
use crate::models::audio::{SummaryOptions, UploadMeta};
use infer::MatcherType;
use validator::Validate;

pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/ogg",
    "audio/x-m4a",
    "audio/mp4",
    "audio/webm",
    "video/webm",
    "application/octet-stream",
];

pub const ALLOWED_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg", ".m4a", ".mp4", ".webm", ".oga"];

/// Bytes inspected when sniffing the real file type.
pub const SNIFF_LEN: usize = 512;

/// Checks everything the client declared about the upload. Cheap enough to
/// run before any byte of the body is read.
pub fn validate_upload_meta(meta: &UploadMeta, max_file_size: u64) -> Result<(), AppError> {
    if meta.size > max_file_size {
        return Err(AppError::invalid_upload(
            "file",
            format!("file is too large, maximum {}MB", max_file_size / (1024 * 1024)),
        ));
    }

    if meta.size == 0 {
        return Err(AppError::invalid_upload("file", "file is empty"));
    }

    let declared = meta.content_type.as_deref().unwrap_or_default();
    if !ALLOWED_CONTENT_TYPES.contains(&declared) {
        return Err(AppError::invalid_upload(
            "file",
            format!("unsupported file type: {declared}, only audio files are allowed"),
        ));
    }

    let file_name = meta.file_name.as_deref().unwrap_or_default().to_lowercase();
    if !ALLOWED_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext)) {
        return Err(AppError::invalid_upload(
            "file",
            format!("unsupported file extension, allowed: {}", ALLOWED_EXTENSIONS.join(" ")),
        ));
    }

    Ok(())
}

/// Rejects content whose magic bytes say it is neither audio nor video.
/// Unrecognized content passes.
pub fn validate_audio_head(head: &[u8]) -> Result<(), AppError> {
    let head = &head[..head.len().min(SNIFF_LEN)];
    if let Some(kind) = infer::get(head)
        && !matches!(kind.matcher_type(), MatcherType::Audio | MatcherType::Video)
    {
        return Err(AppError::invalid_upload(
            "file",
            format!("file is not audio, detected type: {}", kind.mime_type()),
        ));
    }

    Ok(())
}

/// Parses the optional form fields. Blank values count as absent.
pub fn parse_summary_options(pages: Option<&str>, notes: Option<&str>) -> Result<SummaryOptions, AppError> {
    let pages = match pages.map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => Some(
            raw.parse::<u32>()
                .map_err(|_| AppError::invalid_upload("pages", "pages must be a number"))?,
        ),
        None => None,
    };

    let options = SummaryOptions {
        pages,
        notes: notes.filter(|n| !n.is_empty()).map(str::to_string),
    };

    options.validate().map_err(|errors| {
        let field_errors = errors.field_errors();
        let (field, message) = if let Some(errs) = field_errors.get("pages") {
            ("pages", errs.first().and_then(|e| e.message.clone()))
        } else {
            ("notes", field_errors.get("notes").and_then(|errs| errs.first()).and_then(|e| e.message.clone()))
        };
        AppError::invalid_upload(field, message.map(|m| m.to_string()).unwrap_or_else(|| format!("invalid {field}")))
    })?;

    Ok(options)
}
