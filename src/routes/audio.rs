use crate::config::Config;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::audio::{AudioUpload, UploadMeta};
use crate::service::pdf::PdfService;
use crate::service::transcription::Summarizer;
use crate::service::upload::{SNIFF_LEN, parse_summary_options, validate_audio_head, validate_upload_meta};
use rocket::form::{self, Errors, Form};
use rocket::http::{Header, Status};
use rocket::{Responder, State, post, routes};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

#[derive(Responder)]
#[response(content_type = "application/pdf")]
pub struct PdfDownload {
    body: Vec<u8>,
    disposition: Header<'static>,
}

impl PdfDownload {
    fn attachment(body: Vec<u8>, file_name: &str) -> Self {
        PdfDownload {
            body,
            disposition: Header::new("Content-Disposition", format!("attachment; filename={file_name}")),
        }
    }
}

fn form_error(errors: &Errors<'_>, max_file_size: u64) -> AppError {
    if errors.status() == Status::PayloadTooLarge {
        return AppError::invalid_upload("file", format!("file is too large, maximum {}MB", max_file_size / (1024 * 1024)));
    }

    if errors.iter().any(|e| e.is_for("file") && matches!(e.kind, form::error::ErrorKind::Missing)) {
        return AppError::invalid_upload("file", "file is required");
    }

    AppError::BadRequest(errors.to_string())
}

/// Turns a lecture recording into handwritten-style notes delivered as a PDF.
#[post("/", data = "<upload>")]
pub async fn create_notes(
    upload: Result<Form<AudioUpload<'_>>, Errors<'_>>,
    summarizer: &State<Arc<dyn Summarizer>>,
    pdf: &State<PdfService>,
    config: &State<Config>,
    _rate_limit: RateLimit,
) -> Result<PdfDownload, AppError> {
    let max_file_size = config.upload.max_file_size;
    let upload = upload.map_err(|errors| form_error(&errors, max_file_size))?;
    let meta = UploadMeta::from_temp_file(&upload.file);
    if let Err(err) = validate_upload_meta(&meta, max_file_size) {
        warn!(error = %err, size = meta.size, content_type = ?meta.content_type, "audio upload rejected");
        return Err(err);
    }
    let options = parse_summary_options(upload.pages.as_deref(), upload.notes.as_deref())?;

    let reader = upload.file.open().await.map_err(|e| AppError::io("Failed to open uploaded file", e))?;
    tokio::pin!(reader);
    let mut audio = Vec::with_capacity(SNIFF_LEN);
    reader
        .as_mut()
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut audio)
        .await
        .map_err(|e| AppError::io("Failed to read uploaded file", e))?;

    if let Err(err) = validate_audio_head(&audio) {
        warn!(error = %err, size = meta.size, "audio upload rejected");
        return Err(err);
    }

    audio.reserve(meta.size as usize);
    reader
        .read_to_end(&mut audio)
        .await
        .map_err(|e| AppError::io("Failed to read uploaded file", e))?;

    let file_name = meta.file_name.as_deref().unwrap_or("audio");
    info!(size = meta.size, file_name, pages = ?options.pages, "transcribing audio upload");

    let summary = summarizer
        .summarize(&audio, file_name, options.pages, options.notes.as_deref())
        .await?;
    let document = pdf.create_pdf(summary).await?;

    info!(bytes = document.len(), "notes PDF generated");
    Ok(PdfDownload::attachment(document, "notes.pdf"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![create_notes]
}
