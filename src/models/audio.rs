use rocket::FromForm;
use rocket::fs::TempFile;
use serde::Serialize;
use validator::Validate;

/// Multipart body of `POST /audio`.
#[derive(FromForm)]
pub struct AudioUpload<'r> {
    pub file: TempFile<'r>,
    pub pages: Option<String>,
    pub notes: Option<String>,
}

/// What the client declared about the uploaded file.
#[derive(Debug, Clone, Default)]
pub struct UploadMeta {
    pub size: u64,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

impl UploadMeta {
    pub fn from_temp_file(file: &TempFile<'_>) -> Self {
        UploadMeta {
            size: file.len(),
            content_type: file.content_type().map(|ct| format!("{}/{}", ct.top(), ct.sub())),
            file_name: file.raw_name().map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Validate)]
pub struct SummaryOptions {
    #[validate(range(min = 1, max = 50, message = "pages must be between 1 and 50"))]
    pub pages: Option<u32>,
    #[validate(length(max = 1000, message = "notes is too long (maximum 1000 characters)"))]
    pub notes: Option<String>,
}
