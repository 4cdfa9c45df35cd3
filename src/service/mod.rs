pub mod oauth;
pub mod pdf;
pub mod session;
pub mod transcription;
pub mod upload;
pub mod user;
