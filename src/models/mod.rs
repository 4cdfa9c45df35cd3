pub mod audio;
pub mod oauth;
pub mod session;
pub mod user;
