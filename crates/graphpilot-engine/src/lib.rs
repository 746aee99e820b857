pub mod client;
pub mod http;
pub mod session;
pub mod status;

pub use client::EngineClient;
pub use http::{HttpDocumentStore, HttpEngineApi};
pub use session::EngineSession;
pub use status::normalize_job_status;
