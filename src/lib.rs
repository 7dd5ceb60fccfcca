pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod history;
pub mod inference;
pub mod report;
pub mod schema;
pub mod session;
pub mod severity;

pub use history::{AdmissionPolicy, History};
pub use schema::{Detection, ImageResult, SeverityReport};
pub use session::Session;
