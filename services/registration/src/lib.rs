//! Admissions Registration Service
//!
//! Backend for the category B admission form. Applicants submit personal
//! details, exam ranks, academic records, branch preferences and scanned
//! documents in one multipart request; the service validates and stores the
//! submission and renders it back for the admissions office.
//!
//! ## Features
//!
//! - **Schema-driven validation**: one immutable [`RegistrationSchema`]
//!   drives validation and the workbook column layout
//! - **Pluggable storage**: PostgreSQL via sqlx, or an in-memory store for
//!   development
//! - **Workbook export**: every registration in one XLSX sheet, with
//!   thumbnails and download links for uploaded documents
//! - **PDF preview**: a printable application form generated from an
//!   unsaved submission
//! - **Attachment serving**: stored documents served inline or as downloads,
//!   typed by their magic bytes
//!
//! ## Architecture
//!
//! ```text
//! Browser form (multipart)
//!        │
//!        ▼
//! ┌──────────────┐   validate   ┌──────────────┐          ┌──────────────┐
//! │ Submission   │─────────────▶│ Record       │─────────▶│ Repository   │
//! │ Form         │              │ Store        │          │ (pg/memory)  │
//! └──────────────┘              └──────────────┘          └──────────────┘
//!        │                             │
//!        ▼                             ├──────────────────┐
//! ┌──────────────┐              ┌──────────────┐   ┌──────────────┐
//! │ Document     │              │ Workbook     │   │ Attachment   │
//! │ Renderer     │              │ Renderer     │   │ Serving      │
//! └──────────────┘              └──────────────┘   └──────────────┘
//!      (PDF)                    (XLSX, links)───────▶   ▲
//!                                                       │
//!                                              Blob Classifier
//! ```

pub mod api;
pub mod blob_classifier;
pub mod config;
pub mod document;
pub mod error;
pub mod pg_repository;
pub mod record_store;
pub mod registration;
pub mod repository;
pub mod schema;
pub mod submission;
pub mod telemetry;
pub mod util;
pub mod workbook;

pub use api::{create_router, start_api_server, AppState};
pub use blob_classifier::{classify, BlobKind};
pub use config::Config;
pub use document::DocumentRenderer;
pub use error::RegistrationError;
pub use pg_repository::PgRegistrationRepository;
pub use record_store::{open_repository, RecordStore};
pub use registration::{InsertedRegistration, NewRegistration, Registration};
pub use repository::{InMemoryRegistrationRepository, RegistrationRepository};
pub use schema::{AttachmentField, RegistrationSchema};
pub use submission::{SubmissionForm, UploadPolicy};
pub use workbook::WorkbookRenderer;
