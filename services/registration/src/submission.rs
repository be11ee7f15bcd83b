use crate::config::UploadConfig;
use crate::error::RegistrationError;
use crate::schema::AttachmentField;
use axum::extract::multipart::{Field, Multipart, MultipartError};
use std::collections::BTreeMap;
use tracing::debug;

/// Part name carrying the JSON-encoded branch priorities
pub const PRIORITIES_FIELD: &str = "priorities";

/// Limits applied to uploaded files before anything is stored
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_bytes: usize,
    allowed_content_types: Vec<String>,
}

impl UploadPolicy {
    pub fn new(max_file_bytes: usize, allowed_content_types: Vec<String>) -> Self {
        Self {
            max_file_bytes,
            allowed_content_types,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.max_file_bytes, config.allowed_content_types.clone())
    }

    /// Request body limit large enough for every attachment at full size
    pub fn request_body_limit(&self) -> usize {
        self.max_file_bytes
            .saturating_mul(AttachmentField::ALL.len())
            .saturating_add(1024 * 1024)
    }

    pub fn check_content_type(
        &self,
        field: AttachmentField,
        content_type: Option<&str>,
    ) -> Result<(), RegistrationError> {
        let declared = content_type
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase());

        match declared {
            Some(declared) if self.allowed_content_types.iter().any(|t| *t == declared) => Ok(()),
            _ => Err(RegistrationError::validation(
                field.name(),
                format!(
                    "Invalid file type for {}. Only JPEG, PNG, and PDF are allowed.",
                    field.name()
                ),
            )),
        }
    }

    pub fn check_size(&self, field: AttachmentField, len: usize) -> Result<(), RegistrationError> {
        if len > self.max_file_bytes {
            return Err(RegistrationError::validation(
                field.name(),
                format!(
                    "File size for {} exceeds {} byte limit",
                    field.name(),
                    self.max_file_bytes
                ),
            ));
        }
        Ok(())
    }
}

/// Field values, priorities and attachments of one submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionForm {
    text: BTreeMap<String, String>,
    priorities: Vec<String>,
    attachments: BTreeMap<AttachmentField, Vec<u8>>,
}

impl SubmissionForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_text(name, value);
        self
    }

    pub fn with_priorities(mut self, priorities: Vec<String>) -> Self {
        self.priorities = priorities;
        self
    }

    pub fn with_attachment(mut self, field: AttachmentField, bytes: Vec<u8>) -> Self {
        self.set_attachment(field, bytes);
        self
    }

    pub fn set_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.text.insert(name.into(), value.into());
    }

    /// Trimmed value of a text part; blank values read as absent
    pub fn text(&self, name: &str) -> Option<&str> {
        self.text
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn applicant_name(&self) -> Option<&str> {
        self.text("name")
    }

    pub fn priorities(&self) -> &[String] {
        &self.priorities
    }

    /// Parse the JSON-encoded priorities part.
    ///
    /// The value must be a JSON array; `null` entries become empty slots so
    /// positions are preserved. A blank value means no priorities.
    pub fn set_priorities_json(&mut self, raw: &str) -> Result<(), RegistrationError> {
        if raw.trim().is_empty() {
            self.priorities.clear();
            return Ok(());
        }

        let invalid = |reason: String| {
            RegistrationError::validation(
                PRIORITIES_FIELD,
                format!("Invalid priorities format: {reason}"),
            )
        };

        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
        let entries = value
            .as_array()
            .ok_or_else(|| invalid("Priorities must be an array".to_string()))?;

        self.priorities = entries
            .iter()
            .map(|entry| match entry {
                serde_json::Value::String(branch) => Ok(branch.clone()),
                serde_json::Value::Null => Ok(String::new()),
                other => Err(invalid(format!("unexpected entry {other}"))),
            })
            .collect::<Result<_, _>>()?;

        Ok(())
    }

    /// Store an attachment; empty buffers are treated as not uploaded
    pub fn set_attachment(&mut self, field: AttachmentField, bytes: Vec<u8>) {
        if bytes.is_empty() {
            self.attachments.remove(&field);
        } else {
            self.attachments.insert(field, bytes);
        }
    }

    pub fn attachment(&self, field: AttachmentField) -> Option<&[u8]> {
        self.attachments.get(&field).map(Vec::as_slice)
    }

    /// Read a multipart request into a form, enforcing the upload policy.
    ///
    /// Text parts with unknown names are ignored. File parts must use one
    /// of the attachment names; a file part without a file name (what
    /// browsers send for an untouched file input) is skipped.
    pub async fn from_multipart(
        mut multipart: Multipart,
        policy: &UploadPolicy,
    ) -> Result<Self, RegistrationError> {
        let mut form = Self::new();

        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            match field.file_name() {
                Some(file_name) => {
                    let slot = AttachmentField::from_name(&name).ok_or_else(|| {
                        RegistrationError::validation(
                            name.as_str(),
                            format!("Unexpected file field: {name}"),
                        )
                    })?;
                    if file_name.is_empty() {
                        continue;
                    }
                    policy.check_content_type(slot, field.content_type())?;
                    let bytes = read_limited(field, slot, policy).await?;
                    form.set_attachment(slot, bytes);
                }
                None if name == PRIORITIES_FIELD => {
                    let raw = field.text().await.map_err(malformed)?;
                    form.set_priorities_json(&raw)?;
                }
                None if AttachmentField::from_name(&name).is_some() => {
                    debug!(field = %name, "Ignoring attachment part sent without a file");
                }
                None => {
                    let value = field.text().await.map_err(malformed)?;
                    form.set_text(name, value);
                }
            }
        }

        Ok(form)
    }
}

/// Read a file part chunk by chunk, failing as soon as it exceeds the limit
async fn read_limited(
    mut field: Field<'_>,
    slot: AttachmentField,
    policy: &UploadPolicy,
) -> Result<Vec<u8>, RegistrationError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(malformed)? {
        policy.check_size(slot, bytes.len() + chunk.len())?;
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn malformed(e: MultipartError) -> RegistrationError {
    RegistrationError::validation("form", format!("Malformed multipart body: {e}"))
}
