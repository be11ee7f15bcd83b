use crate::blob_classifier::{classify, BlobKind};
use crate::config::ExportConfig;
use crate::error::RegistrationError;
use crate::registration::{Registration, ScalarValue};
use crate::schema::{AttachmentField, RegistrationSchema};
use chrono::SecondsFormat;
use printpdf::image_crate::io::Reader as ImageReader;
use rust_xlsxwriter::{Format, Image, Url, Workbook, Worksheet};
use std::io::Cursor;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Download name of the exported workbook
pub const EXPORT_FILENAME: &str = "registrations_export.xlsx";

const SHEET_NAME: &str = "Registrations";
const PRIORITY_COLUMN_WIDTH: f64 = 25.0;
const ATTACHMENT_COLUMN_WIDTH: f64 = 20.0;
const SUBMITTED_AT_COLUMN_WIDTH: f64 = 20.0;
/// Thumbnail offset from the cell's top-left corner, in pixels
const THUMBNAIL_OFFSET_PX: u32 = 5;

/// One worksheet column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub header: String,
    pub width: f64,
}

/// Hyperlink written into an attachment cell
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentLink {
    pub field: AttachmentField,
    pub kind: BlobKind,
    pub url: String,
    pub text: &'static str,
    pub tip: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Link(AttachmentLink),
}

/// Cell contents of one data row, in column order
#[derive(Debug, Clone, PartialEq)]
pub struct RowPlan {
    pub cells: Vec<CellValue>,
    pub has_attachments: bool,
}

/// Renders registrations into an XLSX workbook
#[derive(Debug, Clone)]
pub struct WorkbookRenderer {
    base_url: String,
    thumbnail_px: u32,
    row_height: f64,
    scalar_names: Vec<&'static str>,
    priority_slots: usize,
    columns: Vec<Column>,
}

impl WorkbookRenderer {
    pub fn new(schema: &RegistrationSchema, config: &ExportConfig) -> Self {
        let mut columns: Vec<Column> = schema
            .scalar_fields()
            .iter()
            .map(|field| Column {
                header: field.label.to_string(),
                width: field.column_width,
            })
            .collect();

        columns.extend((1..=schema.priority_slots()).map(|slot| Column {
            header: format!("Priority {slot}"),
            width: PRIORITY_COLUMN_WIDTH,
        }));

        columns.extend(AttachmentField::ALL.iter().map(|field| Column {
            header: field.label().to_string(),
            width: ATTACHMENT_COLUMN_WIDTH,
        }));

        columns.push(Column {
            header: "Submitted At".to_string(),
            width: SUBMITTED_AT_COLUMN_WIDTH,
        });

        Self {
            base_url: config.public_base_url.trim_end_matches('/').to_string(),
            thumbnail_px: config.thumbnail_px,
            row_height: config.row_height,
            scalar_names: schema.scalar_fields().iter().map(|field| field.name).collect(),
            priority_slots: schema.priority_slots(),
            columns,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// URL under which the serving endpoint returns an attachment
    pub fn attachment_url(&self, id: Uuid, field: AttachmentField) -> String {
        format!("{}/api/image/{}/{}", self.base_url, id, field.name())
    }

    /// Lay out the cells of one registration
    pub fn plan_row(&self, registration: &Registration) -> RowPlan {
        let mut cells = Vec::with_capacity(self.columns.len());

        for name in &self.scalar_names {
            cells.push(match registration.scalar(name) {
                Some(ScalarValue::Text(text)) => CellValue::Text(text.to_string()),
                Some(ScalarValue::Number(number)) => CellValue::Number(number),
                None => CellValue::Empty,
            });
        }

        for slot in 0..self.priority_slots {
            cells.push(match registration.priorities.get(slot) {
                Some(branch) if !branch.is_empty() => CellValue::Text(branch.clone()),
                _ => CellValue::Empty,
            });
        }

        let mut has_attachments = false;
        for field in AttachmentField::ALL {
            let link = registration
                .attachment(field)
                .and_then(|bytes| self.attachment_link(registration.id, field, classify(bytes)));
            has_attachments |= link.is_some();
            cells.push(link.map_or(CellValue::Empty, CellValue::Link));
        }

        cells.push(CellValue::Text(
            registration
                .submitted_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        ));

        RowPlan {
            cells,
            has_attachments,
        }
    }

    fn attachment_link(
        &self,
        id: Uuid,
        field: AttachmentField,
        kind: BlobKind,
    ) -> Option<AttachmentLink> {
        if !kind.is_displayable() {
            return None;
        }
        let text = if kind.is_image() {
            "View/Download Image"
        } else {
            "View/Download PDF"
        };

        Some(AttachmentLink {
            field,
            kind,
            url: self.attachment_url(id, field),
            text,
            tip: format!("Download {}", field.name()),
        })
    }

    /// Render all registrations into XLSX bytes
    #[instrument(skip(self, registrations), fields(count = registrations.len()))]
    pub fn render(&self, registrations: &[Registration]) -> Result<Vec<u8>, RegistrationError> {
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;

        for (col, column) in self.columns.iter().enumerate() {
            let col = col as u16;
            worksheet.set_column_width(col, column.width)?;
            worksheet.write_string_with_format(0, col, &column.header, &header_format)?;
        }

        for (index, registration) in registrations.iter().enumerate() {
            let row = index as u32 + 1;
            let plan = self.plan_row(registration);

            for (col, cell) in plan.cells.iter().enumerate() {
                let col = col as u16;
                match cell {
                    CellValue::Empty => {}
                    CellValue::Text(text) => {
                        worksheet.write_string(row, col, text)?;
                    }
                    CellValue::Number(number) => {
                        worksheet.write_number(row, col, *number)?;
                    }
                    CellValue::Link(link) => {
                        let url = Url::new(&link.url).set_text(link.text).set_tip(&link.tip);
                        worksheet.write_url(row, col, url)?;

                        if link.kind.is_image() {
                            if let Some(bytes) = registration.attachment(link.field) {
                                self.insert_thumbnail(worksheet, row, col, bytes, link)?;
                            }
                        }
                    }
                }
            }

            if plan.has_attachments {
                worksheet.set_row_height(row, self.row_height)?;
            }
        }

        let buffer = workbook.save_to_buffer()?;
        debug!(bytes = buffer.len(), "Workbook rendered");

        Ok(buffer)
    }

    /// Anchor a thumbnail over the cell; undecodable images are skipped
    fn insert_thumbnail(
        &self,
        worksheet: &mut Worksheet,
        row: u32,
        col: u16,
        bytes: &[u8],
        link: &AttachmentLink,
    ) -> Result<(), RegistrationError> {
        if let Err(reason) = probe_image(bytes) {
            warn!(field = %link.field, error = %reason, "Skipping undecodable thumbnail");
            return Ok(());
        }

        let image = match Image::new_from_buffer(bytes) {
            Ok(image) => image,
            Err(e) => {
                warn!(field = %link.field, error = %e, "Skipping unsupported thumbnail");
                return Ok(());
            }
        };

        let size = f64::from(self.thumbnail_px);
        let image = image.set_scale_to_size(size, size, false);
        worksheet.insert_image_with_offset(
            row,
            col,
            &image,
            THUMBNAIL_OFFSET_PX,
            THUMBNAIL_OFFSET_PX,
        )?;

        Ok(())
    }
}

/// Read the image header far enough to know its dimensions
fn probe_image(bytes: &[u8]) -> Result<(u32, u32), String> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .into_dimensions()
        .map_err(|e| e.to_string())
}
