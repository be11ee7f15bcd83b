use crate::blob_classifier::{classify, BlobKind};
use crate::config::ExportConfig;
use crate::error::RegistrationError;
use crate::schema::AttachmentField;
use crate::submission::SubmissionForm;
use crate::util::sanitize_path_component;
use printpdf::image_crate::{self, DynamicImage, GenericImageView};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point,
};
use tracing::{instrument, warn};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 17.64;
const PT_TO_MM: f32 = 0.352_778;
/// Images are scaled to fit a square of this many points
const IMAGE_BOX_PT: f32 = 250.0;
const INDENT_PT: f32 = 10.0;
/// Rough Helvetica advance per character as a fraction of the font size
const CHAR_WIDTH_EM: f32 = 0.5;
const LAYER_NAME: &str = "Layer 1";

const TITLE_SIZE: f32 = 16.0;
const SUBTITLE_SIZE: f32 = 12.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 10.0;

const NOT_AVAILABLE: &str = "N/A";

/// Labelled lines of each text section, keyed by form field name
const SECTIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "Personal Information",
        &[
            ("Full Name", "name"),
            ("Father's Name", "fatherName"),
            ("Address", "address"),
            ("Mobile Number", "mobile"),
            ("Resident", "resident"),
        ],
    ),
    (
        "Entrance Exam Details",
        &[("JEE Rank", "jeeRank"), ("EAPCET Rank", "eapcetRank")],
    ),
    (
        "10th Class Details",
        &[
            ("Board", "board10th"),
            ("Total Marks", "maxMarks10th"),
            ("Marks Obtained", "marksObtained10th"),
            ("GPA", "gpa10th"),
        ],
    ),
    (
        "12th Class Details",
        &[
            ("Board", "board12th"),
            ("Total Marks", "maxMarks12th"),
            ("Marks Obtained", "marksObtained12th"),
            ("Percentage", "percentage12th"),
        ],
    ),
];

/// Unit of document layout
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Centered letterhead line
    Title(String),
    /// Centered second letterhead line
    Subtitle(String),
    /// Underlined section heading
    Heading(String),
    Line(String),
    Indented(String),
    Image(DynamicImage),
    Gap,
}

/// Renders a submission as a paginated A4 PDF
#[derive(Debug, Clone)]
pub struct DocumentRenderer {
    institution_name: String,
    programme_title: String,
}

impl DocumentRenderer {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            institution_name: config.institution_name.clone(),
            programme_title: config.programme_title.clone(),
        }
    }

    /// File name offered to the browser for the rendered form
    pub fn download_filename(form: &SubmissionForm) -> String {
        // Names without any ASCII letter or digit would sanitize to bare underscores
        let token = form
            .applicant_name()
            .map(sanitize_path_component)
            .filter(|token| token.chars().any(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "form".to_string());
        format!("application_{token}.pdf")
    }

    pub fn plan(&self, form: &SubmissionForm) -> Vec<Block> {
        let mut blocks = vec![
            Block::Title(self.institution_name.clone()),
            Block::Subtitle(self.programme_title.clone()),
            Block::Gap,
        ];

        for (heading, lines) in SECTIONS {
            blocks.push(Block::Heading(heading.to_string()));
            for (label, field) in lines.iter() {
                let value = form.text(field).unwrap_or(NOT_AVAILABLE);
                blocks.push(Block::Line(format!("{label}: {value}")));
            }
            blocks.push(Block::Gap);
        }

        blocks.push(Block::Heading("Branch Preferences".to_string()));
        let before = blocks.len();
        for (index, branch) in form.priorities().iter().enumerate() {
            if !branch.trim().is_empty() {
                blocks.push(Block::Line(format!("Priority {}: {}", index + 1, branch.trim())));
            }
        }
        if blocks.len() == before {
            blocks.push(Block::Line(NOT_AVAILABLE.to_string()));
        }
        blocks.push(Block::Gap);

        blocks.push(Block::Heading("Uploaded Files".to_string()));
        for field in AttachmentField::ALL {
            match form.attachment(field) {
                Some(bytes) => {
                    blocks.push(Block::Line(format!("{}:", field.label())));
                    blocks.push(attachment_block(field, bytes));
                }
                None => blocks.push(Block::Line(format!("{}: Not uploaded", field.label()))),
            }
            blocks.push(Block::Gap);
        }

        blocks
    }

    /// Render the submission into PDF bytes
    #[instrument(skip(self, form), fields(applicant = form.applicant_name().unwrap_or_default()))]
    pub fn render(&self, form: &SubmissionForm) -> Result<Vec<u8>, RegistrationError> {
        let blocks = self.plan(form);

        let mut writer = PageWriter::new("Application Form")?;
        for block in &blocks {
            writer.write(block);
        }

        writer.finish()
    }
}

fn attachment_block(field: AttachmentField, bytes: &[u8]) -> Block {
    if classify(bytes) == BlobKind::Pdf {
        return Block::Indented("PDF document attached (view separately)".to_string());
    }

    match image_crate::load_from_memory(bytes) {
        Ok(image) => Block::Image(DynamicImage::ImageRgb8(image.to_rgb8())),
        Err(e) => {
            warn!(field = %field, error = %e, "Failed to decode uploaded image");
            Block::Indented("Error embedding image".to_string())
        }
    }
}

fn pt(value: f32) -> f32 {
    value * PT_TO_MM
}

/// Greedy word wrap by estimated character count
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Top-down layout over a growing list of A4 pages
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Baseline of the next line, in mm from the page bottom
    cursor: f32,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, RegistrationError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME);
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            cursor: PAGE_HEIGHT_MM - MARGIN_MM,
        })
    }

    fn usable_width(&self) -> f32 {
        PAGE_WIDTH_MM - 2.0 * MARGIN_MM
    }

    fn ensure_space(&mut self, height: f32) {
        if self.cursor - height < MARGIN_MM {
            let (page, layer) =
                self.doc
                    .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME);
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.cursor = PAGE_HEIGHT_MM - MARGIN_MM;
        }
    }

    fn write(&mut self, block: &Block) {
        match block {
            Block::Title(text) => self.centered(text, TITLE_SIZE),
            Block::Subtitle(text) => self.centered(text, SUBTITLE_SIZE),
            Block::Heading(text) => self.heading(text),
            Block::Line(text) => self.paragraph(text, BODY_SIZE, 0.0),
            Block::Indented(text) => self.paragraph(text, BODY_SIZE, pt(INDENT_PT)),
            Block::Image(image) => self.image(image),
            Block::Gap => self.cursor -= pt(BODY_SIZE),
        }
    }

    fn line_height(size: f32) -> f32 {
        pt(size * 1.2)
    }

    fn centered(&mut self, text: &str, size: f32) {
        let max_chars = (self.usable_width() / pt(size * CHAR_WIDTH_EM)) as usize;
        for line in wrap(text, max_chars.max(1)) {
            self.ensure_space(Self::line_height(size));
            self.cursor -= Self::line_height(size);
            let width = line.chars().count() as f32 * pt(size * CHAR_WIDTH_EM);
            let x = ((PAGE_WIDTH_MM - width) / 2.0).max(MARGIN_MM);
            self.layer
                .use_text(line, size, Mm(x), Mm(self.cursor), &self.regular);
        }
    }

    fn heading(&mut self, text: &str) {
        // Keep a heading together with at least one body line
        self.ensure_space(Self::line_height(HEADING_SIZE) + Self::line_height(BODY_SIZE));
        self.cursor -= Self::line_height(HEADING_SIZE);
        self.layer
            .use_text(text, HEADING_SIZE, Mm(MARGIN_MM), Mm(self.cursor), &self.bold);

        let underline_y = self.cursor - pt(2.0);
        let width = text.chars().count() as f32 * pt(HEADING_SIZE * CHAR_WIDTH_EM);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_MM), Mm(underline_y)), false),
                (Point::new(Mm(MARGIN_MM + width), Mm(underline_y)), false),
            ],
            is_closed: false,
        });

        self.cursor -= pt(BODY_SIZE * 0.5);
    }

    fn paragraph(&mut self, text: &str, size: f32, indent: f32) {
        let max_chars = ((self.usable_width() - indent) / pt(size * CHAR_WIDTH_EM)) as usize;
        for line in wrap(text, max_chars.max(1)) {
            self.ensure_space(Self::line_height(size));
            self.cursor -= Self::line_height(size);
            self.layer.use_text(
                line,
                size,
                Mm(MARGIN_MM + indent),
                Mm(self.cursor),
                &self.regular,
            );
        }
    }

    fn image(&mut self, image: &DynamicImage) {
        let (width_px, height_px) = image.dimensions();
        let longest = width_px.max(height_px).max(1) as f32;

        // Pick the dpi that makes the longest side exactly fill the box
        let box_mm = pt(IMAGE_BOX_PT);
        let dpi = longest * 25.4 / box_mm;
        let width_mm = width_px as f32 * 25.4 / dpi;
        let height_mm = height_px as f32 * 25.4 / dpi;

        self.ensure_space(height_mm + pt(BODY_SIZE * 0.5));
        self.cursor -= height_mm + pt(BODY_SIZE * 0.5);

        Image::from_dynamic_image(image).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm((PAGE_WIDTH_MM - width_mm) / 2.0)),
                translate_y: Some(Mm(self.cursor)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
    }

    fn finish(self) -> Result<Vec<u8>, RegistrationError> {
        Ok(self.doc.save_to_bytes()?)
    }
}
