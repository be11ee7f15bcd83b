const PDF_MAGIC: &[u8] = b"%PDF";
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Kind of an attachment as derived from its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Pdf,
    Png,
    /// Fallback for any other non-empty content
    Jpeg,
    /// Empty input; never displayable inline
    Unknown,
}

impl BlobKind {
    /// MIME type sent with served attachments
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Unknown => "application/octet-stream",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }

    pub fn is_displayable(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Classify a buffer by its leading bytes
pub fn classify(bytes: &[u8]) -> BlobKind {
    if bytes.is_empty() {
        BlobKind::Unknown
    } else if bytes.starts_with(PDF_MAGIC) {
        BlobKind::Pdf
    } else if bytes.starts_with(PNG_MAGIC) {
        BlobKind::Png
    } else {
        BlobKind::Jpeg
    }
}
