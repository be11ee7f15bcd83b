use crate::error::RegistrationError;
use crate::registration::NewRegistration;
use crate::submission::SubmissionForm;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The seven binary document slots of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttachmentField {
    Photo,
    Memo10th,
    Memo12th,
    EapcetHallTicket,
    EapcetRankCard,
    JeeHallTicket,
    JeeRankCard,
}

impl AttachmentField {
    /// All attachment fields in report order
    pub const ALL: [AttachmentField; 7] = [
        Self::Photo,
        Self::Memo10th,
        Self::Memo12th,
        Self::EapcetHallTicket,
        Self::EapcetRankCard,
        Self::JeeHallTicket,
        Self::JeeRankCard,
    ];

    /// Multipart part name and URL path segment
    pub fn name(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Memo10th => "memo10th",
            Self::Memo12th => "memo12th",
            Self::EapcetHallTicket => "eapcetHallTicket",
            Self::EapcetRankCard => "eapcetRankCard",
            Self::JeeHallTicket => "jeeHallTicket",
            Self::JeeRankCard => "jeeRankCard",
        }
    }

    /// Human-readable label used in reports
    pub fn label(self) -> &'static str {
        match self {
            Self::Photo => "Photo",
            Self::Memo10th => "10th Memo",
            Self::Memo12th => "12th Memo",
            Self::EapcetHallTicket => "EAPCET Hall Ticket",
            Self::EapcetRankCard => "EAPCET Rank Card",
            Self::JeeHallTicket => "JEE Hall Ticket",
            Self::JeeRankCard => "JEE Rank Card",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

impl fmt::Display for AttachmentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttachmentField {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| RegistrationError::validation("field", "Invalid field"))
    }
}

/// Value kind of a scalar field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

/// Definition of one scalar field
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    /// Multipart part name and JSON key
    pub name: &'static str,
    /// Label used in messages and as the workbook header
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Workbook column width in characters
    pub column_width: f64,
}

impl ScalarField {
    const fn new(
        name: &'static str,
        label: &'static str,
        kind: FieldKind,
        required: bool,
        column_width: f64,
    ) -> Self {
        Self {
            name,
            label,
            kind,
            required,
            column_width,
        }
    }
}

/// Immutable definition of the registration entity
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationSchema {
    scalars: Vec<ScalarField>,
    required_attachments: Vec<AttachmentField>,
    priority_slots: usize,
}

impl RegistrationSchema {
    /// The admission form as collected by the registration page
    pub fn standard() -> Self {
        use FieldKind::{Number, Text};

        Self {
            scalars: vec![
                ScalarField::new("name", "Name", Text, true, 20.0),
                ScalarField::new("fatherName", "Father's Name", Text, true, 20.0),
                ScalarField::new("address", "Address", Text, true, 30.0),
                ScalarField::new("mobile", "Mobile", Text, true, 15.0),
                ScalarField::new("jeeRank", "JEE Rank", Number, false, 10.0),
                ScalarField::new("eapcetRank", "EAPCET Rank", Number, false, 10.0),
                ScalarField::new("resident", "Resident", Text, true, 15.0),
                ScalarField::new("board10th", "10th Board", Text, false, 20.0),
                ScalarField::new("maxMarks10th", "10th Max Marks", Number, false, 15.0),
                ScalarField::new("marksObtained10th", "10th Marks Obtained", Number, false, 15.0),
                ScalarField::new("gpa10th", "10th GPA", Number, false, 10.0),
                ScalarField::new("board12th", "12th Board", Text, true, 20.0),
                ScalarField::new("maxMarks12th", "12th Max Marks", Number, true, 15.0),
                ScalarField::new("marksObtained12th", "12th Marks Obtained", Number, true, 15.0),
                ScalarField::new("percentage12th", "12th Percentage", Number, true, 15.0),
            ],
            required_attachments: vec![AttachmentField::Memo12th],
            priority_slots: 7,
        }
    }

    pub fn scalar_fields(&self) -> &[ScalarField] {
        &self.scalars
    }

    pub fn scalar_field(&self, name: &str) -> Option<&ScalarField> {
        self.scalars.iter().find(|field| field.name == name)
    }

    /// Maximum number of ranked branch preferences
    pub fn priority_slots(&self) -> usize {
        self.priority_slots
    }

    pub fn is_attachment_required(&self, field: AttachmentField) -> bool {
        self.required_attachments.contains(&field)
    }

    /// Validate a submission and convert it into its typed form.
    ///
    /// Fields are checked in schema order and the first offending field is
    /// reported. Nothing here touches storage.
    pub fn validate(&self, form: &SubmissionForm) -> Result<NewRegistration, RegistrationError> {
        let mut numbers: HashMap<&'static str, f64> = HashMap::new();

        for field in &self.scalars {
            match (form.text(field.name), field.kind) {
                (None, _) if field.required => {
                    return Err(RegistrationError::missing(field.name, field.label));
                }
                (None, _) | (Some(_), FieldKind::Text) => {}
                (Some(raw), FieldKind::Number) => {
                    let value = parse_number(raw)
                        .ok_or_else(|| RegistrationError::not_a_number(field.name, field.label))?;
                    numbers.insert(field.name, value);
                }
            }
        }

        for field in AttachmentField::ALL {
            if self.is_attachment_required(field) && form.attachment(field).is_none() {
                return Err(RegistrationError::missing(field.name(), field.label()));
            }
        }

        if form.priorities().len() > self.priority_slots {
            return Err(RegistrationError::validation(
                "priorities",
                format!(
                    "At most {} branch priorities are allowed, got {}",
                    self.priority_slots,
                    form.priorities().len()
                ),
            ));
        }

        let text = |name: &str| form.text(name).map(str::to_owned);
        let required_text = |name: &str| {
            text(name).ok_or_else(|| RegistrationError::missing(name, self.label_of(name)))
        };
        let number = |name: &str| numbers.get(name).copied();
        let required_number = |name: &str| {
            number(name).ok_or_else(|| RegistrationError::missing(name, self.label_of(name)))
        };
        let required_attachment = |field: AttachmentField| {
            form.attachment(field)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| RegistrationError::missing(field.name(), field.label()))
        };

        Ok(NewRegistration {
            name: required_text("name")?,
            guardian_name: required_text("fatherName")?,
            address: required_text("address")?,
            mobile: required_text("mobile")?,
            residency: required_text("resident")?,
            jee_rank: number("jeeRank"),
            eapcet_rank: number("eapcetRank"),
            board_10th: text("board10th"),
            max_marks_10th: number("maxMarks10th"),
            marks_obtained_10th: number("marksObtained10th"),
            gpa_10th: number("gpa10th"),
            board_12th: required_text("board12th")?,
            max_marks_12th: required_number("maxMarks12th")?,
            marks_obtained_12th: required_number("marksObtained12th")?,
            percentage_12th: required_number("percentage12th")?,
            priorities: form.priorities().to_vec(),
            photo: form.attachment(AttachmentField::Photo).map(<[u8]>::to_vec),
            memo_10th: form.attachment(AttachmentField::Memo10th).map(<[u8]>::to_vec),
            memo_12th: required_attachment(AttachmentField::Memo12th)?,
            eapcet_hall_ticket: form
                .attachment(AttachmentField::EapcetHallTicket)
                .map(<[u8]>::to_vec),
            eapcet_rank_card: form
                .attachment(AttachmentField::EapcetRankCard)
                .map(<[u8]>::to_vec),
            jee_hall_ticket: form
                .attachment(AttachmentField::JeeHallTicket)
                .map(<[u8]>::to_vec),
            jee_rank_card: form.attachment(AttachmentField::JeeRankCard).map(<[u8]>::to_vec),
        })
    }

    fn label_of<'a>(&self, name: &'a str) -> &'a str {
        self.scalar_field(name).map_or(name, |field| field.label)
    }
}

/// Parse a numeric form value; blanks are handled by the caller
fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}
