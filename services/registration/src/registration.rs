use crate::schema::AttachmentField;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A validated submission that has not been persisted yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewRegistration {
    pub name: String,
    pub guardian_name: String,
    pub address: String,
    pub mobile: String,
    pub residency: String,
    pub jee_rank: Option<f64>,
    pub eapcet_rank: Option<f64>,
    pub board_10th: Option<String>,
    pub max_marks_10th: Option<f64>,
    pub marks_obtained_10th: Option<f64>,
    pub gpa_10th: Option<f64>,
    pub board_12th: String,
    pub max_marks_12th: f64,
    pub marks_obtained_12th: f64,
    pub percentage_12th: f64,
    pub priorities: Vec<String>,
    pub photo: Option<Vec<u8>>,
    pub memo_10th: Option<Vec<u8>>,
    pub memo_12th: Vec<u8>,
    pub eapcet_hall_ticket: Option<Vec<u8>>,
    pub eapcet_rank_card: Option<Vec<u8>>,
    pub jee_hall_ticket: Option<Vec<u8>>,
    pub jee_rank_card: Option<Vec<u8>>,
}

/// Identity and timestamp assigned by the store on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InsertedRegistration {
    pub id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

/// Stored registration, attachments included.
///
/// Serializes with the form's wire names; attachment bytes are encoded as
/// base64 strings or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "fatherName")]
    pub guardian_name: String,
    pub address: String,
    pub mobile: String,
    #[serde(rename = "resident")]
    pub residency: String,
    pub jee_rank: Option<f64>,
    pub eapcet_rank: Option<f64>,
    pub board_10th: Option<String>,
    pub max_marks_10th: Option<f64>,
    pub marks_obtained_10th: Option<f64>,
    pub gpa_10th: Option<f64>,
    pub board_12th: String,
    pub max_marks_12th: f64,
    pub marks_obtained_12th: f64,
    pub percentage_12th: f64,
    pub priorities: Vec<String>,
    #[serde(with = "base64_serde")]
    pub photo: Option<Vec<u8>>,
    #[serde(with = "base64_serde")]
    pub memo_10th: Option<Vec<u8>>,
    #[serde(with = "base64_serde")]
    pub memo_12th: Option<Vec<u8>>,
    #[serde(with = "base64_serde")]
    pub eapcet_hall_ticket: Option<Vec<u8>>,
    #[serde(with = "base64_serde")]
    pub eapcet_rank_card: Option<Vec<u8>>,
    #[serde(with = "base64_serde")]
    pub jee_hall_ticket: Option<Vec<u8>>,
    #[serde(with = "base64_serde")]
    pub jee_rank_card: Option<Vec<u8>>,
    pub submitted_at: DateTime<Utc>,
}

/// Scalar value of a stored registration, as read by the reports
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue<'a> {
    Text(&'a str),
    Number(f64),
}

impl Registration {
    /// Assemble a stored record from a validated submission
    pub fn from_new(inserted: InsertedRegistration, new: NewRegistration) -> Self {
        Self {
            id: inserted.id,
            name: new.name,
            guardian_name: new.guardian_name,
            address: new.address,
            mobile: new.mobile,
            residency: new.residency,
            jee_rank: new.jee_rank,
            eapcet_rank: new.eapcet_rank,
            board_10th: new.board_10th,
            max_marks_10th: new.max_marks_10th,
            marks_obtained_10th: new.marks_obtained_10th,
            gpa_10th: new.gpa_10th,
            board_12th: new.board_12th,
            max_marks_12th: new.max_marks_12th,
            marks_obtained_12th: new.marks_obtained_12th,
            percentage_12th: new.percentage_12th,
            priorities: new.priorities,
            photo: new.photo,
            memo_10th: new.memo_10th,
            memo_12th: Some(new.memo_12th),
            eapcet_hall_ticket: new.eapcet_hall_ticket,
            eapcet_rank_card: new.eapcet_rank_card,
            jee_hall_ticket: new.jee_hall_ticket,
            jee_rank_card: new.jee_rank_card,
            submitted_at: inserted.submitted_at,
        }
    }

    /// Raw bytes of an attachment, `None` when it was not uploaded
    pub fn attachment(&self, field: AttachmentField) -> Option<&[u8]> {
        let bytes = match field {
            AttachmentField::Photo => &self.photo,
            AttachmentField::Memo10th => &self.memo_10th,
            AttachmentField::Memo12th => &self.memo_12th,
            AttachmentField::EapcetHallTicket => &self.eapcet_hall_ticket,
            AttachmentField::EapcetRankCard => &self.eapcet_rank_card,
            AttachmentField::JeeHallTicket => &self.jee_hall_ticket,
            AttachmentField::JeeRankCard => &self.jee_rank_card,
        };
        bytes.as_deref().filter(|bytes| !bytes.is_empty())
    }

    /// Scalar value by wire name
    pub fn scalar(&self, name: &str) -> Option<ScalarValue<'_>> {
        let number = |value: Option<f64>| value.map(ScalarValue::Number);

        match name {
            "name" => Some(ScalarValue::Text(&self.name)),
            "fatherName" => Some(ScalarValue::Text(&self.guardian_name)),
            "address" => Some(ScalarValue::Text(&self.address)),
            "mobile" => Some(ScalarValue::Text(&self.mobile)),
            "resident" => Some(ScalarValue::Text(&self.residency)),
            "jeeRank" => number(self.jee_rank),
            "eapcetRank" => number(self.eapcet_rank),
            "board10th" => self.board_10th.as_deref().map(ScalarValue::Text),
            "maxMarks10th" => number(self.max_marks_10th),
            "marksObtained10th" => number(self.marks_obtained_10th),
            "gpa10th" => number(self.gpa_10th),
            "board12th" => Some(ScalarValue::Text(&self.board_12th)),
            "maxMarks12th" => number(Some(self.max_marks_12th)),
            "marksObtained12th" => number(Some(self.marks_obtained_12th)),
            "percentage12th" => number(Some(self.percentage_12th)),
            _ => None,
        }
    }
}

/// Base64 serialization helper
mod base64_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::Serializer;

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }
}
