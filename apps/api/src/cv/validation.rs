//! Field rules for the CV wizard. Every validator takes the raw form value
//! and returns the normalized value to keep, or a message for the user.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_JOB_COUNT: u32 = 10;
const MAX_SKILL_COUNT: u32 = 20;
const PHONE_MIN_DIGITS: usize = 8;
const PHONE_MAX_DIGITS: usize = 15;
const BIRTHDATE_FORMAT: &str = "%d/%m/%Y";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email regex is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvField {
    Name,
    Surname,
    Birthdate,
    Degree,
    JobCount,
    Phone,
    Email,
    PicturePath,
    SkillCount,
}

impl CvField {
    pub const ALL: [CvField; 9] = [
        CvField::Name,
        CvField::Surname,
        CvField::Birthdate,
        CvField::Degree,
        CvField::JobCount,
        CvField::Phone,
        CvField::Email,
        CvField::PicturePath,
        CvField::SkillCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CvField::Name => "name",
            CvField::Surname => "surname",
            CvField::Birthdate => "birthdate",
            CvField::Degree => "degree",
            CvField::JobCount => "job_count",
            CvField::Phone => "phone",
            CvField::Email => "email",
            CvField::PicturePath => "picture_path",
            CvField::SkillCount => "skill_count",
        }
    }

    /// Runs the rule for this field. `today` bounds the birthdate.
    pub fn validate(&self, value: &str, today: NaiveDate) -> Result<String, String> {
        match self {
            CvField::Name | CvField::Surname => validate_name(value),
            CvField::Birthdate => validate_birthdate(value, today),
            CvField::Degree | CvField::PicturePath => validate_nonempty(value),
            CvField::JobCount => validate_count(value, MAX_JOB_COUNT),
            CvField::SkillCount => validate_count(value, MAX_SKILL_COUNT),
            CvField::Phone => validate_phone(value),
            CvField::Email => validate_email(value),
        }
    }
}

impl fmt::Display for CvField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CvField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CvField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown field: {s}"))
    }
}

pub fn validate_name(value: &str) -> Result<String, String> {
    let name = value.trim();
    if name.is_empty() {
        return Err("name can't be empty".to_string());
    }
    if !name.chars().all(|c| c.is_alphabetic() || c.is_whitespace()) {
        return Err("name can only contain letters and spaces".to_string());
    }
    if name.chars().count() < 2 {
        return Err("name too short".to_string());
    }
    Ok(name.to_string())
}

pub fn validate_birthdate(value: &str, today: NaiveDate) -> Result<String, String> {
    let birthdate = value.trim();
    if birthdate.is_empty() {
        return Err("birthdate can't be empty".to_string());
    }
    let parsed = NaiveDate::parse_from_str(birthdate, BIRTHDATE_FORMAT)
        .map_err(|_| "invalid date format (expected DD/MM/YYYY)".to_string())?;
    if parsed > today {
        return Err("birthday cannot be in the future".to_string());
    }
    Ok(birthdate.to_string())
}

pub fn validate_phone(value: &str) -> Result<String, String> {
    let phone = value.trim();
    if phone.is_empty() {
        return Err("phone number can't be empty".to_string());
    }
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("phone number must contain only digits (except leading +)".to_string());
    }
    if !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits.len()) {
        return Err("phone number length is invalid".to_string());
    }
    Ok(phone.to_string())
}

pub fn validate_nonempty(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("this field cannot be empty".to_string());
    }
    Ok(trimmed.to_string())
}

/// A non-negative integer no greater than `max`.
pub fn validate_count(value: &str, max: u32) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err("this field must be a number".to_string());
    }
    match trimmed.parse::<u32>() {
        Ok(n) if n <= max => Ok(trimmed.to_string()),
        _ => Err(format!("this field must be between 0 and {max}")),
    }
}

pub fn validate_email(value: &str) -> Result<String, String> {
    let email = value.trim();
    if email.is_empty() {
        return Err("email can't be empty".to_string());
    }
    if email_regex().is_match(email) {
        Ok(email.to_string())
    } else {
        Err("Invalid Email".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldError {
    pub field: CvField,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormValidation {
    pub ok: bool,
    pub fields: BTreeMap<String, String>,
    pub errors: Vec<FieldError>,
}

/// The whole CV form as the wizard submits it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CvForm {
    pub name: String,
    pub surname: String,
    pub birthdate: String,
    pub degree: String,
    pub job_count: String,
    pub phone: String,
    pub email: String,
    pub picture_path: String,
    pub skill_count: String,
}

impl CvForm {
    pub fn value(&self, field: CvField) -> &str {
        match field {
            CvField::Name => &self.name,
            CvField::Surname => &self.surname,
            CvField::Birthdate => &self.birthdate,
            CvField::Degree => &self.degree,
            CvField::JobCount => &self.job_count,
            CvField::Phone => &self.phone,
            CvField::Email => &self.email,
            CvField::PicturePath => &self.picture_path,
            CvField::SkillCount => &self.skill_count,
        }
    }
}

/// Validates every field, collecting all failures. The picture is optional:
/// an empty `picture_path` is skipped rather than reported.
pub fn validate_form(form: &CvForm, today: NaiveDate) -> FormValidation {
    let mut fields = BTreeMap::new();
    let mut errors = Vec::new();

    for field in CvField::ALL {
        let raw = form.value(field);
        if field == CvField::PicturePath && raw.trim().is_empty() {
            fields.insert(field.as_str().to_string(), String::new());
            continue;
        }
        match field.validate(raw, today) {
            Ok(value) => {
                fields.insert(field.as_str().to_string(), value);
            }
            Err(error) => errors.push(FieldError { field, error }),
        }
    }

    FormValidation {
        ok: errors.is_empty(),
        fields,
        errors,
    }
}
