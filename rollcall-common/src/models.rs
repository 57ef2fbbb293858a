//! Domain model: users, students, courses and attendance records
//!
//! `New*` types are creation payloads; they never carry `id` or
//! `createdAt`, which the storage layer assigns. `*Patch` types are partial
//! updates where `None` means "leave unchanged".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::validation::{
    self, blank_to_none, normalize_codes, validate_course_codes, validate_descriptor,
    validate_optional_email, FieldError,
};
use crate::{Error, Result};

/// Numeric face summary produced by the client-side detector
pub type Descriptor = Vec<f32>;

pub const DEFAULT_LANGUAGE: &str = "en";

// ========================================
// Enumerations
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            other => Err(format!(
                "unknown status '{}' (expected present, absent or late)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMethod {
    Face,
    Manual,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Face => "face",
            VerificationMethod::Manual => "manual",
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "face" => Ok(VerificationMethod::Face),
            "manual" => Ok(VerificationMethod::Manual),
            other => Err(format!(
                "unknown verification method '{}' (expected face or manual)",
                other
            )),
        }
    }
}

// ========================================
// User
// ========================================

/// Instructor account
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// PHC-format password hash; never serialized
    pub password_hash: String,
    pub name: String,
    pub department: Option<String>,
    pub profile_image: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Secret-free projection returned to clients
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
            department: self.department.clone(),
            profile_image: self.profile_image.clone(),
            language: self.language.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub department: Option<String>,
    pub profile_image: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

/// User creation payload; the password is already hashed by the caller
#[derive(Debug, Clone, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "password hash is required"))]
    pub password_hash: String,
    #[validate(length(min = 2, message = "must be at least 2 characters"))]
    pub name: String,
    pub department: Option<String>,
    pub profile_image: Option<String>,
    #[validate(length(min = 2, max = 16, message = "must be 2 to 16 characters"))]
    pub language: String,
}

impl NewUser {
    pub fn normalized(self) -> Result<Self> {
        let user = NewUser {
            username: self.username.trim().to_string(),
            password_hash: self.password_hash,
            name: self.name.trim().to_string(),
            department: blank_to_none(self.department),
            profile_image: blank_to_none(self.profile_image),
            language: self.language.trim().to_string(),
        };
        validation::check(&user)?;
        Ok(user)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[validate(length(min = 2, message = "must be at least 2 characters"))]
    pub name: Option<String>,
    pub department: Option<String>,
    pub profile_image: Option<String>,
    #[validate(length(min = 2, max = 16, message = "must be 2 to 16 characters"))]
    pub language: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.department.is_none()
            && self.profile_image.is_none()
            && self.language.is_none()
    }

    pub fn normalized(self) -> Result<Self> {
        let patch = UserPatch {
            name: self.name.map(|v| v.trim().to_string()),
            department: self.department.map(|v| v.trim().to_string()),
            profile_image: self.profile_image.map(|v| v.trim().to_string()),
            language: self.language.map(|v| v.trim().to_string()),
        };
        validation::check(&patch)?;
        Ok(patch)
    }

    /// Merge into `user`; an empty department or image clears it
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(department) = &self.department {
            user.department = blank_to_none(Some(department.clone()));
        }
        if let Some(image) = &self.profile_image {
            user.profile_image = blank_to_none(Some(image.clone()));
        }
        if let Some(language) = &self.language {
            user.language = language.clone();
        }
    }
}

// ========================================
// Student
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub name: String,
    /// External, human-facing identifier (unique)
    pub student_id: String,
    pub email: Option<String>,
    pub face_descriptor: Option<Descriptor>,
    /// Codes of the courses the student is enrolled in
    pub courses: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn is_enrolled_in(&self, course_code: &str) -> bool {
        self.courses.iter().any(|code| code == course_code)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    #[serde(default)]
    #[validate(length(min = 2, message = "must be at least 2 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "student id is required"))]
    pub student_id: String,
    #[serde(default)]
    #[validate(custom(function = "validate_optional_email"))]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_descriptor"))]
    pub face_descriptor: Option<Descriptor>,
    #[serde(default)]
    #[validate(custom(function = "validate_course_codes"))]
    pub courses: Vec<String>,
}

impl NewStudent {
    /// Trim strings, treat blank email as absent, de-duplicate course codes
    pub fn normalized(self) -> Result<Self> {
        let student = NewStudent {
            name: self.name.trim().to_string(),
            student_id: self.student_id.trim().to_string(),
            email: blank_to_none(self.email),
            face_descriptor: self.face_descriptor,
            courses: normalize_codes(self.courses),
        };
        validation::check(&student)?;
        Ok(student)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    #[validate(length(min = 2, message = "must be at least 2 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "student id is required"))]
    pub student_id: Option<String>,
    /// `Some("")` clears the stored email
    #[validate(custom(function = "validate_optional_email"))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_descriptor"))]
    pub face_descriptor: Option<Descriptor>,
    #[validate(custom(function = "validate_course_codes"))]
    pub courses: Option<Vec<String>>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.student_id.is_none()
            && self.email.is_none()
            && self.face_descriptor.is_none()
            && self.courses.is_none()
    }

    pub fn normalized(self) -> Result<Self> {
        let patch = StudentPatch {
            name: self.name.map(|v| v.trim().to_string()),
            student_id: self.student_id.map(|v| v.trim().to_string()),
            email: self.email.map(|v| v.trim().to_string()),
            face_descriptor: self.face_descriptor,
            courses: self.courses.map(normalize_codes),
        };
        validation::check(&patch)?;
        Ok(patch)
    }

    pub fn apply(&self, student: &mut Student) {
        if let Some(name) = &self.name {
            student.name = name.clone();
        }
        if let Some(student_id) = &self.student_id {
            student.student_id = student_id.clone();
        }
        if let Some(email) = &self.email {
            student.email = blank_to_none(Some(email.clone()));
        }
        if let Some(descriptor) = &self.face_descriptor {
            student.face_descriptor = Some(descriptor.clone());
        }
        if let Some(courses) = &self.courses {
            student.courses = courses.clone();
        }
    }
}

// ========================================
// Course
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub instructor_id: i64,
    pub room: Option<String>,
    pub schedule: Option<String>,
    /// Cached roster size; maintained on student writes, may be set directly
    pub total_students: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    #[serde(default)]
    #[validate(length(min = 1, message = "course code is required"))]
    pub code: String,
    #[serde(default)]
    #[validate(length(min = 2, message = "must be at least 2 characters"))]
    pub name: String,
    /// Stamped from the session by the API layer
    #[serde(default)]
    #[validate(range(min = 1, message = "instructor is required"))]
    pub instructor_id: i64,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "must not be negative"))]
    pub total_students: i64,
}

impl NewCourse {
    pub fn normalized(self) -> Result<Self> {
        let course = NewCourse {
            code: self.code.trim().to_string(),
            name: self.name.trim().to_string(),
            instructor_id: self.instructor_id,
            room: blank_to_none(self.room),
            schedule: blank_to_none(self.schedule),
            total_students: self.total_students,
        };
        validation::check(&course)?;
        Ok(course)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CoursePatch {
    #[validate(length(min = 1, message = "course code is required"))]
    pub code: Option<String>,
    #[validate(length(min = 2, message = "must be at least 2 characters"))]
    pub name: Option<String>,
    /// `Some("")` clears the room
    pub room: Option<String>,
    /// `Some("")` clears the schedule
    pub schedule: Option<String>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub total_students: Option<i64>,
}

impl CoursePatch {
    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.name.is_none()
            && self.room.is_none()
            && self.schedule.is_none()
            && self.total_students.is_none()
    }

    pub fn normalized(self) -> Result<Self> {
        let patch = CoursePatch {
            code: self.code.map(|v| v.trim().to_string()),
            name: self.name.map(|v| v.trim().to_string()),
            room: self.room.map(|v| v.trim().to_string()),
            schedule: self.schedule.map(|v| v.trim().to_string()),
            total_students: self.total_students,
        };
        validation::check(&patch)?;
        Ok(patch)
    }

    pub fn apply(&self, course: &mut Course) {
        if let Some(code) = &self.code {
            course.code = code.clone();
        }
        if let Some(name) = &self.name {
            course.name = name.clone();
        }
        if let Some(room) = &self.room {
            course.room = blank_to_none(Some(room.clone()));
        }
        if let Some(schedule) = &self.schedule {
            course.schedule = blank_to_none(Some(schedule.clone()));
        }
        if let Some(total) = self.total_students {
            course.total_students = total;
        }
    }
}

// ========================================
// Attendance
// ========================================

/// One check-in event. Append-only: never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub date: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub verification_method: VerificationMethod,
}

/// Validated attendance creation payload
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendance {
    pub student_id: i64,
    pub course_id: i64,
    pub date: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub verification_method: VerificationMethod,
}

/// Raw attendance payload as clients send it
///
/// Every field is optional here so that missing and malformed values are
/// reported per field instead of failing the whole body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceInput {
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
    pub date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub verification_method: Option<String>,
}

impl AttendanceInput {
    /// Validate into a [`NewAttendance`]; a missing date becomes `now`
    pub fn into_new(self, now: DateTime<Utc>) -> Result<NewAttendance> {
        let mut errors = Vec::new();

        let student_id = require_id("studentId", self.student_id, &mut errors);
        let course_id = require_id("courseId", self.course_id, &mut errors);

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => {
                errors.push(FieldError::new("status", "status is required"));
                None
            }
            Some(raw) => raw
                .parse::<AttendanceStatus>()
                .map_err(|e| errors.push(FieldError::new("status", e)))
                .ok(),
        };

        let verification_method = match self.verification_method.as_deref().map(str::trim) {
            None | Some("") => {
                errors.push(FieldError::new(
                    "verificationMethod",
                    "verification method is required",
                ));
                None
            }
            Some(raw) => raw
                .parse::<VerificationMethod>()
                .map_err(|e| errors.push(FieldError::new("verificationMethod", e)))
                .ok(),
        };

        match (student_id, course_id, status, verification_method) {
            (Some(student_id), Some(course_id), Some(status), Some(verification_method))
                if errors.is_empty() =>
            {
                Ok(NewAttendance {
                    student_id,
                    course_id,
                    date: crate::time::normalize(self.date.unwrap_or(now)),
                    status,
                    verification_method,
                })
            }
            _ => Err(Error::Validation(errors)),
        }
    }
}

fn require_id(field: &str, value: Option<i64>, errors: &mut Vec<FieldError>) -> Option<i64> {
    match value {
        Some(id) if id > 0 => Some(id),
        Some(_) => {
            errors.push(FieldError::new(field, "must be a positive id"));
            None
        }
        None => {
            errors.push(FieldError::new(field, format!("{} is required", field)));
            None
        }
    }
}

/// Attendance joined with the student and course it references
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentAttendance {
    #[serde(flatten)]
    pub attendance: Attendance,
    pub student: Student,
    pub course: Course,
}
