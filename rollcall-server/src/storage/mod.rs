//! Persistence gateway
//!
//! One async contract over the four entities, with an in-memory arena
//! ([`MemStorage`]) and a SQLite-backed store ([`SqliteStorage`]). Callers
//! hold an `Arc<dyn Storage>` and never know which is active.
//!
//! Lookups return `Ok(None)` for absent ids; updates return
//! [`StorageError::NotFound`]; deletes return whether a row was removed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use rollcall_common::models::{
    Attendance, Course, CoursePatch, NewAttendance, NewCourse, NewStudent, NewUser,
    RecentAttendance, Student, StudentPatch, User, UserPatch,
};

pub mod memory;
pub mod sqlite;

pub use memory::MemStorage;
pub use sqlite::SqliteStorage;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),

    /// Natural key already taken by another record
    #[error("{0}")]
    Conflict(String),

    /// A stored reference points at a record that does not exist
    #[error("Data integrity violation: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored value could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(String),
}

#[async_trait]
pub trait Storage: Send + Sync {
    // Users
    async fn create_user(&self, user: NewUser) -> StorageResult<User>;
    async fn get_user(&self, id: i64) -> StorageResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>>;
    async fn update_user(&self, id: i64, patch: &UserPatch) -> StorageResult<User>;

    // Students
    /// Also bumps `totalStudents` of every existing course in the code list
    async fn create_student(&self, student: NewStudent) -> StorageResult<Student>;
    async fn get_student(&self, id: i64) -> StorageResult<Option<Student>>;
    async fn get_student_by_student_id(&self, student_id: &str)
        -> StorageResult<Option<Student>>;
    /// A changed code list moves roster counts from removed to added codes
    async fn update_student(&self, id: i64, patch: &StudentPatch) -> StorageResult<Student>;
    /// Decrements the roster count of every enrolled course
    async fn delete_student(&self, id: i64) -> StorageResult<bool>;
    async fn list_students(&self) -> StorageResult<Vec<Student>>;
    /// Students whose code list contains the course's code; empty if the course is absent
    async fn list_students_by_course(&self, course_id: i64) -> StorageResult<Vec<Student>>;

    // Courses
    async fn create_course(&self, course: NewCourse) -> StorageResult<Course>;
    async fn get_course(&self, id: i64) -> StorageResult<Option<Course>>;
    async fn get_course_by_code(&self, code: &str) -> StorageResult<Option<Course>>;
    async fn list_courses(&self) -> StorageResult<Vec<Course>>;
    async fn list_courses_by_instructor(&self, instructor_id: i64) -> StorageResult<Vec<Course>>;
    async fn update_course(&self, id: i64, patch: &CoursePatch) -> StorageResult<Course>;
    async fn delete_course(&self, id: i64) -> StorageResult<bool>;

    // Attendance (append-only)
    async fn create_attendance(&self, attendance: NewAttendance) -> StorageResult<Attendance>;
    async fn get_attendance(&self, id: i64) -> StorageResult<Option<Attendance>>;
    async fn list_attendances_by_student(&self, student_id: i64)
        -> StorageResult<Vec<Attendance>>;
    async fn list_attendances_by_course(&self, course_id: i64) -> StorageResult<Vec<Attendance>>;
    /// Records for a course with `start <= date <= end`
    async fn list_attendances_between(
        &self,
        course_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Attendance>>;
    /// Newest first (ties by descending id), joined with student and course
    ///
    /// Fails with [`StorageError::Integrity`] if any selected row references
    /// a missing student or course.
    async fn recent_attendances(&self, limit: usize) -> StorageResult<Vec<RecentAttendance>>;
}

pub(crate) fn username_taken(username: &str) -> StorageError {
    StorageError::Conflict(format!("Username '{}' is already taken", username))
}

pub(crate) fn student_id_taken(student_id: &str) -> StorageError {
    StorageError::Conflict(format!("Student ID '{}' is already registered", student_id))
}

pub(crate) fn course_code_taken(code: &str) -> StorageError {
    StorageError::Conflict(format!("Course code '{}' is already in use", code))
}

pub(crate) fn dangling(attendance: &Attendance, what: &str, id: i64) -> StorageError {
    StorageError::Integrity(format!(
        "attendance {} references missing {} {}",
        attendance.id, what, id
    ))
}

/// Codes present in `old` but not `new`, and in `new` but not `old`
pub(crate) fn roster_delta<'a>(
    old: &'a [String],
    new: &'a [String],
) -> (Vec<&'a str>, Vec<&'a str>) {
    let removed = old
        .iter()
        .filter(|code| !new.contains(*code))
        .map(String::as_str)
        .collect();
    let added = new
        .iter()
        .filter(|code| !old.contains(*code))
        .map(String::as_str)
        .collect();
    (removed, added)
}
