//! Storage contract tests
//!
//! Each scenario runs against both the in-memory store and SQLite so the
//! two backends stay interchangeable.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use rollcall_common::db::{init_database, open_in_memory};
use rollcall_common::models::{
    AttendanceStatus, CoursePatch, NewAttendance, NewCourse, NewStudent, NewUser, StudentPatch,
    UserPatch, VerificationMethod,
};
use rollcall_server::storage::{MemStorage, SqliteStorage, Storage, StorageError};

async fn backends() -> Vec<(&'static str, Arc<dyn Storage>)> {
    let pool = open_in_memory().await.expect("Should open in-memory SQLite");
    vec![
        ("memory", Arc::new(MemStorage::new())),
        ("sqlite", Arc::new(SqliteStorage::new(pool))),
    ]
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

fn new_user(username: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        password_hash: "$pbkdf2-sha256$i=1000$c2FsdA$aGFzaA".to_string(),
        name: "Prof. Jane Smith".to_string(),
        department: Some("Computer Science".to_string()),
        profile_image: None,
        language: "en".to_string(),
    }
}

fn new_course(code: &str, instructor_id: i64, total_students: i64) -> NewCourse {
    NewCourse {
        code: code.to_string(),
        name: format!("Course {}", code),
        instructor_id,
        room: Some("Room 305B".to_string()),
        schedule: None,
        total_students,
    }
}

fn new_student(student_id: &str, courses: &[&str]) -> NewStudent {
    NewStudent {
        name: "Sarah Johnson".to_string(),
        student_id: student_id.to_string(),
        email: Some("sarah.johnson@example.com".to_string()),
        face_descriptor: None,
        courses: courses.iter().map(|c| c.to_string()).collect(),
    }
}

fn mark(student_id: i64, course_id: i64, date: DateTime<Utc>) -> NewAttendance {
    NewAttendance {
        student_id,
        course_id,
        date,
        status: AttendanceStatus::Present,
        verification_method: VerificationMethod::Manual,
    }
}

async fn total_students(storage: &Arc<dyn Storage>, course_id: i64) -> i64 {
    storage
        .get_course(course_id)
        .await
        .unwrap()
        .unwrap()
        .total_students
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_user_lifecycle() {
    for (backend, storage) in backends().await {
        let user = storage.create_user(new_user("faculty")).await.unwrap();
        assert!(user.id > 0, "{}", backend);

        let by_name = storage.get_user_by_username("faculty").await.unwrap();
        assert_eq!(by_name.as_ref().map(|u| u.id), Some(user.id), "{}", backend);
        assert!(storage.get_user_by_username("nobody").await.unwrap().is_none());

        let err = storage.create_user(new_user("faculty")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)), "{}: {:?}", backend, err);

        let patch = UserPatch {
            language: Some("fr".to_string()),
            department: Some(String::new()),
            ..Default::default()
        };
        let updated = storage.update_user(user.id, &patch).await.unwrap();
        assert_eq!(updated.language, "fr", "{}", backend);
        assert_eq!(updated.department, None, "{}", backend);

        let reloaded = storage.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded, updated, "{}", backend);

        let err = storage.update_user(999, &patch).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)), "{}", backend);
    }
}

// =============================================================================
// Students and roster counters
// =============================================================================

#[tokio::test]
async fn test_roster_counter_follows_enrollment() {
    for (backend, storage) in backends().await {
        let cs101 = storage.create_course(new_course("CS101", 1, 35)).await.unwrap();
        let cs201 = storage.create_course(new_course("CS201", 1, 0)).await.unwrap();

        let student = storage
            .create_student(new_student("S12345", &["CS101"]))
            .await
            .unwrap();
        assert_eq!(total_students(&storage, cs101.id).await, 36, "{}", backend);
        assert_eq!(total_students(&storage, cs201.id).await, 0, "{}", backend);

        let patch = StudentPatch {
            courses: Some(vec!["CS201".to_string()]),
            ..Default::default()
        };
        let moved = storage.update_student(student.id, &patch).await.unwrap();
        assert_eq!(moved.courses, vec!["CS201".to_string()], "{}", backend);
        assert_eq!(total_students(&storage, cs101.id).await, 35, "{}", backend);
        assert_eq!(total_students(&storage, cs201.id).await, 1, "{}", backend);

        // Manually zeroed counter never goes negative
        let zero = CoursePatch {
            total_students: Some(0),
            ..Default::default()
        };
        storage.update_course(cs201.id, &zero).await.unwrap();
        assert!(storage.delete_student(student.id).await.unwrap(), "{}", backend);
        assert_eq!(total_students(&storage, cs201.id).await, 0, "{}", backend);

        assert!(!storage.delete_student(student.id).await.unwrap(), "{}", backend);
        assert!(storage.get_student(student.id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_student_id_is_unique() {
    for (backend, storage) in backends().await {
        storage.create_student(new_student("S1", &[])).await.unwrap();
        let second = storage.create_student(new_student("S2", &[])).await.unwrap();

        let err = storage
            .create_student(new_student("S1", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)), "{}: {:?}", backend, err);

        let patch = StudentPatch {
            student_id: Some("S1".to_string()),
            ..Default::default()
        };
        let err = storage.update_student(second.id, &patch).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)), "{}: {:?}", backend, err);

        let found = storage.get_student_by_student_id("S2").await.unwrap();
        assert_eq!(found.map(|s| s.id), Some(second.id), "{}", backend);
    }
}

#[tokio::test]
async fn test_students_by_course() {
    for (backend, storage) in backends().await {
        let cs101 = storage.create_course(new_course("CS101", 1, 0)).await.unwrap();
        let a = storage
            .create_student(new_student("S1", &["CS101", "CS201"]))
            .await
            .unwrap();
        storage
            .create_student(new_student("S2", &["CS201"]))
            .await
            .unwrap();
        let c = storage
            .create_student(new_student("S3", &["CS101"]))
            .await
            .unwrap();

        let ids: Vec<i64> = storage
            .list_students_by_course(cs101.id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id], "{}", backend);

        assert!(storage.list_students_by_course(999).await.unwrap().is_empty());
        assert_eq!(storage.list_students().await.unwrap().len(), 3, "{}", backend);
    }
}

#[tokio::test]
async fn test_face_descriptor_round_trips() {
    for (backend, storage) in backends().await {
        let student = storage.create_student(new_student("S1", &[])).await.unwrap();
        assert_eq!(student.face_descriptor, None, "{}", backend);

        let patch = StudentPatch {
            face_descriptor: Some(vec![0.25, -0.5, 1.0]),
            ..Default::default()
        };
        storage.update_student(student.id, &patch).await.unwrap();
        let reloaded = storage.get_student(student.id).await.unwrap().unwrap();
        assert_eq!(reloaded.face_descriptor, Some(vec![0.25, -0.5, 1.0]), "{}", backend);
    }
}

// =============================================================================
// Courses
// =============================================================================

#[tokio::test]
async fn test_course_codes_and_instructor_scope() {
    for (backend, storage) in backends().await {
        let mine = storage.create_course(new_course("CS101", 1, 0)).await.unwrap();
        let theirs = storage.create_course(new_course("CS201", 2, 0)).await.unwrap();

        let err = storage
            .create_course(new_course("CS101", 2, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)), "{}: {:?}", backend, err);

        let rename = CoursePatch {
            code: Some("CS101".to_string()),
            ..Default::default()
        };
        let err = storage.update_course(theirs.id, &rename).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)), "{}: {:?}", backend, err);

        let owned: Vec<i64> = storage
            .list_courses_by_instructor(1)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(owned, vec![mine.id], "{}", backend);
        assert_eq!(storage.list_courses().await.unwrap().len(), 2, "{}", backend);

        let by_code = storage.get_course_by_code("CS201").await.unwrap();
        assert_eq!(by_code.map(|c| c.id), Some(theirs.id), "{}", backend);

        let clear_room = CoursePatch {
            room: Some(String::new()),
            ..Default::default()
        };
        let updated = storage.update_course(mine.id, &clear_room).await.unwrap();
        assert_eq!(updated.room, None, "{}", backend);

        assert!(storage.delete_course(mine.id).await.unwrap(), "{}", backend);
        assert!(!storage.delete_course(mine.id).await.unwrap(), "{}", backend);
    }
}

// =============================================================================
// Attendance
// =============================================================================

#[tokio::test]
async fn test_attendance_reads() {
    for (backend, storage) in backends().await {
        let first = storage.create_attendance(mark(1, 10, at(2, 9))).await.unwrap();
        storage.create_attendance(mark(1, 11, at(3, 9))).await.unwrap();
        storage.create_attendance(mark(2, 10, at(4, 9))).await.unwrap();

        let fetched = storage.get_attendance(first.id).await.unwrap();
        assert_eq!(fetched, Some(first.clone()), "{}", backend);
        assert_eq!(first.date, at(2, 9), "{}", backend);

        assert_eq!(storage.list_attendances_by_student(1).await.unwrap().len(), 2);
        assert_eq!(storage.list_attendances_by_course(10).await.unwrap().len(), 2);

        // Both bounds are inclusive
        let between = storage
            .list_attendances_between(10, at(2, 9), at(4, 9))
            .await
            .unwrap();
        assert_eq!(between.len(), 2, "{}", backend);
        let narrow = storage
            .list_attendances_between(10, at(2, 10), at(4, 8))
            .await
            .unwrap();
        assert!(narrow.is_empty(), "{}", backend);
    }
}

#[tokio::test]
async fn test_recent_attendance_order_and_join() {
    for (backend, storage) in backends().await {
        let course = storage.create_course(new_course("CS101", 1, 0)).await.unwrap();
        let student = storage
            .create_student(new_student("S1", &["CS101"]))
            .await
            .unwrap();

        let older = storage
            .create_attendance(mark(student.id, course.id, at(2, 9)))
            .await
            .unwrap();
        let tie_a = storage
            .create_attendance(mark(student.id, course.id, at(5, 9)))
            .await
            .unwrap();
        let tie_b = storage
            .create_attendance(mark(student.id, course.id, at(5, 9)))
            .await
            .unwrap();

        let recent = storage.recent_attendances(10).await.unwrap();
        let ids: Vec<i64> = recent.iter().map(|r| r.attendance.id).collect();
        assert_eq!(ids, vec![tie_b.id, tie_a.id, older.id], "{}", backend);
        assert_eq!(recent[0].student.student_id, "S1", "{}", backend);
        assert_eq!(recent[0].course.code, "CS101", "{}", backend);

        assert_eq!(storage.recent_attendances(1).await.unwrap().len(), 1);
        assert!(storage.recent_attendances(0).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_recent_attendance_reports_dangling_reference() {
    for (backend, storage) in backends().await {
        let course = storage.create_course(new_course("CS101", 1, 0)).await.unwrap();
        storage
            .create_attendance(mark(404, course.id, at(2, 9)))
            .await
            .unwrap();

        let err = storage.recent_attendances(10).await.unwrap_err();
        assert!(matches!(err, StorageError::Integrity(_)), "{}: {:?}", backend, err);
    }
}

// =============================================================================
// SQLite persistence
// =============================================================================

#[tokio::test]
async fn test_sqlite_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("rollcall.db");

    {
        let pool = init_database(&db_path).await.unwrap();
        let storage = SqliteStorage::new(pool.clone());
        storage.create_course(new_course("CS101", 1, 0)).await.unwrap();
        storage
            .create_student(new_student("S1", &["CS101"]))
            .await
            .unwrap();
        pool.close().await;
    }

    let storage = SqliteStorage::new(init_database(&db_path).await.unwrap());
    let course = storage.get_course_by_code("CS101").await.unwrap().unwrap();
    assert_eq!(course.total_students, 1);
    let student = storage.get_student_by_student_id("S1").await.unwrap().unwrap();
    assert_eq!(student.courses, vec!["CS101".to_string()]);
}
