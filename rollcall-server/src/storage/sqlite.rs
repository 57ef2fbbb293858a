//! SQLite-backed store
//!
//! Timestamps are stored as fixed-width RFC 3339 text, student course lists
//! and face descriptors as JSON text. Multi-statement writes run inside one
//! transaction; every query inside it goes through the transaction handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use tracing::debug;

use rollcall_common::models::{
    Attendance, AttendanceStatus, Course, CoursePatch, Descriptor, NewAttendance, NewCourse,
    NewStudent, NewUser, RecentAttendance, Student, StudentPatch, User, UserPatch,
    VerificationMethod,
};
use rollcall_common::time;
use rollcall_common::validation::normalize_codes;

use super::{
    course_code_taken, dangling, roster_delta, student_id_taken, username_taken, Storage,
    StorageError, StorageResult,
};

const USER_COLUMNS: &str =
    "id, username, password_hash, name, department, profile_image, language, created_at";
const STUDENT_COLUMNS: &str = "id, name, student_id, email, face_descriptor, courses, created_at";
const COURSE_COLUMNS: &str =
    "id, code, name, instructor_id, room, schedule, total_students, created_at";
const ATTENDANCE_COLUMNS: &str = "id, student_id, course_id, date, status, verification_method";

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ========================================
// Row decoding
// ========================================

fn decode_time(raw: &str) -> StorageResult<DateTime<Utc>> {
    time::decode(raw).map_err(|e| StorageError::Encoding(format!("timestamp '{}': {}", raw, e)))
}

fn user_from_row(row: &SqliteRow) -> StorageResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        name: row.try_get("name")?,
        department: row.try_get("department")?,
        profile_image: row.try_get("profile_image")?,
        language: row.try_get("language")?,
        created_at: decode_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn student_from_row(row: &SqliteRow) -> StorageResult<Student> {
    let descriptor: Option<String> = row.try_get("face_descriptor")?;
    let face_descriptor = descriptor
        .map(|raw| serde_json::from_str::<Descriptor>(&raw))
        .transpose()
        .map_err(|e| StorageError::Encoding(format!("face descriptor: {}", e)))?;

    let courses: String = row.try_get("courses")?;
    let courses = serde_json::from_str::<Vec<String>>(&courses)
        .map_err(|e| StorageError::Encoding(format!("course list: {}", e)))?;

    Ok(Student {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        student_id: row.try_get("student_id")?,
        email: row.try_get("email")?,
        face_descriptor,
        courses,
        created_at: decode_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn course_from_row(row: &SqliteRow) -> StorageResult<Course> {
    Ok(Course {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        instructor_id: row.try_get("instructor_id")?,
        room: row.try_get("room")?,
        schedule: row.try_get("schedule")?,
        total_students: row.try_get("total_students")?,
        created_at: decode_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn attendance_from_row(row: &SqliteRow) -> StorageResult<Attendance> {
    let status: String = row.try_get("status")?;
    let method: String = row.try_get("verification_method")?;
    Ok(Attendance {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        course_id: row.try_get("course_id")?,
        date: decode_time(&row.try_get::<String, _>("date")?)?,
        status: status
            .parse::<AttendanceStatus>()
            .map_err(StorageError::Encoding)?,
        verification_method: method
            .parse::<VerificationMethod>()
            .map_err(StorageError::Encoding)?,
    })
}

fn encode_json<T: serde::Serialize + ?Sized>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Encoding(e.to_string()))
}

/// Turn a UNIQUE violation into `conflict`, pass everything else through
fn map_unique(err: sqlx::Error, conflict: StorageError) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict,
        _ => StorageError::Database(err),
    }
}

async fn adjust_roster(
    tx: &mut Transaction<'_, Sqlite>,
    codes: &[&str],
    delta: i64,
) -> StorageResult<()> {
    for code in codes {
        sqlx::query(
            "UPDATE courses SET total_students = MAX(total_students + ?, 0) WHERE code = ?",
        )
        .bind(delta)
        .bind(*code)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn fetch_student(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
) -> StorageResult<Option<Student>> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .as_ref()
        .map(student_from_row)
        .transpose()
}

#[async_trait]
impl Storage for SqliteStorage {
    // ========================================
    // Users
    // ========================================

    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let created_at = time::now();
        let id = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, name, department, profile_image, language, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.department)
        .bind(&user.profile_image)
        .bind(&user.language)
        .bind(time::encode(created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, username_taken(&user.username)))?
        .last_insert_rowid();

        Ok(User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            name: user.name,
            department: user.department,
            profile_image: user.profile_image,
            language: user.language,
            created_at,
        })
    }

    async fn get_user(&self, id: i64) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn update_user(&self, id: i64, patch: &UserPatch) -> StorageResult<User> {
        let mut user = self
            .get_user(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("User {}", id)))?;
        if patch.is_empty() {
            return Ok(user);
        }
        patch.apply(&mut user);

        sqlx::query(
            "UPDATE users SET name = ?, department = ?, profile_image = ?, language = ? WHERE id = ?",
        )
        .bind(&user.name)
        .bind(&user.department)
        .bind(&user.profile_image)
        .bind(&user.language)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    // ========================================
    // Students
    // ========================================

    async fn create_student(&self, student: NewStudent) -> StorageResult<Student> {
        let courses = normalize_codes(student.courses);
        let created_at = time::now();
        let descriptor = student
            .face_descriptor
            .as_ref()
            .map(|d| encode_json(d))
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO students (name, student_id, email, face_descriptor, courses, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&student.name)
        .bind(&student.student_id)
        .bind(&student.email)
        .bind(&descriptor)
        .bind(encode_json(&courses)?)
        .bind(time::encode(created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, student_id_taken(&student.student_id)))?
        .last_insert_rowid();

        let codes: Vec<&str> = courses.iter().map(String::as_str).collect();
        adjust_roster(&mut tx, &codes, 1).await?;

        tx.commit().await?;
        debug!("Created student {} enrolled in {:?}", id, courses);

        Ok(Student {
            id,
            name: student.name,
            student_id: student.student_id,
            email: student.email,
            face_descriptor: student.face_descriptor,
            courses,
            created_at,
        })
    }

    async fn get_student(&self, id: i64) -> StorageResult<Option<Student>> {
        let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(student_from_row)
            .transpose()
    }

    async fn get_student_by_student_id(
        &self,
        student_id: &str,
    ) -> StorageResult<Option<Student>> {
        let sql = format!("SELECT {} FROM students WHERE student_id = ?", STUDENT_COLUMNS);
        sqlx::query(&sql)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(student_from_row)
            .transpose()
    }

    async fn update_student(&self, id: i64, patch: &StudentPatch) -> StorageResult<Student> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_student(&mut tx, id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Student {}", id)))?;
        if patch.is_empty() {
            return Ok(existing);
        }

        let mut updated = existing.clone();
        patch.apply(&mut updated);
        updated.courses = normalize_codes(updated.courses);

        let descriptor = updated
            .face_descriptor
            .as_ref()
            .map(|d| encode_json(d))
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE students
            SET name = ?, student_id = ?, email = ?, face_descriptor = ?, courses = ?
            WHERE id = ?
            "#,
        )
        .bind(&updated.name)
        .bind(&updated.student_id)
        .bind(&updated.email)
        .bind(&descriptor)
        .bind(encode_json(&updated.courses)?)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, student_id_taken(&updated.student_id)))?;

        let (removed, added) = roster_delta(&existing.courses, &updated.courses);
        adjust_roster(&mut tx, &removed, -1).await?;
        adjust_roster(&mut tx, &added, 1).await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_student(&self, id: i64) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;

        let Some(existing) = fetch_student(&mut tx, id).await? else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let codes: Vec<&str> = existing.courses.iter().map(String::as_str).collect();
        adjust_roster(&mut tx, &codes, -1).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_students(&self) -> StorageResult<Vec<Student>> {
        let sql = format!("SELECT {} FROM students ORDER BY id", STUDENT_COLUMNS);
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(student_from_row)
            .collect()
    }

    async fn list_students_by_course(&self, course_id: i64) -> StorageResult<Vec<Student>> {
        let Some(course) = self.get_course(course_id).await? else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {} FROM students WHERE EXISTS (SELECT 1 FROM json_each(students.courses) WHERE json_each.value = ?) ORDER BY id",
            STUDENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&course.code)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(student_from_row)
            .collect()
    }

    // ========================================
    // Courses
    // ========================================

    async fn create_course(&self, course: NewCourse) -> StorageResult<Course> {
        let created_at = time::now();
        let total_students = course.total_students.max(0);
        let id = sqlx::query(
            r#"
            INSERT INTO courses (code, name, instructor_id, room, schedule, total_students, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&course.code)
        .bind(&course.name)
        .bind(course.instructor_id)
        .bind(&course.room)
        .bind(&course.schedule)
        .bind(total_students)
        .bind(time::encode(created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, course_code_taken(&course.code)))?
        .last_insert_rowid();

        Ok(Course {
            id,
            code: course.code,
            name: course.name,
            instructor_id: course.instructor_id,
            room: course.room,
            schedule: course.schedule,
            total_students,
            created_at,
        })
    }

    async fn get_course(&self, id: i64) -> StorageResult<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(course_from_row)
            .transpose()
    }

    async fn get_course_by_code(&self, code: &str) -> StorageResult<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE code = ?", COURSE_COLUMNS);
        sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(course_from_row)
            .transpose()
    }

    async fn list_courses(&self) -> StorageResult<Vec<Course>> {
        let sql = format!("SELECT {} FROM courses ORDER BY id", COURSE_COLUMNS);
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(course_from_row)
            .collect()
    }

    async fn list_courses_by_instructor(&self, instructor_id: i64) -> StorageResult<Vec<Course>> {
        let sql = format!(
            "SELECT {} FROM courses WHERE instructor_id = ? ORDER BY id",
            COURSE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(instructor_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(course_from_row)
            .collect()
    }

    async fn update_course(&self, id: i64, patch: &CoursePatch) -> StorageResult<Course> {
        let mut course = self
            .get_course(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Course {}", id)))?;
        if patch.is_empty() {
            return Ok(course);
        }
        patch.apply(&mut course);

        sqlx::query(
            r#"
            UPDATE courses
            SET code = ?, name = ?, room = ?, schedule = ?, total_students = ?
            WHERE id = ?
            "#,
        )
        .bind(&course.code)
        .bind(&course.name)
        .bind(&course.room)
        .bind(&course.schedule)
        .bind(course.total_students)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, course_code_taken(&course.code)))?;

        Ok(course)
    }

    async fn delete_course(&self, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================
    // Attendance
    // ========================================

    async fn create_attendance(&self, attendance: NewAttendance) -> StorageResult<Attendance> {
        let date = time::normalize(attendance.date);
        let id = sqlx::query(
            r#"
            INSERT INTO attendances (student_id, course_id, date, status, verification_method)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(attendance.student_id)
        .bind(attendance.course_id)
        .bind(time::encode(date))
        .bind(attendance.status.as_str())
        .bind(attendance.verification_method.as_str())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Attendance {
            id,
            student_id: attendance.student_id,
            course_id: attendance.course_id,
            date,
            status: attendance.status,
            verification_method: attendance.verification_method,
        })
    }

    async fn get_attendance(&self, id: i64) -> StorageResult<Option<Attendance>> {
        let sql = format!("SELECT {} FROM attendances WHERE id = ?", ATTENDANCE_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(attendance_from_row)
            .transpose()
    }

    async fn list_attendances_by_student(
        &self,
        student_id: i64,
    ) -> StorageResult<Vec<Attendance>> {
        let sql = format!(
            "SELECT {} FROM attendances WHERE student_id = ? ORDER BY id",
            ATTENDANCE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(attendance_from_row)
            .collect()
    }

    async fn list_attendances_by_course(&self, course_id: i64) -> StorageResult<Vec<Attendance>> {
        let sql = format!(
            "SELECT {} FROM attendances WHERE course_id = ? ORDER BY id",
            ATTENDANCE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(attendance_from_row)
            .collect()
    }

    async fn list_attendances_between(
        &self,
        course_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Attendance>> {
        let sql = format!(
            "SELECT {} FROM attendances WHERE course_id = ? AND date >= ? AND date <= ? ORDER BY id",
            ATTENDANCE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(course_id)
            .bind(time::encode(time::normalize(start)))
            .bind(time::encode(time::normalize(end)))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(attendance_from_row)
            .collect()
    }

    async fn recent_attendances(&self, limit: usize) -> StorageResult<Vec<RecentAttendance>> {
        let sql = format!(
            "SELECT {} FROM attendances ORDER BY date DESC, id DESC LIMIT ?",
            ATTENDANCE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(attendance_from_row)
            .collect::<StorageResult<Vec<_>>>()?;

        let mut students: HashMap<i64, Option<Student>> = HashMap::new();
        let mut courses: HashMap<i64, Option<Course>> = HashMap::new();
        let mut joined = Vec::with_capacity(rows.len());

        for attendance in rows {
            if !students.contains_key(&attendance.student_id) {
                let student = self.get_student(attendance.student_id).await?;
                students.insert(attendance.student_id, student);
            }
            if !courses.contains_key(&attendance.course_id) {
                let course = self.get_course(attendance.course_id).await?;
                courses.insert(attendance.course_id, course);
            }

            let student = students
                .get(&attendance.student_id)
                .cloned()
                .flatten()
                .ok_or_else(|| dangling(&attendance, "student", attendance.student_id))?;
            let course = courses
                .get(&attendance.course_id)
                .cloned()
                .flatten()
                .ok_or_else(|| dangling(&attendance, "course", attendance.course_id))?;

            joined.push(RecentAttendance {
                attendance,
                student,
                course,
            });
        }

        Ok(joined)
    }
}
