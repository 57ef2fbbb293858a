//! In-memory arena store
//!
//! All four maps and the id counters sit behind one `RwLock`, so a write
//! that touches several entities (student + roster counters) is atomic
//! with respect to every other request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use rollcall_common::models::{
    Attendance, Course, CoursePatch, NewAttendance, NewCourse, NewStudent, NewUser,
    RecentAttendance, Student, StudentPatch, User, UserPatch,
};
use rollcall_common::time;
use rollcall_common::validation::normalize_codes;

use super::{
    course_code_taken, dangling, roster_delta, student_id_taken, username_taken, Storage,
    StorageError, StorageResult,
};

#[derive(Default)]
struct Arena {
    users: BTreeMap<i64, User>,
    students: BTreeMap<i64, Student>,
    courses: BTreeMap<i64, Course>,
    attendances: BTreeMap<i64, Attendance>,
    last_user_id: i64,
    last_student_id: i64,
    last_course_id: i64,
    last_attendance_id: i64,
}

impl Arena {
    fn course_id_by_code(&self, code: &str) -> Option<i64> {
        self.courses
            .values()
            .find(|course| course.code == code)
            .map(|course| course.id)
    }

    fn adjust_roster(&mut self, code: &str, delta: i64) {
        if let Some(id) = self.course_id_by_code(code) {
            if let Some(course) = self.courses.get_mut(&id) {
                course.total_students = (course.total_students + delta).max(0);
            }
        }
    }
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Volatile store for tests, demos and `--memory` runs
#[derive(Default)]
pub struct MemStorage {
    arena: RwLock<Arena>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let mut arena = self.arena.write().await;
        if arena.users.values().any(|u| u.username == user.username) {
            return Err(username_taken(&user.username));
        }

        let id = next_id(&mut arena.last_user_id);
        let created = User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            name: user.name,
            department: user.department,
            profile_image: user.profile_image,
            language: user.language,
            created_at: time::now(),
        };
        arena.users.insert(id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: i64) -> StorageResult<Option<User>> {
        Ok(self.arena.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let arena = self.arena.read().await;
        Ok(arena.users.values().find(|u| u.username == username).cloned())
    }

    async fn update_user(&self, id: i64, patch: &UserPatch) -> StorageResult<User> {
        let mut arena = self.arena.write().await;
        let user = arena
            .users
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("User {}", id)))?;
        patch.apply(user);
        Ok(user.clone())
    }

    async fn create_student(&self, student: NewStudent) -> StorageResult<Student> {
        let mut arena = self.arena.write().await;
        if arena
            .students
            .values()
            .any(|s| s.student_id == student.student_id)
        {
            return Err(student_id_taken(&student.student_id));
        }

        let id = next_id(&mut arena.last_student_id);
        let created = Student {
            id,
            name: student.name,
            student_id: student.student_id,
            email: student.email,
            face_descriptor: student.face_descriptor,
            courses: normalize_codes(student.courses),
            created_at: time::now(),
        };
        for code in &created.courses {
            arena.adjust_roster(code, 1);
        }
        arena.students.insert(id, created.clone());
        Ok(created)
    }

    async fn get_student(&self, id: i64) -> StorageResult<Option<Student>> {
        Ok(self.arena.read().await.students.get(&id).cloned())
    }

    async fn get_student_by_student_id(
        &self,
        student_id: &str,
    ) -> StorageResult<Option<Student>> {
        let arena = self.arena.read().await;
        Ok(arena
            .students
            .values()
            .find(|s| s.student_id == student_id)
            .cloned())
    }

    async fn update_student(&self, id: i64, patch: &StudentPatch) -> StorageResult<Student> {
        let mut arena = self.arena.write().await;
        let existing = arena
            .students
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("Student {}", id)))?;

        if let Some(student_id) = &patch.student_id {
            if arena
                .students
                .values()
                .any(|s| s.id != id && &s.student_id == student_id)
            {
                return Err(student_id_taken(student_id));
            }
        }

        let mut updated = existing.clone();
        patch.apply(&mut updated);
        updated.courses = normalize_codes(updated.courses);

        let (removed, added) = roster_delta(&existing.courses, &updated.courses);
        for code in removed {
            arena.adjust_roster(code, -1);
        }
        for code in added {
            arena.adjust_roster(code, 1);
        }

        arena.students.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_student(&self, id: i64) -> StorageResult<bool> {
        let mut arena = self.arena.write().await;
        let Some(removed) = arena.students.remove(&id) else {
            return Ok(false);
        };
        for code in &removed.courses {
            arena.adjust_roster(code, -1);
        }
        Ok(true)
    }

    async fn list_students(&self) -> StorageResult<Vec<Student>> {
        Ok(self.arena.read().await.students.values().cloned().collect())
    }

    async fn list_students_by_course(&self, course_id: i64) -> StorageResult<Vec<Student>> {
        let arena = self.arena.read().await;
        let Some(course) = arena.courses.get(&course_id) else {
            return Ok(Vec::new());
        };
        Ok(arena
            .students
            .values()
            .filter(|s| s.is_enrolled_in(&course.code))
            .cloned()
            .collect())
    }

    async fn create_course(&self, course: NewCourse) -> StorageResult<Course> {
        let mut arena = self.arena.write().await;
        if arena.course_id_by_code(&course.code).is_some() {
            return Err(course_code_taken(&course.code));
        }

        let id = next_id(&mut arena.last_course_id);
        let created = Course {
            id,
            code: course.code,
            name: course.name,
            instructor_id: course.instructor_id,
            room: course.room,
            schedule: course.schedule,
            total_students: course.total_students.max(0),
            created_at: time::now(),
        };
        arena.courses.insert(id, created.clone());
        Ok(created)
    }

    async fn get_course(&self, id: i64) -> StorageResult<Option<Course>> {
        Ok(self.arena.read().await.courses.get(&id).cloned())
    }

    async fn get_course_by_code(&self, code: &str) -> StorageResult<Option<Course>> {
        let arena = self.arena.read().await;
        Ok(arena.courses.values().find(|c| c.code == code).cloned())
    }

    async fn list_courses(&self) -> StorageResult<Vec<Course>> {
        Ok(self.arena.read().await.courses.values().cloned().collect())
    }

    async fn list_courses_by_instructor(&self, instructor_id: i64) -> StorageResult<Vec<Course>> {
        let arena = self.arena.read().await;
        Ok(arena
            .courses
            .values()
            .filter(|c| c.instructor_id == instructor_id)
            .cloned()
            .collect())
    }

    async fn update_course(&self, id: i64, patch: &CoursePatch) -> StorageResult<Course> {
        let mut arena = self.arena.write().await;
        if !arena.courses.contains_key(&id) {
            return Err(StorageError::NotFound(format!("Course {}", id)));
        }

        if let Some(code) = &patch.code {
            if arena.courses.values().any(|c| c.id != id && &c.code == code) {
                return Err(course_code_taken(code));
            }
        }

        let course = arena
            .courses
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("Course {}", id)))?;
        patch.apply(course);
        Ok(course.clone())
    }

    async fn delete_course(&self, id: i64) -> StorageResult<bool> {
        Ok(self.arena.write().await.courses.remove(&id).is_some())
    }

    async fn create_attendance(&self, attendance: NewAttendance) -> StorageResult<Attendance> {
        let mut arena = self.arena.write().await;
        let id = next_id(&mut arena.last_attendance_id);
        let created = Attendance {
            id,
            student_id: attendance.student_id,
            course_id: attendance.course_id,
            date: time::normalize(attendance.date),
            status: attendance.status,
            verification_method: attendance.verification_method,
        };
        arena.attendances.insert(id, created.clone());
        Ok(created)
    }

    async fn get_attendance(&self, id: i64) -> StorageResult<Option<Attendance>> {
        Ok(self.arena.read().await.attendances.get(&id).cloned())
    }

    async fn list_attendances_by_student(
        &self,
        student_id: i64,
    ) -> StorageResult<Vec<Attendance>> {
        let arena = self.arena.read().await;
        Ok(arena
            .attendances
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn list_attendances_by_course(&self, course_id: i64) -> StorageResult<Vec<Attendance>> {
        let arena = self.arena.read().await;
        Ok(arena
            .attendances
            .values()
            .filter(|a| a.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn list_attendances_between(
        &self,
        course_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Attendance>> {
        let arena = self.arena.read().await;
        Ok(arena
            .attendances
            .values()
            .filter(|a| a.course_id == course_id && a.date >= start && a.date <= end)
            .cloned()
            .collect())
    }

    async fn recent_attendances(&self, limit: usize) -> StorageResult<Vec<RecentAttendance>> {
        let arena = self.arena.read().await;
        let mut rows: Vec<&Attendance> = arena.attendances.values().collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        rows.into_iter()
            .take(limit)
            .map(|attendance| {
                let student = arena
                    .students
                    .get(&attendance.student_id)
                    .ok_or_else(|| dangling(attendance, "student", attendance.student_id))?;
                let course = arena
                    .courses
                    .get(&attendance.course_id)
                    .ok_or_else(|| dangling(attendance, "course", attendance.course_id))?;
                Ok(RecentAttendance {
                    attendance: attendance.clone(),
                    student: student.clone(),
                    course: course.clone(),
                })
            })
            .collect()
    }
}
