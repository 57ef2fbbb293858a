//! Demo dataset
//!
//! One instructor (`faculty` / `password`), four courses, four students and
//! four check-ins dated today. Loaded only into a store that does not yet
//! have the demo instructor.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use rollcall_common::models::{
    AttendanceStatus, NewAttendance, NewCourse, NewStudent, NewUser, VerificationMethod,
    DEFAULT_LANGUAGE,
};
use rollcall_common::time;

use crate::credentials::PasswordHasherConfig;
use crate::error::ApiResult;
use crate::storage::Storage;

pub const DEMO_USERNAME: &str = "faculty";
pub const DEMO_PASSWORD: &str = "password";

struct DemoCourse {
    code: &'static str,
    name: &'static str,
    room: &'static str,
    schedule: &'static str,
    total_students: i64,
}

const COURSES: [DemoCourse; 4] = [
    DemoCourse {
        code: "CS101",
        name: "Computer Science 101",
        room: "Room 305B",
        schedule: "Monday, Wednesday 2:30 PM",
        total_students: 35,
    },
    DemoCourse {
        code: "CS201",
        name: "Data Structures",
        room: "Lab 201",
        schedule: "Tuesday, Thursday 10:15 AM",
        total_students: 28,
    },
    DemoCourse {
        code: "CS301",
        name: "Database Systems",
        room: "Room 112A",
        schedule: "Wednesday, Friday 11:05 AM",
        total_students: 42,
    },
    DemoCourse {
        code: "CS401",
        name: "Artificial Intelligence",
        room: "Room 202C",
        schedule: "Monday, Thursday 1:30 PM",
        total_students: 30,
    },
];

const STUDENTS: [(&str, &str, &str, [&str; 2]); 4] = [
    ("Michael Roberts", "S12345", "michael.roberts@example.com", ["CS101", "CS201"]),
    ("Sarah Johnson", "S12346", "sarah.johnson@example.com", ["CS101", "CS301"]),
    ("David Wilson", "S12347", "david.wilson@example.com", ["CS201", "CS301"]),
    ("Emily Chen", "S12348", "emily.chen@example.com", ["CS101", "CS401"]),
];

// (student index, course index, local time, status, method)
const CHECK_INS: [(usize, usize, (u32, u32), AttendanceStatus, VerificationMethod); 4] = [
    (0, 0, (9, 30), AttendanceStatus::Present, VerificationMethod::Face),
    (1, 1, (10, 15), AttendanceStatus::Present, VerificationMethod::Face),
    (2, 2, (11, 5), AttendanceStatus::Absent, VerificationMethod::Manual),
    (3, 3, (13, 30), AttendanceStatus::Late, VerificationMethod::Face),
];

/// Load the demo dataset; returns `false` if it was already present
pub async fn seed_demo_data(
    storage: &dyn Storage,
    hasher: &PasswordHasherConfig,
    now: DateTime<Utc>,
) -> ApiResult<bool> {
    if storage.get_user_by_username(DEMO_USERNAME).await?.is_some() {
        info!("Demo data already present, skipping seed");
        return Ok(false);
    }

    let instructor = storage
        .create_user(
            NewUser {
                username: DEMO_USERNAME.to_string(),
                password_hash: hasher.hash(DEMO_PASSWORD)?,
                name: "Prof. Jane Smith".to_string(),
                department: Some("Computer Science".to_string()),
                profile_image: None,
                language: DEFAULT_LANGUAGE.to_string(),
            }
            .normalized()?,
        )
        .await?;

    let mut course_ids = Vec::with_capacity(COURSES.len());
    for course in &COURSES {
        let created = storage
            .create_course(
                NewCourse {
                    code: course.code.to_string(),
                    name: course.name.to_string(),
                    instructor_id: instructor.id,
                    room: Some(course.room.to_string()),
                    schedule: Some(course.schedule.to_string()),
                    total_students: course.total_students,
                }
                .normalized()?,
            )
            .await?;
        course_ids.push(created.id);
    }

    let mut student_ids = Vec::with_capacity(STUDENTS.len());
    for (name, student_id, email, courses) in STUDENTS {
        let created = storage
            .create_student(
                NewStudent {
                    name: name.to_string(),
                    student_id: student_id.to_string(),
                    email: Some(email.to_string()),
                    face_descriptor: None,
                    courses: courses.iter().map(|c| c.to_string()).collect(),
                }
                .normalized()?,
            )
            .await?;
        student_ids.push(created.id);
    }

    let today = time::local_day_bounds(now).0;
    for (student, course, (hour, minute), status, method) in CHECK_INS {
        let offset = Duration::hours(i64::from(hour)) + Duration::minutes(i64::from(minute));
        storage
            .create_attendance(NewAttendance {
                student_id: student_ids[student],
                course_id: course_ids[course],
                date: today + offset,
                status,
                verification_method: method,
            })
            .await?;
    }

    info!(
        "Seeded demo data: instructor '{}', {} courses, {} students, {} check-ins",
        DEMO_USERNAME,
        course_ids.len(),
        student_ids.len(),
        CHECK_INS.len()
    );
    Ok(true)
}
