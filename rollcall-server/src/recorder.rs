//! Attendance recorder
//!
//! The write path for check-ins and the read path for derived views:
//! dashboard totals, per-course percentages, today's status and the CSV
//! export. Nothing here is cached; every aggregate is recomputed from the
//! raw attendance rows on each call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use rollcall_common::models::{
    Attendance, AttendanceInput, AttendanceStatus, Course, NewAttendance, RecentAttendance,
};
use rollcall_common::time;

use crate::error::{ApiError, ApiResult};
use crate::storage::Storage;

/// Placeholder for students missing from the course roster
pub const UNKNOWN: &str = "Unknown";

pub const CSV_HEADER: [&str; 6] = [
    "Date",
    "Student ID",
    "Student Name",
    "Course",
    "Status",
    "Verification Method",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayStats {
    /// `"present/total"` across the instructor's courses
    pub today_attendance: String,
    pub today_percentage: i64,
    pub weekly_average: i64,
    pub total_students: i64,
    pub course_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStat {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub date: String,
    pub student_id: String,
    pub student_name: String,
    pub course: String,
    pub status: String,
    pub verification_method: String,
}

#[derive(Debug, Clone)]
pub struct CourseExport {
    pub course: Course,
    pub rows: Vec<ExportRow>,
}

impl CourseExport {
    /// Render as CSV with a header row; zero records yields the header only
    pub fn to_csv(&self) -> ApiResult<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER).map_err(csv_error)?;
        for row in &self.rows {
            writer
                .write_record([
                    row.date.as_str(),
                    row.student_id.as_str(),
                    row.student_name.as_str(),
                    row.course.as_str(),
                    row.status.as_str(),
                    row.verification_method.as_str(),
                ])
                .map_err(csv_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ApiError::Internal(format!("csv flush failed: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| ApiError::Internal(format!("csv not utf-8: {}", e)))
    }

    /// `attendance_<code>_<YYYY-MM-DD>.csv`, dated in local time
    pub fn filename(&self, now: DateTime<Utc>) -> String {
        format!(
            "attendance_{}_{}.csv",
            self.course.code,
            time::format_local(now, "%Y-%m-%d")
        )
    }
}

fn csv_error(err: csv::Error) -> ApiError {
    ApiError::Internal(format!("csv encoding failed: {}", err))
}

/// round(present / total * 100), 0 when there are no rows
pub fn percentage(present: usize, total: usize) -> i64 {
    if total == 0 {
        return 0;
    }
    (present as f64 / total as f64 * 100.0).round() as i64
}

fn count_present(rows: &[Attendance]) -> usize {
    rows.iter()
        .filter(|a| a.status == AttendanceStatus::Present)
        .count()
}

#[derive(Clone)]
pub struct AttendanceRecorder {
    storage: Arc<dyn Storage>,
}

impl AttendanceRecorder {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Append one attendance row; never updates an existing one
    pub async fn record(&self, attendance: NewAttendance) -> ApiResult<Attendance> {
        let created = self.storage.create_attendance(attendance).await?;
        info!(
            "Recorded attendance {}: student {} course {} {} via {}",
            created.id,
            created.student_id,
            created.course_id,
            created.status,
            created.verification_method
        );
        Ok(created)
    }

    /// Validate a raw payload, default its date to `now`, then record it
    pub async fn record_input(
        &self,
        input: AttendanceInput,
        now: DateTime<Utc>,
    ) -> ApiResult<Attendance> {
        let attendance = input.into_new(now)?;
        self.record(attendance).await
    }

    pub async fn recent(&self, limit: usize) -> ApiResult<Vec<RecentAttendance>> {
        Ok(self.storage.recent_attendances(limit).await?)
    }

    /// Dashboard totals for one instructor
    ///
    /// `totalStudents` counts distinct students enrolled in any of the
    /// instructor's courses; `weeklyAverage` covers the seven local days
    /// ending today.
    pub async fn today_stats(
        &self,
        instructor_id: i64,
        now: DateTime<Utc>,
    ) -> ApiResult<TodayStats> {
        let courses = self.storage.list_courses_by_instructor(instructor_id).await?;
        let (day_start, day_end) = time::local_day_bounds(now);
        let week_start = time::local_days_back(now, 6);

        let mut present_today = 0;
        let mut total_today = 0;
        let mut present_week = 0;
        let mut total_week = 0;

        for course in &courses {
            let today = self
                .storage
                .list_attendances_between(course.id, day_start, day_end)
                .await?;
            present_today += count_present(&today);
            total_today += today.len();

            let week = self
                .storage
                .list_attendances_between(course.id, week_start, day_end)
                .await?;
            present_week += count_present(&week);
            total_week += week.len();
        }

        let codes: HashSet<&str> = courses.iter().map(|c| c.code.as_str()).collect();
        let total_students = self
            .storage
            .list_students()
            .await?
            .iter()
            .filter(|s| s.courses.iter().any(|code| codes.contains(code.as_str())))
            .count();

        Ok(TodayStats {
            today_attendance: format!("{}/{}", present_today, total_today),
            today_percentage: percentage(present_today, total_today),
            weekly_average: percentage(present_week, total_week),
            total_students: total_students as i64,
            course_count: courses.len() as i64,
        })
    }

    /// All-time present percentage per owned course
    pub async fn course_stats(&self, instructor_id: i64) -> ApiResult<Vec<CourseStat>> {
        let courses = self.storage.list_courses_by_instructor(instructor_id).await?;
        let mut stats = Vec::with_capacity(courses.len());
        for course in courses {
            let rows = self.storage.list_attendances_by_course(course.id).await?;
            stats.push(CourseStat {
                id: course.id,
                name: course.name,
                code: course.code,
                percentage: percentage(count_present(&rows), rows.len()),
            });
        }
        Ok(stats)
    }

    /// Most recent record on or after local midnight, if any
    pub async fn today_status(
        &self,
        student_id: i64,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> ApiResult<Option<Attendance>> {
        let (day_start, day_end) = time::local_day_bounds(now);
        let rows = self
            .storage
            .list_attendances_between(course_id, day_start, day_end)
            .await?;
        Ok(rows
            .into_iter()
            .filter(|a| a.student_id == student_id)
            .max_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id))))
    }

    /// One row per attendance record of the course
    ///
    /// Names come from the course roster; anyone not on it is `Unknown`.
    pub async fn export_course(&self, course_id: i64) -> ApiResult<CourseExport> {
        let course = self
            .storage
            .get_course(course_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

        let attendances = self.storage.list_attendances_by_course(course_id).await?;
        let roster: HashMap<i64, _> = self
            .storage
            .list_students_by_course(course_id)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let rows = attendances
            .iter()
            .map(|attendance| {
                let student = roster.get(&attendance.student_id);
                ExportRow {
                    date: time::format_local(attendance.date, "%Y-%m-%d %H:%M:%S"),
                    student_id: student
                        .map(|s| s.student_id.clone())
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                    student_name: student
                        .map(|s| s.name.clone())
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                    course: course.name.clone(),
                    status: attendance.status.to_string(),
                    verification_method: attendance.verification_method.to_string(),
                }
            })
            .collect();

        Ok(CourseExport { course, rows })
    }
}
