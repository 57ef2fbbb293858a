//! Verification gateway
//!
//! Turns a face capture into an attendance record. Detection happens in the
//! browser; the server only decides, through a [`VerificationPolicy`],
//! whether the capture counts for the claimed student. The policy is chosen
//! by configuration:
//!
//! - [`AcceptAll`]: every capture is recorded as present (default)
//! - [`DescriptorThreshold`]: Euclidean distance between the submitted and
//!   the enrolled descriptor must not exceed the threshold

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use rollcall_common::config::{VerificationConfig, VerificationMode};
use rollcall_common::models::{
    Attendance, AttendanceStatus, Descriptor, NewAttendance, Student, StudentPatch,
    VerificationMethod,
};

use crate::error::{ApiError, ApiResult};
use crate::recorder::AttendanceRecorder;
use crate::storage::Storage;

/// What the client submitted for one check-in
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub descriptor: Option<Descriptor>,
    pub image: Option<Vec<u8>>,
}

impl Capture {
    pub fn is_empty(&self) -> bool {
        self.descriptor.is_none() && self.image.as_ref().map_or(true, |img| img.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

pub trait VerificationPolicy: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, student: &Student, capture: &Capture) -> Verdict;
}

/// Placeholder policy: any capture is a match
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl VerificationPolicy for AcceptAll {
    fn name(&self) -> &'static str {
        "accept_all"
    }

    fn evaluate(&self, _student: &Student, _capture: &Capture) -> Verdict {
        Verdict::Accepted
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorThreshold {
    pub threshold: f32,
}

impl VerificationPolicy for DescriptorThreshold {
    fn name(&self) -> &'static str {
        "descriptor_threshold"
    }

    fn evaluate(&self, student: &Student, capture: &Capture) -> Verdict {
        let Some(enrolled) = student.face_descriptor.as_ref().filter(|d| !d.is_empty()) else {
            return Verdict::Rejected("Student has no enrolled face descriptor".to_string());
        };
        let Some(submitted) = capture.descriptor.as_ref() else {
            return Verdict::Rejected("Capture carries no face descriptor".to_string());
        };
        match euclidean_distance(enrolled, submitted) {
            Some(distance) if distance <= self.threshold => Verdict::Accepted,
            Some(distance) => Verdict::Rejected(format!(
                "Face does not match (distance {:.3} > {:.3})",
                distance, self.threshold
            )),
            None => Verdict::Rejected("Descriptor dimensions do not match".to_string()),
        }
    }
}

/// `None` when the vectors differ in length or are empty
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum.sqrt())
}

pub fn policy_from_config(config: &VerificationConfig) -> Arc<dyn VerificationPolicy> {
    match config.mode {
        VerificationMode::AcceptAll => Arc::new(AcceptAll),
        VerificationMode::DescriptorThreshold => Arc::new(DescriptorThreshold {
            threshold: config.threshold,
        }),
    }
}

#[derive(Clone)]
pub struct VerificationGateway {
    storage: Arc<dyn Storage>,
    recorder: AttendanceRecorder,
    policy: Arc<dyn VerificationPolicy>,
}

impl VerificationGateway {
    pub fn new(
        storage: Arc<dyn Storage>,
        recorder: AttendanceRecorder,
        policy: Arc<dyn VerificationPolicy>,
    ) -> Self {
        Self {
            storage,
            recorder,
            policy,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Store whatever descriptor the client computed; no likeness check
    pub async fn enroll(&self, student_id: i64, descriptor: Descriptor) -> ApiResult<Student> {
        if self.storage.get_student(student_id).await?.is_none() {
            return Err(ApiError::NotFound("Student not found".to_string()));
        }
        let patch = StudentPatch {
            face_descriptor: Some(descriptor),
            ..Default::default()
        }
        .normalized()?;
        let student = self.storage.update_student(student_id, &patch).await?;
        info!("Enrolled face descriptor for student {}", student_id);
        Ok(student)
    }

    /// Check the capture against the policy and record present/face
    ///
    /// Lookups and the policy decision happen first; only an accepted
    /// capture writes.
    pub async fn verify(
        &self,
        student_id: i64,
        course_id: i64,
        capture: &Capture,
        now: DateTime<Utc>,
    ) -> ApiResult<Attendance> {
        let student = self
            .storage
            .get_student(student_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;
        if self.storage.get_course(course_id).await?.is_none() {
            return Err(ApiError::NotFound("Course not found".to_string()));
        }

        if let Verdict::Rejected(reason) = self.policy.evaluate(&student, capture) {
            warn!(
                "Face verification rejected for student {} course {} ({}): {}",
                student_id,
                course_id,
                self.policy.name(),
                reason
            );
            return Err(ApiError::VerificationRejected(reason));
        }

        self.recorder
            .record(NewAttendance {
                student_id,
                course_id,
                date: rollcall_common::time::normalize(now),
                status: AttendanceStatus::Present,
                verification_method: VerificationMethod::Face,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemStorage, SqliteStorage};
    use rollcall_common::db::open_in_memory;
    use rollcall_common::models::{NewCourse, NewStudent};

    fn student_with(descriptor: Option<Descriptor>) -> Student {
        Student {
            id: 1,
            name: "Michael Roberts".to_string(),
            student_id: "S12345".to_string(),
            email: None,
            face_descriptor: descriptor,
            courses: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), Some(5.0));
        assert_eq!(euclidean_distance(&[1.0], &[1.0, 2.0]), None);
        assert_eq!(euclidean_distance(&[], &[]), None);
    }

    #[test]
    fn test_threshold_policy() {
        let policy = DescriptorThreshold { threshold: 0.6 };
        let student = student_with(Some(vec![0.1, 0.2, 0.3]));

        let close = Capture {
            descriptor: Some(vec![0.1, 0.2, 0.4]),
            image: None,
        };
        assert_eq!(policy.evaluate(&student, &close), Verdict::Accepted);

        let far = Capture {
            descriptor: Some(vec![1.0, 1.0, 1.0]),
            image: None,
        };
        assert!(matches!(policy.evaluate(&student, &far), Verdict::Rejected(_)));

        let image_only = Capture {
            descriptor: None,
            image: Some(vec![0xFF, 0xD8]),
        };
        assert!(matches!(policy.evaluate(&student, &image_only), Verdict::Rejected(_)));
    }

    #[test]
    fn test_threshold_requires_enrollment() {
        let policy = DescriptorThreshold { threshold: 0.6 };
        let capture = Capture {
            descriptor: Some(vec![0.1]),
            image: None,
        };
        assert!(matches!(
            policy.evaluate(&student_with(Some(vec![])), &capture),
            Verdict::Rejected(_)
        ));
        assert!(matches!(
            policy.evaluate(&student_with(None), &capture),
            Verdict::Rejected(_)
        ));
    }

    #[test]
    fn test_capture_is_empty() {
        assert!(Capture::default().is_empty());
        assert!(Capture {
            descriptor: None,
            image: Some(vec![])
        }
        .is_empty());
        assert!(!Capture {
            descriptor: Some(vec![]),
            image: None
        }
        .is_empty());
    }

    async fn gateway(
        policy: Arc<dyn VerificationPolicy>,
    ) -> (Arc<dyn Storage>, VerificationGateway) {
        gateway_over(Arc::new(MemStorage::new()), policy)
    }

    fn gateway_over(
        storage: Arc<dyn Storage>,
        policy: Arc<dyn VerificationPolicy>,
    ) -> (Arc<dyn Storage>, VerificationGateway) {
        let recorder = AttendanceRecorder::new(storage.clone());
        (storage.clone(), VerificationGateway::new(storage, recorder, policy))
    }

    async fn seed(storage: &Arc<dyn Storage>) -> (i64, i64) {
        let course = storage
            .create_course(NewCourse {
                code: "CS101".to_string(),
                name: "Computer Science 101".to_string(),
                instructor_id: 1,
                room: None,
                schedule: None,
                total_students: 0,
            })
            .await
            .unwrap();
        let student = storage
            .create_student(NewStudent {
                name: "Michael Roberts".to_string(),
                student_id: "S12345".to_string(),
                email: None,
                face_descriptor: None,
                courses: vec!["CS101".to_string()],
            })
            .await
            .unwrap();
        (student.id, course.id)
    }

    #[tokio::test]
    async fn test_accept_all_records_present_face() {
        let (storage, gateway) = gateway(Arc::new(AcceptAll)).await;
        let (student_id, course_id) = seed(&storage).await;
        let capture = Capture {
            descriptor: None,
            image: Some(vec![1, 2, 3]),
        };

        let record = gateway
            .verify(student_id, course_id, &capture, Utc::now())
            .await
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.verification_method, VerificationMethod::Face);
    }

    #[tokio::test]
    async fn test_rejection_writes_nothing() {
        let (storage, gateway) = gateway(Arc::new(DescriptorThreshold { threshold: 0.6 })).await;
        let (student_id, course_id) = seed(&storage).await;
        gateway.enroll(student_id, vec![0.0, 0.0]).await.unwrap();

        let capture = Capture {
            descriptor: Some(vec![3.0, 4.0]),
            image: None,
        };
        let err = gateway
            .verify(student_id, course_id, &capture, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::VerificationRejected(_)));
        assert!(storage
            .list_attendances_by_course(course_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_student_and_course() {
        let (storage, gateway) = gateway(Arc::new(AcceptAll)).await;
        let (student_id, course_id) = seed(&storage).await;
        let capture = Capture {
            descriptor: Some(vec![0.5]),
            image: None,
        };

        let err = gateway.verify(99, course_id, &capture, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = gateway.verify(student_id, 99, &capture, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = gateway.enroll(99, vec![]).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_enroll_rejects_non_finite_descriptor() {
        let pool = open_in_memory().await.unwrap();
        let (storage, gateway) =
            gateway_over(Arc::new(SqliteStorage::new(pool)), Arc::new(AcceptAll));
        let (student_id, _) = seed(&storage).await;

        let descriptor: Descriptor = serde_json::from_str("[0.5, 1e39]").unwrap();
        let err = gateway.enroll(student_id, descriptor).await.unwrap_err();
        let ApiError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields[0].field, "faceDescriptor");

        // The row is untouched and still decodes
        let student = storage.get_student(student_id).await.unwrap().unwrap();
        assert_eq!(student.face_descriptor, None);
        assert_eq!(storage.list_students().await.unwrap().len(), 1);

        let enrolled = gateway.enroll(student_id, vec![0.25, 0.5]).await.unwrap();
        assert_eq!(enrolled.face_descriptor, Some(vec![0.25, 0.5]));
    }
}
