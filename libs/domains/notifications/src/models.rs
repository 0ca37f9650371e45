//! Data models for the notifications domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::EmailContent;

/// Kinds of notification emails the platform sends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Attendance was recorded for a class session.
    AttendanceRecorded,
    /// An evaluation score was edited after publication.
    EvaluationEdited,
    /// A grading structure was published for a class.
    GradeStructureCreated,
    /// A student was assigned to a project group.
    ProjectGroupAssigned,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::AttendanceRecorded => write!(f, "attendance_recorded"),
            NotificationKind::EvaluationEdited => write!(f, "evaluation_edited"),
            NotificationKind::GradeStructureCreated => write!(f, "grade_structure_created"),
            NotificationKind::ProjectGroupAssigned => write!(f, "project_group_assigned"),
        }
    }
}

/// One queued outbound notification.
///
/// Owned exclusively by the queue once enqueued; the caller keeps only the
/// returned job id for correlation in logs.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    /// Unique job identifier.
    pub id: Uuid,
    /// Pre-rendered message content. Rendering happens once at enqueue
    /// time; a retried send reuses this verbatim even if the underlying
    /// records changed in the meantime.
    pub email: EmailContent,
    /// Kind of notification, for logging and metrics labels.
    pub kind: NotificationKind,
    /// Teacher the notification is attributed to. Used as the statistics
    /// grouping key.
    pub teacher_id: Option<Uuid>,
    /// Delivery attempts made so far.
    pub attempts: u32,
    /// Job creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NotificationJob {
    /// Create a new job with zero attempts.
    pub fn new(email: EmailContent, kind: NotificationKind, teacher_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            kind,
            teacher_id,
            attempts: 0,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Template Data Structures
// ============================================================================

/// Data for rendering the attendance-recorded email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecordedData {
    pub student_name: String,
    pub class_name: String,
    /// Session date as displayed, e.g. "2026-03-14".
    pub session_date: String,
    /// "present", "absent" or "late".
    pub attendance_status: String,
    pub teacher_name: String,
    pub portal_url: String,
    pub institution_name: String,
}

/// Data for rendering the evaluation-edited email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationEditedData {
    pub student_name: String,
    pub class_name: String,
    pub evaluation_title: String,
    /// Term the evaluation belongs to, e.g. "Second partial".
    pub term_label: String,
    /// New score as displayed, if the edit changed it.
    pub new_score: Option<String>,
    pub teacher_name: String,
    pub portal_url: String,
    pub institution_name: String,
}

/// Data for rendering the grading-structure-published email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeStructureCreatedData {
    pub class_name: String,
    pub term_label: String,
    /// Number of graded components in the structure.
    pub component_count: u32,
    /// Sum of the component weights, normally 100.
    pub total_weight_percent: u32,
    pub teacher_name: String,
    pub portal_url: String,
    pub institution_name: String,
}

/// Data for rendering the project-group-assigned email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectGroupAssignedData {
    pub student_name: String,
    pub class_name: String,
    pub project_title: String,
    pub group_name: String,
    pub member_names: Vec<String>,
    pub due_date: Option<String>,
    pub portal_url: String,
    pub institution_name: String,
}
