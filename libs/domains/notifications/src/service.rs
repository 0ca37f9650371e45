//! Notification service: renders and queues academic notification emails.
//!
//! This is the surface the route handlers call. Every method validates the
//! recipient, renders the message, hands it to the queue and returns the
//! job id; delivery happens in the background and its outcome never reaches
//! the caller.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{
    AttendanceRecordedData, EvaluationEditedData, GradeStructureCreatedData, NotificationKind,
    ProjectGroupAssignedData,
};
use crate::providers::EmailContent;
use crate::queue::NotificationQueue;
use crate::stats::DeliveryStats;
use crate::templates::{RenderedEmail, TemplateEngine};
use core_config::{env_or_default, ConfigError, FromEnv};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Configuration for the notification service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the student/teacher portal, used for links in emails.
    pub portal_url: String,
    /// Institution name for email footers.
    pub institution_name: String,
    /// Reply-To address attached to outgoing notifications, if any.
    pub reply_to: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            portal_url: "http://localhost:3000".to_string(),
            institution_name: "Aula".to_string(),
            reply_to: None,
        }
    }
}

impl FromEnv for ServiceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            portal_url: env_or_default("PORTAL_URL", "http://localhost:3000"),
            institution_name: env_or_default("INSTITUTION_NAME", "Aula"),
            reply_to: std::env::var("NOTIFIER_REPLY_TO").ok(),
        })
    }
}

/// Service for queueing academic notification emails.
pub struct NotificationService {
    queue: Arc<NotificationQueue>,
    templates: Arc<TemplateEngine>,
    config: ServiceConfig,
}

impl NotificationService {
    /// Create a new notification service.
    pub fn new(queue: Arc<NotificationQueue>, templates: TemplateEngine, config: ServiceConfig) -> Self {
        Self {
            queue,
            templates: Arc::new(templates),
            config,
        }
    }

    /// Queue an attendance-recorded notification for a student.
    pub fn queue_attendance_recorded(
        &self,
        to_email: &str,
        student_name: &str,
        class_name: &str,
        session_date: &str,
        attendance_status: &str,
        teacher_name: &str,
        teacher_id: Option<Uuid>,
    ) -> NotificationResult<Uuid> {
        let data = AttendanceRecordedData {
            student_name: student_name.to_string(),
            class_name: class_name.to_string(),
            session_date: session_date.to_string(),
            attendance_status: attendance_status.to_string(),
            teacher_name: teacher_name.to_string(),
            portal_url: format!("{}/attendance", self.config.portal_url),
            institution_name: self.config.institution_name.clone(),
        };

        let rendered = self.templates.render_attendance_recorded(&data)?;
        self.enqueue_rendered(
            to_email,
            student_name,
            rendered,
            NotificationKind::AttendanceRecorded,
            teacher_id,
        )
    }

    /// Queue a grade-change notification for a student.
    pub fn queue_evaluation_edited(
        &self,
        to_email: &str,
        student_name: &str,
        class_name: &str,
        evaluation_title: &str,
        term_label: &str,
        new_score: Option<&str>,
        teacher_name: &str,
        teacher_id: Option<Uuid>,
    ) -> NotificationResult<Uuid> {
        let data = EvaluationEditedData {
            student_name: student_name.to_string(),
            class_name: class_name.to_string(),
            evaluation_title: evaluation_title.to_string(),
            term_label: term_label.to_string(),
            new_score: new_score.map(str::to_string),
            teacher_name: teacher_name.to_string(),
            portal_url: format!("{}/grades", self.config.portal_url),
            institution_name: self.config.institution_name.clone(),
        };

        let rendered = self.templates.render_evaluation_edited(&data)?;
        self.enqueue_rendered(
            to_email,
            student_name,
            rendered,
            NotificationKind::EvaluationEdited,
            teacher_id,
        )
    }

    /// Queue a grading-structure-published announcement for a student.
    pub fn queue_grade_structure_created(
        &self,
        to_email: &str,
        student_name: &str,
        class_name: &str,
        term_label: &str,
        component_count: u32,
        total_weight_percent: u32,
        teacher_name: &str,
        teacher_id: Option<Uuid>,
    ) -> NotificationResult<Uuid> {
        let data = GradeStructureCreatedData {
            class_name: class_name.to_string(),
            term_label: term_label.to_string(),
            component_count,
            total_weight_percent,
            teacher_name: teacher_name.to_string(),
            portal_url: format!("{}/grades", self.config.portal_url),
            institution_name: self.config.institution_name.clone(),
        };

        let rendered = self.templates.render_grade_structure_created(&data)?;
        self.enqueue_rendered(
            to_email,
            student_name,
            rendered,
            NotificationKind::GradeStructureCreated,
            teacher_id,
        )
    }

    /// Queue a project-group-assignment notification for a student.
    pub fn queue_project_group_assigned(
        &self,
        to_email: &str,
        student_name: &str,
        class_name: &str,
        project_title: &str,
        group_name: &str,
        member_names: Vec<String>,
        due_date: Option<&str>,
        teacher_id: Option<Uuid>,
    ) -> NotificationResult<Uuid> {
        let data = ProjectGroupAssignedData {
            student_name: student_name.to_string(),
            class_name: class_name.to_string(),
            project_title: project_title.to_string(),
            group_name: group_name.to_string(),
            member_names,
            due_date: due_date.map(str::to_string),
            portal_url: format!("{}/projects", self.config.portal_url),
            institution_name: self.config.institution_name.clone(),
        };

        let rendered = self.templates.render_project_group_assigned(&data)?;
        self.enqueue_rendered(
            to_email,
            student_name,
            rendered,
            NotificationKind::ProjectGroupAssigned,
            teacher_id,
        )
    }

    /// Delivery statistics for the admin reporting endpoint.
    pub fn statistics(&self, teacher_id: Option<Uuid>) -> DeliveryStats {
        self.queue.statistics(teacher_id)
    }

    /// Reset delivery statistics (admin maintenance endpoint).
    pub fn reset_statistics(&self, teacher_id: Option<Uuid>) {
        self.queue.reset_statistics(teacher_id);
    }

    fn enqueue_rendered(
        &self,
        to_email: &str,
        to_name: &str,
        rendered: RenderedEmail,
        kind: NotificationKind,
        teacher_id: Option<Uuid>,
    ) -> NotificationResult<Uuid> {
        if to_email.trim().is_empty() {
            return Err(NotificationError::InvalidRecipient(
                "recipient email is empty".to_string(),
            ));
        }

        let email = EmailContent {
            to_email: to_email.to_string(),
            to_name: to_name.to_string(),
            subject: rendered.subject,
            html_body: rendered.html,
            text_body: rendered.text,
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: self.config.reply_to.clone(),
        };

        let job_id = self.queue.enqueue(email, kind, teacher_id);
        info!(%job_id, %kind, to = %to_email, "Queued notification email");
        Ok(job_id)
    }
}
