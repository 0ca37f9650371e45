//! Email template rendering engine.
//!
//! Handlebars-based rendering for the academic notification kinds. Pure
//! string-to-string work: no I/O, no mutable state. Rendering happens once
//! before a message is queued, so a render failure surfaces to the business
//! caller and never reaches the delivery queue.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{
    AttendanceRecordedData, EvaluationEditedData, GradeStructureCreatedData,
    ProjectGroupAssignedData,
};
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Rendered email content.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    /// HTML body content.
    pub html: String,
    /// Plain text body content.
    pub text: String,
    /// Email subject line.
    pub subject: String,
}

/// Template engine for rendering notification emails.
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    /// Create a new template engine with all templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();

        let templates = [
            ("attendance_recorded_html", ATTENDANCE_RECORDED_HTML),
            ("attendance_recorded_text", ATTENDANCE_RECORDED_TEXT),
            ("evaluation_edited_html", EVALUATION_EDITED_HTML),
            ("evaluation_edited_text", EVALUATION_EDITED_TEXT),
            ("grade_structure_created_html", GRADE_STRUCTURE_CREATED_HTML),
            ("grade_structure_created_text", GRADE_STRUCTURE_CREATED_TEXT),
            ("project_group_assigned_html", PROJECT_GROUP_ASSIGNED_HTML),
            ("project_group_assigned_text", PROJECT_GROUP_ASSIGNED_TEXT),
        ];

        for (name, template) in templates {
            handlebars
                .register_template_string(name, template)
                .map_err(|e| {
                    NotificationError::TemplateError(format!("Failed to register {}: {}", name, e))
                })?;
        }

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    fn render<T: Serialize>(&self, template_name: &str, data: &T) -> NotificationResult<String> {
        self.handlebars
            .render(template_name, data)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))
    }

    /// Render an attendance-recorded email.
    pub fn render_attendance_recorded(
        &self,
        data: &AttendanceRecordedData,
    ) -> NotificationResult<RenderedEmail> {
        debug!(student = %data.student_name, class = %data.class_name, "Rendering attendance email");

        Ok(RenderedEmail {
            html: self.render("attendance_recorded_html", data)?,
            text: self.render("attendance_recorded_text", data)?,
            subject: format!(
                "Attendance recorded for {} on {}",
                data.class_name, data.session_date
            ),
        })
    }

    /// Render an evaluation-edited email.
    pub fn render_evaluation_edited(
        &self,
        data: &EvaluationEditedData,
    ) -> NotificationResult<RenderedEmail> {
        debug!(student = %data.student_name, class = %data.class_name, "Rendering evaluation email");

        Ok(RenderedEmail {
            html: self.render("evaluation_edited_html", data)?,
            text: self.render("evaluation_edited_text", data)?,
            subject: format!(
                "Grade updated in {}: {}",
                data.class_name, data.evaluation_title
            ),
        })
    }

    /// Render a grading-structure-published email.
    pub fn render_grade_structure_created(
        &self,
        data: &GradeStructureCreatedData,
    ) -> NotificationResult<RenderedEmail> {
        debug!(class = %data.class_name, "Rendering grade structure email");

        Ok(RenderedEmail {
            html: self.render("grade_structure_created_html", data)?,
            text: self.render("grade_structure_created_text", data)?,
            subject: format!("Grading structure published for {}", data.class_name),
        })
    }

    /// Render a project-group-assigned email.
    pub fn render_project_group_assigned(
        &self,
        data: &ProjectGroupAssignedData,
    ) -> NotificationResult<RenderedEmail> {
        debug!(student = %data.student_name, project = %data.project_title, "Rendering project group email");

        Ok(RenderedEmail {
            html: self.render("project_group_assigned_html", data)?,
            text: self.render("project_group_assigned_text", data)?,
            subject: format!("Project group assignment: {}", data.project_title),
        })
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new().expect("Failed to create default template engine")
    }
}

// ============================================================================
// Template strings
// ============================================================================

const ATTENDANCE_RECORDED_HTML: &str = r#"
<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Attendance recorded</h2>
  <p>Hello {{student_name}},</p>
  <p>Your attendance for <strong>{{class_name}}</strong> on {{session_date}} was recorded as
  <strong>{{attendance_status}}</strong> by {{teacher_name}}.</p>
  <p>If this does not match your records, contact your teacher or review your
  attendance history in the portal.</p>
  <p><a href="{{portal_url}}">View attendance</a></p>
  <hr style="border: none; border-top: 1px solid #ddd;">
  <p style="color: #888; font-size: 12px;">{{institution_name}}</p>
</div>
"#;

const ATTENDANCE_RECORDED_TEXT: &str = r#"Attendance recorded

Hello {{student_name}},

Your attendance for {{class_name}} on {{session_date}} was recorded as
{{attendance_status}} by {{teacher_name}}.

If this does not match your records, contact your teacher or review your
attendance history in the portal: {{portal_url}}

{{institution_name}}
"#;

const EVALUATION_EDITED_HTML: &str = r#"
<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Grade updated</h2>
  <p>Hello {{student_name}},</p>
  <p>{{teacher_name}} updated the evaluation <strong>{{evaluation_title}}</strong>
  ({{term_label}}) in <strong>{{class_name}}</strong>.</p>
  {{#if new_score}}
  <p>New score: <strong>{{new_score}}</strong></p>
  {{/if}}
  <p><a href="{{portal_url}}">View your grades</a></p>
  <hr style="border: none; border-top: 1px solid #ddd;">
  <p style="color: #888; font-size: 12px;">{{institution_name}}</p>
</div>
"#;

const EVALUATION_EDITED_TEXT: &str = r#"Grade updated

Hello {{student_name}},

{{teacher_name}} updated the evaluation "{{evaluation_title}}" ({{term_label}})
in {{class_name}}.
{{#if new_score}}
New score: {{new_score}}
{{/if}}
View your grades: {{portal_url}}

{{institution_name}}
"#;

const GRADE_STRUCTURE_CREATED_HTML: &str = r#"
<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Grading structure published</h2>
  <p>{{teacher_name}} published the grading structure for
  <strong>{{class_name}}</strong> ({{term_label}}).</p>
  <p>It has {{component_count}} graded components totaling
  {{total_weight_percent}}% of the final grade.</p>
  <p><a href="{{portal_url}}">View grading structure</a></p>
  <hr style="border: none; border-top: 1px solid #ddd;">
  <p style="color: #888; font-size: 12px;">{{institution_name}}</p>
</div>
"#;

const GRADE_STRUCTURE_CREATED_TEXT: &str = r#"Grading structure published

{{teacher_name}} published the grading structure for {{class_name}}
({{term_label}}).

It has {{component_count}} graded components totaling {{total_weight_percent}}%
of the final grade.

View grading structure: {{portal_url}}

{{institution_name}}
"#;

const PROJECT_GROUP_ASSIGNED_HTML: &str = r#"
<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Project group assignment</h2>
  <p>Hello {{student_name}},</p>
  <p>You were assigned to <strong>{{group_name}}</strong> for the project
  <strong>{{project_title}}</strong> in {{class_name}}.</p>
  <p>Group members:</p>
  <ul>
    {{#each member_names}}
    <li>{{this}}</li>
    {{/each}}
  </ul>
  {{#if due_date}}
  <p>Due date: <strong>{{due_date}}</strong></p>
  {{/if}}
  <p><a href="{{portal_url}}">View project</a></p>
  <hr style="border: none; border-top: 1px solid #ddd;">
  <p style="color: #888; font-size: 12px;">{{institution_name}}</p>
</div>
"#;

const PROJECT_GROUP_ASSIGNED_TEXT: &str = r#"Project group assignment

Hello {{student_name}},

You were assigned to {{group_name}} for the project "{{project_title}}"
in {{class_name}}.

Group members:
{{#each member_names}}
- {{this}}
{{/each}}
{{#if due_date}}
Due date: {{due_date}}
{{/if}}
View project: {{portal_url}}

{{institution_name}}
"#;
