//! Notifications Domain
//!
//! Best-effort email delivery for the Aula academic-management backend.
//!
//! # Features
//!
//! - Attendance-recorded notifications for students
//! - Evaluation-edited notifications (grade changes)
//! - Grading-structure-published announcements
//! - Project-group-assignment notifications
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   API Handler   │  ← attendance/evaluations/grades endpoints
//! └────────┬────────┘
//!          │ render + enqueue (fire-and-forget)
//! ┌────────▼────────┐
//! │ NotificationSvc │
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │NotificationQueue│  ← in-process FIFO, retry with backoff
//! └────────┬────────┘
//!          │ one message at a time
//! ┌────────▼────────┐
//! │  EmailProvider  │  ← SMTP (lettre) or SendGrid
//! └─────────────────┘
//! ```
//!
//! Delivery is decoupled from the triggering request: `enqueue` appends the
//! pre-rendered message and returns immediately, and a single background
//! task drains the queue. Transient send failures are retried up to a fixed
//! attempt limit; exhausted jobs are dropped and recorded in the
//! [`stats::DeliveryLedger`], which backs the admin statistics endpoint.
//! Nothing in this crate ever fails the business operation that queued the
//! notification.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{
//!     NotificationQueue, NotificationService, QueueConfig, ServiceConfig,
//!     SmtpProvider, TemplateEngine,
//! };
//!
//! let provider = Arc::new(SmtpProvider::from_env()?);
//! let queue = Arc::new(NotificationQueue::new(provider, QueueConfig::from_env()?));
//! let service = NotificationService::new(queue, TemplateEngine::new()?, ServiceConfig::from_env()?);
//!
//! service.queue_attendance_recorded(
//!     "student@example.edu",
//!     "Ana",
//!     "Databases II",
//!     "2026-03-14",
//!     "absent",
//!     "Prof. Soto",
//!     Some(teacher_id),
//! )?;
//! ```

pub mod error;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod queue;
pub mod service;
pub mod stats;
pub mod templates;

// Re-export commonly used types
pub use error::{NotificationError, NotificationResult};
pub use models::{NotificationJob, NotificationKind};
pub use providers::{EmailContent, EmailProvider, SendGridProvider, SentEmail, SmtpProvider};
pub use queue::{NotificationQueue, QueueConfig};
pub use service::{NotificationService, ServiceConfig};
pub use stats::{DeliveryLedger, DeliveryStats, RecentError};
pub use templates::{RenderedEmail, TemplateEngine};
