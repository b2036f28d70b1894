//! Progression & gating engine.
//!
//! The rules that move a student through the 30 parts: advancing the plan
//! pointer after a passed part, pausing at milestone edges until the
//! required official exams pass, reopening the gate, extending deadlines,
//! promoting fully-qualified students, and admission control for new exam
//! requests.

#![warn(missing_docs)]

mod error;
mod service;

pub mod gate;
pub mod notify;
pub mod progression;
pub mod qualification;
pub mod reminder;
pub mod scheduler;
pub mod validator;

pub use error::{EngineError, ErrorKind, Result};
pub use notify::{LogNotifier, Notification, Notifier, WebhookNotifier};
pub use service::{GatingEngine, PlanSpec, PlanStatus, Stage};
