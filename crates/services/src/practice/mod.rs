mod builder;
mod ledger;
mod service;
mod view;

// Public API of the practice subsystem.
pub use crate::error::PracticeError;
pub use service::{PracticeService, ReportPolicy};
pub use view::{
    ActiveSessionStatus, AnswerOutcome, BankStats, GroupSnapshot, QuestionView, SessionSnapshot,
    StatusSnapshot,
};
