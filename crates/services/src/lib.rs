#![forbid(unsafe_code)]

pub mod error;
pub mod practice;

pub use practice_core::Clock;

pub use error::PracticeError;
pub use practice::{
    ActiveSessionStatus, AnswerOutcome, BankStats, GroupSnapshot, PracticeService, QuestionView,
    ReportPolicy, SessionSnapshot, StatusSnapshot,
};
