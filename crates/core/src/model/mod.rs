mod answer;
mod group;
mod ids;
mod question;
mod session;
mod settings;

pub use ids::{BankId, GroupEpoch, ParseIdError, QuestionId, SessionId, UserId};

pub use answer::{AnswerKey, AnswerRecord};
pub use group::{Group, GroupError, GroupMode};
pub use question::{ChoiceOption, Question, QuestionError, QuestionType};
pub use session::{PracticeSession, SessionError, SessionStatus};
pub use settings::{PracticeSettings, SettingsError, TypeRatio};
