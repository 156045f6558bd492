use std::sync::Arc;

use study_core::model::{QuestionId, QuizBank, QuizQuestion};

use crate::error::QuizServiceError;
use crate::progress_service::ProgressService;

/// Result of grading one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerResult {
    pub correct: bool,
    pub accepted_answers: Vec<String>,
    pub explanation: Option<String>,
}

/// Serves the bundled quiz and records answers as progress.
#[derive(Clone)]
pub struct QuizService {
    bank: Arc<QuizBank>,
    progress: Arc<ProgressService>,
}

impl QuizService {
    #[must_use]
    pub fn new(bank: Arc<QuizBank>, progress: Arc<ProgressService>) -> Self {
        Self { bank, progress }
    }

    #[must_use]
    pub fn bank(&self) -> &QuizBank {
        &self.bank
    }

    /// Questions in one category, or every question when `category` is `None`.
    #[must_use]
    pub fn questions(&self, category: Option<&str>) -> Vec<&QuizQuestion> {
        match category {
            Some(name) => self.bank.by_category(name).collect(),
            None => self.bank.questions().iter().collect(),
        }
    }

    /// Grade `answer` and record the attempt.
    ///
    /// Recording is best-effort; a failed write does not change the result.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::UnknownQuestion` for an id not in the bank,
    /// or `QuizServiceError::Quiz` for a blank answer.
    pub async fn submit_answer(
        &self,
        question_id: &QuestionId,
        answer: &str,
        elapsed_secs: u32,
    ) -> Result<AnswerResult, QuizServiceError> {
        let question = self
            .bank
            .get(question_id)
            .ok_or_else(|| QuizServiceError::UnknownQuestion(question_id.clone()))?;
        let correct = question.check(answer)?;

        self.progress
            .record_quiz_attempt(question, correct, elapsed_secs)
            .await;

        Ok(AnswerResult {
            correct,
            accepted_answers: question.correct_answer.accepted().to_vec(),
            explanation: question.explanation.clone(),
        })
    }
}
