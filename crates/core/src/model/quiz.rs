use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;

use crate::model::ids::QuestionId;

const BUNDLED_QUIZ_DATA: &str = include_str!("../../data/quiz_data.json");

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("answer cannot be empty")]
    EmptyAnswer,

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),

    #[error("multiple-choice question {0} has no options")]
    MissingOptions(QuestionId),

    #[error("question {0} has no accepted answer")]
    MissingAnswer(QuestionId),

    #[error("invalid quiz dataset: {0}")]
    Dataset(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice,
    FillInBlank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// One accepted answer, or several equally accepted spellings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    One(String),
    Many(Vec<String>),
}

impl CorrectAnswer {
    #[must_use]
    pub fn accepted(&self) -> &[String] {
        match self {
            CorrectAnswer::One(a) => std::slice::from_ref(a),
            CorrectAnswer::Many(list) => list,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: QuestionId,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: CorrectAnswer,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl QuizQuestion {
    /// Grade a submitted answer.
    ///
    /// Multiple-choice answers must equal an accepted option exactly;
    /// fill-in-blank answers are compared trimmed and case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyAnswer` for a blank submission.
    pub fn check(&self, answer: &str) -> Result<bool, QuizError> {
        if answer.trim().is_empty() {
            return Err(QuizError::EmptyAnswer);
        }
        let accepted = self.correct_answer.accepted();
        let correct = match self.kind {
            QuestionKind::MultipleChoice => accepted.iter().any(|a| a == answer),
            QuestionKind::FillInBlank => {
                let given = answer.trim().to_lowercase();
                accepted.iter().any(|a| a.trim().to_lowercase() == given)
            }
        };
        Ok(correct)
    }

    fn validate(&self) -> Result<(), QuizError> {
        if self.correct_answer.accepted().is_empty() {
            return Err(QuizError::MissingAnswer(self.id.clone()));
        }
        if self.kind == QuestionKind::MultipleChoice && self.options.is_empty() {
            return Err(QuizError::MissingOptions(self.id.clone()));
        }
        Ok(())
    }
}

/// The read-only question dataset shipped with the app.
#[derive(Debug, Clone)]
pub struct QuizBank {
    questions: Vec<QuizQuestion>,
}

impl QuizBank {
    /// Load the dataset embedded at build time.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if the embedded JSON is malformed or inconsistent.
    pub fn bundled() -> Result<Self, QuizError> {
        Self::from_json(BUNDLED_QUIZ_DATA)
    }

    /// Parse a dataset from a JSON array of questions.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Dataset` for malformed JSON, or a validation error
    /// for duplicate ids and incomplete questions.
    pub fn from_json(raw: &str) -> Result<Self, QuizError> {
        let questions: Vec<QuizQuestion> = serde_json::from_str(raw)?;
        let mut seen = HashSet::new();
        for q in &questions {
            if !seen.insert(q.id.clone()) {
                return Err(QuizError::DuplicateQuestion(q.id.clone()));
            }
            q.validate()?;
        }
        Ok(Self { questions })
    }

    #[must_use]
    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn get(&self, id: &QuestionId) -> Option<&QuizQuestion> {
        self.questions.iter().find(|q| &q.id == id)
    }

    /// Distinct categories in first-seen order.
    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for cat in self.questions.iter().filter_map(|q| q.category.as_deref()) {
            if !out.contains(&cat) {
                out.push(cat);
            }
        }
        out
    }

    pub fn by_category<'a, 'b>(&'a self, category: &'b str) -> impl Iterator<Item = &'a QuizQuestion> + use<'a, 'b> {
        self.questions
            .iter()
            .filter(move |q| q.category.as_deref() == Some(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"id":"1","type":"multiple-choice","question":"2+2?","options":["3","4"],
         "correctAnswer":"4","category":"Math","difficulty":"easy"},
        {"id":"2","type":"fill-in-blank","question":"Capital of France?",
         "correctAnswer":["Paris","paris city"],"category":"Geo"},
        {"id":"3","type":"fill-in-blank","question":"Opposite of up?",
         "correctAnswer":"down","category":"Math"}
    ]"#;

    #[test]
    fn multiple_choice_requires_exact_option() {
        let bank = QuizBank::from_json(SAMPLE).unwrap();
        let q = bank.get(&QuestionId::new("1")).unwrap();
        assert!(q.check("4").unwrap());
        assert!(!q.check("3").unwrap());
        assert!(!q.check(" 4").unwrap());
    }

    #[test]
    fn fill_in_blank_ignores_case_and_whitespace() {
        let bank = QuizBank::from_json(SAMPLE).unwrap();
        let q = bank.get(&QuestionId::new("2")).unwrap();
        assert!(q.check("  PARIS ").unwrap());
        assert!(q.check("Paris City").unwrap());
        assert!(!q.check("Lyon").unwrap());
    }

    #[test]
    fn blank_answer_is_rejected() {
        let bank = QuizBank::from_json(SAMPLE).unwrap();
        let q = bank.get(&QuestionId::new("3")).unwrap();
        assert!(matches!(q.check("  "), Err(QuizError::EmptyAnswer)));
    }

    #[test]
    fn categories_are_distinct_in_order() {
        let bank = QuizBank::from_json(SAMPLE).unwrap();
        assert_eq!(bank.categories(), ["Math", "Geo"]);
        assert_eq!(bank.by_category("Math").count(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r#"[
            {"id":"1","type":"fill-in-blank","question":"a","correctAnswer":"a"},
            {"id":"1","type":"fill-in-blank","question":"b","correctAnswer":"b"}
        ]"#;
        assert!(matches!(
            QuizBank::from_json(raw),
            Err(QuizError::DuplicateQuestion(_))
        ));
    }

    #[test]
    fn multiple_choice_without_options_is_rejected() {
        let raw = r#"[{"id":"1","type":"multiple-choice","question":"a","correctAnswer":"a"}]"#;
        assert!(matches!(
            QuizBank::from_json(raw),
            Err(QuizError::MissingOptions(_))
        ));
    }

    #[test]
    fn bundled_dataset_loads() {
        let bank = QuizBank::bundled().unwrap();
        assert!(!bank.questions().is_empty());
    }
}
