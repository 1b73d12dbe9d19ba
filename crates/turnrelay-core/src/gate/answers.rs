//! Answer collection for a pending question set

use std::collections::BTreeSet;

use crate::events::{Question, QuestionSet};

use super::GateError;

/// Answer to one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Chosen option label or free text
    Single(String),
    /// Chosen option labels
    Multi(BTreeSet<String>),
}

impl Selection {
    fn is_answered(&self) -> bool {
        match self {
            Self::Single(text) => !text.trim().is_empty(),
            Self::Multi(labels) => !labels.is_empty(),
        }
    }
}

/// Per-question answers for one [`QuestionSet`]
#[derive(Debug, Clone)]
pub struct AnswerSheet {
    questions: Vec<Question>,
    selections: Vec<Option<Selection>>,
}

impl AnswerSheet {
    pub fn new(set: &QuestionSet) -> Self {
        Self {
            questions: set.questions.clone(),
            selections: vec![None; set.questions.len()],
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn selection(&self, index: usize) -> Option<&Selection> {
        self.selections.get(index).and_then(Option::as_ref)
    }

    fn question(&self, index: usize) -> Result<&Question, GateError> {
        self.questions
            .get(index)
            .ok_or(GateError::UnknownQuestion(index))
    }

    /// Choose an option (or type an answer) for a single-select question
    pub fn select(&mut self, index: usize, answer: impl Into<String>) -> Result<(), GateError> {
        if self.question(index)?.multi_select {
            return Err(GateError::SelectionKind(index));
        }
        self.selections[index] = Some(Selection::Single(answer.into()));
        Ok(())
    }

    /// Typed text overrides any chosen option
    pub fn set_text(&mut self, index: usize, text: impl Into<String>) -> Result<(), GateError> {
        self.select(index, text)
    }

    /// Flip one option of a multi-select question
    pub fn toggle(&mut self, index: usize, label: &str) -> Result<(), GateError> {
        if !self.question(index)?.multi_select {
            return Err(GateError::SelectionKind(index));
        }
        let slot = &mut self.selections[index];
        if !matches!(slot, Some(Selection::Multi(_))) {
            *slot = Some(Selection::Multi(BTreeSet::new()));
        }
        if let Some(Selection::Multi(labels)) = slot {
            if !labels.remove(label) {
                labels.insert(label.to_string());
            }
        }
        Ok(())
    }

    pub fn clear(&mut self, index: usize) {
        if let Some(slot) = self.selections.get_mut(index) {
            *slot = None;
        }
    }

    pub fn is_answered(&self, index: usize) -> bool {
        self.selection(index).is_some_and(Selection::is_answered)
    }

    /// Indices of questions still lacking an answer
    pub fn missing(&self) -> Vec<usize> {
        (0..self.questions.len())
            .filter(|&i| !self.is_answered(i))
            .collect()
    }

    /// Submission is allowed only once every question is answered
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Serialize the answers into the text sent back to the agent
    ///
    /// A single question yields just its answer. Several questions yield one
    /// `"{title}: {answer}"` line each.
    pub fn serialize(&self) -> Result<String, GateError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(GateError::Incomplete(missing));
        }

        let answers: Vec<String> = self
            .questions
            .iter()
            .zip(&self.selections)
            .map(|(question, selection)| match selection {
                Some(selection) => format_selection(question, selection),
                None => String::new(),
            })
            .collect();

        if answers.len() == 1 {
            return Ok(answers.into_iter().next().unwrap_or_default());
        }

        Ok(self
            .questions
            .iter()
            .zip(answers)
            .map(|(question, answer)| format!("{}: {}", question.title(), answer))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Multi-select labels are listed in option order
fn format_selection(question: &Question, selection: &Selection) -> String {
    match selection {
        Selection::Single(text) => text.trim().to_string(),
        Selection::Multi(labels) => {
            let mut ordered: Vec<&String> = labels.iter().collect();
            ordered.sort_by_key(|label| question.option_index(label).unwrap_or(usize::MAX));
            ordered
                .into_iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}
