use std::collections::BTreeSet;

use crate::decision::QuestionAnswer;
use crate::request::Question;

/// Current choice for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Single(Option<usize>),
    Multi(BTreeSet<usize>),
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::Single(choice) => choice.is_none(),
            Selection::Multi(set) => set.is_empty(),
        }
    }

    pub fn contains(&self, option: usize) -> bool {
        match self {
            Selection::Single(choice) => *choice == Some(option),
            Selection::Multi(set) => set.contains(&option),
        }
    }
}

/// One question as mirrored for UI interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionItem {
    pub question: String,
    pub header: Option<String>,
    pub labels: Vec<String>,
    pub selection: Selection,
}

impl QuestionItem {
    pub fn is_multi(&self) -> bool {
        matches!(self.selection, Selection::Multi(_))
    }
}

/// What a toggle did to the question state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleEffect {
    /// Selection changed; wait for more input or an explicit submit.
    Changed,
    /// Selection completes the prompt; resolve now.
    Complete,
}

/// Mirror of a rendered question prompt, keyed by its channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionState {
    pub request_id: String,
    pub session_id: String,
    pub items: Vec<QuestionItem>,
    /// Rendered body of the active page, kept to re-render the keyboard.
    pub text: String,
    /// Once set, further UI input is ignored.
    pub resolved: bool,
}

impl QuestionState {
    pub fn new(request_id: &str, session_id: &str, questions: &[Question], text: String) -> Self {
        let items = questions
            .iter()
            .map(|q| QuestionItem {
                question: q.question.clone(),
                header: q.header.clone(),
                labels: q.options.iter().map(|o| o.label.clone()).collect(),
                selection: if q.multi_select {
                    Selection::Multi(BTreeSet::new())
                } else {
                    Selection::Single(None)
                },
            })
            .collect();
        Self {
            request_id: request_id.to_string(),
            session_id: session_id.to_string(),
            items,
            text,
            resolved: false,
        }
    }

    /// One single-select question: the first click is the answer.
    pub fn resolves_on_first_click(&self) -> bool {
        self.items.len() == 1 && !self.items[0].is_multi()
    }

    /// Every question has at least one selection.
    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|item| !item.selection.is_empty())
    }

    /// Apply a click on `option` of `question`.
    ///
    /// Multi-select options toggle. Single-select options replace the choice.
    /// A click completes the prompt when it is the only single-select question,
    /// or when it answers the last unanswered single-select question.
    pub fn toggle(&mut self, question: usize, option: usize) -> Result<ToggleEffect, String> {
        let item = self
            .items
            .get_mut(question)
            .ok_or_else(|| format!("no question #{question}"))?;
        if option >= item.labels.len() {
            return Err(format!("no option #{option}"));
        }

        let was_unanswered = item.selection.is_empty();
        match &mut item.selection {
            Selection::Multi(set) => {
                if !set.remove(&option) {
                    set.insert(option);
                }
                Ok(ToggleEffect::Changed)
            }
            Selection::Single(choice) => {
                *choice = Some(option);
                if self.resolves_on_first_click() || (was_unanswered && self.is_complete()) {
                    Ok(ToggleEffect::Complete)
                } else {
                    Ok(ToggleEffect::Changed)
                }
            }
        }
    }

    /// Selected labels per question, in question order.
    pub fn answers(&self) -> Vec<QuestionAnswer> {
        self.items
            .iter()
            .map(|item| QuestionAnswer {
                question: item.question.clone(),
                labels: item
                    .labels
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| item.selection.contains(*i))
                    .map(|(_, label)| label.clone())
                    .collect(),
            })
            .collect()
    }
}
