//! Question model and GIFT formatting
//!
//! A question is a name, a statement and an [`Answer`] — a sum type over the
//! supported kinds (numerical, multiple choice), each knowing how to render
//! its GIFT answer lines. Every text field runs through the transform
//! pipeline before serialization.

use serde::Deserialize;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::WrapError;
use crate::gift;
use crate::transform::{Pipeline, RunContext, TextProcessor, Transform, UrlImages};

/// A tolerance expressed as a percentage of the solution value, e.g. `5%`
static PERCENTAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d*\.\d+|\d+)\s*%").unwrap());

/// Width and height of *all* the images in a question. Both fields are
/// required: a lone width or height is rejected at deserialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSettings {
    pub width: u32,
    pub height: u32,
}

/// A single quiz question as declared in the bank file
#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub name: String,
    pub statement: String,
    #[serde(default)]
    pub feedback: Option<String>,
    /// Minutes deemed necessary to answer the question
    #[serde(default)]
    pub time: Option<u32>,
    #[serde(default, rename = "images_settings")]
    pub images: Option<ImageSettings>,
    #[serde(flatten)]
    pub answer: Answer,
}

/// The kind-specific part of a question, selected by the `class` tag
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "class")]
pub enum Answer {
    Numerical { solution: Solution },
    MultipleChoice { answers: Answers },
}

/// Value and, optionally, tolerated error of a numerical solution
#[derive(Debug, Clone, Deserialize)]
pub struct Solution {
    pub value: f64,
    #[serde(default)]
    pub error: Option<Tolerance>,
}

/// A tolerance: either a bare number or a string, which may carry a `%`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Tolerance {
    Number(f64),
    Text(String),
}

impl Solution {
    /// Resolves the tolerance to its final text: a percentage becomes an
    /// absolute value (`value * pct / 100`), everything else passes through.
    pub fn error_text(&self) -> Option<String> {
        match &self.error {
            None => None,
            Some(Tolerance::Number(n)) => Some(n.to_string()),
            Some(Tolerance::Text(t)) => {
                let resolved = PERCENTAGE
                    .captures(t)
                    .and_then(|caps| caps[1].parse::<f64>().ok())
                    .map(|pct| (self.value * pct / 100.0).to_string());
                Some(resolved.unwrap_or_else(|| t.clone()))
            }
        }
    }
}

/// Right answer and the wrong ones of a multiple-choice question
#[derive(Debug, Clone, Deserialize)]
pub struct Answers {
    #[serde(default)]
    pub perfect: Option<String>,
    #[serde(default)]
    pub wrong: Vec<WrongAnswer>,
}

/// A wrong answer: plain text, or a `[text, credit]` pair (credit may be
/// negative)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WrongAnswer {
    Weighted(String, f64),
    Plain(String),
}

impl Answers {
    /// The maximum grade reachable through positive partial credits
    pub fn max_positive_credit(&self) -> f64 {
        self.wrong
            .iter()
            .filter_map(|a| match a {
                WrongAnswer::Weighted(_, credit) if *credit > 0.0 => Some(*credit),
                _ => None,
            })
            .sum()
    }
}

impl Answer {
    /// Renders the GIFT answer line(s), processing every answer text through
    /// the pipeline.
    fn render(&self, name: &str, proc: &mut TextProcessor<'_>) -> Result<String, WrapError> {
        match self {
            Answer::Numerical { solution } => Ok(gift::from_numerical_solution(
                solution.value,
                solution.error_text().as_deref(),
            )),
            Answer::MultipleChoice { answers } => {
                let mut lines = Vec::with_capacity(answers.wrong.len() + 1);
                for answer in &answers.wrong {
                    match answer {
                        WrongAnswer::Weighted(text, credit) => {
                            lines.push(format!("~%{}%{}", credit, proc.process(text)?));
                        }
                        WrongAnswer::Plain(text) => {
                            lines.push(format!("~{}", proc.process(text)?));
                        }
                    }
                }
                match &answers.perfect {
                    Some(perfect) => {
                        lines.insert(0, format!("={}", proc.process(perfect)?));
                    }
                    None => {
                        let max_credit = answers.max_positive_credit();
                        if max_credit < 100.0 {
                            tracing::warn!(
                                question = %name,
                                max_credit,
                                "question won't allow full credit"
                            );
                        }
                    }
                }
                Ok(format!("\t{}", lines.join("\n\t")))
            }
        }
    }
}

impl Question {
    /// Builds the question in the GIFT format:
    /// `::name::[html]<statement>{ <answer lines> [<feedback>] }`.
    pub fn to_gift(&self, pipeline: &Pipeline, ctx: &mut RunContext) -> Result<String, WrapError> {
        let urls = UrlImages::new(self.images.map(|s| (s.width, s.height)));
        let custom: [&dyn Transform; 1] = [&urls];
        let mut proc = TextProcessor::new(pipeline, &custom, ctx);

        let mut statement = self.statement.trim_end().to_string();
        if let Some(minutes) = self.time {
            statement.push_str(&format!(
                "\n\n\n<i>Estimated time\\: {} minutes</i>\n",
                minutes
            ));
        }

        let name = proc.process(&self.name)?;
        let statement = proc.process(&statement)?;
        let answer = self.answer.render(&self.name, &mut proc)?;
        let feedback = match &self.feedback {
            Some(feedback) => format!(
                "\n\t{}",
                gift::from_feedback(&proc.process(feedback.trim_end())?)
            ),
            None => String::new(),
        };

        Ok(format!(
            "{}{}{}{{\n{}{}\n}}",
            gift::from_question_name(&name),
            gift::HTML,
            statement,
            answer,
            feedback
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn bare_pipeline() -> Pipeline {
        Pipeline::new(vec![], vec![])
    }

    fn question_from_yaml(yaml: &str) -> Question {
        serde_yaml::from_str(yaml).expect("question to deserialize")
    }

    #[rstest]
    #[case(10.0, Some(Tolerance::Text("5%".to_string())), Some("0.5"))]
    #[case(10.0, Some(Tolerance::Text("0.3".to_string())), Some("0.3"))]
    #[case(10.0, Some(Tolerance::Number(2.0)), Some("2"))]
    #[case(10.0, None, None)]
    fn tolerance_resolution(
        #[case] value: f64,
        #[case] error: Option<Tolerance>,
        #[case] expected: Option<&str>,
    ) {
        let solution = Solution { value, error };
        assert_eq!(solution.error_text().as_deref(), expected);
    }

    #[test]
    fn numerical_question_with_percentage_error() {
        let question = question_from_yaml(
            "class: Numerical\n\
             name: Q1\n\
             statement: How much?\n\
             solution:\n  value: 10\n  error: 5%\n",
        );
        let mut ctx = RunContext::new(None);
        let block = question.to_gift(&bare_pipeline(), &mut ctx).unwrap();
        assert_eq!(block, "::Q1::[html]How much?{\n#\t=%100%10:0.5#\n}");
    }

    #[test]
    fn numerical_question_without_value_is_rejected() {
        let result: Result<Question, _> = serde_yaml::from_str(
            "class: Numerical\n\
             name: Q1\n\
             statement: How much?\n\
             solution:\n  error: 5%\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn lone_width_is_rejected() {
        let result: Result<Question, _> = serde_yaml::from_str(
            "class: Numerical\n\
             name: Q1\n\
             statement: How much?\n\
             solution:\n  value: 10\n\
             images_settings:\n  width: 320\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn multiple_choice_without_perfect_answer_still_renders_credits() {
        let question = question_from_yaml(
            "class: MultipleChoice\n\
             name: Q2\n\
             statement: Pick one\n\
             answers:\n\
             \x20 wrong:\n\
             \x20   - [A, 50]\n\
             \x20   - [B, -10]\n",
        );
        let mut ctx = RunContext::new(None);
        let block = question.to_gift(&bare_pipeline(), &mut ctx).unwrap();
        assert_eq!(block, "::Q2::[html]Pick one{\n\t~%50%A\n\t~%-10%B\n}");
    }

    #[test]
    fn max_positive_credit_ignores_negative_and_plain_answers() {
        let answers = Answers {
            perfect: None,
            wrong: vec![
                WrongAnswer::Weighted("A".to_string(), 50.0),
                WrongAnswer::Weighted("B".to_string(), -10.0),
                WrongAnswer::Plain("C".to_string()),
            ],
        };
        assert_eq!(answers.max_positive_credit(), 50.0);
    }

    #[test]
    fn perfect_answer_leads_the_list() {
        let question = question_from_yaml(
            "class: MultipleChoice\n\
             name: Q3\n\
             statement: Pick one\n\
             answers:\n\
             \x20 perfect: Right\n\
             \x20 wrong:\n\
             \x20   - Wrong one\n\
             \x20   - [Half right, 50]\n",
        );
        let mut ctx = RunContext::new(None);
        let block = question.to_gift(&bare_pipeline(), &mut ctx).unwrap();
        assert_eq!(
            block,
            "::Q3::[html]Pick one{\n\t=Right\n\t~Wrong one\n\t~%50%Half right\n}"
        );
    }

    #[test]
    fn time_estimate_is_appended_to_the_statement() {
        let question = question_from_yaml(
            "class: Numerical\n\
             name: Q4\n\
             statement: How much?\n\
             time: 5\n\
             solution:\n  value: 2\n",
        );
        let mut ctx = RunContext::new(None);
        let block = question.to_gift(&bare_pipeline(), &mut ctx).unwrap();
        assert!(block.contains("<i>Estimated time\\: 5 minutes</i>"));
    }

    #[test]
    fn feedback_is_indented_inside_the_answer_block() {
        let question = question_from_yaml(
            "class: Numerical\n\
             name: Q5\n\
             statement: How much?\n\
             feedback: Think harder\n\
             solution:\n  value: 2\n",
        );
        let mut ctx = RunContext::new(None);
        let block = question.to_gift(&bare_pipeline(), &mut ctx).unwrap();
        assert!(block.ends_with("{\n#\t=%100%2#\n\t####Think harder\n}"));
    }
}
