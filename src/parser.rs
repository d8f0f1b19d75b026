//! Turns an uploaded text file into question drafts.
//!
//! The file is a sequence of blocks separated by a separator line (`---` by default):
//!
//! ```text
//! Q: What is 2+2?
//! A) 3
//! B) 4
//! Ans: 2
//! Exp: Basic arithmetic.
//! ---
//! ```
//!
//! Each block is validated on its own, so one malformed block never hides the others.

use thiserror::Error;

use crate::database::quiz::QuestionDraft;

const QUESTION_PREFIXES: &[&str] = &["question", "q", "السؤال", "سؤال", "س"];
const ANSWER_PREFIXES: &[&str] = &[
    "correct answer",
    "right answer",
    "answer",
    "ans",
    "correct",
    "الإجابة الصحيحة",
    "الإجابة",
    "الاجابة",
    "إجابة",
    "اجابة",
    "الجواب",
    "صح",
];
const EXPLANATION_PREFIXES: &[&str] = &[
    "explanation",
    "explain",
    "exp",
    "reason",
    "التفسير",
    "تفسير",
    "الشرح",
    "شرح",
];
const PREFIX_SEPARATORS: &[char] = &[':', '-', '/'];
const OPTION_MARKERS: &[char] = &[')', '.', '-'];

#[derive(Debug, Clone)]
pub struct ParserSettings {
    pub separator: String,
    pub max_question_len: usize,
    pub max_option_len: usize,
    pub max_explanation_len: usize,
    pub max_options: usize,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            separator: "---".to_owned(),
            max_question_len: 300,
            max_option_len: 100,
            max_explanation_len: 200,
            max_options: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockProblem {
    #[error("missing question text")]
    MissingPrompt,
    #[error("question is longer than {0} characters")]
    PromptTooLong(usize),
    #[error("expected at least 2 options, found {0}")]
    TooFewOptions(usize),
    #[error("expected at most {max} options, found {found}")]
    TooManyOptions { max: usize, found: usize },
    #[error("option {0} is empty")]
    EmptyOption(usize),
    #[error("option {position} is longer than {max} characters")]
    OptionTooLong { position: usize, max: usize },
    #[error("missing answer number")]
    MissingAnswer,
    #[error("answer {answer} is out of range 1-{options}")]
    AnswerOutOfRange { answer: usize, options: usize },
}

/// A rejected block. `block` is the 1-based position among non-blank blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Block #{block}: {problem}")]
pub struct BlockError {
    pub block: usize,
    pub problem: BlockProblem,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseReport {
    pub questions: Vec<QuestionDraft>,
    pub errors: Vec<BlockError>,
}

impl ParseReport {
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty() && self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRole {
    Question,
    Answer,
    Explanation,
    Option,
}

/// Matchers evaluated in order for every line; the first match wins.
const MATCHERS: &[(LineRole, fn(&str) -> Option<&str>)] = &[
    (LineRole::Question, question_line),
    (LineRole::Answer, answer_line),
    (LineRole::Explanation, explanation_line),
    (LineRole::Option, strip_option_token),
];

#[derive(Debug, Default)]
struct RawBlock<'a> {
    prompt: Option<&'a str>,
    options: Vec<&'a str>,
    answer: Option<usize>,
    explanation: Option<&'a str>,
    recognized: bool,
}

pub fn parse_questions(text: &str, settings: &ParserSettings) -> ParseReport {
    let mut report = ParseReport::default();
    let mut position = 0;

    for lines in split_blocks(text, &settings.separator) {
        let raw = scan_block(&lines);
        if !raw.recognized {
            continue;
        }
        position += 1;

        match validate_block(raw, settings) {
            Ok(draft) => report.questions.push(draft),
            Err(problem) => report.errors.push(BlockError {
                block: position,
                problem,
            }),
        }
    }

    report
}

fn split_blocks<'a>(text: &'a str, separator: &str) -> Vec<Vec<&'a str>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let separator = separator.trim();
    let mut blocks = vec![Vec::new()];

    for line in text.lines() {
        let line = line.trim();
        if line == separator {
            blocks.push(Vec::new());
        } else if let Some(current) = blocks.last_mut() {
            current.push(line);
        }
    }

    blocks
}

fn scan_block<'a>(lines: &[&'a str]) -> RawBlock<'a> {
    let mut raw = RawBlock::default();

    for &line in lines {
        let Some((role, rest)) = classify(line, raw.prompt.is_none()) else {
            continue;
        };
        raw.recognized = true;

        match role {
            LineRole::Question => {
                if !rest.is_empty() {
                    raw.prompt = Some(rest);
                }
            }
            LineRole::Option => raw.options.push(rest),
            LineRole::Answer => {
                if raw.answer.is_none() {
                    raw.answer = leading_number(rest);
                }
            }
            LineRole::Explanation => {
                if raw.explanation.is_none() {
                    raw.explanation = Some(rest);
                }
            }
        }
    }

    raw
}

fn classify(line: &str, wants_prompt: bool) -> Option<(LineRole, &str)> {
    MATCHERS
        .iter()
        .filter(|(role, _)| wants_prompt || *role != LineRole::Question)
        .find_map(|(role, matcher)| matcher(line).map(|rest| (*role, rest)))
}

fn validate_block(raw: RawBlock<'_>, settings: &ParserSettings) -> Result<QuestionDraft, BlockProblem> {
    let prompt = raw.prompt.unwrap_or_default();
    if prompt.is_empty() {
        return Err(BlockProblem::MissingPrompt);
    }
    if prompt.chars().count() > settings.max_question_len {
        return Err(BlockProblem::PromptTooLong(settings.max_question_len));
    }

    if raw.options.len() < 2 {
        return Err(BlockProblem::TooFewOptions(raw.options.len()));
    }
    if raw.options.len() > settings.max_options {
        return Err(BlockProblem::TooManyOptions {
            max: settings.max_options,
            found: raw.options.len(),
        });
    }
    for (i, option) in raw.options.iter().enumerate() {
        if option.is_empty() {
            return Err(BlockProblem::EmptyOption(i + 1));
        }
        if option.chars().count() > settings.max_option_len {
            return Err(BlockProblem::OptionTooLong {
                position: i + 1,
                max: settings.max_option_len,
            });
        }
    }

    let answer = raw.answer.ok_or(BlockProblem::MissingAnswer)?;
    if answer == 0 || answer > raw.options.len() {
        return Err(BlockProblem::AnswerOutOfRange {
            answer,
            options: raw.options.len(),
        });
    }

    let explanation = raw
        .explanation
        .filter(|text| !text.is_empty())
        .map(|text| truncate_chars(text, settings.max_explanation_len));

    Ok(QuestionDraft::new(
        prompt.to_owned(),
        raw.options.into_iter().map(str::to_owned).collect(),
        answer - 1,
        explanation,
    ))
}

fn question_line(line: &str) -> Option<&str> {
    strip_prefix(line, QUESTION_PREFIXES)
}

fn answer_line(line: &str) -> Option<&str> {
    strip_prefix(line, ANSWER_PREFIXES)
}

fn explanation_line(line: &str) -> Option<&str> {
    strip_prefix(line, EXPLANATION_PREFIXES)
}

/// `<prefix> <sep> <rest>`, prefix compared case-insensitively.
fn strip_prefix<'a>(line: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| {
        let head = line.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        let rest = line[prefix.len()..].trim_start();
        let rest = rest.strip_prefix(PREFIX_SEPARATORS)?;
        Some(rest.trim())
    })
}

/// `A)`, `1.`, `b-`: a single alphanumeric character and a marker.
fn strip_option_token(line: &str) -> Option<&str> {
    let mut chars = line.char_indices();
    let (_, token) = chars.next()?;
    if !token.is_alphanumeric() {
        return None;
    }
    let (at, marker) = chars.next()?;
    if !OPTION_MARKERS.contains(&marker) {
        return None;
    }
    Some(line[at + marker.len_utf8()..].trim())
}

/// First run of digits in `text`, accepting Arabic-Indic digits. Saturates instead of
/// overflowing, so an oversized answer reads as out of range.
fn leading_number(text: &str) -> Option<usize> {
    let mut digits = text
        .chars()
        .skip_while(|c| digit_value(*c).is_none())
        .map_while(digit_value)
        .peekable();
    digits.peek()?;

    Some(digits.fold(0usize, |number, digit| {
        number.saturating_mul(10).saturating_add(digit as usize)
    }))
}

fn digit_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => c.to_digit(10),
        '\u{0660}'..='\u{0669}' => Some(c as u32 - 0x0660),
        '\u{06F0}'..='\u{06F9}' => Some(c as u32 - 0x06F0),
        _ => None,
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_owned(),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParseReport {
        parse_questions(text, &ParserSettings::default())
    }

    #[test]
    fn parses_the_documented_example() {
        let report = parse("Q: What is 2+2?\nA) 3\nB) 4\nC) 22\nAns: 2\nExp: Basic arithmetic.\n---\n");

        assert!(report.errors.is_empty());
        assert_eq!(
            report.questions,
            vec![QuestionDraft::new(
                "What is 2+2?".into(),
                vec!["3".into(), "4".into(), "22".into()],
                1,
                Some("Basic arithmetic.".into()),
            )]
        );
    }

    #[test]
    fn missing_answer_is_reported_with_block_position() {
        let report = parse("Q: first\nA) x\nB) y\nAns: 1\n---\nQ: second\nA) x\nB) y\n---\n");

        assert_eq!(report.questions.len(), 1);
        assert_eq!(
            report.errors,
            vec![BlockError {
                block: 2,
                problem: BlockProblem::MissingAnswer
            }]
        );
        assert_eq!(report.errors[0].to_string(), "Block #2: missing answer number");
    }

    #[test]
    fn single_block_without_answer_yields_one_error_and_nothing_else() {
        let report = parse("Q: What?\nA) x\nB) y\n");

        assert!(report.questions.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].block, 1);
    }

    #[test]
    fn blank_blocks_do_not_advance_the_counter() {
        let report = parse("---\n\n   \n---\nrandom words\n---\nQ: What?\nA) x\nAns: 1\n");

        assert_eq!(
            report.errors,
            vec![BlockError {
                block: 1,
                problem: BlockProblem::TooFewOptions(1)
            }]
        );
    }

    #[test]
    fn malformed_blocks_are_isolated() {
        let good = "Q: ok\nA) a\nB) b\nAns: 2";
        let bad_range = "Q: bad\nA) a\nB) b\nAns: 3";
        let bad_prompt = "A) a\nB) b\nAns: 1";
        let text = [good, bad_range, good, bad_prompt, good].join("\n---\n");

        let report = parse(&text);

        assert_eq!(report.questions.len(), 3);
        assert_eq!(
            report.errors,
            vec![
                BlockError {
                    block: 2,
                    problem: BlockProblem::AnswerOutOfRange {
                        answer: 3,
                        options: 2
                    }
                },
                BlockError {
                    block: 4,
                    problem: BlockProblem::MissingPrompt
                },
            ]
        );
    }

    #[test]
    fn answer_zero_is_out_of_range() {
        let report = parse("Q: ok\nA) a\nB) b\nAns: 0");
        assert_eq!(
            report.errors[0].problem,
            BlockProblem::AnswerOutOfRange {
                answer: 0,
                options: 2
            }
        );
    }

    #[test]
    fn prefixes_are_case_insensitive_and_flexible() {
        let report = parse("question - Capital of France?\n1. Paris\n2. Rome\nANSWER / the first one: 1\nexplanation: It is Paris.");

        let draft = &report.questions[0];
        assert_eq!(draft.prompt(), "Capital of France?");
        assert_eq!(draft.options(), ["Paris", "Rome"]);
        assert_eq!(draft.correct_index(), 0);
        assert_eq!(draft.explanation(), Some("It is Paris."));
    }

    #[test]
    fn arabic_vocabulary_and_digits() {
        let text = "س: ما عاصمة مصر؟\nأ) القاهرة\nب) الإسكندرية\nج- أسوان\nصح: ٢\nشرح: سؤال تجريبي";
        let report = parse(text);

        assert!(report.errors.is_empty(), "{:?}", report.errors);
        let draft = &report.questions[0];
        assert_eq!(draft.prompt(), "ما عاصمة مصر؟");
        assert_eq!(draft.options().len(), 3);
        assert_eq!(draft.options()[2], "أسوان");
        assert_eq!(draft.correct_index(), 1);
        assert_eq!(draft.explanation(), Some("سؤال تجريبي"));
    }

    #[test]
    fn only_the_first_question_line_is_kept() {
        let report = parse("Q: first\nQ: second\nA) a\nB) b\nAns: 1");

        let draft = &report.questions[0];
        assert_eq!(draft.prompt(), "first");
        assert_eq!(draft.options(), ["a", "b"]);
    }

    #[test]
    fn empty_question_line_does_not_claim_the_prompt() {
        let report = parse("Q:\nQ: real\nA) a\nB) b\nAns: 1");

        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.questions[0].prompt(), "real");
    }

    #[test]
    fn answer_line_without_a_number_is_skipped() {
        let report = parse("Q: ok\nA) a\nB) b\nAns: ?\nAns: 2");

        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.questions[0].correct_index(), 1);
    }

    #[test]
    fn oversized_answer_is_out_of_range() {
        let report = parse("Q: ok\nA) a\nB) b\nAns: 99999999999999999999999");

        assert!(matches!(
            report.errors[0].problem,
            BlockProblem::AnswerOutOfRange { options: 2, .. }
        ));
    }

    #[test]
    fn unrecognized_lines_are_ignored() {
        let report = parse("Chapter 3\nQ: ok\nsome note\nA) a\nB) b\n\nAns: 2\n");
        assert_eq!(report.questions.len(), 1);
        assert_eq!(report.questions[0].correct_index(), 1);
    }

    #[test]
    fn long_explanation_is_truncated_not_rejected() {
        let settings = ParserSettings {
            max_explanation_len: 5,
            ..ParserSettings::default()
        };
        let report = parse_questions("Q: ok\nA) a\nB) b\nAns: 1\nExp: abcdefgh", &settings);

        assert!(report.errors.is_empty());
        assert_eq!(report.questions[0].explanation(), Some("abcde"));
    }

    #[test]
    fn overlong_prompt_and_option_are_rejected() {
        let settings = ParserSettings {
            max_question_len: 4,
            max_option_len: 3,
            ..ParserSettings::default()
        };
        let report = parse_questions(
            "Q: too long\nA) a\nB) b\nAns: 1\n---\nQ: ok\nA) a\nB) long\nAns: 1",
            &settings,
        );

        assert_eq!(report.errors[0].problem, BlockProblem::PromptTooLong(4));
        assert_eq!(
            report.errors[1].problem,
            BlockProblem::OptionTooLong {
                position: 2,
                max: 3
            }
        );
    }

    #[test]
    fn too_many_and_empty_options_are_rejected() {
        let settings = ParserSettings {
            max_options: 2,
            ..ParserSettings::default()
        };
        let report = parse_questions(
            "Q: a\nA) a\nB) b\nC) c\nAns: 1\n---\nQ: b\nA) a\nB)\nAns: 1",
            &settings,
        );

        assert_eq!(
            report.errors[0].problem,
            BlockProblem::TooManyOptions { max: 2, found: 3 }
        );
        assert_eq!(report.errors[1].problem, BlockProblem::EmptyOption(2));
    }

    #[test]
    fn custom_separator_and_crlf() {
        let settings = ParserSettings {
            separator: "###".into(),
            ..ParserSettings::default()
        };
        let report = parse_questions(
            "\u{feff}Q: one\r\nA) a\r\nB) b\r\nAns: 1\r\n###\r\nQ: two\r\nA) a\r\nB) b\r\nAns: 2\r\n",
            &settings,
        );

        assert_eq!(report.questions.len(), 2);
        assert_eq!(report.questions[1].correct_index(), 1);
    }

    #[test]
    fn rendered_block_parses_back_to_the_same_draft() {
        let report = parse("Q: What is 2+2?\n1) 3\n2) 4\n3) 22\nAnswer: 2\nExplain: Basic arithmetic.");
        let draft = report.questions[0].clone();

        let again = parse(&draft.to_string());
        assert_eq!(again.questions, vec![draft]);
    }

    #[test]
    fn correct_index_stays_within_options() {
        let text = (1..=5)
            .map(|answer| format!("Q: q{answer}\nA) a\nB) b\nC) c\nAns: {answer}"))
            .collect::<Vec<_>>()
            .join("\n---\n");
        let report = parse(&text);

        assert_eq!(report.questions.len(), 3);
        assert_eq!(report.errors.len(), 2);
        for draft in &report.questions {
            assert!(draft.correct_index() < draft.options().len());
        }
    }
}
