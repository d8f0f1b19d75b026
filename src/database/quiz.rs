use std::fmt;

/// A parsed question that has not been queued yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    prompt: String,
    options: Vec<String>,
    correct_index: usize,
    explanation: Option<String>,
}

/// A queued question. The id is assigned by storage in creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: i64,
    draft: QuestionDraft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetChat {
    chat_id: i64,
    title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePoll {
    poll_id: String,
    correct_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserScore {
    display_name: String,
    correct_count: u32,
    total_count: u32,
}

const OPTION_TOKENS: &[char] = &['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J'];

/// Renders the draft back into the upload template.
impl fmt::Display for QuestionDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Q: {}", self.prompt)?;
        for (i, option) in self.options.iter().enumerate() {
            match OPTION_TOKENS.get(i) {
                Some(token) => writeln!(f, "{}) {}", token, option)?,
                None => writeln!(f, "{}) {}", i % 10, option)?,
            }
        }
        write!(f, "Ans: {}", self.correct_index + 1)?;
        if let Some(explanation) = &self.explanation {
            write!(f, "\nExp: {}", explanation)?;
        }
        Ok(())
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}\n{}", self.id, self.draft)
    }
}

impl fmt::Display for TargetChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(f, "{} ({})", title, self.chat_id),
            None => write!(f, "{}", self.chat_id),
        }
    }
}

impl fmt::Display for UserScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} correct",
            self.display_name, self.correct_count, self.total_count
        )
    }
}

impl QuestionDraft {
    /// Callers must uphold `correct_index < options.len()`; the parser does.
    pub fn new(
        prompt: String,
        options: Vec<String>,
        correct_index: usize,
        explanation: Option<String>,
    ) -> Self {
        debug_assert!(correct_index < options.len());
        Self {
            prompt,
            options,
            correct_index,
            explanation,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_index(&self) -> usize {
        self.correct_index
    }

    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }
}

impl Question {
    pub fn retrieve(id: i64, draft: QuestionDraft) -> Self {
        Self { id, draft }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn prompt(&self) -> &str {
        self.draft.prompt()
    }

    pub fn options(&self) -> &[String] {
        self.draft.options()
    }

    pub fn correct_index(&self) -> usize {
        self.draft.correct_index()
    }

    pub fn explanation(&self) -> Option<&str> {
        self.draft.explanation()
    }
}

impl TargetChat {
    pub fn new(chat_id: i64, title: Option<String>) -> Self {
        Self { chat_id, title }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}

impl ActivePoll {
    pub fn new(poll_id: impl Into<String>, correct_index: usize) -> Self {
        Self {
            poll_id: poll_id.into(),
            correct_index,
        }
    }

    pub fn poll_id(&self) -> &str {
        &self.poll_id
    }

    pub fn correct_index(&self) -> usize {
        self.correct_index
    }
}

impl UserScore {
    pub fn retrieve(display_name: String, correct_count: u32, total_count: u32) -> Self {
        Self {
            display_name,
            correct_count,
            total_count,
        }
    }

    pub fn first_response(display_name: String, correct: bool) -> Self {
        Self::retrieve(display_name, u32::from(correct), 1)
    }

    pub(crate) fn count_response(&mut self, display_name: String, correct: bool) {
        self.display_name = display_name;
        self.total_count += 1;
        if correct {
            self.correct_count += 1;
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    pub fn total_count(&self) -> u32 {
        self.total_count
    }
}
