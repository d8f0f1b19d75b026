#![allow(async_fn_in_trait)]

use std::error::Error;

use teloxide::{
    payloads::SendPollSetters,
    prelude::Requester,
    types::{ChatId, PollType},
    Bot,
};

use crate::{database::quiz::Question, parser::truncate_chars};

/// Telegram rejects quiz explanations longer than this.
pub const EXPLANATION_LIMIT: usize = 200;

pub type TransportError = Box<dyn Error + Send + Sync>;

/// Outbound side of the bot, kept narrow so delivery can be exercised without Telegram.
pub trait QuizTransport {
    /// Publishes `question` as a quiz poll and returns the poll id.
    async fn publish_quiz(
        &self,
        chat_id: i64,
        question: &Question,
        anonymous: bool,
    ) -> Result<String, TransportError>;

    async fn notify(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    /// Fails when the bot cannot see the chat.
    async fn chat_title(&self, chat_id: i64) -> Result<Option<String>, TransportError>;
}

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl QuizTransport for TelegramTransport {
    async fn publish_quiz(
        &self,
        chat_id: i64,
        question: &Question,
        anonymous: bool,
    ) -> Result<String, TransportError> {
        let mut request = self
            .bot
            .send_poll(
                ChatId(chat_id),
                question.prompt(),
                question.options().to_vec(),
            )
            .type_(PollType::Quiz)
            .is_anonymous(anonymous)
            .correct_option_id(u8::try_from(question.correct_index())?);

        if let Some(explanation) = question.explanation() {
            request = request.explanation(truncate_chars(explanation, EXPLANATION_LIMIT));
        }

        let message = request.await?;
        let poll = message
            .poll()
            .ok_or("Telegram answered without the published poll")?;

        Ok(poll.id.to_string())
    }

    async fn notify(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }

    async fn chat_title(&self, chat_id: i64) -> Result<Option<String>, TransportError> {
        let chat = self.bot.get_chat(ChatId(chat_id)).await?;
        Ok(chat.title().map(str::to_owned))
    }
}
