use std::{error::Error, sync::Arc};

use teloxide::{
    dispatching::{
        dialogue::{self, InMemStorage},
        DpHandlerDescription, UpdateFilterExt, UpdateHandler,
    },
    dptree::{self, Handler},
    prelude::DependencyMap,
    types::{Message, Update},
};
use tracing::instrument;

use crate::{
    commands::{self, Command},
    config::Config,
    database::Storage,
    panel, scoring,
    state::PanelState,
    upload,
};

type SchemeResult = Result<(), Box<dyn Error + Send + Sync + 'static>>;

/// Dispatch tree of the bot. Poll answers carry no chat, so they are routed before the dialogue.
pub fn schema() -> UpdateHandler<Box<dyn Error + Send + Sync + 'static>> {
    let dialogue_handler = dialogue::enter::<Update, InMemStorage<PanelState>, PanelState, _>()
        .branch(message_scheme())
        .branch(callback_query_scheme());

    dptree::entry()
        .branch(Update::filter_poll_answer().endpoint(scoring::receive_poll_answer::<Storage>))
        .branch(dialogue_handler)
}

fn is_admin(update: Update, config: Arc<Config>) -> bool {
    update
        .from()
        .map_or(false, |user| config.is_admin(user.id.0))
}

#[instrument(level = "debug")]
fn message_scheme() -> Handler<'static, DependencyMap, SchemeResult, DpHandlerDescription> {
    use dptree::case;
    log::debug!("Building dispatching tree for messages");

    let public_commands = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(commands::help))
        .branch(case![Command::MyScore].endpoint(commands::my_score::<Storage>));

    let refused_commands = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(commands::refuse));

    Update::filter_message()
        .branch(public_commands)
        .branch(dptree::filter(is_admin).branch(admin_scheme()))
        .branch(refused_commands)
}

#[instrument(level = "debug")]
fn admin_scheme() -> Handler<'static, DependencyMap, SchemeResult, DpHandlerDescription> {
    use dptree::case;
    log::debug!("Building dispatching tree for admin panel");

    let admin_commands = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(commands::start::<Storage>))
        .branch(case![Command::Cancel].endpoint(commands::cancel))
        .branch(case![Command::AddChat].endpoint(commands::add_chat::<Storage>))
        .branch(case![Command::AddChatId(chat_id)].endpoint(commands::add_chat_id::<Storage>))
        .branch(case![Command::Chats].endpoint(commands::chats::<Storage>))
        .branch(case![Command::RemoveChat(chat_id)].endpoint(commands::remove_chat::<Storage>))
        .branch(case![Command::Stats].endpoint(commands::stats::<Storage>))
        .branch(case![Command::Peek].endpoint(commands::peek::<Storage>))
        .branch(case![Command::SendOne].endpoint(commands::send_one::<Storage>))
        .branch(case![Command::SendAll].endpoint(commands::send_all::<Storage>))
        .branch(case![Command::Clear].endpoint(commands::clear));

    dptree::entry()
        .branch(admin_commands)
        .branch(
            dptree::filter(|msg: Message| msg.document().is_some())
                .endpoint(upload::receive_upload::<Storage>),
        )
        .branch(case![PanelState::AwaitingChatId].endpoint(panel::receive_chat_id::<Storage>))
        .branch(dptree::filter(|msg: Message| msg.chat.is_private()).endpoint(commands::invalid_input))
}

#[instrument(level = "debug")]
fn callback_query_scheme() -> Handler<'static, DependencyMap, SchemeResult, DpHandlerDescription> {
    log::debug!("Building dispatching tree for callback query");

    Update::filter_callback_query()
        .branch(dptree::filter(is_admin).endpoint(panel::handle_callback::<Storage>))
        .endpoint(panel::refuse_callback)
}
