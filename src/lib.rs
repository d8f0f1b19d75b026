use state::PanelState;
use teloxide::{dispatching::dialogue::InMemStorage, prelude::Dialogue};

pub mod commands;
pub mod config;
pub mod database;
pub mod drainer;
pub mod keyboard;
pub mod panel;
pub mod parser;
pub mod publisher;
pub mod schema;
pub mod scoring;
pub mod state;
pub mod upload;

pub type PanelDialogue = Dialogue<PanelState, InMemStorage<PanelState>>;
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;
