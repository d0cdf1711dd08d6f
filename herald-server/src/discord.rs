//! Discord adapter: the notification sink and the gateway event handler.

use async_trait::async_trait;
use herald_core::commands::{Caller, CommandHandler, CommandOutcome, Menu};
use herald_core::delivery::{NotificationSink, SinkError, truncate_message};
use herald_core::entities::{ChannelId, RoleId};
use serenity::all::{
    ComponentInteraction, ComponentInteractionDataKind, Context, CreateActionRow,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage, CreateSelectMenu,
    CreateSelectMenuKind, CreateSelectMenuOption, EventHandler, GatewayIntents, Interaction,
    Message, Ready,
};
use serenity::http::{Http, HttpError};
use std::sync::Arc;
use time::OffsetDateTime;

/// Gateway intents needed to read prefixed commands in guild channels.
pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

/// Posts messages through the Discord REST API.
pub struct SerenitySink {
    http: Arc<Http>,
}

impl SerenitySink {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }
}

#[async_trait]
impl NotificationSink for SerenitySink {
    async fn send(&self, destination: ChannelId, text: &str) -> Result<(), SinkError> {
        let channel = serenity::all::ChannelId::new(destination.get());
        match channel.say(&*self.http, truncate_message(text)).await {
            Ok(_) => Ok(()),
            Err(serenity::Error::Http(HttpError::UnsuccessfulRequest(response)))
                if response.status_code.is_client_error() =>
            {
                tracing::warn!(
                    channel = %destination,
                    status = %response.status_code,
                    error = %response.error.message,
                    "Discord rejected message"
                );
                Err(SinkError::Rejected(destination))
            }
            Err(e) => Err(SinkError::Transport(e.to_string())),
        }
    }
}

/// Routes gateway events to the command handler.
pub struct Handler {
    commands: Arc<CommandHandler>,
}

impl Handler {
    pub fn new(commands: Arc<CommandHandler>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, guilds = ready.guilds.len(), "Connected to Discord gateway");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || msg.guild_id.is_none() {
            return;
        }
        if !msg.content.trim_start().starts_with(self.commands.prefix()) {
            return;
        }

        let caller = message_caller(&ctx, &msg).await;
        let outcome = self
            .commands
            .handle_message(&caller, &msg.content, OffsetDateTime::now_utc())
            .await;

        let result = match outcome {
            CommandOutcome::Ignored => return,
            CommandOutcome::Reply(text) => msg.channel_id.say(&ctx.http, truncate_message(&text)).await,
            CommandOutcome::Menu(menu) => {
                let message = CreateMessage::new()
                    .content(truncate_message(&menu.prompt))
                    .components(vec![select_row(&menu)]);
                msg.channel_id.send_message(&ctx.http, message).await
            }
        };
        if let Err(e) = result {
            tracing::warn!(channel = %msg.channel_id, error = %e, "Failed to reply to command");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Component(component) = interaction else {
            return;
        };
        let ComponentInteractionDataKind::StringSelect { values } = &component.data.kind else {
            return;
        };
        let Some(value) = values.first() else {
            return;
        };

        let caller = component_caller(&component);
        let outcome = self
            .commands
            .handle_selection(&caller, &component.data.custom_id, value, OffsetDateTime::now_utc())
            .await;

        let response = match outcome {
            CommandOutcome::Ignored => return,
            CommandOutcome::Reply(text) => CreateInteractionResponseMessage::new()
                .content(truncate_message(&text))
                .components(Vec::new()),
            CommandOutcome::Menu(menu) => CreateInteractionResponseMessage::new()
                .content(truncate_message(&menu.prompt))
                .components(vec![select_row(&menu)]),
        };
        if let Err(e) = component
            .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(response))
            .await
        {
            tracing::warn!(custom_id = %component.data.custom_id, error = %e, "Failed to answer selection");
        }
    }
}

fn select_row(menu: &Menu) -> CreateActionRow {
    let options = menu
        .options
        .iter()
        .map(|option| CreateSelectMenuOption::new(&option.label, &option.value))
        .collect();
    let select = CreateSelectMenu::new(&menu.custom_id, CreateSelectMenuKind::String { options })
        .placeholder(&menu.placeholder);
    CreateActionRow::SelectMenu(select)
}

fn roles(ids: &[serenity::all::RoleId]) -> Vec<RoleId> {
    ids.iter().filter_map(|id| RoleId::new(id.get())).collect()
}

async fn message_caller(ctx: &Context, msg: &Message) -> Caller {
    let member = match msg.member(ctx).await {
        Ok(member) => member,
        Err(e) => {
            tracing::debug!(user = %msg.author.id, error = %e, "Could not resolve guild member");
            return Caller::default();
        }
    };
    let is_admin = msg
        .guild(&ctx.cache)
        .map(|guild| {
            #[allow(deprecated)]
            let permissions = guild.member_permissions(&member);
            permissions.administrator()
        })
        .unwrap_or(false);
    Caller {
        is_admin,
        is_bot: msg.author.bot,
        roles: roles(&member.roles),
    }
}

fn component_caller(component: &ComponentInteraction) -> Caller {
    let Some(member) = &component.member else {
        return Caller::default();
    };
    Caller {
        is_admin: member.permissions.is_some_and(|p| p.administrator()),
        is_bot: component.user.bot,
        roles: roles(&member.roles),
    }
}
