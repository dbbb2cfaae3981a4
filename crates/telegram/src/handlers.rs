//! Inbound message handling: command routing and the authoring flow.

use std::sync::Arc;

use {
    teloxide::{
        prelude::*,
        types::{ChatMember, MediaKind, MessageKind, UserId},
    },
    tracing::{debug, info, warn},
};

use batchlink_core::{
    Applied, AuthoringSession, BundleStore, ChannelBinding, ChannelStore, Content, SessionStore,
    publish,
};

use crate::{delivery::DeliveryEngine, outbound::Outbound};

const WELCOME_MSG: &str = "👋 Welcome! Please use a valid start link.";
const SET_USAGE_MSG: &str = "❌ Usage: /set 1000";
const SET_OK_MSG: &str = "✅ Okay! Now send the message to display to users.";
const INVALID_NUMBER_MSG: &str = "❌ Invalid number.";
const CONNECT_USAGE_MSG: &str = "❌ Usage: /connect -100xxxxxxxxx";
const NOT_ADMIN_MSG: &str = "❌ Bot is not admin in the channel.";
const SEND_VIDEO_MSG: &str = "❌ Please send a video.";

/// Shared context for inbound message handling.
pub struct HandlerContext {
    pub bot: Bot,
    pub bot_user_id: UserId,
    pub bot_username: String,
    pub sessions: Arc<dyn SessionStore>,
    pub bundles: Arc<dyn BundleStore>,
    pub channels: Arc<dyn ChannelStore>,
    pub outbound: Arc<dyn Outbound>,
    pub delivery: DeliveryEngine,
}

/// Handle a single inbound message (called from the polling loop).
pub async fn handle_message(msg: &Message, ctx: &HandlerContext) -> anyhow::Result<()> {
    let Some(from) = msg.from.as_ref() else {
        debug!(chat_id = msg.chat.id.0, "ignoring message without sender");
        return Ok(());
    };
    let owner_id = from.id.0 as i64;
    let chat_id = msg.chat.id.0;

    let content = extract_content(msg);
    if let Some((command, arg)) = content.text.as_deref().and_then(parse_command) {
        return handle_command(command, arg, owner_id, chat_id, ctx).await;
    }

    handle_content(&content, owner_id, chat_id, ctx).await
}

async fn handle_command(
    command: &str,
    arg: Option<&str>,
    owner_id: i64,
    chat_id: i64,
    ctx: &HandlerContext,
) -> anyhow::Result<()> {
    match command {
        "start" => match arg {
            Some(token) => {
                ctx.delivery
                    .deliver(ctx.outbound.as_ref(), chat_id, token)
                    .await?;
            },
            None => ctx.outbound.send_text(chat_id, WELCOME_MSG).await?,
        },
        "set" => handle_set(arg, owner_id, chat_id, ctx).await?,
        "connect" => handle_connect(arg, owner_id, chat_id, ctx).await?,
        other => {
            debug!(owner_id, command = other, "ignoring unknown command");
        },
    }
    Ok(())
}

async fn handle_set(
    arg: Option<&str>,
    owner_id: i64,
    chat_id: i64,
    ctx: &HandlerContext,
) -> anyhow::Result<()> {
    let Some(arg) = arg else {
        ctx.outbound.send_text(chat_id, SET_USAGE_MSG).await?;
        return Ok(());
    };

    match AuthoringSession::parse_target_count(arg) {
        Ok(target_count) => {
            // Upsert: silently discards any incomplete session.
            let session = AuthoringSession::begin(owner_id, target_count);
            ctx.sessions.upsert(&session).await?;
            info!(owner_id, target_count, "authoring session started");
            ctx.outbound.send_text(chat_id, SET_OK_MSG).await?;
        },
        Err(e) => {
            debug!(owner_id, error = %e, "rejected target count");
            ctx.outbound.send_text(chat_id, INVALID_NUMBER_MSG).await?;
        },
    }
    Ok(())
}

async fn handle_connect(
    arg: Option<&str>,
    owner_id: i64,
    chat_id: i64,
    ctx: &HandlerContext,
) -> anyhow::Result<()> {
    let Some(channel_id) = parse_channel_id(arg) else {
        ctx.outbound.send_text(chat_id, CONNECT_USAGE_MSG).await?;
        return Ok(());
    };

    match ctx
        .bot
        .get_chat_member(ChatId(channel_id), ctx.bot_user_id)
        .await
    {
        Ok(member) if is_channel_admin(&member) => {
            ctx.channels
                .bind(&ChannelBinding {
                    channel_id,
                    owner_id,
                })
                .await?;
            info!(owner_id, channel_id, "channel connected");
            ctx.outbound
                .send_text(chat_id, &format!("✅ Connected to channel {channel_id}!"))
                .await?;
        },
        Ok(_) => {
            ctx.outbound.send_text(chat_id, NOT_ADMIN_MSG).await?;
        },
        Err(e) => {
            warn!(owner_id, channel_id, error = %e, "channel member lookup failed");
            ctx.outbound
                .send_text(chat_id, &format!("⚠️ Error: {e}"))
                .await?;
        },
    }
    Ok(())
}

/// Route non-command content into the owner's authoring session.
async fn handle_content(
    content: &Content,
    owner_id: i64,
    chat_id: i64,
    ctx: &HandlerContext,
) -> anyhow::Result<()> {
    // Content from an owner with no active session is ignored entirely,
    // so unrelated messages pass through without a reply.
    let Some(mut session) = ctx.sessions.find(owner_id).await? else {
        return Ok(());
    };

    match session.apply(content) {
        Applied::MessageSaved => {
            ctx.sessions.upsert(&session).await?;
            info!(owner_id, target_count = session.target_count, "batch message saved");
            ctx.outbound
                .send_text(
                    chat_id,
                    &format!("✅ Message saved. Now send {} videos.", session.target_count),
                )
                .await?;
        },
        Applied::NotAVideo => {
            ctx.outbound.send_text(chat_id, SEND_VIDEO_MSG).await?;
        },
        Applied::VideoAccepted => {
            // The store's atomic append is the authoritative mutation;
            // its returned row drives the progress report and the
            // finalize guard, so a racing upload cannot double-count.
            let video = content.video.as_deref().unwrap_or_default();
            let Some(updated) = ctx.sessions.append_video(owner_id, video).await? else {
                debug!(owner_id, "append hit a completed or discarded session");
                return Ok(());
            };

            if updated.finalize_ready() {
                finalize(updated, chat_id, ctx).await?;
            } else {
                ctx.outbound
                    .send_text(
                        chat_id,
                        &format!(
                            "📥 Received {}/{} videos.",
                            updated.received(),
                            updated.target_count
                        ),
                    )
                    .await?;
            }
        },
    }
    Ok(())
}

/// Publish the completed batch and hand the owner a share link.
async fn finalize(
    session: AuthoringSession,
    chat_id: i64,
    ctx: &HandlerContext,
) -> anyhow::Result<()> {
    let owner_id = session.owner_id;
    let bundle = publish(ctx.bundles.as_ref(), session.message, session.videos).await?;
    ctx.sessions.delete(owner_id).await?;
    info!(
        owner_id,
        token = %bundle.token,
        videos = bundle.videos.len(),
        "bundle published"
    );

    let link = share_link(&ctx.bot_username, &bundle.token);
    ctx.outbound
        .send_text(
            chat_id,
            &format!("✅ All videos received!\nHere is your link:\n\n{link}"),
        )
        .await?;
    Ok(())
}

/// Deep link a requester opens to redeem `token`.
fn share_link(bot_username: &str, token: &str) -> String {
    format!("https://t.me/{bot_username}?start={token}")
}

/// Split `/cmd arg` into its name and first argument, tolerating the
/// `@botname` suffix Telegram adds in group chats.
fn parse_command(text: &str) -> Option<(&str, Option<&str>)> {
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next()?;
    let name = name.split('@').next().unwrap_or(name);
    Some((name, parts.next()))
}

fn parse_channel_id(arg: Option<&str>) -> Option<i64> {
    arg.and_then(|a| a.parse::<i64>().ok())
}

fn is_channel_admin(member: &ChatMember) -> bool {
    member.kind.is_administrator()
}

/// Reduce an inbound Telegram message to the fields the authoring flow
/// cares about.
fn extract_content(msg: &Message) -> Content {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Text(t) => Content {
                text: Some(t.text.clone()),
                ..Default::default()
            },
            MediaKind::Video(v) => Content {
                caption: v.caption.clone(),
                video: Some(v.video.file.id.clone()),
                ..Default::default()
            },
            MediaKind::Photo(p) => Content {
                caption: p.caption.clone(),
                ..Default::default()
            },
            MediaKind::Document(d) => Content {
                caption: d.caption.clone(),
                ..Default::default()
            },
            MediaKind::Animation(a) => Content {
                caption: a.caption.clone(),
                ..Default::default()
            },
            MediaKind::Audio(a) => Content {
                caption: a.caption.clone(),
                ..Default::default()
            },
            MediaKind::Voice(v) => Content {
                caption: v.caption.clone(),
                ..Default::default()
            },
            _ => Content::default(),
        },
        _ => Content::default(),
    }
}
