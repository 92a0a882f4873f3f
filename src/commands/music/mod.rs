//! The `!`-prefixed music commands, matched by regex against raw message
//! content and routed through a [`Sequence`]. Long-running operations reply
//! with an hourglass placeholder first and edit the answer in afterwards.

pub mod utils;

use regex::Regex;
use serenity::all::{ChannelType, EditMessage};
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

use crate::dispatcher::{self, HandlerResult, Sequence, boxed};
use crate::events::MessageEvent;
use crate::questions::{Question, answer};

use utils::music_manager::MusicError;
use utils::queue::{Queue, RequesterContext};

static PLAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!p(?:lay)? (.*)").unwrap());
static PLAYTOP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!p(?:lay)?top (.*)").unwrap());
static RANDOMTOP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!(?:p(?:lay)?)?rand(?:om)?top").unwrap());
static RANDOM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!(?:p(?:lay)?)?rand(?:om)?").unwrap());
static SKIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!skip").unwrap());
static NOW_PLAYING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!np").unwrap());
static JOIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!join").unwrap());
static PAUSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!pause").unwrap());
static RESUME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!resume").unwrap());
static QUEUE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!q(?:ueue)?").unwrap());
static LOOP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!loop(?:queue)?").unwrap());
static REMOVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!remove\b(?:\s+(\S+))?").unwrap());
static SHUFFLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!shuffle(?:queue)?").unwrap());
static SAVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!save").unwrap());
static LOAD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!load (.*)").unwrap());
static LEAVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!leave").unwrap());
static HELP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!help").unwrap());

const REMOVE_PROMPT: &str = "Please specify the number of the song to remove";
const REMOVE_PROMPT_EXPIRY: Duration = Duration::from_secs(30);

/// The full music command set as one handler, for the top-level route.
/// `randomtop` precedes `random` because the latter's pattern is a prefix of
/// the former's.
pub fn handler() -> dispatcher::Handler<MessageEvent> {
    Sequence::new(vec![
        boxed(play),
        boxed(play_top),
        boxed(random_top),
        boxed(random),
        boxed(skip),
        boxed(now_playing),
        boxed(join_channel),
        boxed(pause),
        boxed(resume),
        boxed(show_queue),
        boxed(toggle_loop),
        boxed(remove),
        boxed(shuffle),
        boxed(save),
        boxed(load),
        boxed(leave),
        boxed(help),
    ])
    .into_handler()
}

/// The guild's queue, or `None` outside a guild (the command then falls
/// through unhandled).
async fn guild_queue(event: &MessageEvent) -> Option<Queue> {
    let guild_id = event.msg.guild_id?;
    Some(event.state.queue(guild_id).await)
}

/// Snapshot of the requester's voice situation, taken from the gateway cache.
/// Synchronous so no cache reference survives into an await.
fn requester_context(event: &MessageEvent) -> Option<RequesterContext> {
    let guild = event.ctx.cache.guild(event.msg.guild_id?)?;
    let voice_channel = guild
        .voice_states
        .get(&event.msg.author.id)
        .and_then(|voice| voice.channel_id);
    let guild_voice_channels = guild
        .channels
        .values()
        .filter(|channel| channel.kind == ChannelType::Voice)
        .map(|channel| channel.id)
        .collect();
    Some(RequesterContext {
        voice_channel,
        guild_voice_channels,
    })
}

async fn say(event: &MessageEvent, content: impl Into<String>) -> Result<(), crate::Error> {
    event.msg.channel_id.say(&event.ctx, content.into()).await?;
    Ok(())
}

/// Placeholder-then-edit reply for operations that take a while. A
/// [`MusicError`] becomes the reply text; transport failures propagate.
async fn load_response<F>(event: &MessageEvent, work: F) -> Result<(), crate::Error>
where
    F: Future<Output = Result<String, MusicError>>,
{
    let mut placeholder = event.msg.channel_id.say(&event.ctx, ":hourglass:").await?;
    let content = match work.await {
        Ok(content) => content,
        Err(error) => {
            warn!(%error, "music command failed");
            error.to_string()
        }
    };
    placeholder
        .edit(&event.ctx, EditMessage::new().content(content))
        .await?;
    Ok(())
}

async fn play(event: MessageEvent) -> HandlerResult {
    let Some(query) = PLAY_RE
        .captures(&event.msg.content)
        .map(|caps| caps[1].trim().to_string())
    else {
        return Ok(false);
    };
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    let requester = requester_context(&event);
    load_response(&event, queue.enqueue(requester.as_ref(), &query, false)).await?;
    Ok(true)
}

async fn play_top(event: MessageEvent) -> HandlerResult {
    let Some(query) = PLAYTOP_RE
        .captures(&event.msg.content)
        .map(|caps| caps[1].trim().to_string())
    else {
        return Ok(false);
    };
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    let requester = requester_context(&event);
    load_response(&event, queue.enqueue(requester.as_ref(), &query, true)).await?;
    Ok(true)
}

async fn random_top(event: MessageEvent) -> HandlerResult {
    if !RANDOMTOP_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    let requester = requester_context(&event);
    load_response(&event, queue.enqueue_random(requester.as_ref(), true)).await?;
    Ok(true)
}

async fn random(event: MessageEvent) -> HandlerResult {
    if !RANDOM_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    let requester = requester_context(&event);
    load_response(&event, queue.enqueue_random(requester.as_ref(), false)).await?;
    Ok(true)
}

async fn skip(event: MessageEvent) -> HandlerResult {
    if !SKIP_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    let requester = requester_context(&event);
    load_response(&event, queue.skip(requester.as_ref())).await?;
    Ok(true)
}

async fn now_playing(event: MessageEvent) -> HandlerResult {
    if !NOW_PLAYING_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    say(&event, queue.currently_playing().await).await?;
    Ok(true)
}

async fn join_channel(event: MessageEvent) -> HandlerResult {
    if !JOIN_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(guild_id) = event.msg.guild_id else {
        return Ok(false);
    };
    let Some(channel) = requester_context(&event).and_then(|req| req.voice_channel) else {
        say(&event, MusicError::NoVoiceChannel.to_string()).await?;
        return Ok(true);
    };
    match event.state.sink.join(guild_id, channel).await {
        Ok(()) => say(&event, "Joined!").await?,
        Err(error) => say(&event, error.to_string()).await?,
    }
    Ok(true)
}

async fn pause(event: MessageEvent) -> HandlerResult {
    if !PAUSE_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(guild_id) = event.msg.guild_id else {
        return Ok(false);
    };
    match event.state.sink.pause(guild_id).await {
        Ok(()) => say(&event, "Paused.").await?,
        Err(error) => say(&event, error.to_string()).await?,
    }
    Ok(true)
}

async fn resume(event: MessageEvent) -> HandlerResult {
    if !RESUME_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(guild_id) = event.msg.guild_id else {
        return Ok(false);
    };
    match event.state.sink.resume(guild_id).await {
        Ok(()) => say(&event, "Resumed.").await?,
        Err(error) => say(&event, error.to_string()).await?,
    }
    Ok(true)
}

async fn show_queue(event: MessageEvent) -> HandlerResult {
    if !QUEUE_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    say(&event, queue.describe_queue().await).await?;
    Ok(true)
}

async fn toggle_loop(event: MessageEvent) -> HandlerResult {
    if !LOOP_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    say(&event, queue.toggle_loop().await).await?;
    Ok(true)
}

/// `!remove 3` removes directly; a bare `!remove` asks for the position and
/// waits up to thirty seconds for a follow-up number from the same author in
/// the same channel.
async fn remove(event: MessageEvent) -> HandlerResult {
    let Some(caps) = REMOVE_RE.captures(&event.msg.content) else {
        return Ok(false);
    };
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };

    if let Some(position) = caps.get(1).and_then(|arg| arg.as_str().parse::<usize>().ok()) {
        say(&event, queue.remove(position).await).await?;
        return Ok(true);
    }

    say(&event, REMOVE_PROMPT).await?;
    let author = event.msg.author.id;
    let channel = event.msg.channel_id;
    event
        .state
        .questions
        .add(Question::until_expired_or_answered(
            REMOVE_PROMPT_EXPIRY,
            answer(move |follow_up: MessageEvent| {
                let queue = queue.clone();
                async move {
                    if follow_up.msg.author.id != author || follow_up.msg.channel_id != channel {
                        return false;
                    }
                    let Ok(position) = follow_up.msg.content.trim().parse::<usize>() else {
                        return false;
                    };
                    let content = queue.remove(position).await;
                    if let Err(error) = follow_up.msg.channel_id.say(&follow_up.ctx, content).await
                    {
                        warn!(%error, "could not send removal confirmation");
                    }
                    true
                }
            }),
        ))
        .await;
    Ok(true)
}

async fn shuffle(event: MessageEvent) -> HandlerResult {
    if !SHUFFLE_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    say(&event, queue.shuffle().await).await?;
    Ok(true)
}

async fn save(event: MessageEvent) -> HandlerResult {
    if !SAVE_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    say(&event, queue.save().await).await?;
    Ok(true)
}

async fn load(event: MessageEvent) -> HandlerResult {
    let Some(ids) = LOAD_RE
        .captures(&event.msg.content)
        .map(|caps| caps[1].trim().to_string())
    else {
        return Ok(false);
    };
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    let requester = requester_context(&event);
    load_response(&event, queue.load(requester.as_ref(), &ids)).await?;
    Ok(true)
}

async fn leave(event: MessageEvent) -> HandlerResult {
    if !LEAVE_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    let Some(queue) = guild_queue(&event).await else {
        return Ok(false);
    };
    say(&event, queue.leave().await).await?;
    Ok(true)
}

async fn help(event: MessageEvent) -> HandlerResult {
    if !HELP_RE.is_match(&event.msg.content) {
        return Ok(false);
    }
    say(
        &event,
        "Commands:\n\
         `!play <name or url>` - queue a song or playlist\n\
         `!playtop <name or url>` - queue at the front\n\
         `!random` / `!randomtop` - queue a random known song\n\
         `!skip` - skip the current song\n\
         `!np` - show the current song\n\
         `!queue` - show the queue\n\
         `!loop` - toggle queue looping\n\
         `!remove <number>` - remove a queued song\n\
         `!shuffle` - shuffle the queue\n\
         `!save` / `!load <ids>` - save and restore the queue\n\
         `!join` / `!pause` / `!resume` / `!leave`",
    )
    .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("!play despacito", Some("despacito"); "long form")]
    #[test_case("!p despacito", Some("despacito"); "short form")]
    #[test_case("!PLAY despacito", Some("despacito"); "case insensitive")]
    #[test_case("!playtop despacito", None; "playtop is not play")]
    #[test_case("!play", None; "missing argument")]
    fn play_pattern(content: &str, expected: Option<&str>) {
        let found = PLAY_RE
            .captures(content)
            .map(|caps| caps[1].trim().to_string());
        assert_eq!(found.as_deref(), expected);
    }

    #[test_case("!playtop song", Some("song"))]
    #[test_case("!ptop song", Some("song"))]
    #[test_case("!play song", None)]
    fn playtop_pattern(content: &str, expected: Option<&str>) {
        let found = PLAYTOP_RE
            .captures(content)
            .map(|caps| caps[1].trim().to_string());
        assert_eq!(found.as_deref(), expected);
    }

    #[test_case("!random", true)]
    #[test_case("!rand", true)]
    #[test_case("!playrandom", true)]
    #[test_case("!prand", true)]
    #[test_case("!randomtop", true; "also matches the top variant")]
    #[test_case("!skip", false)]
    fn random_pattern(content: &str, matches: bool) {
        assert_eq!(RANDOM_RE.is_match(content), matches);
    }

    #[test_case("!randomtop", true)]
    #[test_case("!randtop", true)]
    #[test_case("!playrandomtop", true)]
    #[test_case("!random", false)]
    fn randomtop_pattern(content: &str, matches: bool) {
        assert_eq!(RANDOMTOP_RE.is_match(content), matches);
    }

    #[test_case("!queue", true)]
    #[test_case("!q", true)]
    #[test_case("!loop", true)]
    #[test_case("!loopqueue", true)]
    #[test_case("!shufflequeue", true)]
    fn alias_patterns(content: &str, matches: bool) {
        let matched = QUEUE_RE.is_match(content)
            || LOOP_RE.is_match(content)
            || SHUFFLE_RE.is_match(content);
        assert_eq!(matched, matches);
    }

    #[test]
    fn remove_pattern_with_and_without_position() {
        let caps = REMOVE_RE.captures("!remove 3").unwrap();
        assert_eq!(&caps[1], "3");

        let caps = REMOVE_RE.captures("!remove").unwrap();
        assert!(caps.get(1).is_none());

        assert!(!REMOVE_RE.is_match("!removed"));
    }

    #[test]
    fn load_pattern_captures_the_id_list() {
        let caps = LOAD_RE.captures("!load a,b,c").unwrap();
        assert_eq!(&caps[1], "a,b,c");
        assert!(!LOAD_RE.is_match("!load"));
    }
}
