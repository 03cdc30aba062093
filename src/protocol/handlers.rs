//! Command handlers
//!
//! Routes each parsed command to its handler and maps every failure to
//! the reply its class warrants. The authentication precondition is
//! enforced here once, before routing, so no handler re-checks it.

use std::io;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::error::CommandError;
use crate::protocol::{Command, Reply, replies};
use crate::session::{ControlWriter, Session, SessionContext};
use crate::transfer::{PassiveChannel, engine};

/// What the session loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Handles one command end to end: precondition, dispatch, reply.
///
/// Returns `Err` only when the control connection itself fails; every
/// other failure is answered on the control channel and the session
/// keeps going.
pub async fn handle_command(
    session: &mut Session,
    command: &Command,
    control: &mut ControlWriter,
    ctx: &SessionContext,
) -> io::Result<Flow> {
    // Only USER, PASS and QUIT may precede a successful login.
    if !session.is_authenticated() && !command.allowed_before_login() {
        let err = CommandError::NotLoggedIn;
        err.log(session.peer());
        control.send(&err.reply()).await?;
        return Ok(Flow::Continue);
    }

    match dispatch(session, command, control, ctx).await {
        Ok(reply) => {
            control.send(&reply).await?;
            Ok(match command {
                Command::Quit => Flow::Quit,
                _ => Flow::Continue,
            })
        }
        Err(CommandError::Transport(e)) => Err(e),
        Err(err) => {
            err.log(session.peer());
            control.send(&err.reply()).await?;
            Ok(Flow::Continue)
        }
    }
}

async fn dispatch(
    session: &mut Session,
    command: &Command,
    control: &mut ControlWriter,
    ctx: &SessionContext,
) -> Result<Reply, CommandError> {
    match command {
        Command::User(name) => handle_user(session, name),
        Command::Pass(secret) => handle_pass(session, secret, ctx),
        Command::Quit => Ok(Reply::new(replies::GOODBYE, "Goodbye.")),
        Command::Syst => Ok(Reply::new(replies::SYSTEM_TYPE, "UNIX Type: L8")),
        Command::Noop => Ok(Reply::new(replies::OK, "OK.")),
        Command::Pwd => Ok(Reply::new(
            replies::PATH_CREATED,
            "\"/\" is the current directory.",
        )),
        Command::Feat => Ok(Reply::new(replies::FEATURES, "No extended features.")),
        Command::Auth(_) => Ok(Reply::new(
            replies::NOT_IMPLEMENTED,
            "Security extensions not supported.",
        )),
        Command::Type(code) => handle_type(code),
        Command::Cwd(path) => handle_cwd(path, ctx),
        Command::Pasv => handle_pasv(session, ctx),
        Command::List | Command::Nlst => handle_list(session, control, ctx).await,
        Command::Size(name) => handle_size(name, ctx),
        Command::Mdtm(name) => handle_mdtm(name, ctx),
        Command::Retr(name) => handle_retr(session, name, control, ctx).await,
        Command::Stor(name) => handle_stor(session, name, control, ctx).await,
        Command::Unknown(raw) => Err(CommandError::NotImplemented(raw.clone())),
    }
}

/// USER stores the offered name; the verdict waits for PASS.
fn handle_user(session: &mut Session, name: &str) -> Result<Reply, CommandError> {
    session.set_pending_user(name.to_string());
    Ok(Reply::new(
        replies::PASSWORD_REQUIRED,
        "User name okay, need password.",
    ))
}

/// PASS settles the pending USER against the configured credential
/// pair. The pending name is consumed whether the attempt succeeds or
/// not; a failed attempt always leaves the session unauthenticated.
fn handle_pass(
    session: &mut Session,
    secret: &str,
    ctx: &SessionContext,
) -> Result<Reply, CommandError> {
    let offered = session.take_pending_user();
    let config = &ctx.config;
    let accepted =
        offered.as_deref() == Some(config.username.as_str()) && secret == config.password;
    session.set_authenticated(accepted);
    if accepted {
        info!("user {} logged in from {}", config.username, session.peer());
        Ok(Reply::new(replies::LOGIN_SUCCESS, "User logged in, proceed."))
    } else {
        warn!(
            "ALERT: failed login attempt from {} (user {:?})",
            session.peer(),
            offered.as_deref().unwrap_or("")
        );
        Ok(Reply::new(replies::NOT_LOGGED_IN, "Login incorrect."))
    }
}

/// TYPE accepts the codes a flat byte store can honor. The setting is
/// cosmetic: data is always transferred as raw bytes.
fn handle_type(code: &str) -> Result<Reply, CommandError> {
    let normalized = code
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    match normalized.as_str() {
        "A" | "I" | "L 8" => Ok(Reply::new(
            replies::OK,
            format!("Type set to {normalized}."),
        )),
        _ => Err(CommandError::BadParameter(code.to_string())),
    }
}

/// CWD accepts only the root forms; the namespace has no tree.
fn handle_cwd(path: &str, ctx: &SessionContext) -> Result<Reply, CommandError> {
    if ctx.config.is_root_path(path.trim()) {
        Ok(Reply::new(
            replies::ACTION_COMPLETE,
            "Directory changed to /.",
        ))
    } else {
        Err(CommandError::NotFound(path.to_string()))
    }
}

/// PASV tears down any live channel, binds a fresh listener, and only
/// then advertises the endpoint.
fn handle_pasv(session: &mut Session, ctx: &SessionContext) -> Result<Reply, CommandError> {
    session.close_data_channel();

    let ip = match ctx.config.pasv_ip() {
        Some(ip) => ip,
        None => match session.local_ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => {
                return Err(CommandError::DataChannel(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "passive mode requires an IPv4 address",
                )));
            }
        },
    };

    let channel =
        PassiveChannel::open(ip, ctx.config.pasv_port).map_err(CommandError::DataChannel)?;
    let reply = Reply::new(replies::ENTERING_PASSIVE_MODE, channel.pasv_text());
    session.set_data_channel(channel);
    Ok(reply)
}

/// LIST and NLST stream the flat namespace over the data channel.
async fn handle_list(
    session: &mut Session,
    control: &mut ControlWriter,
    ctx: &SessionContext,
) -> Result<Reply, CommandError> {
    let mut channel = session
        .take_data_channel()
        .ok_or(CommandError::NoDataChannel)?;

    control
        .send(&Reply::new(
            replies::OPENING_DATA_CONNECTION,
            "Here comes the directory listing.",
        ))
        .await
        .map_err(CommandError::Transport)?;

    let result = stream_listing(&mut channel, ctx);
    channel.close();
    result
}

fn stream_listing(
    channel: &mut PassiveChannel,
    ctx: &SessionContext,
) -> Result<Reply, CommandError> {
    let names = ctx.store.list().map_err(CommandError::Storage)?;
    let conn = channel
        .accept_once(ctx.config.data_timeout())
        .map_err(CommandError::DataChannel)?;
    engine::send_listing(&names, conn).map_err(CommandError::Transfer)?;
    Ok(Reply::new(replies::TRANSFER_COMPLETE, "Directory send OK."))
}

/// SIZE reports the stored byte count.
fn handle_size(name: &str, ctx: &SessionContext) -> Result<Reply, CommandError> {
    let info = ctx
        .store
        .stat(name)
        .map_err(|_| CommandError::NotFound(name.to_string()))?;
    Ok(Reply::new(replies::FILE_STATUS, info.size.to_string()))
}

/// MDTM reports the modification time as YYYYMMDDHHMMSS in UTC.
fn handle_mdtm(name: &str, ctx: &SessionContext) -> Result<Reply, CommandError> {
    let info = ctx
        .store
        .stat(name)
        .map_err(|_| CommandError::NotFound(name.to_string()))?;
    let stamp: DateTime<Utc> = info.modified.into();
    Ok(Reply::new(
        replies::FILE_STATUS,
        stamp.format("%Y%m%d%H%M%S").to_string(),
    ))
}

/// RETR refuses missing and tampered files before any data connection
/// is accepted, then streams the content and closes the channel.
async fn handle_retr(
    session: &mut Session,
    name: &str,
    control: &mut ControlWriter,
    ctx: &SessionContext,
) -> Result<Reply, CommandError> {
    let mut channel = session
        .take_data_channel()
        .ok_or(CommandError::NoDataChannel)?;

    if !ctx.store.exists(name) {
        channel.close();
        return Err(CommandError::NotFound(name.to_string()));
    }
    if ctx.gate.has_changed(name) {
        channel.close();
        return Err(CommandError::IntegrityViolation(name.to_string()));
    }

    control
        .send(&Reply::new(
            replies::OPENING_DATA_CONNECTION,
            "Opening data connection.",
        ))
        .await
        .map_err(CommandError::Transport)?;

    let result = stream_download(&mut channel, name, ctx);
    channel.close();
    result
}

fn stream_download(
    channel: &mut PassiveChannel,
    name: &str,
    ctx: &SessionContext,
) -> Result<Reply, CommandError> {
    let mut file = ctx.store.open_read(name).map_err(CommandError::Storage)?;
    let conn = channel
        .accept_once(ctx.config.data_timeout())
        .map_err(CommandError::DataChannel)?;
    let bytes = engine::send_file(&mut *file, conn).map_err(CommandError::Transfer)?;
    info!("sent {name} ({bytes} bytes)");
    Ok(Reply::new(replies::TRANSFER_COMPLETE, "Transfer complete."))
}

/// STOR receives until the peer closes the data connection, then
/// refreshes the integrity record when the path is protected.
async fn handle_stor(
    session: &mut Session,
    name: &str,
    control: &mut ControlWriter,
    ctx: &SessionContext,
) -> Result<Reply, CommandError> {
    let mut channel = session
        .take_data_channel()
        .ok_or(CommandError::NoDataChannel)?;

    control
        .send(&Reply::new(
            replies::OPENING_DATA_CONNECTION,
            "Ok to send data.",
        ))
        .await
        .map_err(CommandError::Transport)?;

    let result = stream_upload(&mut channel, name, ctx);
    channel.close();
    result
}

fn stream_upload(
    channel: &mut PassiveChannel,
    name: &str,
    ctx: &SessionContext,
) -> Result<Reply, CommandError> {
    let conn = channel
        .accept_once(ctx.config.data_timeout())
        .map_err(CommandError::DataChannel)?;
    let mut sink = ctx.store.open_write(name).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => {
            CommandError::NotFound(name.to_string())
        }
        _ => CommandError::Storage(e),
    })?;
    let bytes = engine::receive_file(conn, &mut *sink).map_err(CommandError::Transfer)?;
    drop(sink);
    info!("stored {name} ({bytes} bytes)");

    // A protected upload re-baselines its integrity record.
    if ctx.config.is_protected(name) {
        ctx.gate.init(name).map_err(CommandError::Storage)?;
    }
    Ok(Reply::new(replies::TRANSFER_COMPLETE, "Transfer complete."))
}
