// SSH/SFTP adapter for ssh-copy deployments
//
// ssh2 is a blocking library; every session runs on the blocking pool. A
// session lives for one deployment: connect, authenticate, upload, optionally
// run the post command, drop.

use crate::error::EngineError;
use crate::Result;
use ssh2::{OpenFlags, OpenType, Session};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved connection target (secrets already decrypted)
#[derive(Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshCredentials,
}

#[derive(Clone)]
pub enum SshCredentials {
    Password(String),
    Key {
        private_key: String,
        passphrase: Option<String>,
    },
}

/// Output of the post command, if one ran
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub output: String,
}

/// Upload bytes to a remote path and optionally run a command afterwards
pub async fn upload(
    target: SshTarget,
    remote_path: PathBuf,
    bytes: Vec<u8>,
    post_command: Option<String>,
) -> Result<Option<CommandOutput>> {
    tokio::task::spawn_blocking(move || {
        let session = open_session(&target)?;

        let sftp = session.sftp().map_err(|e| remote_err(&target.host, &e))?;
        let mut file = sftp
            .open_mode(
                &remote_path,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                0o600,
                OpenType::File,
            )
            .map_err(|e| EngineError::AdapterRemote {
                adapter: "ssh".to_string(),
                details: format!("Opening {} on {}: {}", remote_path.display(), target.host, e),
            })?;
        file.write_all(&bytes)
            .map_err(|e| remote_io_err(&target.host, e))?;
        drop(file);
        tracing::debug!(host = %target.host, path = %remote_path.display(), "Uploaded via SFTP");

        match post_command {
            Some(command) => run_command(&session, &target.host, &command).map(Some),
            None => Ok(None),
        }
    })
    .await?
}

/// Connect and authenticate without transferring anything
pub async fn check(target: SshTarget) -> Result<()> {
    tokio::task::spawn_blocking(move || open_session(&target).map(|_| ())).await?
}

fn open_session(target: &SshTarget) -> Result<Session> {
    let addr = format!("{}:{}", target.host, target.port);
    let stream = TcpStream::connect(&addr).map_err(|e| EngineError::AdapterUnreachable {
        adapter: "ssh".to_string(),
        details: format!("{}: {}", addr, e),
    })?;
    stream
        .set_read_timeout(Some(Duration::from_secs(30)))
        .and_then(|_| stream.set_write_timeout(Some(Duration::from_secs(30))))
        .map_err(|e| remote_io_err(&target.host, e))?;

    let mut session = Session::new().map_err(|e| remote_err(&target.host, &e))?;
    session.set_tcp_stream(stream);
    session
        .handshake()
        .map_err(|e| EngineError::AdapterUnreachable {
            adapter: "ssh".to_string(),
            details: format!("Handshake with {}: {}", target.host, e),
        })?;

    let auth_result = match &target.auth {
        SshCredentials::Password(password) => {
            session.userauth_password(&target.username, password)
        }
        SshCredentials::Key {
            private_key,
            passphrase,
        } => session.userauth_pubkey_memory(
            &target.username,
            None,
            private_key,
            passphrase.as_deref(),
        ),
    };
    auth_result.map_err(|e| EngineError::AdapterAuth {
        adapter: "ssh".to_string(),
        details: format!("{}@{}: {}", target.username, target.host, e),
    })?;

    if !session.authenticated() {
        return Err(EngineError::AdapterAuth {
            adapter: "ssh".to_string(),
            details: format!("{}@{}: authentication incomplete", target.username, target.host),
        });
    }

    Ok(session)
}

fn run_command(session: &Session, host: &str, command: &str) -> Result<CommandOutput> {
    let mut channel = session
        .channel_session()
        .map_err(|e| remote_err(host, &e))?;
    channel.exec(command).map_err(|e| remote_err(host, &e))?;

    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .map_err(|e| remote_io_err(host, e))?;
    let mut stderr = String::new();
    let _ = channel.stderr().read_to_string(&mut stderr);
    channel.wait_close().map_err(|e| remote_err(host, &e))?;

    let exit_status = channel.exit_status().map_err(|e| remote_err(host, &e))?;
    if exit_status != 0 {
        return Err(EngineError::AdapterRemote {
            adapter: "ssh".to_string(),
            details: format!(
                "Post command on {} exited with {}: {}",
                host,
                exit_status,
                stderr.trim()
            ),
        });
    }

    Ok(CommandOutput {
        exit_status,
        output,
    })
}

fn remote_err(host: &str, err: &ssh2::Error) -> EngineError {
    EngineError::AdapterRemote {
        adapter: "ssh".to_string(),
        details: format!("{}: {}", host, err),
    }
}

fn remote_io_err(host: &str, err: std::io::Error) -> EngineError {
    EngineError::AdapterRemote {
        adapter: "ssh".to_string(),
        details: format!("{}: {}", host, err),
    }
}
