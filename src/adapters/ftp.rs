// FTP/FTPS adapter for ftp-copy deployments

use crate::error::EngineError;
use crate::Result;
use std::io::Cursor;
use std::path::PathBuf;
use suppaftp::native_tls::TlsConnector;
use suppaftp::{FtpError, FtpStream, NativeTlsConnector, NativeTlsFtpStream};

#[derive(Clone)]
pub struct FtpTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Explicit FTPS (TLS on the control connection)
    pub secure: bool,
}

/// Upload bytes to the remote path. suppaftp is blocking, so the transfer
/// runs on the blocking pool.
pub async fn upload(target: FtpTarget, remote_path: PathBuf, bytes: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let path = remote_path.to_string_lossy().into_owned();
        if target.secure {
            let mut stream = connect_secure(&target)?;
            stream
                .login(&target.username, &target.password)
                .map_err(|e| auth_err(&target.host, e))?;
            stream
                .put_file(&path, &mut Cursor::new(bytes))
                .map_err(|e| classify(&target.host, e))?;
            let _ = stream.quit();
        } else {
            let mut stream = connect_plain(&target)?;
            stream
                .login(&target.username, &target.password)
                .map_err(|e| auth_err(&target.host, e))?;
            stream
                .put_file(&path, &mut Cursor::new(bytes))
                .map_err(|e| classify(&target.host, e))?;
            let _ = stream.quit();
        }
        tracing::debug!(host = %target.host, path, "Uploaded via FTP");
        Ok(())
    })
    .await?
}

/// Connect and log in without transferring anything
pub async fn check(target: FtpTarget) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        if target.secure {
            let mut stream = connect_secure(&target)?;
            stream
                .login(&target.username, &target.password)
                .map_err(|e| auth_err(&target.host, e))?;
            let _ = stream.quit();
        } else {
            let mut stream = connect_plain(&target)?;
            stream
                .login(&target.username, &target.password)
                .map_err(|e| auth_err(&target.host, e))?;
            let _ = stream.quit();
        }
        Ok(())
    })
    .await?
}

fn connect_plain(target: &FtpTarget) -> Result<FtpStream> {
    FtpStream::connect(format!("{}:{}", target.host, target.port))
        .map_err(|e| unreachable_err(&target.host, e))
}

fn connect_secure(target: &FtpTarget) -> Result<NativeTlsFtpStream> {
    let connector = TlsConnector::new().map_err(|e| EngineError::Internal(format!(
        "TLS connector init: {}",
        e
    )))?;
    NativeTlsFtpStream::connect(format!("{}:{}", target.host, target.port))
        .map_err(|e| unreachable_err(&target.host, e))?
        .into_secure(NativeTlsConnector::from(connector), &target.host)
        .map_err(|e| unreachable_err(&target.host, e))
}

fn unreachable_err(host: &str, err: FtpError) -> EngineError {
    EngineError::AdapterUnreachable {
        adapter: "ftp".to_string(),
        details: format!("{}: {}", host, err),
    }
}

fn auth_err(host: &str, err: FtpError) -> EngineError {
    match err {
        FtpError::ConnectionError(_) => unreachable_err(host, err),
        other => EngineError::AdapterAuth {
            adapter: "ftp".to_string(),
            details: format!("{}: {}", host, other),
        },
    }
}

fn classify(host: &str, err: FtpError) -> EngineError {
    match err {
        FtpError::ConnectionError(_) => unreachable_err(host, err),
        other => EngineError::AdapterRemote {
            adapter: "ftp".to_string(),
            details: format!("{}: {}", host, other),
        },
    }
}
