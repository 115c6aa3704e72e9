// One executor per deployment action kind

pub mod api_call;
pub mod command;
pub mod copy;
pub mod docker;
pub mod email;
pub mod ftp;
pub mod npm;
pub mod smb;
pub mod ssh;
pub mod webhook;
