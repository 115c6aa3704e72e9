// Deployment transport adapters
//
// Each adapter owns one way of reaching a deployment target and maps its
// library's failures onto the engine's error kinds: unreachable, auth,
// remote. The dispatch executors stay thin and call in here.

pub mod docker;
pub mod ftp;
pub mod http;
pub mod npm;
pub mod smb;
pub mod smtp;
pub mod ssh;
