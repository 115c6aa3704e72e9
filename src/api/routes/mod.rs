// Route handlers

pub mod actions;
pub mod certificates;
pub mod files;
pub mod health;
pub mod passphrase;
pub mod renew;
pub mod san;
pub mod scheduler;
pub mod settings;
