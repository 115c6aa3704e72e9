// Domain model shared across the engine

pub mod action;
pub mod certificate;

pub use action::{ActionResult, ActionStatus, DeployAction, DispatchMode, DispatchReport};
pub use certificate::{
    ArtifactForm, CertStatus, CertType, Certificate, KeyType, RenewalPolicy, SanEntry, SanKind,
    VersionEntry,
};
