//! CreditRoll collects per-contributor commit counts across every public
//! repository of a GitHub organization, folding anonymous contributor
//! entries into the account they belong to.

pub mod config;
pub mod credits;
pub mod error;
pub mod forge;
pub mod output;

pub use config::Config;
pub use credits::{CreditsOrchestrator, CreditsReport, CreditsRun};
pub use error::{CreditsError, CreditsResult};
pub use forge::{Credentials, ForgeClient, GitHubClient};
