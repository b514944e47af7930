pub mod command;
pub mod commit;
pub mod conf;
pub mod config;
pub mod daemon;
pub mod dispatch;
mod display;
pub mod fwd;
pub mod helpers;
pub mod server;
mod utils;

pub use command::{CommandTree, Privilege};
pub use commit::commit;
pub use config::DaemonConfig;
pub use daemon::DaemonKind;
pub use dispatch::{dispatch, Context};
pub use server::{bind, serve};
