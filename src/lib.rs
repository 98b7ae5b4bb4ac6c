pub mod app;
mod cli;
mod config;
pub mod coords;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod logging;
pub mod notification;
pub mod overlay;
pub mod panel;
pub mod poi;
pub mod storage;
pub mod viewer;
pub use error::{AppError, AppResult};

/// Entrypoint used by the `poimap` binary.
pub fn run() -> anyhow::Result<()> {
    logging::init();
    cli::handle_commands(std::env::args_os())
}
