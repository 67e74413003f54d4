#[allow(unused)]
mod interlude {
    pub use crate::utils::default;

    pub use std::future::Future;
    pub use std::path::{Path, PathBuf};
    pub use std::sync::Arc;

    pub use color_eyre::eyre;
    pub use eyre::{format_err as ferr, Context, Result as Res, WrapErr};
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::json;
    pub use tracing::{debug, error, info, trace, warn};
    pub use tracing_unwrap::*;
}

mod cli;
mod collection;
mod config;
mod engine;
mod log;
mod ops;
mod parser;
mod publish;
mod server;
mod store;
mod task;
mod utils;

use crate::interlude::*;

use shadow_rs::shadow;
shadow!(build);

fn main() -> std::process::ExitCode {
    // FIXME: use unix_sigpipe once https://github.com/rust-lang/rust/issues/97889 lands
    #[cfg(unix)]
    unsafe {
        use nix::sys::signal::*;
        // `sake list | head` should end quietly
        let _ = signal(Signal::SIGPIPE, SigHandler::SigDfl);
    }
    log::init();

    let res = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("error building tokio runtime")
        .and_then(|rt| {
            let res = rt.block_on(cli::cli());
            // abandoned blocking work, like a timed out parse, mustn't
            // hold the process open
            rt.shutdown_background();
            res
        });

    match res {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
