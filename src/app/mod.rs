mod config;
mod contact;
mod crawl;
mod data_io;
mod detail;
mod error;
mod html;
mod listing;
mod net;
mod partial;
mod recovery;
mod runtime;
mod types;

#[cfg(test)]
mod testing;

pub use runtime::run;
pub use types::Cli;
