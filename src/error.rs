use std::io;

use crate::decoder::DefragError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("defragmentation error: {0}")]
    Defrag(#[from] DefragError),

    #[error("pcap error: {0}")]
    Pcap(String),
}

pub type Result<T> = std::result::Result<T, Error>;
