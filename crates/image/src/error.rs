use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to run `{command}`: {source}")]
    CommandExecution {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("required build asset is missing: {}", .0.display())]
    MissingAsset(PathBuf),
    #[error(transparent)]
    Config(#[from] skua_config::Error),
    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn command(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandExecution {
            command: command.into(),
            source,
        }
    }
}

impl skua_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

skua_common::impl_context!();
