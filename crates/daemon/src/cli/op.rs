use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolve the base URL of a local service.
///
/// Priority: explicit flag > `port` from the config file > `fallback_port`.
pub fn resolve_remote(explicit: Option<Url>, port: Option<u16>, fallback_port: u16) -> Url {
    if let Some(url) = explicit {
        return url;
    }
    let port = port.unwrap_or(fallback_port);
    Url::parse(&format!("http://localhost:{}", port))
        .unwrap_or_else(|_| unreachable!("a localhost url with a u16 port always parses"))
}


#[derive(Clone)]
pub struct OpContext {
    /// Shared client for talking to running services
    pub http: reqwest::Client,
    /// Optional custom config path (defaults to ~/.ecloud)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build()?,
            config_path,
        })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
