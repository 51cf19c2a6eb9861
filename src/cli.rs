//! Interactive client.
//!
//! Reads one line at a time, sends it trimmed and verbatim, prints the reply.
//! `exit` quits without sending anything; blank lines are skipped.

use crate::client::{ClientConfig, TcpClient};
use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Prompt printed before each line is read.
pub const PROMPT: &str = "[memkv] > ";

/// What the REPL should do with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction<'a> {
    Exit,
    Skip,
    Send(&'a str),
}

/// Classifies a raw input line.
pub fn classify(line: &str) -> LineAction<'_> {
    match line.trim() {
        "exit" => LineAction::Exit,
        "" => LineAction::Skip,
        request => LineAction::Send(request),
    }
}

/// Anything that can carry one request and return one reply.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&mut self, request: &[u8]) -> anyhow::Result<Vec<u8>>;
}

impl Transport for TcpClient {
    async fn send(&mut self, request: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(TcpClient::send(self, request).await?.to_vec())
    }
}

/// Runs the read-eval-print loop until `exit`, end of input or `shutdown`.
///
/// Transport errors are printed and the loop continues.
pub async fn repl<T, R, W>(
    transport: &mut T,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("failed to read from stdin")?,
        };

        let Some(line) = line else {
            break;
        };

        let request = match classify(&line) {
            LineAction::Exit => {
                info!("exiting");
                break;
            }
            LineAction::Skip => continue,
            LineAction::Send(request) => request,
        };

        match transport.send(request.as_bytes()).await {
            Ok(reply) => {
                output.write_all(&reply).await?;
                output.write_all(b"\n").await?;
            }
            Err(e) => {
                error!(error = %e, "failed to send request to server");
                output.write_all(format!("{:#}\n", e).as_bytes()).await?;
            }
        }
    }

    output.flush().await?;
    Ok(())
}

/// Connects to `address` and runs the REPL on stdin/stdout.
pub async fn run_cli(
    address: &str,
    config: ClientConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut client = TcpClient::connect(address, config)
        .await
        .context("failed to create tcp client")?;

    info!(address, "starting interactive client");

    repl(
        &mut client,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown,
    )
    .await
}
