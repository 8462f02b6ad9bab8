//! JSON-lines invocation stream
//!
//! Every non-empty input line is one event. Events run concurrently on their
//! own tasks against a shared handler, so a slow cluster does not hold up the
//! rest. Responses are written as they complete, one JSON object per line,
//! and carry the cluster name for correlation.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use eks_token::IdentityProvider;

use crate::cluster::ClusterDescriber;
use crate::handler::{FunctionEvent, InvocationResponse, RequestHandler, GENERIC_ERROR_MESSAGE};
use crate::kubernetes::PodCounter;

/// Read events from `input` until EOF and write one response per event to
/// `output`. Returns the writer and the number of events answered.
pub async fn serve_lines<D, I, Q, R, W>(
    handler: Arc<RequestHandler<D, I, Q>>,
    input: R,
    output: W,
) -> std::io::Result<(W, usize)>
where
    D: ClusterDescriber + 'static,
    I: IdentityProvider + 'static,
    Q: PodCounter + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<InvocationResponse>();
    let writer = tokio::spawn(write_responses(rx, output));

    let mut tasks = JoinSet::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<FunctionEvent>(line) {
            Ok(event) => {
                let handler = handler.clone();
                let tx = tx.clone();
                tasks.spawn(async move {
                    let response = handler.respond(&event).await;
                    let _ = tx.send(response);
                });
            }
            Err(e) => {
                tracing::warn!("Rejecting malformed event: {}", e);
                let _ = tx.send(InvocationResponse {
                    cluster_name: None,
                    message: GENERIC_ERROR_MESSAGE.to_string(),
                    error: Some(format!("Invalid event: {}", e)),
                });
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Invocation task failed: {}", e);
        }
    }
    drop(tx);

    writer
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}

async fn write_responses<W>(
    mut rx: mpsc::UnboundedReceiver<InvocationResponse>,
    mut output: W,
) -> std::io::Result<(W, usize)>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(response) = rx.recv().await {
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        output.write_all(&out).await?;
        output.flush().await?;
        written += 1;
    }
    Ok((output, written))
}
